use glam::Vec3;
use hecs::Entity;
use scene_renderer::renderer::{
    BoundingSphere, DeviceCommand, FrameStats, LightBudget, LightCategory, LightGroup,
    LightGroupId, Material, MaterialDefinition, MaterialDefinitionKey, MaterialKey,
    MaterialShaderFlags, MeshHandle, PipelineKind, RecordingDevice, RenderState,
    ShaderProgramId, SubdivideOptions, TransparencyMode,
};
use scene_renderer::scene::Transform;
use scene_renderer::{Camera, RendererContext, RendererSettings, Scene, SceneRenderer, ViewportId};

const CUBE: MeshHandle = MeshHandle(7);
const PANE: MeshHandle = MeshHandle(8);

type LitDraw = (MeshHandle, LightGroupId, MaterialShaderFlags);

struct Harness {
    renderer: SceneRenderer<RecordingDevice>,
    viewport: ViewportId,
    scene: Scene,
    camera: Camera,
    lit: MaterialDefinitionKey,
    lit_material: MaterialKey,
}

impl Harness {
    fn new(settings: RendererSettings) -> Self {
        let mut renderer =
            SceneRenderer::new(RendererContext::new(RecordingDevice::new(), settings));
        let viewport = renderer.add_viewport(640, 480);
        let lit = renderer
            .materials_mut()
            .add_definition(MaterialDefinition::new("Lit", "// lit surface"));
        let lit_material = renderer.materials_mut().add_material(Material::new(lit));

        Self {
            renderer,
            viewport,
            scene: Scene::new(),
            camera: Camera::looking_at(Vec3::new(0.0, 4.0, 10.0), Vec3::ZERO),
            lit,
            lit_material,
        }
    }

    fn spawn_mesh(&mut self, position: Vec3, material: MaterialKey) -> Entity {
        self.spawn_shape(CUBE, position, material)
    }

    fn spawn_shape(&mut self, mesh: MeshHandle, position: Vec3, material: MaterialKey) -> Entity {
        self.scene
            .spawn()
            .with_transform(Transform::from_translation(position))
            .with_mesh(mesh, material, BoundingSphere::new(Vec3::ZERO, 1.0))
            .spawn()
    }

    fn add_glass(&mut self) -> (MaterialDefinitionKey, MaterialKey) {
        let materials = self.renderer.materials_mut();
        let glass = materials.add_definition(
            MaterialDefinition::new("Glass", "// glass")
                .with_transparency(TransparencyMode::Blended)
                .with_shadows(false),
        );
        (glass, materials.add_material(Material::new(glass)))
    }

    fn spawn_point_light(&mut self, position: Vec3, shadows: bool) -> Entity {
        self.scene
            .spawn()
            .with_transform(Transform::from_translation(position))
            .with_point_light(Vec3::ONE, 1.0, 6.0)
            .casting_shadows(shadows)
            .spawn()
    }

    fn spawn_sun(&mut self, shadows: bool) -> Entity {
        self.scene
            .spawn()
            .with_transform(Transform::looking_along(Vec3::ZERO, Vec3::new(0.2, -1.0, 0.1)))
            .with_directional_light(Vec3::ONE, 1.0)
            .casting_shadows(shadows)
            .spawn()
    }

    fn render(&mut self) -> FrameStats {
        self.scene.update();
        self.renderer.device_mut().take_commands();
        self.renderer
            .render_viewport(&self.scene, &self.camera, self.viewport);
        self.renderer.last_frame_stats()
    }

    /// Labels of the framebuffers bound this frame, consecutive repeats folded.
    fn bound_framebuffers(&self) -> Vec<String> {
        let device = self.renderer.device();
        let mut labels: Vec<String> = Vec::new();
        for command in device.commands() {
            if let DeviceCommand::BindRenderTarget(target) = command {
                let label = device
                    .framebuffer_label(target.framebuffer)
                    .unwrap_or("?")
                    .to_string();
                if labels.last() != Some(&label) {
                    labels.push(label);
                }
            }
        }
        labels
    }

    /// Mesh, light group and flags of every material draw this frame, in
    /// submission order. Depth and shadow draws use utility programs and are
    /// skipped.
    fn lit_draws(&self, definitions: &[MaterialDefinitionKey]) -> Vec<LitDraw> {
        let caches = self.renderer.shader_caches();
        let variant_of = |program: ShaderProgramId| {
            definitions
                .iter()
                .filter_map(|&definition| caches.cache(definition))
                .flat_map(|cache| cache.ids().map(move |id| (*id, cache.get(id))))
                .find(|(_, compiled)| *compiled == Some(program))
                .map(|(id, _)| id)
        };

        self.renderer
            .device()
            .commands()
            .iter()
            .filter_map(|command| match command {
                DeviceCommand::DrawMesh {
                    mesh,
                    program: Some(program),
                    ..
                } => variant_of(*program).map(|id| (*mesh, id.light_group, id.flags)),
                _ => None,
            })
            .collect()
    }

    fn variants(
        &self,
        definition: MaterialDefinitionKey,
    ) -> Vec<(LightGroupId, MaterialShaderFlags)> {
        self.renderer
            .shader_caches()
            .cache(definition)
            .map(|cache| cache.ids().map(|id| (id.light_group, id.flags)).collect())
            .unwrap_or_default()
    }
}

#[test]
fn single_directional_light_builds_one_variant() {
    let mut harness = Harness::new(RendererSettings::default());
    harness.spawn_mesh(Vec3::ZERO, harness.lit_material);
    harness.spawn_sun(false);

    let stats = harness.render();

    assert_eq!(stats.pipeline, Some(PipelineKind::Combined));
    assert_eq!(stats.opaque_draw_calls, 1);
    assert_eq!(
        harness.variants(harness.lit),
        vec![(
            LightGroupId::from_counts([0, 1, 0, 0, 0, 0, 0]),
            MaterialShaderFlags::INCLUDE_MATERIAL_PASS
        )]
    );
}

#[test]
fn five_point_lights_split_into_four_and_one() {
    let mut settings = RendererSettings::default();
    settings.light_budget.point = 4;
    let mut harness = Harness::new(settings);
    harness.spawn_mesh(Vec3::ZERO, harness.lit_material);
    for i in 0..5 {
        let angle = i as f32 * std::f32::consts::TAU / 5.0;
        harness.spawn_point_light(Vec3::new(angle.cos() * 2.0, 1.0, angle.sin() * 2.0), false);
    }

    let stats = harness.render();
    assert_eq!(stats.pipeline, Some(PipelineKind::MultiPass));
    assert_eq!(stats.depth_prepass_draw_calls, 1);
    assert_eq!(stats.opaque_draw_calls, 2);

    let manager = harness.renderer.light_manager();
    let mut group = LightGroup::new();
    for &index in manager.registry(LightCategory::Point) {
        group.add_light(LightCategory::Point, index);
    }
    let mut groups = Vec::new();
    manager.subdivide_light_group(&group, &mut groups, SubdivideOptions::empty());
    let counts: Vec<u16> = groups.iter().map(|g| g.id().point_count()).collect();
    assert_eq!(counts, vec![4, 1]);

    let variants = harness.variants(harness.lit);
    assert_eq!(variants.len(), 2);
    for (group, flags) in variants {
        match group.point_count() {
            4 => assert_eq!(flags, MaterialShaderFlags::INCLUDE_MATERIAL_PASS),
            1 => assert!(flags.is_empty()),
            other => panic!("unexpected point count {other}"),
        }
    }

    let states: Vec<RenderState> = harness
        .renderer
        .device()
        .commands()
        .iter()
        .filter_map(|command| match command {
            DeviceCommand::SetRenderState(state) => Some(*state),
            _ => None,
        })
        .collect();
    assert!(states.contains(&RenderState::ADDITIVE_LIGHTING));
}

#[test]
fn removing_the_shadow_light_skips_point_shadow_maps() {
    let mut harness = Harness::new(RendererSettings::default());
    harness.spawn_mesh(Vec3::ZERO, harness.lit_material);
    let lamp = harness.spawn_point_light(Vec3::new(0.0, 3.0, 0.0), true);

    let stats = harness.render();
    assert_eq!(
        harness
            .renderer
            .light_manager()
            .registry(LightCategory::ShadowPoint)
            .len(),
        1
    );
    assert_eq!(stats.shadow_passes, 6);
    assert!(harness
        .bound_framebuffers()
        .iter()
        .any(|label| label.starts_with("ShadowMap[shadow_point")));

    assert!(harness.scene.despawn(lamp));
    let stats = harness.render();

    assert!(harness
        .renderer
        .light_manager()
        .registry(LightCategory::ShadowPoint)
        .is_empty());
    assert_eq!(stats.shadow_passes, 0);
    assert!(!harness
        .bound_framebuffers()
        .iter()
        .any(|label| label.starts_with("ShadowMap[")));
}

#[test]
fn passes_run_in_frame_order() {
    let mut harness = Harness::new(RendererSettings::default());
    harness.spawn_mesh(Vec3::ZERO, harness.lit_material);
    harness.spawn_mesh(Vec3::new(2.0, 0.0, 0.0), harness.lit_material);
    harness.spawn_sun(true);

    let stats = harness.render();
    assert_eq!(stats.pipeline, Some(PipelineKind::Combined));
    assert_eq!(stats.shadow_passes, 1);
    assert_eq!(stats.shadow_draw_calls, 2);

    let labels = harness.bound_framebuffers();
    assert_eq!(
        &labels[..3],
        &[
            "SceneColor".to_string(),
            "ShadowMap[shadow_directional:0]".to_string(),
            "SceneColor".to_string(),
        ]
    );
    assert_eq!(labels[3], "Luminance64");
    assert!(labels.contains(&"Bloom".to_string()));
    assert_eq!(labels.last().map(String::as_str), Some("FinalColor"));
}

#[test]
fn ldr_output_is_a_single_blit() {
    let mut harness = Harness::new(RendererSettings::default());
    harness.renderer.set_option("hdr", "false").unwrap();
    harness.spawn_mesh(Vec3::ZERO, harness.lit_material);
    harness.spawn_sun(false);

    let stats = harness.render();

    assert_eq!(stats.postprocess_passes, 1);
    assert_eq!(
        harness.bound_framebuffers(),
        vec!["SceneColor".to_string(), "FinalColor".to_string()]
    );
    let viewport = harness.renderer.viewport(harness.viewport).unwrap();
    assert!(viewport.final_color.is_some());
}

#[test]
fn repeated_frames_reuse_shader_variants() {
    let mut harness = Harness::new(RendererSettings::default());
    harness.spawn_mesh(Vec3::ZERO, harness.lit_material);
    harness.spawn_sun(false);

    let first = harness.render();
    let second = harness.render();

    assert_eq!(first.shader_cache.misses, 1);
    assert_eq!(second.shader_cache.misses, 0);
    assert_eq!(second.shader_cache.hits, 1);
    assert_eq!(harness.renderer.shader_caches().variant_count(), 1);
}

#[test]
fn reloading_a_definition_recompiles_its_shader() {
    let mut harness = Harness::new(RendererSettings::default());
    harness.spawn_mesh(Vec3::ZERO, harness.lit_material);
    harness.spawn_sun(false);
    harness.render();

    let program_of = |harness: &Harness| {
        let cache = harness.renderer.shader_caches().cache(harness.lit).unwrap();
        let id = *cache.ids().next().unwrap();
        cache.get(&id).unwrap()
    };
    let before = program_of(&harness);
    let live = harness.renderer.device().live_shader_count();

    let lit = harness.lit;
    assert!(harness
        .renderer
        .materials_mut()
        .reload_definition(lit, MaterialDefinition::new("Lit", "// lit surface v2")));
    let stats = harness.render();

    assert_ne!(program_of(&harness), before);
    assert_eq!(stats.shader_cache.misses, 1);
    assert_eq!(harness.renderer.device().live_shader_count(), live);
}

#[test]
fn transparent_meshes_never_sample_shadow_maps() {
    let mut harness = Harness::new(RendererSettings::default());
    let (glass, pane) = harness.add_glass();
    harness.spawn_mesh(Vec3::ZERO, pane);
    harness.spawn_mesh(Vec3::new(0.0, -1.5, 0.0), harness.lit_material);
    harness.spawn_point_light(Vec3::new(0.0, 2.0, 0.0), true);
    for i in 0..4 {
        harness.spawn_point_light(Vec3::new(i as f32 - 1.5, 1.0, 1.0), false);
    }

    let stats = harness.render();
    assert_eq!(stats.pipeline, Some(PipelineKind::MultiPass));
    assert!(stats.transparent_draw_calls >= 2);

    let glass_variants = harness.variants(glass);
    assert!(!glass_variants.is_empty());
    assert!(glass_variants
        .iter()
        .all(|(group, _)| group.shadow_light_count() == 0));
    assert!(harness
        .variants(harness.lit)
        .iter()
        .any(|(group, _)| group.shadow_point_count() == 1));
}

#[test]
fn combined_path_respects_disabled_depth_prepass() {
    let mut harness = Harness::new(RendererSettings::default());
    harness
        .renderer
        .set_option("depth_prepass", "false")
        .unwrap();
    harness.spawn_mesh(Vec3::ZERO, harness.lit_material);
    harness.spawn_sun(false);

    let stats = harness.render();
    assert_eq!(stats.pipeline, Some(PipelineKind::Combined));
    assert_eq!(stats.depth_prepass_draw_calls, 0);
}

#[test]
fn light_budget_setting_drives_subdivision() {
    let mut settings = RendererSettings::default();
    settings.light_budget = LightBudget::uniform(2);
    settings.combined_light_limit = 0;
    let mut harness = Harness::new(settings);
    harness.spawn_mesh(Vec3::ZERO, harness.lit_material);
    for i in 0..3 {
        harness.spawn_point_light(Vec3::new(i as f32, 1.0, 0.0), false);
    }

    let stats = harness.render();
    assert_eq!(stats.pipeline, Some(PipelineKind::MultiPass));
    assert_eq!(stats.opaque_draw_calls, 2);
}

fn render_glass_and_cube(settings: RendererSettings) -> (FrameStats, Vec<LitDraw>) {
    let mut harness = Harness::new(settings);
    let (glass, pane) = harness.add_glass();
    harness.spawn_mesh(Vec3::new(0.0, -1.5, 0.0), harness.lit_material);
    harness.spawn_shape(PANE, Vec3::ZERO, pane);
    harness.spawn_point_light(Vec3::new(0.0, 2.0, 0.0), true);
    harness.spawn_point_light(Vec3::new(1.0, 1.0, 1.0), false);

    let stats = harness.render();
    let draws = harness.lit_draws(&[harness.lit, glass]);
    (stats, draws)
}

#[test]
fn combined_and_multi_pass_bind_the_same_light_groups() {
    let (combined, combined_draws) = render_glass_and_cube(RendererSettings::default());
    let mut settings = RendererSettings::default();
    settings.combined_light_limit = 0;
    let (multi, multi_draws) = render_glass_and_cube(settings);

    assert_eq!(combined.pipeline, Some(PipelineKind::Combined));
    assert_eq!(multi.pipeline, Some(PipelineKind::MultiPass));
    assert_eq!(
        combined_draws,
        vec![
            (
                CUBE,
                LightGroupId::from_counts([0, 0, 1, 0, 0, 1, 0]),
                MaterialShaderFlags::INCLUDE_MATERIAL_PASS
            ),
            (
                PANE,
                LightGroupId::from_counts([0, 0, 2, 0, 0, 0, 0]),
                MaterialShaderFlags::INCLUDE_MATERIAL_PASS
            ),
        ]
    );
    assert_eq!(combined_draws, multi_draws);
}

#[test]
fn over_budget_frames_leave_the_combined_path() {
    let mut settings = RendererSettings::default();
    settings.light_budget = LightBudget::uniform(2);
    let mut harness = Harness::new(settings);
    harness.spawn_mesh(Vec3::ZERO, harness.lit_material);
    for i in 0..3 {
        harness.spawn_point_light(Vec3::new(i as f32, 1.0, 0.0), false);
    }

    let stats = harness.render();
    assert_eq!(stats.pipeline, Some(PipelineKind::MultiPass));

    let draws = harness.lit_draws(&[harness.lit]);
    assert_eq!(draws.len(), 2);
    for (_, group, _) in draws {
        for category in LightCategory::ALL {
            assert!(group.count(category) <= 2, "{group:?} exceeds the budget");
        }
    }
}

#[test]
fn viewports_cull_with_the_camera_they_are_rendered_with() {
    let mut harness = Harness::new(RendererSettings::default());
    harness.spawn_mesh(Vec3::ZERO, harness.lit_material);
    harness.spawn_sun(false);
    let stats = harness.render();
    assert_eq!(stats.visible_objects, 1);

    let side = harness.renderer.add_viewport(320, 240);
    let away = Camera::looking_at(Vec3::new(0.0, 4.0, 10.0), Vec3::new(0.0, 4.0, 30.0));
    harness
        .renderer
        .render_viewport(&harness.scene, &away, side);
    assert_eq!(harness.renderer.last_frame_stats().visible_objects, 0);

    let stats = harness.render();
    assert_eq!(stats.visible_objects, 1);
}

#[test]
#[should_panic(expected = "too many shadow_directional shadow casters")]
fn exceeding_shadow_capacity_is_fatal() {
    let mut harness = Harness::new(RendererSettings::default());
    harness.spawn_mesh(Vec3::ZERO, harness.lit_material);
    harness.spawn_sun(true);
    harness.spawn_sun(true);
    harness.render();
}

#[test]
#[should_panic(expected = "does not exist")]
fn rendering_a_removed_viewport_is_fatal() {
    let mut harness = Harness::new(RendererSettings::default());
    let viewport = harness.viewport;
    assert!(harness.renderer.remove_viewport(viewport));
    harness.render();
}
