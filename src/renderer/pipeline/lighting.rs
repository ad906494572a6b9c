// renderer/pipeline/lighting.rs
use super::{PipelineExecutor, PipelineKind, SHADOW_TEXTURE_UNIT};
use crate::renderer::device::{expect_attachment, ClearFlags, RenderState, RenderTarget};
use crate::renderer::light_group::{LightCategory, LightGroup};
use crate::renderer::light_manager::SubdivideOptions;
use crate::renderer::lights::{
    directional_shadow_matrix, shadow_near_plane, spot_shadow_matrix, AmbientLightRaw,
    DirectionalLightRaw, LightKind, PointLightRaw, ShadowDirectionalLightRaw, ShadowPointLightRaw,
    ShadowSpotLightRaw, SpotLightRaw, SHADOW_DEPTH_BIAS,
};
use crate::renderer::material_shader::MaterialShaderFlags;
use crate::renderer::targets::PING;
use crate::renderer::visibility::{MeshDraw, VisibleSet};

/// How one mesh is drawn: opaque meshes accumulate additively after the
/// first pass, transparent ones blend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurfaceClass {
    Opaque,
    Transparent,
}

impl SurfaceClass {
    fn subdivide_options(self) -> SubdivideOptions {
        match self {
            SurfaceClass::Opaque => SubdivideOptions::empty(),
            SurfaceClass::Transparent => SubdivideOptions::CONVERT_SHADOW_LIGHTS,
        }
    }

    fn render_state(self, pass: usize) -> RenderState {
        match (self, pass) {
            (SurfaceClass::Opaque, 0) => RenderState::OPAQUE,
            (SurfaceClass::Opaque, _) => RenderState::ADDITIVE_LIGHTING,
            (SurfaceClass::Transparent, 0) => RenderState::TRANSPARENT,
            (SurfaceClass::Transparent, _) => RenderState::TRANSPARENT_ADDITIVE,
        }
    }
}

fn block_name(category: LightCategory) -> &'static str {
    match category {
        LightCategory::Ambient => "ambient_lights",
        LightCategory::Directional => "directional_lights",
        LightCategory::Point => "point_lights",
        LightCategory::Spot => "spot_lights",
        LightCategory::ShadowDirectional => "shadow_directional_lights",
        LightCategory::ShadowPoint => "shadow_point_lights",
        LightCategory::ShadowSpot => "shadow_spot_lights",
    }
}

impl PipelineExecutor<'_> {
    pub(super) fn main_pass(&mut self, visible: &VisibleSet) {
        let size = self.targets.size();
        self.device
            .bind_render_target(RenderTarget::all(self.targets.scene));
        self.device.set_viewport(size.width, size.height);

        let mut clear = ClearFlags::empty();
        if self.settings.clear_background {
            clear |= ClearFlags::COLOR;
        }
        if !self.uses_depth_prepass() {
            clear |= ClearFlags::DEPTH;
        }
        if !clear.is_empty() {
            self.device
                .clear(clear, self.settings.background().extend(1.0), 1.0);
        }

        self.bind_camera(visible);

        let mut groups = Vec::new();
        for draw in visible.buckets.opaque_draws() {
            self.draw_lit(draw, visible, SurfaceClass::Opaque, &mut groups);
        }
        for draw in visible
            .buckets
            .transparent
            .iter()
            .chain(visible.buckets.refractive.iter())
        {
            self.draw_lit(draw, visible, SurfaceClass::Transparent, &mut groups);
        }
    }

    /// Draws one mesh once per light group it needs.
    fn draw_lit(
        &mut self,
        draw: &MeshDraw,
        visible: &VisibleSet,
        class: SurfaceClass,
        groups: &mut Vec<LightGroup>,
    ) {
        let source = visible.light_group(draw);
        groups.clear();
        // Transparent surfaces never sample shadow maps, whichever pipeline runs.
        self.lights
            .subdivide_light_group(source, groups, class.subdivide_options());
        if self.kind == PipelineKind::Combined && groups.len() > 1 {
            log::error!(
                "Combined pipeline split {:?} into {} passes",
                source.id(),
                groups.len()
            );
            panic!("combined pipeline selected for a light group over the per-pass budget");
        }
        // Unlit objects still get their material pass.
        if groups.is_empty() {
            groups.push(LightGroup::new());
        }

        for (pass, group) in groups.iter().enumerate() {
            let flags = if pass == 0 {
                MaterialShaderFlags::INCLUDE_MATERIAL_PASS
            } else {
                MaterialShaderFlags::empty()
            };
            let program = self.shader_caches.get_material_shader(
                &mut *self.device,
                self.materials,
                self.shader_builder,
                draw.material,
                group.id(),
                flags,
            );

            self.device.set_render_state(class.render_state(pass));
            self.device.bind_shader(program);
            self.bind_model(draw.transform);
            self.bind_light_group(group, visible);
            self.bind_material(draw);
            self.device.draw_mesh(draw.mesh);

            self.stats.light_groups += 1;
            match class {
                SurfaceClass::Opaque => self.stats.opaque_draw_calls += 1,
                SurfaceClass::Transparent => self.stats.transparent_draw_calls += 1,
            }
        }
    }

    fn bind_material(&mut self, draw: &MeshDraw) {
        let materials = self.materials;
        let (material, _) = materials.resolve(draw.material);
        for parameter in &material.parameters {
            self.device.set_uniform(&parameter.name, parameter.value);
        }
        for (unit, texture) in material.textures.iter().enumerate() {
            if unit as u32 >= SHADOW_TEXTURE_UNIT {
                log::warn!(
                    "Material {:?} binds more than {} textures; extra ones ignored",
                    draw.material,
                    SHADOW_TEXTURE_UNIT
                );
                break;
            }
            self.device.bind_texture(unit as u32, *texture);
        }
    }

    /// Uploads one uniform block per non-empty category and binds the shadow
    /// maps sampled by the group's shadow lights.
    fn bind_light_group(&mut self, group: &LightGroup, visible: &VisibleSet) {
        let lights = self.lights;
        for category in LightCategory::ALL {
            let indices = group.lights(category);
            if indices.is_empty() {
                continue;
            }

            let mut bytes: Vec<u8> = Vec::new();
            for &index in indices {
                let Some(registered) = lights.light(index) else {
                    log::error!("Light group references unknown light {}", index);
                    panic!("light {index} is not registered this frame");
                };
                let slot = registered.shadow_slot.filter(|_| category.is_shadow());

                match (registered.light.kind, slot) {
                    (LightKind::Ambient(light), _) => {
                        let raw = AmbientLightRaw::from_data(&light);
                        bytes.extend_from_slice(bytemuck::bytes_of(&raw));
                    }
                    (LightKind::Directional(light), None) => {
                        let raw = DirectionalLightRaw::from_data(&light);
                        bytes.extend_from_slice(bytemuck::bytes_of(&raw));
                    }
                    (LightKind::Directional(light), Some(slot)) => {
                        let raw = ShadowDirectionalLightRaw {
                            light: DirectionalLightRaw::from_data(&light),
                            view_proj: directional_shadow_matrix(&light, visible.shadow_focus)
                                .to_cols_array_2d(),
                            params: [slot as f32, SHADOW_DEPTH_BIAS, 0.0, 0.0],
                        };
                        bytes.extend_from_slice(bytemuck::bytes_of(&raw));
                        self.bind_shadow_map(category, slot);
                    }
                    (LightKind::Point(light), None) => {
                        let raw = PointLightRaw::from_data(&light);
                        bytes.extend_from_slice(bytemuck::bytes_of(&raw));
                    }
                    (LightKind::Point(light), Some(slot)) => {
                        let raw = ShadowPointLightRaw {
                            light: PointLightRaw::from_data(&light),
                            params: [
                                slot as f32,
                                shadow_near_plane(),
                                light.radius,
                                0.0,
                            ],
                        };
                        bytes.extend_from_slice(bytemuck::bytes_of(&raw));
                        self.bind_shadow_map(category, slot);
                    }
                    (LightKind::Spot(light), None) => {
                        let raw = SpotLightRaw::from_data(&light);
                        bytes.extend_from_slice(bytemuck::bytes_of(&raw));
                    }
                    (LightKind::Spot(light), Some(slot)) => {
                        let raw = ShadowSpotLightRaw {
                            light: SpotLightRaw::from_data(&light),
                            view_proj: spot_shadow_matrix(&light).to_cols_array_2d(),
                            params: [slot as f32, SHADOW_DEPTH_BIAS, light.range, 0.0],
                        };
                        bytes.extend_from_slice(bytemuck::bytes_of(&raw));
                        self.bind_shadow_map(category, slot);
                    }
                }
            }
            self.device.set_uniform_block(block_name(category), &bytes);
        }
    }

    fn bind_shadow_map(&mut self, category: LightCategory, slot: u32) {
        let framebuffer = self.shadow_targets.map(category, slot);
        let texture = expect_attachment(&*self.device, framebuffer, PING);
        let set = match category {
            LightCategory::ShadowDirectional => 0,
            LightCategory::ShadowPoint => 1,
            _ => 2,
        };
        let unit = SHADOW_TEXTURE_UNIT + set * self.shadow_targets.slots() as u32 + slot;
        self.device.bind_texture(unit, texture);
    }
}
