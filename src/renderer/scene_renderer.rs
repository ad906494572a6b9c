// renderer/scene_renderer.rs
//! Top-level per-viewport render entry point.

use slotmap::{new_key_type, SlotMap};

use super::camera::Frustum;
use super::device::{RenderDevice, TextureId};
use super::light_group::LightCategory;
use super::light_manager::LightManager;
use super::material::MaterialLibrary;
use super::material_shader::{MaterialShaderCaches, ShaderBuilder, WgslShaderBuilder};
use super::pipeline::{select_pipeline, FrameStats, PipelineExecutor};
use super::targets::{ShadowTargets, TargetSize, ViewportTargets};
use super::utility_shaders::UtilityShaders;
use super::visibility::{SceneCulling, VisibilityProcessor};
use crate::scene::Camera;
use crate::settings::{RendererSettings, SettingsError};

new_key_type! {
    pub struct ViewportId;
}

/// Everything the renderer depends on, owned in one place and handed to
/// [`SceneRenderer::new`].
pub struct RendererContext<D: RenderDevice> {
    pub device: D,
    pub materials: MaterialLibrary,
    pub shader_builder: Box<dyn ShaderBuilder>,
    pub settings: RendererSettings,
}

impl<D: RenderDevice> RendererContext<D> {
    pub fn new(device: D, settings: RendererSettings) -> Self {
        Self::with_shader_builder(device, settings, Box::new(WgslShaderBuilder))
    }

    pub fn with_shader_builder(
        device: D,
        settings: RendererSettings,
        shader_builder: Box<dyn ShaderBuilder>,
    ) -> Self {
        Self {
            device,
            materials: MaterialLibrary::new(),
            shader_builder,
            settings: settings.validate(),
        }
    }
}

pub struct Viewport {
    width: u32,
    height: u32,
    /// Written by every render call.
    pub final_color: Option<TextureId>,
    targets: ViewportTargets,
}

impl Viewport {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    pub fn targets(&self) -> &ViewportTargets {
        &self.targets
    }
}

pub struct SceneRenderer<D: RenderDevice> {
    context: RendererContext<D>,
    shader_caches: MaterialShaderCaches,
    utility: UtilityShaders,
    lights: LightManager,
    shadow_targets: ShadowTargets,
    viewports: SlotMap<ViewportId, Viewport>,
    stats: FrameStats,
    frame_index: u64,
}

impl<D: RenderDevice> SceneRenderer<D> {
    pub fn new(mut context: RendererContext<D>) -> Self {
        let utility = UtilityShaders::compile(&mut context.device);
        let shadow_targets = ShadowTargets::new(
            &mut context.device,
            context.settings.shadow_map_size,
            context.settings.max_shadow_casters_per_category,
        );
        let lights = LightManager::new(context.settings.light_budget);
        log::info!("Scene renderer initialised");

        Self {
            context,
            shader_caches: MaterialShaderCaches::new(),
            utility,
            lights,
            shadow_targets,
            viewports: SlotMap::with_key(),
            stats: FrameStats::default(),
            frame_index: 0,
        }
    }

    /// Releases every device resource and hands the context back.
    pub fn shutdown(mut self) -> RendererContext<D> {
        let device = &mut self.context.device;
        self.shader_caches.clear(device);
        self.utility.destroy(device);
        self.shadow_targets.destroy(device);
        for (_, viewport) in self.viewports.drain() {
            viewport.targets.destroy(device);
        }
        log::info!("Scene renderer shut down after {} frame(s)", self.frame_index);
        self.context
    }

    pub fn device(&self) -> &D {
        &self.context.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.context.device
    }

    pub fn materials(&self) -> &MaterialLibrary {
        &self.context.materials
    }

    pub fn materials_mut(&mut self) -> &mut MaterialLibrary {
        &mut self.context.materials
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.context.settings
    }

    pub fn light_manager(&self) -> &LightManager {
        &self.lights
    }

    pub fn shader_caches(&self) -> &MaterialShaderCaches {
        &self.shader_caches
    }

    pub fn last_frame_stats(&self) -> FrameStats {
        self.stats
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn option(&self, key: &str) -> Result<String, SettingsError> {
        self.context.settings.option(key)
    }

    /// Changes a runtime option and rebuilds whatever depends on it.
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        let previous = self.context.settings.clone();
        self.context.settings.set_option(key, value)?;
        let settings = &self.context.settings;

        if settings.shadow_map_size != previous.shadow_map_size
            || settings.max_shadow_casters_per_category != previous.max_shadow_casters_per_category
        {
            let device = &mut self.context.device;
            let replacement = ShadowTargets::new(
                device,
                settings.shadow_map_size,
                settings.max_shadow_casters_per_category,
            );
            std::mem::replace(&mut self.shadow_targets, replacement).destroy(device);
        }

        if settings.luminance_size != previous.luminance_size
            || settings.bloom_downscale != previous.bloom_downscale
        {
            let device = &mut self.context.device;
            for (_, viewport) in self.viewports.iter_mut() {
                let size = viewport.targets.size();
                let replacement = ViewportTargets::new(device, size, settings);
                std::mem::replace(&mut viewport.targets, replacement).destroy(device);
                viewport.final_color = None;
            }
        }

        log::info!("Renderer option {} = {}", key, value);
        Ok(())
    }

    pub fn add_viewport(&mut self, width: u32, height: u32) -> ViewportId {
        let size = TargetSize::new(width, height);
        let targets = ViewportTargets::new(&mut self.context.device, size, &self.context.settings);
        let id = self.viewports.insert(Viewport {
            width: size.width,
            height: size.height,
            final_color: None,
            targets,
        });
        log::info!("Added viewport {:?} ({}x{})", id, size.width, size.height);
        id
    }

    pub fn resize_viewport(&mut self, id: ViewportId, width: u32, height: u32) -> bool {
        let Some(viewport) = self.viewports.get_mut(id) else {
            log::warn!("Resize requested for unknown viewport {:?}", id);
            return false;
        };
        let size = TargetSize::new(width, height);
        viewport
            .targets
            .resize(&mut self.context.device, size, self.context.settings.bloom_downscale);
        viewport.width = size.width;
        viewport.height = size.height;
        log::info!("Resized viewport {:?} to {}x{}", id, size.width, size.height);
        true
    }

    /// Only valid between frames.
    pub fn remove_viewport(&mut self, id: ViewportId) -> bool {
        match self.viewports.remove(id) {
            Some(viewport) => {
                viewport.targets.destroy(&mut self.context.device);
                log::info!("Removed viewport {:?}", id);
                true
            }
            None => false,
        }
    }

    pub fn viewport(&self, id: ViewportId) -> Option<&Viewport> {
        self.viewports.get(id)
    }

    pub fn viewport_count(&self) -> usize {
        self.viewports.len()
    }

    /// Drops shader variants of reloaded or deleted material definitions.
    pub fn process_material_events(&mut self) -> usize {
        let mut destroyed = 0;
        for event in self.context.materials.drain_events() {
            destroyed += self
                .shader_caches
                .handle_event(&mut self.context.device, event);
        }
        destroyed
    }

    /// Renders `scene` as seen by `camera` into the viewport's final color
    /// buffer and returns that buffer.
    pub fn render_viewport(
        &mut self,
        scene: &dyn SceneCulling,
        camera: &Camera,
        viewport: ViewportId,
    ) -> TextureId {
        self.process_material_events();

        let Some(target) = self.viewports.get_mut(viewport) else {
            log::error!("Render requested for unknown viewport {:?}", viewport);
            panic!("viewport {viewport:?} does not exist");
        };

        let settings = &self.context.settings;
        let view = camera.view();
        let projection = camera.proj(target.aspect_ratio());
        let frustum = Frustum::from_view_proj(projection * view);

        self.lights.clear();
        self.lights.set_budget(settings.light_budget);

        let visible = {
            let mut processor = VisibilityProcessor::new(
                &mut self.lights,
                &self.context.materials,
                view,
                projection,
                camera.target,
                settings.merge_transparent_buckets,
            );
            scene.query_visible(&frustum, &mut processor);
            processor.finish(scene)
        };

        for category in LightCategory::ALL.into_iter().filter(|c| c.is_shadow()) {
            let casters = self.lights.registry(category).len();
            if casters > settings.max_shadow_casters_per_category {
                log::error!(
                    "{} {} lights cast shadows; at most {} supported",
                    casters,
                    category.name(),
                    settings.max_shadow_casters_per_category
                );
                panic!(
                    "too many {} shadow casters: {casters} > {}",
                    category.name(),
                    settings.max_shadow_casters_per_category
                );
            }
        }

        let kind = select_pipeline(&self.lights, settings.combined_light_limit);
        let mut stats = FrameStats {
            visible_objects: visible.objects.len() as u32,
            visible_meshes: visible.buckets.mesh_count() as u32,
            visible_lights: visible.all_lights.len() as u32,
            ..FrameStats::default()
        };
        self.shader_caches.take_stats();

        let final_color = PipelineExecutor::new(
            &mut self.context.device,
            &self.context.materials,
            self.context.shader_builder.as_ref(),
            &mut self.shader_caches,
            &self.utility,
            settings,
            &self.lights,
            &self.shadow_targets,
            &target.targets,
            &mut stats,
            kind,
        )
        .run(&visible);

        stats.shader_cache = self.shader_caches.take_stats();
        target.final_color = Some(final_color);
        self.stats = stats;
        self.frame_index += 1;

        log::debug!(
            "Frame {}: {:?}, {} mesh(es), {} light(s), {} shadow pass(es), {} draw call(s)",
            self.frame_index,
            kind,
            stats.visible_meshes,
            stats.visible_lights,
            stats.shadow_passes,
            stats.total_draw_calls()
        );

        final_color
    }
}
