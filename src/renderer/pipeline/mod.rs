// renderer/pipeline/mod.rs
//! Per-viewport frame execution: depth pre-pass, shadow maps, lighting and
//! post-processing, run strictly in that order.

mod depth;
mod lighting;
mod postprocess;
mod shadows;

use glam::Mat4;

use super::camera::CameraUniform;
use super::device::{RenderDevice, TextureId, UniformValue};
use super::light_group::LightCategory;
use super::light_manager::LightManager;
use super::material::MaterialLibrary;
use super::material_shader::{MaterialShaderCaches, ShaderBuilder, ShaderCacheStats};
use super::targets::{ShadowTargets, ViewportTargets};
use super::utility_shaders::UtilityShaders;
use super::visibility::VisibleSet;
use crate::settings::RendererSettings;

/// Texture units below this are reserved for material textures.
pub const SHADOW_TEXTURE_UNIT: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrameStage {
    VisibilityResolved,
    DepthPrePass,
    ShadowPass,
    MainPass,
    PostProcess,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    /// One lighting pass per mesh with its whole light group.
    Combined,
    /// Light groups are subdivided and accumulated additively.
    MultiPass,
}

/// Combined is a fast path for small frames; both produce the same image.
/// It is only taken when every light group fits a single pass.
pub fn select_pipeline(lights: &LightManager, combined_light_limit: usize) -> PipelineKind {
    if lights.max_shadow_casters_per_category() <= 1
        && lights.total_light_count() <= combined_light_limit
        && lights.fits_single_pass()
    {
        PipelineKind::Combined
    } else {
        PipelineKind::MultiPass
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub pipeline: Option<PipelineKind>,
    pub visible_objects: u32,
    pub visible_meshes: u32,
    pub visible_lights: u32,
    pub light_groups: u32,
    pub shadow_passes: u32,
    pub blur_passes: u32,
    pub postprocess_passes: u32,
    pub depth_prepass_draw_calls: u32,
    pub shadow_draw_calls: u32,
    pub opaque_draw_calls: u32,
    pub transparent_draw_calls: u32,
    pub shader_cache: ShaderCacheStats,
}

impl FrameStats {
    pub fn total_draw_calls(&self) -> u32 {
        self.depth_prepass_draw_calls
            + self.shadow_draw_calls
            + self.opaque_draw_calls
            + self.transparent_draw_calls
    }
}

/// Everything one frame of one viewport needs, borrowed from the renderer.
pub struct PipelineExecutor<'a> {
    pub device: &'a mut dyn RenderDevice,
    pub materials: &'a MaterialLibrary,
    pub shader_builder: &'a dyn ShaderBuilder,
    pub shader_caches: &'a mut MaterialShaderCaches,
    pub utility: &'a UtilityShaders,
    pub settings: &'a RendererSettings,
    pub lights: &'a LightManager,
    pub shadow_targets: &'a ShadowTargets,
    pub targets: &'a ViewportTargets,
    pub stats: &'a mut FrameStats,
    pub kind: PipelineKind,
    stage: FrameStage,
}

impl<'a> PipelineExecutor<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &'a mut dyn RenderDevice,
        materials: &'a MaterialLibrary,
        shader_builder: &'a dyn ShaderBuilder,
        shader_caches: &'a mut MaterialShaderCaches,
        utility: &'a UtilityShaders,
        settings: &'a RendererSettings,
        lights: &'a LightManager,
        shadow_targets: &'a ShadowTargets,
        targets: &'a ViewportTargets,
        stats: &'a mut FrameStats,
        kind: PipelineKind,
    ) -> Self {
        Self {
            device,
            materials,
            shader_builder,
            shader_caches,
            utility,
            settings,
            lights,
            shadow_targets,
            targets,
            stats,
            kind,
            stage: FrameStage::VisibilityResolved,
        }
    }

    pub fn stage(&self) -> FrameStage {
        self.stage
    }

    fn enter(&mut self, next: FrameStage) {
        if next <= self.stage {
            log::error!("Frame stage {:?} entered after {:?}", next, self.stage);
            panic!("frame stage {next:?} cannot follow {:?}", self.stage);
        }
        log::trace!("Frame stage {:?} -> {:?}", self.stage, next);
        self.stage = next;
    }

    pub fn uses_depth_prepass(&self) -> bool {
        match self.kind {
            PipelineKind::MultiPass => true,
            PipelineKind::Combined => self.settings.depth_prepass,
        }
    }

    /// Runs every stage and returns the texture holding the final color.
    pub fn run(mut self, visible: &VisibleSet) -> TextureId {
        self.stats.pipeline = Some(self.kind);

        if self.uses_depth_prepass() {
            self.enter(FrameStage::DepthPrePass);
            self.depth_prepass(visible);
        }

        self.enter(FrameStage::ShadowPass);
        for category in [
            LightCategory::ShadowDirectional,
            LightCategory::ShadowPoint,
            LightCategory::ShadowSpot,
        ] {
            self.shadow_pass(category, visible);
        }

        self.enter(FrameStage::MainPass);
        self.main_pass(visible);

        self.enter(FrameStage::PostProcess);
        let final_color = self.post_process();

        self.enter(FrameStage::Done);
        final_color
    }

    fn bind_camera(&mut self, visible: &VisibleSet) {
        let camera = CameraUniform::new(visible.view, visible.projection, visible.camera_position);
        self.device
            .set_uniform_block("camera", bytemuck::bytes_of(&camera));
    }

    fn bind_model(&mut self, transform: Mat4) {
        self.device.set_uniform("model", UniformValue::Mat4(transform));
    }
}
