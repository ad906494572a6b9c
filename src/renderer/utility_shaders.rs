// renderer/utility_shaders.rs
//! Fixed-function programs that do not depend on materials or light groups.

use super::device::{RenderDevice, ShaderProgramId};
use super::light_group::LightCategory;

const FULLSCREEN_VS: &str = include_str!("../shader/fullscreen.wgsl");
const DEPTH_SRC: &str = include_str!("../shader/depth.wgsl");
const SHADOW_VARIANCE_SRC: &str = include_str!("../shader/shadow_variance.wgsl");
const BLUR_SRC: &str = include_str!("../shader/blur.wgsl");
const LUMINANCE_SRC: &str = include_str!("../shader/luminance.wgsl");
const BLOOM_SRC: &str = include_str!("../shader/bloom.wgsl");
const TONEMAP_SRC: &str = include_str!("../shader/tonemap.wgsl");
const PASSTHROUGH_SRC: &str = include_str!("../shader/passthrough.wgsl");

#[derive(Debug, Clone, Copy)]
pub struct UtilityShaders {
    pub depth: ShaderProgramId,
    pub shadow_directional: ShaderProgramId,
    pub shadow_point: ShaderProgramId,
    pub shadow_spot: ShaderProgramId,
    pub blur_x: ShaderProgramId,
    pub blur_y: ShaderProgramId,
    pub luminance: ShaderProgramId,
    pub luminance_downsample: ShaderProgramId,
    pub bloom_bright_pass: ShaderProgramId,
    pub tonemap: ShaderProgramId,
    pub tonemap_bloom: ShaderProgramId,
    pub ldr_passthrough: ShaderProgramId,
}

impl UtilityShaders {
    pub fn compile(device: &mut dyn RenderDevice) -> Self {
        let fullscreen = |body: &str, header: &str| format!("{header}{FULLSCREEN_VS}\n{body}");

        let shaders = Self {
            depth: compile(device, "DepthPrePass", DEPTH_SRC.to_string()),
            shadow_directional: compile(
                device,
                "ShadowVariance[directional]",
                format!("const SHADOW_KIND: u32 = 0u;\n{SHADOW_VARIANCE_SRC}"),
            ),
            shadow_point: compile(
                device,
                "ShadowVariance[point]",
                format!("const SHADOW_KIND: u32 = 1u;\n{SHADOW_VARIANCE_SRC}"),
            ),
            shadow_spot: compile(
                device,
                "ShadowVariance[spot]",
                format!("const SHADOW_KIND: u32 = 2u;\n{SHADOW_VARIANCE_SRC}"),
            ),
            blur_x: compile(
                device,
                "GaussianBlurX",
                fullscreen(BLUR_SRC, "const BLUR_AXIS: vec2<f32> = vec2<f32>(1.0, 0.0);\n"),
            ),
            blur_y: compile(
                device,
                "GaussianBlurY",
                fullscreen(BLUR_SRC, "const BLUR_AXIS: vec2<f32> = vec2<f32>(0.0, 1.0);\n"),
            ),
            luminance: compile(
                device,
                "Luminance",
                fullscreen(LUMINANCE_SRC, "const DOWNSAMPLE: bool = false;\n"),
            ),
            luminance_downsample: compile(
                device,
                "LuminanceDownsample",
                fullscreen(LUMINANCE_SRC, "const DOWNSAMPLE: bool = true;\n"),
            ),
            bloom_bright_pass: compile(device, "BloomBrightPass", fullscreen(BLOOM_SRC, "")),
            tonemap: compile(
                device,
                "Tonemap",
                fullscreen(TONEMAP_SRC, "const WITH_BLOOM: bool = false;\n"),
            ),
            tonemap_bloom: compile(
                device,
                "TonemapBloom",
                fullscreen(TONEMAP_SRC, "const WITH_BLOOM: bool = true;\n"),
            ),
            ldr_passthrough: compile(device, "LdrPassthrough", fullscreen(PASSTHROUGH_SRC, "")),
        };
        log::info!("Compiled utility shaders");
        shaders
    }

    /// Variance depth program for a shadow category.
    pub fn shadow_variance(&self, category: LightCategory) -> ShaderProgramId {
        match category {
            LightCategory::ShadowDirectional => self.shadow_directional,
            LightCategory::ShadowPoint => self.shadow_point,
            LightCategory::ShadowSpot => self.shadow_spot,
            other => {
                log::error!("{} lights have no shadow map", other.name());
                panic!("no shadow variance shader for {} lights", other.name());
            }
        }
    }

    fn programs(&self) -> [ShaderProgramId; 12] {
        [
            self.depth,
            self.shadow_directional,
            self.shadow_point,
            self.shadow_spot,
            self.blur_x,
            self.blur_y,
            self.luminance,
            self.luminance_downsample,
            self.bloom_bright_pass,
            self.tonemap,
            self.tonemap_bloom,
            self.ldr_passthrough,
        ]
    }

    pub fn destroy(self, device: &mut dyn RenderDevice) {
        for program in self.programs() {
            device.destroy_shader(program);
        }
    }
}

fn compile(device: &mut dyn RenderDevice, label: &str, source: String) -> ShaderProgramId {
    match device.compile_shader(label, &source) {
        Ok(program) => program,
        Err(err) => {
            log::error!("Utility shader compilation failed: {err}");
            panic!("utility shader {label} failed to compile: {err}");
        }
    }
}
