//! The immediate-mode render device the renderer drives.
//!
//! Everything graphics-API specific lives behind [`RenderDevice`]. Calls are
//! synchronous from the renderer's point of view and issued from one thread.

use bitflags::bitflags;
use glam::{Mat4, Vec2, Vec3, Vec4};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FramebufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShaderProgramId(pub u32);

/// Geometry uploaded to the device by the asset layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeshHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8,
    Rgba16Float,
    R16Float,
    Rg32Float,
    Depth32Float,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub color_formats: Vec<TextureFormat>,
    pub depth: bool,
    /// 6 for cube shadow maps, 1 otherwise.
    pub layers: u32,
}

impl FramebufferDesc {
    pub fn color(label: impl Into<String>, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            color_formats: vec![format],
            depth: false,
            layers: 1,
        }
    }

    pub fn with_depth(mut self) -> Self {
        self.depth = true;
        self
    }

    pub fn with_color_attachment(mut self, format: TextureFormat) -> Self {
        self.color_formats.push(format);
        self
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers.max(1);
        self
    }
}

/// Where draws land: one framebuffer, optionally restricted to a single
/// color attachment, and one array layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub framebuffer: FramebufferId,
    pub color_attachment: Option<u32>,
    pub layer: u32,
}

impl RenderTarget {
    pub fn all(framebuffer: FramebufferId) -> Self {
        Self {
            framebuffer,
            color_attachment: None,
            layer: 0,
        }
    }

    pub fn attachment(framebuffer: FramebufferId, color_attachment: u32) -> Self {
        Self {
            framebuffer,
            color_attachment: Some(color_attachment),
            layer: 0,
        }
    }

    pub fn with_layer(mut self, layer: u32) -> Self {
        self.layer = layer;
        self
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthCompare {
    Always,
    Less,
    LessEqual,
    Equal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Replace,
    Alpha,
    /// One, One.
    Additive,
    /// SrcAlpha, One.
    AdditiveAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Back,
    Front,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub depth_test: DepthCompare,
    pub depth_write: bool,
    pub color_write: bool,
    pub blend: BlendMode,
    pub cull: CullMode,
}

impl RenderState {
    pub const OPAQUE: Self = Self {
        depth_test: DepthCompare::LessEqual,
        depth_write: true,
        color_write: true,
        blend: BlendMode::Replace,
        cull: CullMode::Back,
    };

    pub const DEPTH_ONLY: Self = Self {
        depth_test: DepthCompare::LessEqual,
        depth_write: true,
        color_write: false,
        blend: BlendMode::Replace,
        cull: CullMode::Back,
    };

    pub const ADDITIVE_LIGHTING: Self = Self {
        depth_test: DepthCompare::Equal,
        depth_write: false,
        color_write: true,
        blend: BlendMode::Additive,
        cull: CullMode::Back,
    };

    pub const TRANSPARENT: Self = Self {
        depth_test: DepthCompare::LessEqual,
        depth_write: false,
        color_write: true,
        blend: BlendMode::Alpha,
        cull: CullMode::None,
    };

    pub const TRANSPARENT_ADDITIVE: Self = Self {
        depth_test: DepthCompare::LessEqual,
        depth_write: false,
        color_write: true,
        blend: BlendMode::AdditiveAlpha,
        cull: CullMode::None,
    };

    pub const FULLSCREEN: Self = Self {
        depth_test: DepthCompare::Always,
        depth_write: false,
        color_write: true,
        blend: BlendMode::Replace,
        cull: CullMode::None,
    };

    pub fn with_depth_write(mut self, depth_write: bool) -> Self {
        self.depth_write = depth_write;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    UInt(u32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("shader '{label}' failed to compile: {message}")]
    ShaderCompilation { label: String, message: String },
    #[error("unknown framebuffer {0:?}")]
    UnknownFramebuffer(FramebufferId),
    #[error("framebuffer {framebuffer:?} has no color attachment {index}")]
    MissingAttachment {
        framebuffer: FramebufferId,
        index: u32,
    },
}

pub trait RenderDevice {
    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> FramebufferId;
    fn resize_framebuffer(&mut self, framebuffer: FramebufferId, width: u32, height: u32);
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId);
    fn color_attachment(
        &self,
        framebuffer: FramebufferId,
        index: u32,
    ) -> Result<TextureId, DeviceError>;

    fn bind_render_target(&mut self, target: RenderTarget);
    fn set_viewport(&mut self, width: u32, height: u32);
    fn clear(&mut self, flags: ClearFlags, color: Vec4, depth: f32);
    fn set_render_state(&mut self, state: RenderState);

    fn compile_shader(&mut self, label: &str, source: &str)
        -> Result<ShaderProgramId, DeviceError>;
    fn destroy_shader(&mut self, program: ShaderProgramId);
    fn bind_shader(&mut self, program: ShaderProgramId);

    fn set_uniform(&mut self, name: &str, value: UniformValue);
    fn set_uniform_block(&mut self, name: &str, data: &[u8]);
    fn bind_texture(&mut self, unit: u32, texture: TextureId);

    fn draw_mesh(&mut self, mesh: MeshHandle);
    fn draw_fullscreen(&mut self);
}

/// Resolves a framebuffer attachment that the renderer itself created.
/// A miss means the renderer's resource bookkeeping is broken.
pub(crate) fn expect_attachment(
    device: &dyn RenderDevice,
    framebuffer: FramebufferId,
    index: u32,
) -> TextureId {
    match device.color_attachment(framebuffer, index) {
        Ok(texture) => texture,
        Err(err) => {
            log::error!("Render target lookup failed: {err}");
            panic!("render target lookup failed: {err}");
        }
    }
}
