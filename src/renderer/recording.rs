//! Headless [`RenderDevice`] that records every call instead of touching a GPU.

use std::collections::{HashMap, HashSet};

use glam::Vec4;

use super::device::{
    ClearFlags, DeviceError, FramebufferDesc, FramebufferId, MeshHandle, RenderDevice,
    RenderState, RenderTarget, ShaderProgramId, TextureId, UniformValue,
};

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    CreateFramebuffer {
        id: FramebufferId,
        label: String,
        width: u32,
        height: u32,
    },
    ResizeFramebuffer {
        id: FramebufferId,
        width: u32,
        height: u32,
    },
    DestroyFramebuffer(FramebufferId),
    BindRenderTarget(RenderTarget),
    SetViewport {
        width: u32,
        height: u32,
    },
    Clear {
        flags: ClearFlags,
        color: Vec4,
        depth: f32,
    },
    SetRenderState(RenderState),
    CompileShader {
        id: ShaderProgramId,
        label: String,
    },
    DestroyShader(ShaderProgramId),
    BindShader(ShaderProgramId),
    SetUniform {
        name: String,
        value: UniformValue,
    },
    SetUniformBlock {
        name: String,
        size: usize,
    },
    BindTexture {
        unit: u32,
        texture: TextureId,
    },
    DrawMesh {
        mesh: MeshHandle,
        program: Option<ShaderProgramId>,
        target: Option<RenderTarget>,
    },
    DrawFullscreen {
        program: Option<ShaderProgramId>,
        target: Option<RenderTarget>,
    },
}

struct FramebufferRecord {
    desc: FramebufferDesc,
    attachments: Vec<TextureId>,
}

/// The command log is never trimmed by the device itself. Long-running
/// callers drain it with [`RecordingDevice::take_commands`] once per frame.
#[derive(Default)]
pub struct RecordingDevice {
    commands: Vec<DeviceCommand>,
    framebuffers: HashMap<FramebufferId, FramebufferRecord>,
    shaders: HashMap<ShaderProgramId, String>,
    shader_sources: HashMap<ShaderProgramId, String>,
    failing_labels: HashSet<String>,
    bound_program: Option<ShaderProgramId>,
    bound_target: Option<RenderTarget>,
    compile_count: usize,
    next_id: u32,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    /// Returns the log recorded so far and starts a new one. Resource state
    /// (framebuffers, shaders, bindings) is kept.
    pub fn take_commands(&mut self) -> Vec<DeviceCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Any later compile whose label contains `pattern` fails.
    pub fn fail_compilation_of(&mut self, pattern: impl Into<String>) {
        self.failing_labels.insert(pattern.into());
    }

    pub fn compile_count(&self) -> usize {
        self.compile_count
    }

    pub fn live_shader_count(&self) -> usize {
        self.shaders.len()
    }

    pub fn shader_label(&self, program: ShaderProgramId) -> Option<&str> {
        self.shaders.get(&program).map(String::as_str)
    }

    pub fn shader_source(&self, program: ShaderProgramId) -> Option<&str> {
        self.shader_sources.get(&program).map(String::as_str)
    }

    pub fn live_framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn framebuffer_desc(&self, framebuffer: FramebufferId) -> Option<&FramebufferDesc> {
        self.framebuffers.get(&framebuffer).map(|record| &record.desc)
    }

    pub fn framebuffer_label(&self, framebuffer: FramebufferId) -> Option<&str> {
        self.framebuffer_desc(framebuffer)
            .map(|desc| desc.label.as_str())
    }

    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl RenderDevice for RecordingDevice {
    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> FramebufferId {
        let id = FramebufferId(self.allocate_id());
        let attachments = desc
            .color_formats
            .iter()
            .map(|_| TextureId(self.allocate_id()))
            .collect();
        self.framebuffers.insert(
            id,
            FramebufferRecord {
                desc: desc.clone(),
                attachments,
            },
        );
        self.commands.push(DeviceCommand::CreateFramebuffer {
            id,
            label: desc.label.clone(),
            width: desc.width,
            height: desc.height,
        });
        id
    }

    fn resize_framebuffer(&mut self, framebuffer: FramebufferId, width: u32, height: u32) {
        if let Some(record) = self.framebuffers.get_mut(&framebuffer) {
            record.desc.width = width;
            record.desc.height = height;
        } else {
            log::warn!("Resize requested for unknown framebuffer {:?}", framebuffer);
        }
        self.commands.push(DeviceCommand::ResizeFramebuffer {
            id: framebuffer,
            width,
            height,
        });
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer);
        self.commands
            .push(DeviceCommand::DestroyFramebuffer(framebuffer));
    }

    fn color_attachment(
        &self,
        framebuffer: FramebufferId,
        index: u32,
    ) -> Result<TextureId, DeviceError> {
        let record = self
            .framebuffers
            .get(&framebuffer)
            .ok_or(DeviceError::UnknownFramebuffer(framebuffer))?;
        record
            .attachments
            .get(index as usize)
            .copied()
            .ok_or(DeviceError::MissingAttachment { framebuffer, index })
    }

    fn bind_render_target(&mut self, target: RenderTarget) {
        self.bound_target = Some(target);
        self.commands.push(DeviceCommand::BindRenderTarget(target));
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.commands
            .push(DeviceCommand::SetViewport { width, height });
    }

    fn clear(&mut self, flags: ClearFlags, color: Vec4, depth: f32) {
        self.commands
            .push(DeviceCommand::Clear { flags, color, depth });
    }

    fn set_render_state(&mut self, state: RenderState) {
        self.commands.push(DeviceCommand::SetRenderState(state));
    }

    fn compile_shader(
        &mut self,
        label: &str,
        source: &str,
    ) -> Result<ShaderProgramId, DeviceError> {
        if let Some(pattern) = self
            .failing_labels
            .iter()
            .find(|pattern| label.contains(pattern.as_str()))
        {
            return Err(DeviceError::ShaderCompilation {
                label: label.to_string(),
                message: format!("compilation forced to fail by pattern '{pattern}'"),
            });
        }
        let id = ShaderProgramId(self.allocate_id());
        self.shaders.insert(id, label.to_string());
        self.shader_sources.insert(id, source.to_string());
        self.compile_count += 1;
        self.commands.push(DeviceCommand::CompileShader {
            id,
            label: label.to_string(),
        });
        Ok(id)
    }

    fn destroy_shader(&mut self, program: ShaderProgramId) {
        self.shaders.remove(&program);
        self.shader_sources.remove(&program);
        if self.bound_program == Some(program) {
            self.bound_program = None;
        }
        self.commands.push(DeviceCommand::DestroyShader(program));
    }

    fn bind_shader(&mut self, program: ShaderProgramId) {
        self.bound_program = Some(program);
        self.commands.push(DeviceCommand::BindShader(program));
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) {
        self.commands.push(DeviceCommand::SetUniform {
            name: name.to_string(),
            value,
        });
    }

    fn set_uniform_block(&mut self, name: &str, data: &[u8]) {
        self.commands.push(DeviceCommand::SetUniformBlock {
            name: name.to_string(),
            size: data.len(),
        });
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) {
        self.commands
            .push(DeviceCommand::BindTexture { unit, texture });
    }

    fn draw_mesh(&mut self, mesh: MeshHandle) {
        self.commands.push(DeviceCommand::DrawMesh {
            mesh,
            program: self.bound_program,
            target: self.bound_target,
        });
    }

    fn draw_fullscreen(&mut self) {
        self.commands.push(DeviceCommand::DrawFullscreen {
            program: self.bound_program,
            target: self.bound_target,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::device::TextureFormat;

    #[test]
    fn framebuffer_attachments_are_distinct_textures() {
        let mut device = RecordingDevice::new();
        let desc = FramebufferDesc::color("Shadow", 512, 512, TextureFormat::Rg32Float)
            .with_color_attachment(TextureFormat::Rg32Float)
            .with_depth();
        let fb = device.create_framebuffer(&desc);
        let first = device.color_attachment(fb, 0).unwrap();
        let second = device.color_attachment(fb, 1).unwrap();
        assert_ne!(first, second);
        assert!(matches!(
            device.color_attachment(fb, 2),
            Err(DeviceError::MissingAttachment { index: 2, .. })
        ));
    }

    #[test]
    fn forced_compile_failure_reports_label() {
        let mut device = RecordingDevice::new();
        device.fail_compilation_of("Broken");
        let err = device.compile_shader("BrokenMaterial", "").unwrap_err();
        assert!(err.to_string().contains("BrokenMaterial"));
        assert_eq!(device.compile_count(), 0);
    }

    #[test]
    fn taking_commands_starts_a_fresh_log() {
        let mut device = RecordingDevice::new();
        let program = device.compile_shader("Test", "fn main() {}").unwrap();
        device.bind_shader(program);
        device.draw_mesh(MeshHandle(1));

        assert_eq!(device.take_commands().len(), 3);
        assert!(device.commands().is_empty());
        assert_eq!(device.live_shader_count(), 1);

        device.draw_mesh(MeshHandle(2));
        assert!(matches!(
            device.commands(),
            [DeviceCommand::DrawMesh { program: Some(p), .. }] if *p == program
        ));
    }

    #[test]
    fn draws_remember_bound_program() {
        let mut device = RecordingDevice::new();
        let program = device.compile_shader("Test", "fn main() {}").unwrap();
        device.bind_shader(program);
        device.draw_mesh(MeshHandle(3));
        assert!(matches!(
            device.commands().last(),
            Some(DeviceCommand::DrawMesh { program: Some(p), .. }) if *p == program
        ));
    }
}
