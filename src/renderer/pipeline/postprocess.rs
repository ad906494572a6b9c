// renderer/pipeline/postprocess.rs
use glam::{Vec2, Vec4};

use super::PipelineExecutor;
use crate::renderer::device::{
    expect_attachment, ClearFlags, RenderState, RenderTarget, TextureId, UniformValue,
};
use crate::renderer::targets::{PING, PONG};

impl PipelineExecutor<'_> {
    /// Resolves the HDR scene into the viewport's final color buffer.
    pub(super) fn post_process(&mut self) -> TextureId {
        let scene_color = expect_attachment(&*self.device, self.targets.scene, 0);
        self.device.set_render_state(RenderState::FULLSCREEN);

        if self.settings.hdr {
            let average_luminance = self.luminance_chain(scene_color);
            let bloom = if self.settings.bloom {
                Some(self.bloom(scene_color))
            } else {
                None
            };
            self.tonemap(scene_color, average_luminance, bloom);
        } else {
            self.bind_final_target();
            self.device.bind_shader(self.utility.ldr_passthrough);
            self.device.bind_texture(0, scene_color);
            self.device.draw_fullscreen();
            self.stats.postprocess_passes += 1;
        }

        expect_attachment(&*self.device, self.targets.final_color, 0)
    }

    /// Log-luminance of the scene, halved down to a single texel.
    fn luminance_chain(&mut self, scene_color: TextureId) -> Option<TextureId> {
        let mut source = scene_color;
        let mut last = None;
        let targets = self.targets;
        for (index, &(framebuffer, edge)) in targets.luminance.iter().enumerate() {
            let program = if index == 0 {
                self.utility.luminance
            } else {
                self.utility.luminance_downsample
            };
            self.device.bind_render_target(RenderTarget::all(framebuffer));
            self.device.set_viewport(edge, edge);
            self.device.bind_shader(program);
            self.device.bind_texture(0, source);
            self.device.draw_fullscreen();
            self.stats.postprocess_passes += 1;

            source = expect_attachment(&*self.device, framebuffer, 0);
            last = Some(source);
        }
        last
    }

    /// Bright pass into PING, then a separable blur that ends back in PING.
    fn bloom(&mut self, scene_color: TextureId) -> TextureId {
        let framebuffer = self.targets.bloom;
        let size = self.targets.bloom_size();
        let texel = Vec2::new(1.0 / size.width as f32, 1.0 / size.height as f32);
        let ping = expect_attachment(&*self.device, framebuffer, PING);
        let pong = expect_attachment(&*self.device, framebuffer, PONG);

        self.device
            .bind_render_target(RenderTarget::attachment(framebuffer, PING));
        self.device.set_viewport(size.width, size.height);
        self.device.clear(ClearFlags::COLOR, Vec4::ZERO, 1.0);
        self.device.bind_shader(self.utility.bloom_bright_pass);
        self.device.bind_texture(0, scene_color);
        self.device
            .set_uniform("exposure", UniformValue::Float(self.settings.hdr_exposure));
        self.device.set_uniform(
            "bloom_threshold",
            UniformValue::Float(self.settings.bloom_threshold),
        );
        self.device.draw_fullscreen();
        self.stats.postprocess_passes += 1;

        for (program, source, destination) in [
            (self.utility.blur_x, ping, PONG),
            (self.utility.blur_y, pong, PING),
        ] {
            self.device
                .bind_render_target(RenderTarget::attachment(framebuffer, destination));
            self.device.bind_shader(program);
            self.device.bind_texture(0, source);
            self.device
                .set_uniform("texel_size", UniformValue::Vec2(texel));
            self.device
                .set_uniform("blur_radius", UniformValue::Float(self.settings.blur_radius));
            self.device.set_uniform("layer", UniformValue::UInt(0));
            self.device.draw_fullscreen();
            self.stats.blur_passes += 1;
        }
        ping
    }

    fn tonemap(
        &mut self,
        scene_color: TextureId,
        average_luminance: Option<TextureId>,
        bloom: Option<TextureId>,
    ) {
        self.bind_final_target();
        let program = if bloom.is_some() {
            self.utility.tonemap_bloom
        } else {
            self.utility.tonemap
        };
        self.device.bind_shader(program);
        self.device.bind_texture(0, scene_color);
        if let Some(luminance) = average_luminance {
            self.device.bind_texture(1, luminance);
        }
        if let Some(bloom) = bloom {
            self.device.bind_texture(2, bloom);
            self.device
                .set_uniform("bloom_factor", UniformValue::Float(self.settings.bloom_factor));
        }
        self.device
            .set_uniform("exposure", UniformValue::Float(self.settings.hdr_exposure));
        self.device.draw_fullscreen();
        self.stats.postprocess_passes += 1;
    }

    fn bind_final_target(&mut self) {
        let size = self.targets.size();
        self.device
            .bind_render_target(RenderTarget::all(self.targets.final_color));
        self.device.set_viewport(size.width, size.height);
    }
}
