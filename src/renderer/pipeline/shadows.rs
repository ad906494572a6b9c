// renderer/pipeline/shadows.rs
use glam::{Mat4, Vec2, Vec3, Vec4};

use super::PipelineExecutor;
use crate::renderer::device::{
    expect_attachment, ClearFlags, FramebufferId, RenderState, RenderTarget, UniformValue,
};
use crate::renderer::light_group::LightCategory;
use crate::renderer::lights::{
    directional_shadow_matrix, point_shadow_matrices, spot_shadow_matrix, LightKind,
};
use crate::renderer::targets::{PING, PONG};
use crate::renderer::visibility::{MeshDraw, VisibleSet};

/// Cleared to the far plane in both moments.
const SHADOW_CLEAR: Vec4 = Vec4::ONE;

struct ShadowView {
    view_proj: Mat4,
    position: Vec3,
    far: f32,
}

impl PipelineExecutor<'_> {
    /// Renders and blurs the maps of every active caster in `category`.
    /// Casters that reach no visible mesh are skipped.
    pub(super) fn shadow_pass(&mut self, category: LightCategory, visible: &VisibleSet) {
        let lights = self.lights;
        for (light_index, registered) in lights.active_shadow_casters(category) {
            let Some(slot) = registered.shadow_slot else {
                continue;
            };
            let framebuffer = self.shadow_targets.map(category, slot);

            let (matrices, far) = match registered.light.kind {
                LightKind::Directional(light) => (
                    vec![directional_shadow_matrix(&light, visible.shadow_focus)],
                    light.shadow_distance * 2.0,
                ),
                LightKind::Point(light) => (point_shadow_matrices(&light).to_vec(), light.radius),
                LightKind::Spot(light) => (vec![spot_shadow_matrix(&light)], light.range),
                LightKind::Ambient(_) => continue,
            };

            let casters: Vec<&MeshDraw> = visible
                .buckets
                .opaque_draws()
                .filter(|draw| draw.casts_shadows)
                .filter(|draw| {
                    visible
                        .light_group(draw)
                        .contains(category, light_index)
                })
                .collect();

            log::trace!(
                "Shadow map {}[{}]: {} face(s), {} caster(s)",
                category.name(),
                slot,
                matrices.len(),
                casters.len()
            );

            let position = match registered.light.kind {
                LightKind::Point(light) => light.position,
                LightKind::Spot(light) => light.position,
                _ => visible.shadow_focus,
            };

            for (layer, view_proj) in matrices.into_iter().enumerate() {
                let view = ShadowView {
                    view_proj,
                    position,
                    far,
                };
                self.render_shadow_face(category, framebuffer, layer as u32, &view, &casters);
                self.blur_shadow_face(framebuffer, layer as u32);
            }
        }
    }

    fn render_shadow_face(
        &mut self,
        category: LightCategory,
        framebuffer: FramebufferId,
        layer: u32,
        view: &ShadowView,
        casters: &[&MeshDraw],
    ) {
        let size = self.shadow_targets.size();
        self.device
            .bind_render_target(RenderTarget::attachment(framebuffer, PING).with_layer(layer));
        self.device.set_viewport(size, size);
        self.device
            .clear(ClearFlags::COLOR | ClearFlags::DEPTH, SHADOW_CLEAR, 1.0);
        self.device.set_render_state(RenderState::OPAQUE);
        self.device
            .bind_shader(self.utility.shadow_variance(category));
        self.device
            .set_uniform("light_view_proj", UniformValue::Mat4(view.view_proj));
        self.device
            .set_uniform("light_position", UniformValue::Vec3(view.position));
        self.device
            .set_uniform("light_far", UniformValue::Float(view.far));

        for draw in casters {
            self.bind_model(draw.transform);
            self.device.draw_mesh(draw.mesh);
            self.stats.shadow_draw_calls += 1;
        }
        self.stats.shadow_passes += 1;
    }

    /// Separable Gaussian: X from PING into PONG, Y from PONG back into PING.
    fn blur_shadow_face(&mut self, framebuffer: FramebufferId, layer: u32) {
        let size = self.shadow_targets.size();
        let texel = Vec2::splat(1.0 / size as f32);
        let ping = expect_attachment(&*self.device, framebuffer, PING);
        let pong = expect_attachment(&*self.device, framebuffer, PONG);

        self.device.set_render_state(RenderState::FULLSCREEN);
        for (program, source, destination) in [
            (self.utility.blur_x, ping, PONG),
            (self.utility.blur_y, pong, PING),
        ] {
            self.device.bind_render_target(
                RenderTarget::attachment(framebuffer, destination).with_layer(layer),
            );
            self.device.bind_shader(program);
            self.device.bind_texture(0, source);
            self.device
                .set_uniform("texel_size", UniformValue::Vec2(texel));
            self.device
                .set_uniform("blur_radius", UniformValue::Float(self.settings.blur_radius));
            self.device.set_uniform("layer", UniformValue::UInt(layer));
            self.device.draw_fullscreen();
            self.stats.blur_passes += 1;
        }
    }
}
