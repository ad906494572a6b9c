// renderer/pipeline/depth.rs
use glam::Vec4;

use super::PipelineExecutor;
use crate::renderer::device::{ClearFlags, RenderState, RenderTarget};
use crate::renderer::visibility::VisibleSet;

impl PipelineExecutor<'_> {
    /// Lays down opaque depth so the lighting passes can test with Equal.
    pub(super) fn depth_prepass(&mut self, visible: &VisibleSet) {
        let size = self.targets.size();
        self.device
            .bind_render_target(RenderTarget::all(self.targets.scene));
        self.device.set_viewport(size.width, size.height);
        self.device.clear(ClearFlags::DEPTH, Vec4::ZERO, 1.0);

        self.device.set_render_state(RenderState::DEPTH_ONLY);
        self.device.bind_shader(self.utility.depth);
        self.bind_camera(visible);

        for draw in visible.buckets.opaque_draws() {
            self.bind_model(draw.transform);
            self.device.draw_mesh(draw.mesh);
            self.stats.depth_prepass_draw_calls += 1;
        }
    }
}
