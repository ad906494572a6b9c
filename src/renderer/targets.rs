// renderer/targets.rs
//! Framebuffers owned by the renderer: one set per viewport plus the shadow
//! maps shared by every viewport. Allocated once, resized on demand.

use super::device::{FramebufferDesc, FramebufferId, RenderDevice, TextureFormat};
use super::light_group::LightCategory;
use super::lights::POINT_SHADOW_FACE_COUNT;
use crate::settings::RendererSettings;

pub const HDR_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
pub const LDR_FORMAT: TextureFormat = TextureFormat::Rgba8;
pub const LUMINANCE_FORMAT: TextureFormat = TextureFormat::R16Float;
/// Two moments per texel for variance shadow maps.
pub const SHADOW_FORMAT: TextureFormat = TextureFormat::Rg32Float;

/// Ping-pong pair: attachment 0 holds the result, attachment 1 is scratch.
pub const PING: u32 = 0;
pub const PONG: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn scaled_down(self, divisor: u32) -> Self {
        let divisor = divisor.max(1);
        Self::new(self.width / divisor, self.height / divisor)
    }
}

/// Luminance chain sizes, largest first, ending at 1x1.
pub fn luminance_chain(start: u32) -> Vec<u32> {
    let mut sizes = Vec::new();
    let mut size = start.max(1).next_power_of_two();
    loop {
        sizes.push(size);
        if size == 1 {
            break;
        }
        size /= 2;
    }
    sizes
}

#[derive(Debug)]
pub struct ViewportTargets {
    size: TargetSize,
    bloom_size: TargetSize,
    /// HDR color + depth the main pass renders into.
    pub scene: FramebufferId,
    pub bloom: FramebufferId,
    pub luminance: Vec<(FramebufferId, u32)>,
    pub final_color: FramebufferId,
}

impl ViewportTargets {
    pub fn new(
        device: &mut dyn RenderDevice,
        size: TargetSize,
        settings: &RendererSettings,
    ) -> Self {
        let bloom_size = size.scaled_down(settings.bloom_downscale);

        let scene = device.create_framebuffer(
            &FramebufferDesc::color("SceneColor", size.width, size.height, HDR_FORMAT).with_depth(),
        );
        let bloom = device.create_framebuffer(
            &FramebufferDesc::color("Bloom", bloom_size.width, bloom_size.height, HDR_FORMAT)
                .with_color_attachment(HDR_FORMAT),
        );
        let luminance = luminance_chain(settings.luminance_size)
            .into_iter()
            .map(|edge| {
                let framebuffer = device.create_framebuffer(&FramebufferDesc::color(
                    format!("Luminance{edge}"),
                    edge,
                    edge,
                    LUMINANCE_FORMAT,
                ));
                (framebuffer, edge)
            })
            .collect();
        let final_color = device.create_framebuffer(&FramebufferDesc::color(
            "FinalColor",
            size.width,
            size.height,
            LDR_FORMAT,
        ));

        log::info!(
            "Created viewport targets {}x{} (bloom {}x{})",
            size.width,
            size.height,
            bloom_size.width,
            bloom_size.height
        );

        Self {
            size,
            bloom_size,
            scene,
            bloom,
            luminance,
            final_color,
        }
    }

    pub fn size(&self) -> TargetSize {
        self.size
    }

    pub fn bloom_size(&self) -> TargetSize {
        self.bloom_size
    }

    /// 1x1 average luminance at the end of the chain.
    pub fn average_luminance(&self) -> Option<FramebufferId> {
        self.luminance.last().map(|(framebuffer, _)| *framebuffer)
    }

    /// The luminance chain has a fixed size and is left alone.
    pub fn resize(
        &mut self,
        device: &mut dyn RenderDevice,
        size: TargetSize,
        bloom_downscale: u32,
    ) {
        if size == self.size {
            return;
        }
        self.size = size;
        self.bloom_size = size.scaled_down(bloom_downscale);
        device.resize_framebuffer(self.scene, size.width, size.height);
        device.resize_framebuffer(self.final_color, size.width, size.height);
        device.resize_framebuffer(self.bloom, self.bloom_size.width, self.bloom_size.height);
    }

    pub fn destroy(self, device: &mut dyn RenderDevice) {
        device.destroy_framebuffer(self.scene);
        device.destroy_framebuffer(self.bloom);
        device.destroy_framebuffer(self.final_color);
        for (framebuffer, _) in self.luminance {
            device.destroy_framebuffer(framebuffer);
        }
    }
}

fn shadow_set_index(category: LightCategory) -> Option<usize> {
    match category {
        LightCategory::ShadowDirectional => Some(0),
        LightCategory::ShadowPoint => Some(1),
        LightCategory::ShadowSpot => Some(2),
        _ => None,
    }
}

/// Shadow maps for every shadow category, `slots` per category. Point maps
/// have one layer per cube face.
#[derive(Debug)]
pub struct ShadowTargets {
    size: u32,
    slots: usize,
    maps: [Vec<FramebufferId>; 3],
}

impl ShadowTargets {
    pub fn new(device: &mut dyn RenderDevice, size: u32, slots: usize) -> Self {
        let size = size.max(1);
        let slots = slots.max(1);
        let mut maps: [Vec<FramebufferId>; 3] = Default::default();

        for category in [
            LightCategory::ShadowDirectional,
            LightCategory::ShadowPoint,
            LightCategory::ShadowSpot,
        ] {
            let layers = if category == LightCategory::ShadowPoint {
                POINT_SHADOW_FACE_COUNT as u32
            } else {
                1
            };
            let Some(set) = shadow_set_index(category) else {
                continue;
            };
            for slot in 0..slots {
                let desc = FramebufferDesc::color(
                    format!("ShadowMap[{}:{}]", category.name(), slot),
                    size,
                    size,
                    SHADOW_FORMAT,
                )
                .with_color_attachment(SHADOW_FORMAT)
                .with_depth()
                .with_layers(layers);
                maps[set].push(device.create_framebuffer(&desc));
            }
        }

        log::info!(
            "Created shadow maps: {} slot(s) per category at {}x{}",
            slots,
            size,
            size
        );

        Self { size, slots, maps }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Framebuffer for `slot` of a shadow category. Asking for a slot beyond
    /// the configured capacity is a contract violation.
    pub fn map(&self, category: LightCategory, slot: u32) -> FramebufferId {
        let found = shadow_set_index(category)
            .and_then(|set| self.maps[set].get(slot as usize).copied());
        match found {
            Some(framebuffer) => framebuffer,
            None => {
                log::error!(
                    "No shadow map for {} slot {} (capacity {})",
                    category.name(),
                    slot,
                    self.slots
                );
                panic!(
                    "shadow map slot {slot} for {} exceeds capacity {}",
                    category.name(),
                    self.slots
                );
            }
        }
    }

    pub fn destroy(self, device: &mut dyn RenderDevice) {
        for framebuffer in self.maps.into_iter().flatten() {
            device.destroy_framebuffer(framebuffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recording::RecordingDevice;

    #[test]
    fn luminance_chain_ends_at_one() {
        assert_eq!(luminance_chain(64), vec![64, 32, 16, 8, 4, 2, 1]);
        assert_eq!(luminance_chain(48), vec![64, 32, 16, 8, 4, 2, 1]);
        assert_eq!(luminance_chain(0), vec![1]);
    }

    #[test]
    fn viewport_resize_keeps_framebuffers() {
        let mut device = RecordingDevice::new();
        let settings = RendererSettings::default();
        let mut targets = ViewportTargets::new(&mut device, TargetSize::new(640, 480), &settings);
        let before = device.live_framebuffer_count();

        targets.resize(&mut device, TargetSize::new(1280, 720), settings.bloom_downscale);
        assert_eq!(device.live_framebuffer_count(), before);
        let scene = device.framebuffer_desc(targets.scene).unwrap();
        assert_eq!((scene.width, scene.height), (1280, 720));
        let bloom = device.framebuffer_desc(targets.bloom).unwrap();
        assert_eq!(bloom.width, 1280 / settings.bloom_downscale.max(1));

        targets.destroy(&mut device);
        assert_eq!(device.live_framebuffer_count(), 0);
    }

    #[test]
    fn point_shadow_maps_have_a_layer_per_face() {
        let mut device = RecordingDevice::new();
        let shadows = ShadowTargets::new(&mut device, 512, 2);
        let point = shadows.map(LightCategory::ShadowPoint, 1);
        let desc = device.framebuffer_desc(point).unwrap();
        assert_eq!(desc.layers, 6);
        assert_eq!(desc.color_formats, vec![SHADOW_FORMAT, SHADOW_FORMAT]);
        let spot = device
            .framebuffer_desc(shadows.map(LightCategory::ShadowSpot, 0))
            .unwrap();
        assert_eq!(spot.layers, 1);
        assert_eq!(device.live_framebuffer_count(), 6);
    }

    #[test]
    #[should_panic(expected = "exceeds capacity")]
    fn slot_beyond_capacity_is_fatal() {
        let mut device = RecordingDevice::new();
        let shadows = ShadowTargets::new(&mut device, 256, 1);
        shadows.map(LightCategory::ShadowDirectional, 1);
    }
}
