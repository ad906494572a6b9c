use std::f32::consts::FRAC_PI_4;

use glam::Vec3;
use scene_renderer::renderer::{
    BoundingSphere, Material, MaterialDefinition, MeshHandle, RecordingDevice, TransparencyMode,
    UniformValue,
};
use scene_renderer::scene::Transform;
use scene_renderer::{init_logging, Camera, RendererContext, RendererSettings, Scene, SceneRenderer};

const PLASTIC_SURFACE: &str = include_str!("shader/plastic.wgsl");
const FRAMES: usize = 3;

/// Headless walk through a small lit scene: a floor, a ring of cubes and a
/// glass pane, two shadowed lights and a handful of plain point lights.
fn main() {
    init_logging();

    let settings = RendererSettings::load();
    let context = RendererContext::new(RecordingDevice::new(), settings);
    let mut renderer = SceneRenderer::new(context);
    let viewport = renderer.add_viewport(1280, 720);

    let materials = renderer.materials_mut();
    let plastic = materials.add_definition(MaterialDefinition::new("Plastic", PLASTIC_SURFACE));
    let glass = materials.add_definition(
        MaterialDefinition::new("Glass", PLASTIC_SURFACE)
            .with_transparency(TransparencyMode::Blended)
            .with_shadows(false),
    );
    let grey = materials.add_material(
        Material::new(plastic)
            .with_parameter("base_color", UniformValue::Vec4(glam::Vec4::new(0.6, 0.6, 0.6, 1.0)))
            .with_parameter("roughness", UniformValue::Float(0.8)),
    );
    let red = materials.add_material(
        Material::new(plastic)
            .with_parameter("base_color", UniformValue::Vec4(glam::Vec4::new(0.9, 0.1, 0.1, 1.0)))
            .with_parameter("roughness", UniformValue::Float(0.3)),
    );
    let pane = materials.add_material(
        Material::new(glass)
            .with_parameter("base_color", UniformValue::Vec4(glam::Vec4::new(0.4, 0.7, 1.0, 0.3)))
            .with_parameter("roughness", UniformValue::Float(0.05)),
    );

    let cube = MeshHandle(1);
    let quad = MeshHandle(2);
    let mut scene = Scene::new();

    scene
        .spawn()
        .with_name("Floor")
        .with_transform(Transform::from_trs(
            Vec3::ZERO,
            glam::Quat::IDENTITY,
            Vec3::new(20.0, 0.1, 20.0),
        ))
        .with_mesh(cube, grey, BoundingSphere::new(Vec3::ZERO, 0.87))
        .spawn();

    for i in 0..8 {
        let angle = i as f32 * FRAC_PI_4;
        scene
            .spawn()
            .with_name(format!("Cube {i}"))
            .with_transform(Transform::from_translation(Vec3::new(
                angle.cos() * 4.0,
                0.5,
                angle.sin() * 4.0,
            )))
            .with_mesh(cube, red, BoundingSphere::new(Vec3::ZERO, 0.87))
            .spawn();
    }

    scene
        .spawn()
        .with_name("Glass pane")
        .with_transform(Transform::from_translation(Vec3::new(0.0, 1.0, 2.0)))
        .with_mesh(quad, pane, BoundingSphere::new(Vec3::ZERO, 1.42))
        .spawn();

    scene
        .spawn()
        .with_name("Sky")
        .with_ambient_light(Vec3::new(0.4, 0.45, 0.5), 0.15)
        .spawn();
    scene
        .spawn()
        .with_name("Sun")
        .with_transform(Transform::looking_along(Vec3::ZERO, Vec3::new(-0.3, -1.0, -0.2)))
        .with_directional_light(Vec3::new(1.0, 0.95, 0.85), 2.0)
        .casting_shadows(true)
        .spawn();
    scene
        .spawn()
        .with_name("Lamp")
        .with_transform(Transform::from_translation(Vec3::new(0.0, 3.0, 0.0)))
        .with_point_light(Vec3::new(1.0, 0.8, 0.6), 8.0, 10.0)
        .casting_shadows(true)
        .spawn();
    for i in 0..6 {
        let angle = i as f32 * std::f32::consts::TAU / 6.0;
        scene
            .spawn()
            .with_name(format!("Fill {i}"))
            .with_transform(Transform::from_translation(Vec3::new(
                angle.cos() * 6.0,
                1.5,
                angle.sin() * 6.0,
            )))
            .with_point_light(Vec3::new(0.3, 0.5, 1.0), 2.0, 5.0)
            .spawn();
    }

    let mut camera = Camera::looking_at(Vec3::new(0.0, 6.0, 12.0), Vec3::ZERO);

    for frame in 0..FRAMES {
        let angle = frame as f32 * 0.2;
        camera.eye = Vec3::new(angle.sin() * 12.0, 6.0, angle.cos() * 12.0);
        scene.update();

        let output = renderer.render_viewport(&scene, &camera, viewport);
        let stats = renderer.last_frame_stats();
        log::info!(
            "Frame {}: {:?} pipeline, {} object(s), {} light(s), {} shadow pass(es), {} draw call(s), shader cache {} hit(s) / {} miss(es), output {:?}",
            frame,
            stats.pipeline,
            stats.visible_objects,
            stats.visible_lights,
            stats.shadow_passes,
            stats.total_draw_calls(),
            stats.shader_cache.hits,
            stats.shader_cache.misses,
            output
        );
        let recorded = renderer.device_mut().take_commands();
        log::debug!("Frame {}: {} device command(s) recorded", frame, recorded.len());
    }

    log::info!(
        "{} shader variant(s) cached across {} frame(s)",
        renderer.shader_caches().variant_count(),
        renderer.frame_index()
    );

    let context = renderer.shutdown();
    log::info!(
        "Device released: {} framebuffer(s), {} shader(s) still alive",
        context.device.live_framebuffer_count(),
        context.device.live_shader_count()
    );
}
