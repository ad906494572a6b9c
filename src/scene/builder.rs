// scene/builder.rs
// Optional helper for building entities - uses pure hecs

use glam::Vec3;
use hecs::World;

use super::components::*;
use crate::renderer::camera::BoundingSphere;
use crate::renderer::device::MeshHandle;
use crate::renderer::material::MaterialKey;
use crate::renderer::visibility::MeshInstance;
use crate::scene::Transform;

/// Fluent wrapper around `hecs::EntityBuilder`; `world.spawn` works just as well.
pub struct EntityBuilder<'w> {
    world: &'w mut World,
    builder: hecs::EntityBuilder,
}

impl<'w> EntityBuilder<'w> {
    pub fn new(world: &'w mut World) -> Self {
        Self {
            world,
            builder: hecs::EntityBuilder::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.builder.add(Name::new(name));
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.builder.add(TransformComponent(transform));
        self
    }

    pub fn with_model(mut self, meshes: Vec<MeshInstance>, bounds: BoundingSphere) -> Self {
        self.builder.add(Model { meshes, bounds });
        self
    }

    pub fn with_mesh(
        self,
        mesh: MeshHandle,
        material: MaterialKey,
        bounds: BoundingSphere,
    ) -> Self {
        self.with_model(vec![MeshInstance { mesh, material }], bounds)
    }

    pub fn with_particles(
        mut self,
        mesh: MeshHandle,
        material: MaterialKey,
        bounds: BoundingSphere,
    ) -> Self {
        self.builder.add(ParticleEmitter {
            mesh,
            material,
            bounds,
        });
        self
    }

    pub fn with_ambient_light(mut self, color: Vec3, intensity: f32) -> Self {
        self.builder.add(AmbientLight { color, intensity });
        self
    }

    pub fn with_directional_light(mut self, color: Vec3, intensity: f32) -> Self {
        self.builder.add(DirectionalLight::new(color, intensity));
        self
    }

    pub fn with_point_light(mut self, color: Vec3, intensity: f32, range: f32) -> Self {
        self.builder.add(PointLight {
            color,
            intensity,
            range,
            falloff: 1.0,
        });
        self
    }

    pub fn with_spot_light(
        mut self,
        color: Vec3,
        intensity: f32,
        range: f32,
        inner_angle: f32,
        outer_angle: f32,
    ) -> Self {
        self.builder.add(SpotLight {
            color,
            intensity,
            inner_angle,
            outer_angle,
            range,
            falloff: 1.0,
        });
        self
    }

    pub fn casting_shadows(mut self, enabled: bool) -> Self {
        self.builder.add(CanCastShadow(enabled));
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.builder.add(Visible(visible));
        self
    }

    pub fn spawn(&mut self) -> hecs::Entity {
        self.world.spawn(self.builder.build())
    }
}
