// scene/culling.rs
//! Frustum and light-contact queries over the hecs world.

use glam::{Mat4, Vec3};
use hecs::{Entity, World};

use super::components::*;
use super::transform::Transform;
use super::Scene;
use crate::renderer::camera::{BoundingSphere, Frustum};
use crate::renderer::lights::{self, LightVolume};
use crate::renderer::visibility::{
    ModelNode, ObjectId, ParticleSystemNode, SceneCulling, VisibilityCallback,
};

pub fn object_id(entity: Entity) -> ObjectId {
    ObjectId(entity.to_bits().get())
}

fn resolve_transform(
    world_transform: Option<&WorldTransform>,
    local_transform: Option<&TransformComponent>,
) -> Transform {
    world_transform
        .map(|t| t.0)
        .or_else(|| local_transform.map(|t| t.0))
        .unwrap_or(Transform::IDENTITY)
}

fn is_visible(flag: Option<&Visible>) -> bool {
    flag.map(|v| v.0).unwrap_or(true)
}

fn shadow_enabled(flag: Option<&CanCastShadow>) -> bool {
    flag.map(|flag| flag.0).unwrap_or(false)
}

type Placement<'a> = (
    Option<&'a WorldTransform>,
    Option<&'a TransformComponent>,
    Option<&'a Visible>,
);

/// World matrix and world-space bounds of every visible renderable.
fn for_each_renderable(
    world: &World,
    mut visit: impl FnMut(Entity, Mat4, BoundingSphere, Renderable<'_>),
) {
    for (entity, (model, (world_t, local_t, visible))) in
        world.query::<(&Model, Placement<'_>)>().iter()
    {
        if !is_visible(visible) {
            continue;
        }
        let matrix = resolve_transform(world_t, local_t).matrix();
        visit(entity, matrix, model.bounds.transformed(&matrix), Renderable::Model(model));
    }

    for (entity, (emitter, (world_t, local_t, visible))) in
        world.query::<(&ParticleEmitter, Placement<'_>)>().iter()
    {
        if !is_visible(visible) {
            continue;
        }
        let matrix = resolve_transform(world_t, local_t).matrix();
        visit(
            entity,
            matrix,
            emitter.bounds.transformed(&matrix),
            Renderable::Particles(emitter),
        );
    }
}

enum Renderable<'a> {
    Model(&'a Model),
    Particles(&'a ParticleEmitter),
}

fn light_direction(transform: &Transform) -> Vec3 {
    lights::safe_normalize(transform.forward(), Vec3::NEG_Y)
}

impl SceneCulling for Scene {
    fn query_visible(&self, frustum: &Frustum, callback: &mut dyn VisibilityCallback) {
        let world = &self.world;

        for_each_renderable(world, |entity, transform, bounds, renderable| {
            if !frustum.intersects_sphere(&bounds) {
                return;
            }
            match renderable {
                Renderable::Model(model) => callback.process_model(&ModelNode {
                    id: object_id(entity),
                    transform,
                    bounds,
                    meshes: &model.meshes,
                }),
                Renderable::Particles(emitter) => {
                    callback.process_particle_system(&ParticleSystemNode {
                        id: object_id(entity),
                        transform,
                        bounds,
                        mesh: emitter.mesh,
                        material: emitter.material,
                    })
                }
            }
        });

        for (entity, (light, visible)) in
            world.query::<(&AmbientLight, Option<&Visible>)>().iter()
        {
            if is_visible(visible) {
                callback.process_ambient_light(
                    object_id(entity),
                    &lights::AmbientLight {
                        color: light.color,
                        intensity: light.intensity,
                    },
                );
            }
        }

        for (entity, (light, (world_t, local_t, visible), shadow)) in world
            .query::<(&DirectionalLight, Placement<'_>, Option<&CanCastShadow>)>()
            .iter()
        {
            if !is_visible(visible) {
                continue;
            }
            let transform = resolve_transform(world_t, local_t);
            let data = lights::DirectionalLight {
                direction: light_direction(&transform),
                color: light.color,
                intensity: light.intensity,
                shadow_extent: light.shadow_extent,
                shadow_distance: light.shadow_distance,
            };
            callback.process_directional_light(object_id(entity), &data, shadow_enabled(shadow));
        }

        for (entity, (light, (world_t, local_t, visible), shadow)) in world
            .query::<(&PointLight, Placement<'_>, Option<&CanCastShadow>)>()
            .iter()
        {
            if !is_visible(visible) {
                continue;
            }
            let position = resolve_transform(world_t, local_t).translation;
            if !frustum.intersects_sphere(&BoundingSphere::new(position, light.range)) {
                continue;
            }
            let data = lights::PointLight {
                position,
                color: light.color,
                intensity: light.intensity,
                radius: light.range,
                falloff: light.falloff,
            };
            callback.process_point_light(object_id(entity), &data, shadow_enabled(shadow));
        }

        for (entity, (light, (world_t, local_t, visible), shadow)) in world
            .query::<(&SpotLight, Placement<'_>, Option<&CanCastShadow>)>()
            .iter()
        {
            if !is_visible(visible) {
                continue;
            }
            let transform = resolve_transform(world_t, local_t);
            // The sphere around the apex encloses the whole cone.
            let reach = BoundingSphere::new(transform.translation, light.range);
            if !frustum.intersects_sphere(&reach) {
                continue;
            }
            let data = lights::SpotLight {
                position: transform.translation,
                direction: light_direction(&transform),
                color: light.color,
                intensity: light.intensity,
                range: light.range,
                falloff: light.falloff,
                inner_angle: light.inner_angle,
                outer_angle: light.outer_angle,
            };
            callback.process_spot_light(object_id(entity), &data, shadow_enabled(shadow));
        }
    }

    fn query_contacts(&self, volume: &LightVolume, visit: &mut dyn FnMut(ObjectId)) {
        for_each_renderable(&self.world, |entity, _, bounds, _| {
            if volume.touches_sphere(bounds.center, bounds.radius) {
                visit(object_id(entity));
            }
        });
    }
}
