// scene/mod.rs

pub mod builder;
pub mod camera;
pub mod components;
pub mod culling;
pub mod hierarchy;
pub mod transform;

use hecs::{Entity, World};

pub use builder::EntityBuilder;
pub use camera::Camera;
pub use culling::object_id;
pub use transform::Transform;

pub use components::{
    AmbientLight, CanCastShadow, Children, DirectionalLight, Model, Name, Parent,
    ParticleEmitter, PointLight, SpotLight, TransformComponent, Visible, WorldTransform,
};

use crate::renderer::visibility::ObjectId;

/// hecs world of renderable entities. Implements the renderer's culling
/// interface; cameras are passed per viewport at render time.
pub struct Scene {
    pub world: World,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            world: World::new(),
        }
    }

    pub fn spawn(&mut self) -> EntityBuilder<'_> {
        EntityBuilder::new(&mut self.world)
    }

    pub fn set_parent(&mut self, child: Entity, parent: Entity) -> Result<(), hecs::NoSuchEntity> {
        hierarchy::set_parent(&mut self.world, child, parent)
    }

    /// Refreshes world transforms. Call after moving entities and before
    /// rendering.
    pub fn update(&mut self) {
        hierarchy::propagate_transforms(&mut self.world);
    }

    pub fn entity(&self, id: ObjectId) -> Option<Entity> {
        Entity::from_bits(id.0).filter(|&entity| self.world.contains(entity))
    }

    /// Removes an entity and detaches it from its parent. Children are
    /// despawned with it.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        if let Ok(parent) = self.world.get::<&Parent>(entity).map(|p| p.0) {
            if let Ok(mut siblings) = self.world.get::<&mut Children>(parent) {
                siblings.0.retain(|&e| e != entity);
            }
        }

        let mut stack = vec![entity];
        let mut removed = false;
        while let Some(current) = stack.pop() {
            if let Ok(children) = self.world.get::<&Children>(current) {
                stack.extend(children.0.iter().copied());
            }
            removed |= self.world.despawn(current).is_ok();
        }
        removed
    }
}
