// scene/hierarchy.rs
use hecs::{Entity, World};

use crate::scene::components::{Children, Parent, TransformComponent, WorldTransform};
use crate::scene::transform::Transform;

/// Links `child` under `parent`, detaching it from any previous parent.
pub fn set_parent(
    world: &mut World,
    child: Entity,
    parent: Entity,
) -> Result<(), hecs::NoSuchEntity> {
    if !world.contains(parent) {
        return Err(hecs::NoSuchEntity);
    }
    if let Ok(previous) = world.get::<&Parent>(child).map(|p| p.0) {
        if let Ok(mut siblings) = world.get::<&mut Children>(previous) {
            siblings.0.retain(|&entity| entity != child);
        }
    }
    world.insert_one(child, Parent(parent))?;

    let linked = match world.get::<&mut Children>(parent) {
        Ok(mut children) => {
            children.0.push(child);
            true
        }
        Err(_) => false,
    };
    if !linked {
        world.insert_one(parent, Children(vec![child]))?;
    }
    Ok(())
}

/// Walks every hierarchy from its roots and refreshes `WorldTransform`.
pub(crate) fn propagate_transforms(world: &mut World) {
    let roots: Vec<Entity> = world
        .query::<&TransformComponent>()
        .without::<&Parent>()
        .iter()
        .map(|(entity, _)| entity)
        .collect();

    log::trace!("Propagating transforms from {} root entities", roots.len());

    let mut stack: Vec<(Entity, Transform)> = Vec::new();

    for root in roots {
        stack.push((root, Transform::IDENTITY));

        while let Some((entity, parent_world)) = stack.pop() {
            let local = match world.get::<&TransformComponent>(entity) {
                Ok(t) => t.0,
                Err(_) => {
                    log::trace!("Entity {:?} has no TransformComponent, skipping", entity);
                    continue;
                }
            };

            let world_transform = parent_world.mul_transform(&local);

            let updated = match world.get::<&mut WorldTransform>(entity) {
                Ok(mut wt) => {
                    wt.0 = world_transform;
                    true
                }
                Err(_) => false,
            };

            if !updated {
                if let Err(e) = world.insert_one(entity, WorldTransform(world_transform)) {
                    log::error!(
                        "Failed to insert WorldTransform for entity {:?}: {:?}",
                        entity,
                        e
                    );
                    continue;
                }
            }

            if let Ok(children) = world.get::<&Children>(entity) {
                for &child in children.0.iter().rev() {
                    stack.push((child, world_transform));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::components::Name;
    use glam::{Quat, Vec3};

    fn spawn_at(world: &mut World, name: &str, translation: Vec3) -> Entity {
        world.spawn((
            Name::new(name),
            TransformComponent(Transform::from_translation(translation)),
        ))
    }

    #[test]
    fn children_inherit_parent_translation() {
        let mut world = World::new();
        let parent = spawn_at(&mut world, "Parent", Vec3::new(5.0, 0.0, 0.0));
        let child = spawn_at(&mut world, "Child", Vec3::new(2.0, 0.0, 0.0));
        set_parent(&mut world, child, parent).unwrap();

        propagate_transforms(&mut world);

        let parent_world = world.get::<&WorldTransform>(parent).unwrap();
        assert_eq!(parent_world.0.translation, Vec3::new(5.0, 0.0, 0.0));
        let child_world = world.get::<&WorldTransform>(child).unwrap();
        assert_eq!(child_world.0.translation, Vec3::new(7.0, 0.0, 0.0));
    }

    #[test]
    fn rotation_carries_into_children() {
        let mut world = World::new();
        let parent = world.spawn((TransformComponent(Transform::from_trs(
            Vec3::ZERO,
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            Vec3::ONE,
        )),));
        let child = spawn_at(&mut world, "Child", Vec3::new(1.0, 0.0, 0.0));
        set_parent(&mut world, child, parent).unwrap();

        propagate_transforms(&mut world);

        let child_world = world.get::<&WorldTransform>(child).unwrap();
        assert!(child_world
            .0
            .translation
            .abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5));
    }

    #[test]
    fn propagation_updates_existing_world_transform() {
        let mut world = World::new();
        let parent = spawn_at(&mut world, "Parent", Vec3::ZERO);
        let child = spawn_at(&mut world, "Child", Vec3::new(2.0, 0.0, 0.0));
        set_parent(&mut world, child, parent).unwrap();
        propagate_transforms(&mut world);

        world
            .get::<&mut TransformComponent>(parent)
            .unwrap()
            .0
            .translation = Vec3::new(1.0, 0.0, 0.0);
        propagate_transforms(&mut world);

        let child_world = world.get::<&WorldTransform>(child).unwrap();
        assert_eq!(child_world.0.translation, Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn reparenting_moves_the_child() {
        let mut world = World::new();
        let first = spawn_at(&mut world, "First", Vec3::X);
        let second = spawn_at(&mut world, "Second", Vec3::Y);
        let child = spawn_at(&mut world, "Child", Vec3::ZERO);

        set_parent(&mut world, child, first).unwrap();
        set_parent(&mut world, child, second).unwrap();

        assert!(world.get::<&Children>(first).unwrap().0.is_empty());
        assert_eq!(world.get::<&Children>(second).unwrap().0, vec![child]);
        propagate_transforms(&mut world);
        assert_eq!(world.get::<&WorldTransform>(child).unwrap().0.translation, Vec3::Y);
    }
}
