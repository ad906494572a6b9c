// scene/components.rs
// Pure hecs components

use glam::Vec3;

use crate::renderer::camera::BoundingSphere;
use crate::renderer::device::MeshHandle;
use crate::renderer::lights::{DEFAULT_SHADOW_DISTANCE, DEFAULT_SHADOW_EXTENT};
use crate::renderer::material::MaterialKey;
use crate::renderer::visibility::MeshInstance;
use crate::scene::Transform;

// ============================================================================
// Core Rendering Components
// ============================================================================

/// Transform component (position, rotation, scale)
#[derive(Debug, Clone, Copy)]
pub struct TransformComponent(pub Transform);

/// World-space transform (computed from hierarchy)
#[derive(Debug, Clone, Copy)]
pub struct WorldTransform(pub Transform);

#[derive(Debug, Clone, Copy)]
pub struct Visible(pub bool);

impl Default for Visible {
    fn default() -> Self {
        Self(true)
    }
}

/// Renderable made of one or more meshes. `bounds` is in model space.
#[derive(Debug, Clone)]
pub struct Model {
    pub meshes: Vec<MeshInstance>,
    pub bounds: BoundingSphere,
}

impl Model {
    pub fn single(mesh: MeshHandle, material: MaterialKey, bounds: BoundingSphere) -> Self {
        Self {
            meshes: vec![MeshInstance { mesh, material }],
            bounds,
        }
    }
}

/// Particle system drawn as one mesh; never casts shadows.
#[derive(Debug, Clone, Copy)]
pub struct ParticleEmitter {
    pub mesh: MeshHandle,
    pub material: MaterialKey,
    pub bounds: BoundingSphere,
}

// ============================================================================
// Lighting Components
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct AmbientLight {
    pub color: Vec3,
    pub intensity: f32,
}

/// Shines along the entity's -Z axis.
#[derive(Debug, Clone, Copy)]
pub struct DirectionalLight {
    pub color: Vec3,
    pub intensity: f32,
    pub shadow_extent: f32,
    pub shadow_distance: f32,
}

impl DirectionalLight {
    pub fn new(color: Vec3, intensity: f32) -> Self {
        Self {
            color,
            intensity,
            shadow_extent: DEFAULT_SHADOW_EXTENT,
            shadow_distance: DEFAULT_SHADOW_DISTANCE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PointLight {
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
    pub falloff: f32,
}

/// Points along the entity's -Z axis.
#[derive(Debug, Clone, Copy)]
pub struct SpotLight {
    pub color: Vec3,
    pub intensity: f32,
    pub inner_angle: f32,
    pub outer_angle: f32,
    pub range: f32,
    pub falloff: f32,
}

/// Opt-in shadow casting for light entities.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanCastShadow(pub bool);

// ============================================================================
// Utility Components
// ============================================================================

/// Name component for debugging
#[derive(Debug, Clone)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

// ============================================================================
// Hierarchy Components
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct Parent(pub hecs::Entity);

#[derive(Debug, Clone, Default)]
pub struct Children(pub Vec<hecs::Entity>);
