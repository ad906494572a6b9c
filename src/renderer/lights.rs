use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use super::light_group::LightCategory;

pub const DEFAULT_SHADOW_DISTANCE: f32 = 30.0;
pub const DEFAULT_SHADOW_EXTENT: f32 = 15.0;
const SHADOW_NEAR: f32 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AmbientLight {
    pub color: Vec3,
    pub intensity: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub shadow_extent: f32,
    pub shadow_distance: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
    pub falloff: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
    pub falloff: f32,
    pub inner_angle: f32,
    pub outer_angle: f32,
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: safe_normalize(direction, Vec3::NEG_Y),
            color,
            intensity,
            shadow_extent: DEFAULT_SHADOW_EXTENT,
            shadow_distance: DEFAULT_SHADOW_DISTANCE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightKind {
    Ambient(AmbientLight),
    Directional(DirectionalLight),
    Point(PointLight),
    Spot(SpotLight),
}

/// A light as the renderer sees it for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub casts_shadows: bool,
}

impl Light {
    pub fn ambient(light: AmbientLight) -> Self {
        Self {
            kind: LightKind::Ambient(light),
            casts_shadows: false,
        }
    }

    pub fn directional(light: DirectionalLight, casts_shadows: bool) -> Self {
        Self {
            kind: LightKind::Directional(light),
            casts_shadows,
        }
    }

    pub fn point(light: PointLight, casts_shadows: bool) -> Self {
        Self {
            kind: LightKind::Point(light),
            casts_shadows,
        }
    }

    pub fn spot(light: SpotLight, casts_shadows: bool) -> Self {
        Self {
            kind: LightKind::Spot(light),
            casts_shadows,
        }
    }

    /// Ambient lights never cast shadows, whatever the flag says.
    pub fn category(&self) -> LightCategory {
        let base = match self.kind {
            LightKind::Ambient(_) => return LightCategory::Ambient,
            LightKind::Directional(_) => LightCategory::Directional,
            LightKind::Point(_) => LightCategory::Point,
            LightKind::Spot(_) => LightCategory::Spot,
        };
        if self.casts_shadows {
            base.with_shadow().unwrap_or(base)
        } else {
            base
        }
    }

    pub fn influence(&self) -> LightVolume {
        match self.kind {
            LightKind::Ambient(_) | LightKind::Directional(_) => LightVolume::Global,
            LightKind::Point(light) => LightVolume::Sphere {
                center: light.position,
                radius: light.radius,
            },
            LightKind::Spot(light) => LightVolume::Cone {
                apex: light.position,
                direction: safe_normalize(light.direction, Vec3::NEG_Y),
                range: light.range,
                half_angle: light.outer_angle.max(light.inner_angle),
            },
        }
    }
}

/// Region of space a light can reach.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightVolume {
    Global,
    Sphere {
        center: Vec3,
        radius: f32,
    },
    Cone {
        apex: Vec3,
        direction: Vec3,
        range: f32,
        half_angle: f32,
    },
}

impl LightVolume {
    /// Conservative overlap test against a bounding sphere.
    pub fn touches_sphere(&self, center: Vec3, radius: f32) -> bool {
        match *self {
            LightVolume::Global => true,
            LightVolume::Sphere {
                center: light_center,
                radius: light_radius,
            } => light_center.distance_squared(center) <= (light_radius + radius).powi(2),
            LightVolume::Cone {
                apex,
                direction,
                range,
                half_angle,
            } => {
                let to_center = center - apex;
                let distance = to_center.length();
                if distance <= radius {
                    return true;
                }
                if distance > range + radius {
                    return false;
                }
                let cos_to_center = to_center.dot(direction) / distance;
                let angle_to_center = cos_to_center.clamp(-1.0, 1.0).acos();
                let angular_radius = (radius / distance).clamp(-1.0, 1.0).asin();
                angle_to_center <= half_angle + angular_radius
            }
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct AmbientLightRaw {
    pub color_intensity: [f32; 4],
}

impl AmbientLightRaw {
    pub fn from_data(data: &AmbientLight) -> Self {
        Self {
            color_intensity: [data.color.x, data.color.y, data.color.z, data.intensity],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct DirectionalLightRaw {
    pub direction: [f32; 4],
    pub color_intensity: [f32; 4],
}

impl DirectionalLightRaw {
    pub fn from_data(data: &DirectionalLight) -> Self {
        Self {
            direction: [data.direction.x, data.direction.y, data.direction.z, 0.0],
            color_intensity: [data.color.x, data.color.y, data.color.z, data.intensity],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct PointLightRaw {
    pub position_radius: [f32; 4],
    pub color_intensity: [f32; 4],
    pub attenuation: [f32; 4],
}

impl PointLightRaw {
    pub fn from_data(data: &PointLight) -> Self {
        Self {
            position_radius: [
                data.position.x,
                data.position.y,
                data.position.z,
                data.radius,
            ],
            color_intensity: [data.color.x, data.color.y, data.color.z, data.intensity],
            attenuation: [data.falloff, 0.0, 0.0, 0.0],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct SpotLightRaw {
    pub position_range: [f32; 4],
    pub direction: [f32; 4],
    pub color_intensity: [f32; 4],
    pub cone_params: [f32; 4],
}

impl SpotLightRaw {
    pub fn from_data(data: &SpotLight) -> Self {
        let mut inner = data.inner_angle;
        let mut outer = data.outer_angle;
        if inner > outer {
            std::mem::swap(&mut inner, &mut outer);
        }

        Self {
            position_range: [
                data.position.x,
                data.position.y,
                data.position.z,
                data.range,
            ],
            direction: [data.direction.x, data.direction.y, data.direction.z, 0.0],
            color_intensity: [data.color.x, data.color.y, data.color.z, data.intensity],
            cone_params: [inner.cos(), outer.cos(), data.falloff, 0.0],
        }
    }
}

/// `params` = (shadow map slot, depth bias, unused, unused).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct ShadowDirectionalLightRaw {
    pub light: DirectionalLightRaw,
    pub view_proj: [[f32; 4]; 4],
    pub params: [f32; 4],
}

/// `params` = (shadow map slot, near, far, unused).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct ShadowPointLightRaw {
    pub light: PointLightRaw,
    pub params: [f32; 4],
}

/// `params` = (shadow map slot, depth bias, far, unused).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct ShadowSpotLightRaw {
    pub light: SpotLightRaw,
    pub view_proj: [[f32; 4]; 4],
    pub params: [f32; 4],
}

pub const SHADOW_DEPTH_BIAS: f32 = 0.0015;
pub const POINT_SHADOW_FACE_COUNT: usize = 6;

pub fn directional_shadow_matrix(light: &DirectionalLight, focus: Vec3) -> Mat4 {
    let direction = safe_normalize(light.direction, Vec3::NEG_Y);
    let distance = light.shadow_distance.max(SHADOW_NEAR * 2.0);
    let light_pos = focus - direction * distance;
    let view = Mat4::look_at_rh(light_pos, focus, shadow_up(direction));

    let extent = light.shadow_extent.max(0.1);
    let (left, right, bottom, top) = (-extent, extent, -extent, extent);
    let near = SHADOW_NEAR;
    let far = distance * 2.0;

    let projection = Mat4::from_cols(
        Vec4::new(2.0 / (right - left), 0.0, 0.0, 0.0),
        Vec4::new(0.0, 2.0 / (top - bottom), 0.0, 0.0),
        Vec4::new(0.0, 0.0, -1.0 / (far - near), 0.0),
        Vec4::new(
            -(right + left) / (right - left),
            -(top + bottom) / (top - bottom),
            -near / (far - near),
            1.0,
        ),
    );

    projection * view
}

/// Cube face order: +X, -X, +Y, -Y, +Z, -Z.
pub fn point_shadow_matrices(light: &PointLight) -> [Mat4; POINT_SHADOW_FACE_COUNT] {
    use std::f32::consts::FRAC_PI_2;

    let far = light.radius.max(SHADOW_NEAR + 0.1);
    let projection = Mat4::perspective_rh(FRAC_PI_2, 1.0, SHADOW_NEAR, far);

    let dirs = [
        Vec3::X,
        Vec3::NEG_X,
        Vec3::Y,
        Vec3::NEG_Y,
        Vec3::Z,
        Vec3::NEG_Z,
    ];
    let ups = [Vec3::Y, Vec3::Y, Vec3::Z, Vec3::NEG_Z, Vec3::Y, Vec3::Y];

    let mut matrices = [Mat4::IDENTITY; POINT_SHADOW_FACE_COUNT];
    for ((matrix, dir), up) in matrices.iter_mut().zip(dirs.iter()).zip(ups.iter()) {
        let view = Mat4::look_at_rh(light.position, light.position + *dir, *up);
        *matrix = projection * view;
    }
    matrices
}

pub fn spot_shadow_matrix(light: &SpotLight) -> Mat4 {
    let far = light.range.max(SHADOW_NEAR + 0.1);
    let fov = (light.outer_angle * 2.0).clamp(0.1, std::f32::consts::PI - 0.1);
    let forward = safe_normalize(light.direction, Vec3::NEG_Z);

    let view = Mat4::look_at_rh(light.position, light.position + forward, shadow_up(forward));
    let projection = Mat4::perspective_rh(fov, 1.0, SHADOW_NEAR, far);
    projection * view
}

pub fn shadow_near_plane() -> f32 {
    SHADOW_NEAR
}

fn shadow_up(direction: Vec3) -> Vec3 {
    if direction.abs().dot(Vec3::Y) > 0.95 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

pub(crate) fn safe_normalize(vec: Vec3, fallback: Vec3) -> Vec3 {
    if vec.length_squared() > 1e-6 {
        vec.normalize()
    } else {
        fallback
    }
}
