// scene/transform.rs
use glam::{Mat4, Quat, Vec3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn from_trs(t: Vec3, r: Quat, s: Vec3) -> Self {
        Self {
            translation: t,
            rotation: r,
            scale: s,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    /// Rotation that points the local -Z axis along `direction`.
    pub fn looking_along(translation: Vec3, direction: Vec3) -> Self {
        let direction = direction.try_normalize().unwrap_or(Vec3::NEG_Z);
        Self {
            translation,
            rotation: Quat::from_rotation_arc(Vec3::NEG_Z, direction),
            scale: Vec3::ONE,
        }
    }

    /// Composes `self` (parent) with `child`, so that the result maps child
    /// space straight to the parent's space.
    pub fn mul_transform(&self, child: &Transform) -> Transform {
        Transform {
            translation: self.translation + self.rotation * (self.scale * child.translation),
            rotation: self.rotation * child.rotation,
            scale: self.scale * child.scale,
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_identity() {
        let m = Transform::default().matrix();
        assert!(m.abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn translate_then_scale_ok() {
        let tr = Transform::from_trs(Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY, Vec3::splat(2.0));
        let p = tr.matrix().transform_point3(Vec3::new(1.0, 0.0, 0.0));
        // (1,0,0) -> (2,0,0) -> (3,2,3)
        assert!(p.abs_diff_eq(Vec3::new(3.0, 2.0, 3.0), 1e-6));
    }

    #[test]
    fn composition_matches_matrix_product() {
        let parent = Transform::from_trs(
            Vec3::new(1.0, 0.0, 0.0),
            Quat::from_rotation_y(0.7),
            Vec3::splat(2.0),
        );
        let child = Transform::from_translation(Vec3::new(0.0, 1.0, -3.0));
        let composed = parent.mul_transform(&child).matrix();
        assert!(composed.abs_diff_eq(parent.matrix() * child.matrix(), 1e-5));
    }

    #[test]
    fn looking_along_sets_forward() {
        let t = Transform::looking_along(Vec3::ZERO, Vec3::new(0.0, -1.0, 0.0));
        assert!(t.forward().abs_diff_eq(Vec3::NEG_Y, 1e-5));
    }
}
