// Runtime → engine coordinate conversion.
//
// Runtime: right-handed, +Y up, -Z forward, meters.
// Engine:  left-handed, +Z up, +X forward, world units (world_to_meters per meter).

use std::f32::consts::FRAC_PI_2;

use glam::{Quat, Vec3};

use super::types::XrPose;
use crate::engine::components::Transform;

/// Convert a runtime position or direction into engine space, scaled to world units.
#[inline]
pub fn to_engine_vector(v: Vec3, world_to_meters: f32) -> Vec3 {
    Vec3::new(-v.z, v.x, v.y) * world_to_meters
}

#[inline]
pub fn to_engine_quat(q: Quat) -> Quat {
    Quat::from_xyzw(-q.z, q.x, q.y, -q.w)
}

pub fn to_engine_transform(pose: &XrPose, world_to_meters: f32) -> Transform {
    Transform {
        translation: to_engine_vector(pose.position, world_to_meters),
        rotation: to_engine_quat(pose.orientation),
        scale: Vec3::ONE,
    }
}

/// Plane geometry is authored in the XY plane; runtime planes face +Z, so the
/// pose is followed by a -90° turn about Y.
pub fn plane_transform(pose: &XrPose, world_to_meters: f32) -> Transform {
    let mut transform = to_engine_transform(pose, world_to_meters);
    transform.rotation = transform.rotation * Quat::from_axis_angle(Vec3::Y, -FRAC_PI_2);
    transform
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_maps_to_engine_forward() {
        // Runtime forward is -Z; engine forward is +X.
        let v = to_engine_vector(Vec3::new(0.0, 0.0, -1.0), 100.0);
        assert!((v - Vec3::new(100.0, 0.0, 0.0)).length() < 1e-4);
        // Runtime up (+Y) is engine up (+Z).
        let up = to_engine_vector(Vec3::Y, 1.0);
        assert!((up - Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn rotation_conversion_matches_vector_conversion() {
        let q = Quat::from_axis_angle(Vec3::Y, 0.7);
        let v = Vec3::new(0.3, -0.2, 0.9);
        let rotated_then_converted = to_engine_vector(q * v, 1.0);
        let converted = to_engine_quat(q) * to_engine_vector(v, 1.0);
        assert!((rotated_then_converted - converted).length() < 1e-4);
    }

    #[test]
    fn plane_transform_adds_quarter_turn() {
        let t = plane_transform(&XrPose::IDENTITY, 1.0);
        let expected = to_engine_quat(Quat::IDENTITY) * Quat::from_axis_angle(Vec3::Y, -FRAC_PI_2);
        assert!(t.rotation.abs_diff_eq(expected, 1e-5));
        assert_eq!(t.scale, Vec3::ONE);
    }
}
