// ECS components for tracked AR geometry
// Every plane and mesh published by the scan pipeline is one entity

use bevy_ecs::prelude::*;
use bitflags::bitflags;
use glam::{Mat4, Quat, Vec3};

use crate::xr::SceneUuid;

/// Engine-facing identity of a tracked plane or mesh.
/// Planes reuse the runtime surface uuid; meshes get a locally minted id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackableId(pub u128);

impl TrackableId {
    /// Fresh random id for a mesh. Never returns the all-zero id.
    pub fn new_random() -> Self {
        loop {
            let value: u128 = rand::random();
            if value != 0 {
                return Self(value);
            }
        }
    }
}

impl From<SceneUuid> for TrackableId {
    fn from(uuid: SceneUuid) -> Self {
        Self(uuid.as_u128())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Plane,
    Mesh,
}

/// Identity and kind of a tracked geometry entity
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedGeometry {
    pub id: TrackableId,
    pub kind: GeometryKind,
}

/// Local-to-tracking transform of an entity.
/// A zero scale hides an entity that is known but not currently located.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
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
    pub const IDENTITY: Transform = Transform {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Placeholder for geometry that could not be located this frame.
    pub const HIDDEN: Transform = Transform {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ZERO,
    };

    pub fn from_translation_rotation(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
            scale: Vec3::ONE,
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.scale == Vec3::ZERO
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrackingState {
    #[default]
    Tracking,
    NotTracking,
    StoppedTracking,
}

/// Semantic label of a plane or mesh
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ObjectClassification {
    #[default]
    NotApplicable,
    Unknown,
    Wall,
    Floor,
    Ceiling,
    Table,
    SceneObject,
}

/// Half extent of a plane in its local space (world units).
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct PlaneExtent(pub Vec3);

/// Triangle data of a tracked mesh in its local space (world units).
#[derive(Component, Debug, Clone, Default, PartialEq)]
pub struct MeshGeometry {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl MeshGeometry {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

bitflags! {
    /// What a tracked mesh may be used for by the engine.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct SpatialMeshUsageFlags: u8 {
        const VISIBLE   = 0x1;
        const COLLISION = 0x2;
    }
}

#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpatialMeshUsage(pub SpatialMeshUsageFlags);

/// Number of batches that touched this entity; 1 right after it is added.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateCount(pub u32);

/// Tracking-space to world-space alignment, applied to every entity.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackingToWorld(pub Transform);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_distinct_and_valid() {
        let a = TrackableId::new_random();
        let b = TrackableId::new_random();
        assert_ne!(a, b);
        assert_ne!(a.0, 0);
    }

    #[test]
    fn hidden_transform_collapses_points() {
        let m = Transform::HIDDEN.to_matrix();
        assert_eq!(m.transform_point3(Vec3::new(5.0, -3.0, 2.0)), Vec3::ZERO);
        assert!(Transform::HIDDEN.is_hidden());
        assert!(!Transform::IDENTITY.is_hidden());
    }

    #[test]
    fn triangle_count_ignores_partial_triangles() {
        let mesh = MeshGeometry {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            indices: vec![0, 1, 2, 0, 1],
        };
        assert_eq!(mesh.triangle_count(), 1);
    }
}
