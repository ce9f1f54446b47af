// Engine-side consumer of tracked geometry.
//
// The scan pipeline never touches the ECS world directly. It publishes plane
// and mesh updates through `TrackedMeshHolder`, always inside a batch opened
// with `MeshUpdateBatch`, and reads back snapshots for line tracing.

use std::ops::{Deref, DerefMut};

use glam::{Mat4, Vec3};

use super::components::*;

// ============================================================================
// UPDATE RECORDS
// ============================================================================

/// Full description of one plane, written by the producer after allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneUpdate {
    pub id: TrackableId,
    pub classification: ObjectClassification,
    pub extent: Vec3,
    pub local_to_tracking: Transform,
    pub tracking_state: TrackingState,
}

impl PlaneUpdate {
    pub fn new(id: TrackableId) -> Self {
        Self {
            id,
            classification: ObjectClassification::NotApplicable,
            extent: Vec3::ZERO,
            local_to_tracking: Transform::IDENTITY,
            tracking_state: TrackingState::Tracking,
        }
    }
}

/// Full description of one mesh, written by the producer after allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshUpdate {
    pub id: TrackableId,
    pub classification: ObjectClassification,
    pub vertices: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub local_to_tracking: Transform,
    pub tracking_state: TrackingState,
}

impl MeshUpdate {
    pub fn new(id: TrackableId) -> Self {
        Self {
            id,
            classification: ObjectClassification::NotApplicable,
            vertices: Vec::new(),
            indices: Vec::new(),
            local_to_tracking: Transform::IDENTITY,
            tracking_state: TrackingState::Tracking,
        }
    }
}

/// Pose or usage change of a mesh that is already known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectUpdate {
    pub id: TrackableId,
    pub usage: SpatialMeshUsageFlags,
    pub tracking_state: TrackingState,
    pub local_to_tracking: Transform,
}

/// Read-only view of a tracked geometry for queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedGeometrySnapshot {
    pub id: TrackableId,
    pub kind: GeometryKind,
    pub local_to_world: Mat4,
    pub tracking_state: TrackingState,
}

// ============================================================================
// HOLDER TRAIT
// ============================================================================

pub trait TrackedMeshHolder {
    fn start_mesh_updates(&mut self);

    /// Reserve an update slot for plane `id`. The caller fills in the record.
    fn allocate_plane_update(&mut self, id: TrackableId) -> &mut PlaneUpdate;

    /// Reserve an update slot for mesh `id`. The caller fills in the record.
    fn allocate_mesh_update(&mut self, id: TrackableId) -> &mut MeshUpdate;

    fn object_updated(&mut self, update: ObjectUpdate);

    /// Returns false if `id` was not a known mesh.
    fn remove_mesh(&mut self, id: TrackableId) -> bool;

    /// Returns false if `id` was not a known plane.
    fn remove_plane(&mut self, id: TrackableId) -> bool;

    fn end_mesh_updates(&mut self);

    fn tracked_geometries(&mut self, kind: GeometryKind) -> Vec<TrackedGeometrySnapshot>;
}

// ============================================================================
// BATCH GUARD
// ============================================================================

/// Opens an update batch on creation and closes it on drop, so every exit
/// path of a publishing routine ends the batch exactly once.
pub struct MeshUpdateBatch<'a, H: TrackedMeshHolder + ?Sized> {
    holder: &'a mut H,
}

impl<'a, H: TrackedMeshHolder + ?Sized> MeshUpdateBatch<'a, H> {
    pub fn new(holder: &'a mut H) -> Self {
        holder.start_mesh_updates();
        Self { holder }
    }
}

impl<H: TrackedMeshHolder + ?Sized> Deref for MeshUpdateBatch<'_, H> {
    type Target = H;

    fn deref(&self) -> &H {
        self.holder
    }
}

impl<H: TrackedMeshHolder + ?Sized> DerefMut for MeshUpdateBatch<'_, H> {
    fn deref_mut(&mut self) -> &mut H {
        self.holder
    }
}

impl<H: TrackedMeshHolder + ?Sized> Drop for MeshUpdateBatch<'_, H> {
    fn drop(&mut self) {
        self.holder.end_mesh_updates();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingHolder {
        starts: usize,
        ends: usize,
        planes: Vec<PlaneUpdate>,
    }

    impl TrackedMeshHolder for CountingHolder {
        fn start_mesh_updates(&mut self) {
            self.starts += 1;
        }
        fn allocate_plane_update(&mut self, id: TrackableId) -> &mut PlaneUpdate {
            self.planes.push(PlaneUpdate::new(id));
            let last = self.planes.len() - 1;
            &mut self.planes[last]
        }
        fn allocate_mesh_update(&mut self, _id: TrackableId) -> &mut MeshUpdate {
            unimplemented!()
        }
        fn object_updated(&mut self, _update: ObjectUpdate) {}
        fn remove_mesh(&mut self, _id: TrackableId) -> bool {
            false
        }
        fn remove_plane(&mut self, _id: TrackableId) -> bool {
            false
        }
        fn end_mesh_updates(&mut self) {
            self.ends += 1;
        }
        fn tracked_geometries(&mut self, _kind: GeometryKind) -> Vec<TrackedGeometrySnapshot> {
            Vec::new()
        }
    }

    #[test]
    fn batch_brackets_updates() {
        let mut holder = CountingHolder::default();
        {
            let mut batch = MeshUpdateBatch::new(&mut holder);
            batch.allocate_plane_update(TrackableId(3)).extent = Vec3::ONE;
            assert_eq!(batch.starts, 1);
            assert_eq!(batch.ends, 0);
        }
        assert_eq!(holder.ends, 1);
        assert_eq!(holder.planes[0].extent, Vec3::ONE);
    }

    #[test]
    fn batch_closes_on_early_return() {
        fn publish(holder: &mut CountingHolder, fail: bool) -> Result<(), ()> {
            let _batch = MeshUpdateBatch::new(holder);
            if fail {
                return Err(());
            }
            Ok(())
        }
        let mut holder = CountingHolder::default();
        assert!(publish(&mut holder, true).is_err());
        assert!(publish(&mut holder, false).is_ok());
        assert_eq!((holder.starts, holder.ends), (2, 2));
    }
}
