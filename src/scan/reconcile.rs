// Removal of surfaces that disappeared between two scan cycles.

use std::collections::HashMap;

use super::decoder::PlaneRecord;
use super::inventory::PlaneInventory;
use crate::config::ScanKind;
use crate::engine::{TrackableId, TrackedMeshHolder};
use crate::xr::SceneUuid;

/// Remove every surface of `previous` that is absent from `current`: its
/// mesh first (if it had one), then its plane. Spatial mapping never
/// publishes planes, so only meshes go. The caller owns the batch.
/// Returns the number of surfaces removed.
pub fn remove_departed<H: TrackedMeshHolder + ?Sized>(
    previous: &PlaneInventory,
    current: &HashMap<SceneUuid, PlaneRecord>,
    kind: ScanKind,
    holder: &mut H,
) -> usize {
    let mut removed = 0;
    for (uuid, mesh_id) in previous.iter() {
        if current.contains_key(uuid) {
            continue;
        }
        if let Some(mesh_id) = mesh_id {
            if !holder.remove_mesh(*mesh_id) {
                log::debug!("Departed mesh {:032x} was not tracked", mesh_id.0);
            }
        }
        if kind.publishes_planes() && !holder.remove_plane(TrackableId::from(*uuid)) {
            log::debug!("Departed plane {:032x} was not tracked", uuid.as_u128());
        }
        removed += 1;
    }
    removed
}

/// Identity → mesh projection of a decoded cycle, ready for the inventory.
pub fn inventory_entries(current: &HashMap<SceneUuid, PlaneRecord>) -> impl Iterator<Item = (SceneUuid, Option<TrackableId>)> + '_ {
    current.iter().map(|(uuid, record)| (*uuid, record.mesh_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::*;
    use glam::Vec3;

    #[derive(Default)]
    struct RemovalLog {
        calls: Vec<(GeometryKind, TrackableId)>,
        plane: Option<PlaneUpdate>,
        mesh: Option<MeshUpdate>,
    }

    impl TrackedMeshHolder for RemovalLog {
        fn start_mesh_updates(&mut self) {}
        fn allocate_plane_update(&mut self, id: TrackableId) -> &mut PlaneUpdate {
            self.plane.insert(PlaneUpdate::new(id))
        }
        fn allocate_mesh_update(&mut self, id: TrackableId) -> &mut MeshUpdate {
            self.mesh.insert(MeshUpdate::new(id))
        }
        fn object_updated(&mut self, _update: ObjectUpdate) {}
        fn remove_mesh(&mut self, id: TrackableId) -> bool {
            self.calls.push((GeometryKind::Mesh, id));
            true
        }
        fn remove_plane(&mut self, id: TrackableId) -> bool {
            self.calls.push((GeometryKind::Plane, id));
            true
        }
        fn end_mesh_updates(&mut self) {}
        fn tracked_geometries(&mut self, _kind: GeometryKind) -> Vec<TrackedGeometrySnapshot> {
            Vec::new()
        }
    }

    fn record(mesh_id: Option<TrackableId>) -> PlaneRecord {
        PlaneRecord {
            mesh_id,
            classification: ObjectClassification::Floor,
            extent: Vec3::ONE,
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    #[test]
    fn departed_mesh_removed_before_plane() {
        let a = SceneUuid::from_u128(1);
        let b = SceneUuid::from_u128(2);
        let mut previous = PlaneInventory::new();
        previous.replace_with([(a, Some(TrackableId(10))), (b, None)]);
        let current = HashMap::from([(b, record(None))]);

        let mut log = RemovalLog::default();
        assert_eq!(remove_departed(&previous, &current, ScanKind::SceneUnderstanding, &mut log), 1);
        assert_eq!(
            log.calls,
            vec![(GeometryKind::Mesh, TrackableId(10)), (GeometryKind::Plane, TrackableId::from(a))]
        );
    }

    #[test]
    fn nothing_removed_against_empty_inventory() {
        let current = HashMap::from([(SceneUuid::from_u128(1), record(Some(TrackableId(3))))]);
        let mut log = RemovalLog::default();
        assert_eq!(remove_departed(&PlaneInventory::new(), &current, ScanKind::SceneUnderstanding, &mut log), 0);
        assert!(log.calls.is_empty());
        let entries: Vec<_> = inventory_entries(&current).collect();
        assert_eq!(entries, vec![(SceneUuid::from_u128(1), Some(TrackableId(3)))]);
    }

    #[test]
    fn spatial_mapping_removes_meshes_only() {
        let gone = SceneUuid::from_u128(4);
        let mut previous = PlaneInventory::new();
        previous.replace_with([(gone, Some(TrackableId(40)))]);

        let mut log = RemovalLog::default();
        assert_eq!(remove_departed(&previous, &HashMap::new(), ScanKind::SpatialMapping, &mut log), 1);
        assert_eq!(log.calls, vec![(GeometryKind::Mesh, TrackableId(40))]);
    }
}
