// ECS-backed tracked geometry consumer.
//
// Updates allocated inside a batch are staged and only reach the world when
// the outermost batch ends, in the order removals, planes, meshes, object
// updates. Consumers reading the world between frames therefore never see a
// half-applied scan.

use std::collections::HashMap;

use bevy_ecs::prelude::*;

use super::components::*;
use super::holder::*;
use super::systems;

#[derive(Default)]
pub struct EcsTrackedGeometry {
    world: World,
    index: HashMap<TrackableId, Entity>,
    batch_depth: u32,
    pending_removals: Vec<(TrackableId, GeometryKind)>,
    pending_planes: Vec<PlaneUpdate>,
    pending_meshes: Vec<MeshUpdate>,
    pending_objects: Vec<ObjectUpdate>,
    batches_applied: u64,
}

impl EcsTrackedGeometry {
    pub fn new() -> Self {
        let mut world = World::new();
        world.insert_resource(TrackingToWorld::default());
        Self {
            world,
            ..Default::default()
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: TrackableId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn entity(&self, id: TrackableId) -> Option<Entity> {
        self.index.get(&id).copied()
    }

    /// Identity and kind of a tracked entity, if it exists.
    pub fn geometry(&self, id: TrackableId) -> Option<TrackedGeometry> {
        self.entity(id).and_then(|entity| self.world.get::<TrackedGeometry>(entity)).copied()
    }

    pub fn count_of(&self, kind: GeometryKind) -> usize {
        self.index
            .values()
            .filter(|&&entity| self.world.get::<TrackedGeometry>(entity).is_some_and(|g| g.kind == kind))
            .count()
    }

    pub fn set_tracking_to_world(&mut self, transform: Transform) {
        self.world.insert_resource(TrackingToWorld(transform));
    }

    /// Number of outermost batches that reached the world.
    pub fn batches_applied(&self) -> u64 {
        self.batches_applied
    }

    fn has_kind(&self, id: TrackableId, kind: GeometryKind) -> bool {
        self.geometry(id).is_some_and(|g| g.kind == kind) || self.pending_kind(id) == Some(kind)
    }

    fn pending_kind(&self, id: TrackableId) -> Option<GeometryKind> {
        if self.pending_planes.iter().any(|p| p.id == id) {
            Some(GeometryKind::Plane)
        } else if self.pending_meshes.iter().any(|m| m.id == id) {
            Some(GeometryKind::Mesh)
        } else {
            None
        }
    }

    fn apply_pending(&mut self) {
        for (id, kind) in std::mem::take(&mut self.pending_removals) {
            let matches = self.geometry(id).is_some_and(|g| g.kind == kind);
            if matches {
                if let Some(entity) = self.index.remove(&id) {
                    self.world.despawn(entity);
                }
            }
        }
        for update in std::mem::take(&mut self.pending_planes) {
            let id = update.id;
            let entity = systems::apply_plane_update(&mut self.world, self.index.get(&id).copied(), update);
            self.index.insert(id, entity);
        }
        for update in std::mem::take(&mut self.pending_meshes) {
            let id = update.id;
            let entity = systems::apply_mesh_update(&mut self.world, self.index.get(&id).copied(), update);
            self.index.insert(id, entity);
        }
        for update in std::mem::take(&mut self.pending_objects) {
            match self.index.get(&update.id) {
                Some(&entity) => systems::apply_object_update(&mut self.world, entity, update),
                None => log::debug!("Object update for unknown geometry {:032x}", update.id.0),
            }
        }
        self.batches_applied += 1;
    }
}

impl TrackedMeshHolder for EcsTrackedGeometry {
    fn start_mesh_updates(&mut self) {
        self.batch_depth += 1;
    }

    fn allocate_plane_update(&mut self, id: TrackableId) -> &mut PlaneUpdate {
        self.pending_planes.push(PlaneUpdate::new(id));
        let last = self.pending_planes.len() - 1;
        &mut self.pending_planes[last]
    }

    fn allocate_mesh_update(&mut self, id: TrackableId) -> &mut MeshUpdate {
        self.pending_meshes.push(MeshUpdate::new(id));
        let last = self.pending_meshes.len() - 1;
        &mut self.pending_meshes[last]
    }

    fn object_updated(&mut self, update: ObjectUpdate) {
        self.pending_objects.push(update);
    }

    fn remove_mesh(&mut self, id: TrackableId) -> bool {
        let known = self.has_kind(id, GeometryKind::Mesh);
        if known {
            self.pending_meshes.retain(|m| m.id != id);
            self.pending_removals.push((id, GeometryKind::Mesh));
        }
        known
    }

    fn remove_plane(&mut self, id: TrackableId) -> bool {
        let known = self.has_kind(id, GeometryKind::Plane);
        if known {
            self.pending_planes.retain(|p| p.id != id);
            self.pending_removals.push((id, GeometryKind::Plane));
        }
        known
    }

    fn end_mesh_updates(&mut self) {
        match self.batch_depth {
            0 => log::warn!("end_mesh_updates without a matching start"),
            1 => {
                self.batch_depth = 0;
                self.apply_pending();
            }
            _ => self.batch_depth -= 1,
        }
    }

    fn tracked_geometries(&mut self, kind: GeometryKind) -> Vec<TrackedGeometrySnapshot> {
        systems::collect_snapshots(&mut self.world, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn publish_plane(holder: &mut EcsTrackedGeometry, id: u128) {
        let mut batch = MeshUpdateBatch::new(holder);
        let update = batch.allocate_plane_update(TrackableId(id));
        update.extent = Vec3::new(1.0, 1.0, 0.0);
        update.classification = ObjectClassification::Floor;
    }

    #[test]
    fn updates_are_staged_until_batch_ends() {
        let mut holder = EcsTrackedGeometry::new();
        {
            let mut batch = MeshUpdateBatch::new(&mut holder);
            batch.allocate_plane_update(TrackableId(1));
            assert!(batch.is_empty());
        }
        assert_eq!(holder.len(), 1);
        assert_eq!(holder.batches_applied(), 1);
        let geometry = holder.geometry(TrackableId(1)).unwrap();
        assert_eq!(geometry.kind, GeometryKind::Plane);
    }

    #[test]
    fn nested_batches_apply_once() {
        let mut holder = EcsTrackedGeometry::new();
        holder.start_mesh_updates();
        publish_plane(&mut holder, 1);
        assert!(holder.is_empty());
        holder.end_mesh_updates();
        assert_eq!(holder.len(), 1);
        assert_eq!(holder.batches_applied(), 1);
    }

    #[test]
    fn remove_checks_kind() {
        let mut holder = EcsTrackedGeometry::new();
        publish_plane(&mut holder, 5);
        let mut batch = MeshUpdateBatch::new(&mut holder);
        assert!(!batch.remove_mesh(TrackableId(5)));
        assert!(!batch.remove_plane(TrackableId(6)));
        assert!(batch.remove_plane(TrackableId(5)));
        drop(batch);
        assert!(holder.is_empty());
    }

    #[test]
    fn object_update_moves_mesh() {
        let mut holder = EcsTrackedGeometry::new();
        {
            let mut batch = MeshUpdateBatch::new(&mut holder);
            let mesh = batch.allocate_mesh_update(TrackableId(8));
            mesh.vertices = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
            mesh.indices = vec![0, 1, 2];
        }
        {
            let mut batch = MeshUpdateBatch::new(&mut holder);
            batch.object_updated(ObjectUpdate {
                id: TrackableId(8),
                usage: SpatialMeshUsageFlags::VISIBLE,
                tracking_state: TrackingState::Tracking,
                local_to_tracking: Transform::from_translation_rotation(Vec3::Z, glam::Quat::IDENTITY),
            });
        }
        let entity = holder.entity(TrackableId(8)).unwrap();
        assert_eq!(holder.world().get::<Transform>(entity).unwrap().translation, Vec3::Z);
        assert_eq!(
            holder.world().get::<SpatialMeshUsage>(entity),
            Some(&SpatialMeshUsage(SpatialMeshUsageFlags::VISIBLE))
        );
        assert_eq!(holder.world().get::<UpdateCount>(entity), Some(&UpdateCount(2)));
        assert_eq!(holder.count_of(GeometryKind::Mesh), 1);
    }
}
