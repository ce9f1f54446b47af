// World-update routines for tracked geometry entities
// Each routine applies one kind of update to the ECS world directly

use bevy_ecs::prelude::*;
use bevy_ecs::world::EntityWorldMut;

use super::components::*;
use super::holder::{MeshUpdate, ObjectUpdate, PlaneUpdate, TrackedGeometrySnapshot};

/// Spawn or overwrite the entity for a plane update
pub fn apply_plane_update(world: &mut World, entity: Option<Entity>, update: PlaneUpdate) -> Entity {
    let components = (
        update.local_to_tracking,
        update.tracking_state,
        update.classification,
        PlaneExtent(update.extent),
    );
    match entity {
        Some(entity) => {
            let mut entity_mut = world.entity_mut(entity);
            entity_mut.insert(components);
            bump_update_count(&mut entity_mut);
            entity
        }
        None => world
            .spawn((
                TrackedGeometry { id: update.id, kind: GeometryKind::Plane },
                components,
                UpdateCount(1),
            ))
            .id(),
    }
}

/// Spawn or overwrite the entity for a mesh update
/// New meshes start visible and usable for collision
pub fn apply_mesh_update(world: &mut World, entity: Option<Entity>, update: MeshUpdate) -> Entity {
    let components = (
        update.local_to_tracking,
        update.tracking_state,
        update.classification,
        MeshGeometry {
            vertices: update.vertices,
            indices: update.indices,
        },
    );
    match entity {
        Some(entity) => {
            let mut entity_mut = world.entity_mut(entity);
            entity_mut.insert(components);
            bump_update_count(&mut entity_mut);
            entity
        }
        None => world
            .spawn((
                TrackedGeometry { id: update.id, kind: GeometryKind::Mesh },
                components,
                SpatialMeshUsage(SpatialMeshUsageFlags::VISIBLE | SpatialMeshUsageFlags::COLLISION),
                UpdateCount(1),
            ))
            .id(),
    }
}

/// Apply a pose or usage change to an existing entity
pub fn apply_object_update(world: &mut World, entity: Entity, update: ObjectUpdate) {
    let mut entity_mut = world.entity_mut(entity);
    entity_mut.insert((
        update.local_to_tracking,
        update.tracking_state,
        SpatialMeshUsage(update.usage),
    ));
    bump_update_count(&mut entity_mut);
}

fn bump_update_count(entity_mut: &mut EntityWorldMut<'_>) {
    if let Some(mut count) = entity_mut.get_mut::<UpdateCount>() {
        count.0 += 1;
    }
}

/// Collect world-space snapshots of every entity of `kind`
pub fn collect_snapshots(world: &mut World, kind: GeometryKind) -> Vec<TrackedGeometrySnapshot> {
    let tracking_to_world = world
        .get_resource::<TrackingToWorld>()
        .copied()
        .unwrap_or_default()
        .0
        .to_matrix();
    let mut query = world.query::<(&TrackedGeometry, &Transform, &TrackingState)>();
    query
        .iter(world)
        .filter(|(geometry, _, _)| geometry.kind == kind)
        .map(|(geometry, transform, state)| TrackedGeometrySnapshot {
            id: geometry.id,
            kind: geometry.kind,
            local_to_world: tracking_to_world * transform.to_matrix(),
            tracking_state: *state,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn plane_update_spawns_then_overwrites() {
        let mut world = World::new();
        let mut update = PlaneUpdate::new(TrackableId(1));
        update.extent = Vec3::new(1.0, 2.0, 0.0);
        let entity = apply_plane_update(&mut world, None, update.clone());
        assert_eq!(world.get::<UpdateCount>(entity), Some(&UpdateCount(1)));

        update.extent = Vec3::new(3.0, 2.0, 0.0);
        update.tracking_state = TrackingState::NotTracking;
        let same = apply_plane_update(&mut world, Some(entity), update);
        assert_eq!(same, entity);
        assert_eq!(world.get::<PlaneExtent>(entity), Some(&PlaneExtent(Vec3::new(3.0, 2.0, 0.0))));
        assert_eq!(world.get::<TrackingState>(entity), Some(&TrackingState::NotTracking));
        assert_eq!(world.get::<UpdateCount>(entity), Some(&UpdateCount(2)));
    }

    #[test]
    fn snapshots_include_tracking_to_world() {
        let mut world = World::new();
        world.insert_resource(TrackingToWorld(Transform::from_translation_rotation(
            Vec3::new(0.0, 0.0, 10.0),
            glam::Quat::IDENTITY,
        )));
        let mut update = MeshUpdate::new(TrackableId(9));
        update.local_to_tracking = Transform::from_translation_rotation(Vec3::X, glam::Quat::IDENTITY);
        apply_mesh_update(&mut world, None, update);
        apply_plane_update(&mut world, None, PlaneUpdate::new(TrackableId(2)));

        let meshes = collect_snapshots(&mut world, GeometryKind::Mesh);
        assert_eq!(meshes.len(), 1);
        let origin = meshes[0].local_to_world.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(1.0, 0.0, 10.0)).length() < 1e-6);
    }
}
