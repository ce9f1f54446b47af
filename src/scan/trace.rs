// Line traces against tracked planes and meshes.

use std::collections::HashMap;

use bitflags::bitflags;
use glam::{Quat, Vec3};

use crate::engine::{
    GeometryKind, Hit, TrackableId, TrackedGeometryCollision, TrackedGeometrySnapshot, TrackedMeshHolder, Transform,
};

bitflags! {
    /// What a line trace should test against.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct TraceChannels: u8 {
        const FEATURE_POINT                = 0x1;
        const GROUND_PLANE                 = 0x2;
        const PLANE_USING_EXTENT           = 0x4;
        const PLANE_USING_BOUNDARY_POLYGON = 0x8;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceResult {
    /// Distance from the trace start, in world units.
    pub distance: f32,
    pub channels: TraceChannels,
    /// Hit point, with +X turned onto the surface normal.
    pub local_to_world: Transform,
    pub geometry: TrackableId,
    pub kind: GeometryKind,
}

impl TraceResult {
    fn from_hit(hit: Hit, channels: TraceChannels, snapshot: &TrackedGeometrySnapshot) -> Self {
        Self {
            distance: hit.distance,
            channels,
            local_to_world: Transform::from_translation_rotation(hit.point, Quat::from_rotation_arc(Vec3::X, hit.normal)),
            geometry: snapshot.id,
            kind: snapshot.kind,
        }
    }
}

/// Trace `start..end` against every tracked mesh with a collision proxy and,
/// when `channels` asks for plane extents, every tracked plane. Results are
/// in no particular order.
pub fn line_trace<H: TrackedMeshHolder + ?Sized>(
    holder: &mut H,
    plane_collision: &HashMap<TrackableId, TrackedGeometryCollision>,
    mesh_collision: &HashMap<TrackableId, TrackedGeometryCollision>,
    start: Vec3,
    end: Vec3,
    channels: TraceChannels,
) -> Vec<TraceResult> {
    let mut results = Vec::new();
    let mut trace_kind = |kind: GeometryKind, proxies: &HashMap<TrackableId, TrackedGeometryCollision>| {
        for snapshot in holder.tracked_geometries(kind) {
            let Some(proxy) = proxies.get(&snapshot.id) else {
                continue;
            };
            if let Some(hit) = proxy.collides(start, end, &snapshot.local_to_world) {
                results.push(TraceResult::from_hit(hit, channels, &snapshot));
            }
        }
    };

    // Planes can float in open space (a wall plane across a doorway), so
    // they are only hit when the caller asks for extents.
    trace_kind(GeometryKind::Mesh, mesh_collision);
    if channels.contains(TraceChannels::PLANE_USING_EXTENT) {
        trace_kind(GeometryKind::Plane, plane_collision);
    }
    results
}
