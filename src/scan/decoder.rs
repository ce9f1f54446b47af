// Scene decoding: runtime planes and meshes → engine-space surface records.
//
// Runs on the async compute pool. The request owns everything it reads, so the
// task never touches orchestrator state.

use std::collections::HashMap;

use glam::Vec3;

use super::inventory::PlaneInventory;
use crate::config::ScanKind;
use crate::engine::{ObjectClassification, TrackableId, TrackedGeometryCollision};
use crate::error::ScanResult;
use crate::xr::convert::to_engine_vector;
use crate::xr::{
    ExtensionDispatch, PlaneAlignment, SceneComputeApi, SceneHandle, SceneObjectKind, SceneUuid, XrVector3,
};

/// One decoded surface, waiting to be published. Visual meshes have a zero
/// extent and always carry a mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneRecord {
    /// Set when the surface carries a mesh this cycle.
    pub mesh_id: Option<TrackableId>,
    pub classification: ObjectClassification,
    /// Half extent in engine space and world units.
    pub extent: Vec3,
    /// Mesh vertices in engine space and world units. Moved out on publish.
    pub vertices: Vec<Vec3>,
    pub indices: Vec<u32>,
}

/// Everything the decode task needs, by value.
#[derive(Debug)]
pub struct DecodeRequest {
    pub kind: ScanKind,
    pub dispatch: ExtensionDispatch,
    pub scene: SceneHandle,
    /// Snapshot of the previous cycle, used for mesh identity reuse.
    pub previous: PlaneInventory,
    pub filters: Vec<PlaneAlignment>,
    pub world_to_meters: f32,
}

/// Decoded result of one scan cycle.
#[derive(Debug)]
pub struct SceneUpdate {
    pub scene: SceneHandle,
    /// Generation of the inventory snapshot this update was decoded against.
    pub generation: u64,
    /// Surface ids in the order the runtime reported them.
    pub plane_uuids: Vec<SceneUuid>,
    pub planes: HashMap<SceneUuid, PlaneRecord>,
    pub plane_collision: HashMap<TrackableId, TrackedGeometryCollision>,
    pub mesh_collision: HashMap<TrackableId, TrackedGeometryCollision>,
}

pub fn classification_for(kind: SceneObjectKind) -> ObjectClassification {
    match kind {
        SceneObjectKind::Wall => ObjectClassification::Wall,
        SceneObjectKind::Floor => ObjectClassification::Floor,
        SceneObjectKind::Ceiling => ObjectClassification::Ceiling,
        SceneObjectKind::Platform => ObjectClassification::Table,
        SceneObjectKind::Background => ObjectClassification::SceneObject,
        SceneObjectKind::Uncategorized | SceneObjectKind::Inferred => ObjectClassification::Unknown,
    }
}

/// Decode the request's scene according to its scan kind.
pub fn decode(request: DecodeRequest) -> ScanResult<SceneUpdate> {
    match request.kind {
        ScanKind::SceneUnderstanding => load_planes(request),
        ScanKind::SpatialMapping => load_visual_meshes(request),
    }
}

fn read_object_kinds(api: &dyn SceneComputeApi, scene: &SceneHandle) -> ScanResult<HashMap<SceneUuid, SceneObjectKind>> {
    Ok(api
        .scene_objects(scene.id())?
        .into_iter()
        .map(|object| (object.id, object.kind))
        .collect())
}

/// Runtime vertices, viewed in place as `Vec3`, converted to engine space.
fn engine_vertices(raw: &[XrVector3], world_to_meters: f32) -> Vec<Vec3> {
    bytemuck::cast_slice::<XrVector3, Vec3>(raw)
        .iter()
        .map(|&v| to_engine_vector(v, world_to_meters))
        .collect()
}

/// Read every plane (and its mesh, if computed) out of the request's scene.
pub fn load_planes(request: DecodeRequest) -> ScanResult<SceneUpdate> {
    let DecodeRequest {
        dispatch,
        scene,
        previous,
        filters,
        world_to_meters,
        ..
    } = request;
    let api = dispatch.api();

    let object_kinds = read_object_kinds(api, &scene)?;
    let components = api.scene_planes(scene.id(), &filters)?;

    let mut plane_uuids = Vec::with_capacity(components.len());
    let mut planes = HashMap::with_capacity(components.len());
    let mut plane_collision = HashMap::with_capacity(components.len());
    let mut mesh_collision = HashMap::new();

    for component in components {
        if planes.contains_key(&component.id) {
            log::debug!("Skipping repeated plane {:032x}", component.id.as_u128());
            continue;
        }
        let kind = object_kinds.get(&component.parent_id).copied().unwrap_or_default();
        let size = component.plane.size;
        let has_mesh = component.plane.mesh_buffer_id != 0;

        let mut record = PlaneRecord {
            mesh_id: has_mesh.then(|| previous.mesh_id_for(&component.id)),
            classification: classification_for(kind),
            extent: Vec3::new(-size.height, size.width, 0.0) * world_to_meters * 0.5,
            vertices: Vec::new(),
            indices: Vec::new(),
        };
        plane_collision.insert(
            TrackableId::from(component.id),
            TrackedGeometryCollision::for_plane(record.extent),
        );

        if let Some(mesh_id) = record.mesh_id {
            let buffers = api.mesh_buffers(scene.id(), component.plane.mesh_buffer_id)?;
            record.vertices = engine_vertices(&buffers.vertices, world_to_meters);
            record.indices = buffers.indices;
            mesh_collision.insert(
                mesh_id,
                TrackedGeometryCollision::new(record.vertices.clone(), record.indices.clone()),
            );
        }

        plane_uuids.push(component.id);
        planes.insert(component.id, record);
    }

    log::debug!(
        "Decoded {} planes ({} with meshes) from scene {}",
        plane_uuids.len(),
        mesh_collision.len(),
        scene.id().0
    );

    Ok(SceneUpdate {
        scene,
        generation: previous.generation(),
        plane_uuids,
        planes,
        plane_collision,
        mesh_collision,
    })
}

/// Read every visual mesh out of the request's scene. Meshes take the
/// classification of their parent object, like planes do.
pub fn load_visual_meshes(request: DecodeRequest) -> ScanResult<SceneUpdate> {
    let DecodeRequest {
        dispatch,
        scene,
        previous,
        world_to_meters,
        ..
    } = request;
    let api = dispatch.api();

    let object_kinds = read_object_kinds(api, &scene)?;
    let components = api.scene_visual_meshes(scene.id())?;

    let mut mesh_uuids = Vec::with_capacity(components.len());
    let mut meshes = HashMap::with_capacity(components.len());
    let mut mesh_collision = HashMap::with_capacity(components.len());

    for component in components {
        if component.mesh_buffer_id == 0 || meshes.contains_key(&component.id) {
            log::debug!("Skipping visual mesh {:032x}", component.id.as_u128());
            continue;
        }
        let kind = object_kinds.get(&component.parent_id).copied().unwrap_or_default();
        let mesh_id = previous.mesh_id_for(&component.id);
        let buffers = api.mesh_buffers(scene.id(), component.mesh_buffer_id)?;
        let vertices = engine_vertices(&buffers.vertices, world_to_meters);
        mesh_collision.insert(
            mesh_id,
            TrackedGeometryCollision::new(vertices.clone(), buffers.indices.clone()),
        );
        mesh_uuids.push(component.id);
        meshes.insert(
            component.id,
            PlaneRecord {
                mesh_id: Some(mesh_id),
                classification: classification_for(kind),
                extent: Vec3::ZERO,
                vertices,
                indices: buffers.indices,
            },
        );
    }

    log::debug!("Decoded {} visual meshes from scene {}", mesh_uuids.len(), scene.id().0);

    Ok(SceneUpdate {
        scene,
        generation: previous.generation(),
        plane_uuids: mesh_uuids,
        planes: meshes,
        plane_collision: HashMap::new(),
        mesh_collision,
    })
}
