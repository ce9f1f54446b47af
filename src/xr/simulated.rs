// In-process scene-compute runtime.
//
// Scans are scripted: each `compute_new_scene` consumes the next queued
// outcome, reports `Updating` for a configurable number of polls and then
// completes. With nothing queued, the last successful scan is recomputed,
// which models a static room.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::extension::*;
use super::types::*;
use crate::error::{ScanError, ScanResult};

// ============================================================================
// SCRIPT TYPES
// ============================================================================

/// One planar surface in a simulated room.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedSurface {
    pub id: SceneUuid,
    pub parent_id: SceneUuid,
    pub kind: SceneObjectKind,
    pub alignment: PlaneAlignment,
    pub size: Extent2D,
    pub pose: XrPose,
    /// Mesh data reported through a mesh buffer when `PlaneMesh` was requested.
    pub mesh: Option<MeshBuffers>,
}

impl SimulatedSurface {
    /// A horizontal floor-like plane without mesh data.
    pub fn plane(id: u128, kind: SceneObjectKind, width: f32, height: f32) -> Self {
        Self {
            id: SceneUuid::from_u128(id),
            parent_id: SceneUuid::from_u128(id | (1 << 127)),
            kind,
            alignment: match kind {
                SceneObjectKind::Wall => PlaneAlignment::Vertical,
                _ => PlaneAlignment::Horizontal,
            },
            size: Extent2D { width, height },
            pose: XrPose::IDENTITY,
            mesh: None,
        }
    }

    /// Id of the visual mesh component reported for this surface.
    pub fn visual_mesh_id(&self) -> SceneUuid {
        SceneUuid::from_u128(self.id.as_u128() | (1 << 126))
    }

    pub fn with_pose(mut self, pose: XrPose) -> Self {
        self.pose = pose;
        self
    }

    pub fn with_alignment(mut self, alignment: PlaneAlignment) -> Self {
        self.alignment = alignment;
        self
    }

    /// Attach a flat quad mesh covering the plane (runtime XY plane).
    pub fn with_quad_mesh(mut self) -> Self {
        let (w, h) = (self.size.width * 0.5, self.size.height * 0.5);
        self.mesh = Some(MeshBuffers {
            vertices: vec![
                XrVector3::new(-w, -h, 0.0),
                XrVector3::new(w, -h, 0.0),
                XrVector3::new(w, h, 0.0),
                XrVector3::new(-w, h, 0.0),
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
        });
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulatedScan {
    pub surfaces: Vec<SimulatedSurface>,
}

impl SimulatedScan {
    pub fn new(surfaces: Vec<SimulatedSurface>) -> Self {
        Self { surfaces }
    }
}

#[derive(Debug, Clone)]
enum ScriptedOutcome {
    Completed(SimulatedScan),
    Failed,
    Discarded,
}

#[derive(Debug)]
struct PendingCompute {
    polls_remaining: u32,
    outcome: ScriptedOutcome,
    features: Vec<ComputeFeature>,
}

#[derive(Debug)]
struct StoredScene {
    scan: SimulatedScan,
    features: Vec<ComputeFeature>,
}

#[derive(Debug, Default)]
struct SimState {
    next_handle: u64,
    observers: HashSet<u64>,
    scenes: HashMap<u64, StoredScene>,
    script: VecDeque<(u32, ScriptedOutcome)>,
    pending: HashMap<u64, PendingCompute>,
    completed: HashMap<u64, (SimulatedScan, Vec<ComputeFeature>)>,
    last_scan: Option<SimulatedScan>,
    requests: Vec<NewSceneComputeInfo>,
    lost_tracking: HashSet<SceneUuid>,
    destroyed_scenes: usize,
    locate_calls: usize,
    component_read_failures: u32,
    locate_failures: u32,
    short_locates: u32,
}

impl SimState {
    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

// ============================================================================
// RUNTIME
// ============================================================================

#[derive(Debug, Default)]
pub struct SimulatedRuntime {
    state: Mutex<SimState>,
}

impl SimulatedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a successful scan that completes after `polls` `Updating` reports.
    pub fn queue_scan(&self, scan: SimulatedScan, polls: u32) {
        self.state().script.push_back((polls, ScriptedOutcome::Completed(scan)));
    }

    pub fn queue_failure(&self, polls: u32) {
        self.state().script.push_back((polls, ScriptedOutcome::Failed));
    }

    /// Queue a compute the runtime silently drops (state goes back to `None`).
    pub fn queue_discard(&self, polls: u32) {
        self.state().script.push_back((polls, ScriptedOutcome::Discarded));
    }

    /// Toggle whether a surface can currently be located.
    pub fn set_tracking(&self, id: SceneUuid, tracked: bool) {
        let mut state = self.state();
        if tracked {
            state.lost_tracking.remove(&id);
        } else {
            state.lost_tracking.insert(id);
        }
    }

    /// Fail the next `count` plane or visual mesh component reads.
    pub fn fail_component_reads(&self, count: u32) {
        self.state().component_read_failures += count;
    }

    /// Fail the next `count` locate calls.
    pub fn fail_locates(&self, count: u32) {
        self.state().locate_failures += count;
    }

    /// Make the next `count` locate calls return one location too few.
    pub fn short_locates(&self, count: u32) {
        self.state().short_locates += count;
    }

    pub fn compute_requests(&self) -> Vec<NewSceneComputeInfo> {
        self.state().requests.clone()
    }

    pub fn live_observers(&self) -> usize {
        self.state().observers.len()
    }

    pub fn live_scenes(&self) -> usize {
        self.state().scenes.len()
    }

    pub fn destroyed_scenes(&self) -> usize {
        self.state().destroyed_scenes
    }

    pub fn locate_calls(&self) -> usize {
        self.state().locate_calls
    }
}

fn take_fault(counter: &mut u32) -> bool {
    if *counter == 0 {
        return false;
    }
    *counter -= 1;
    true
}

fn scene_of<'a>(state: &'a SimState, scene: SceneId) -> ScanResult<&'a StoredScene> {
    state.scenes.get(&scene.0).ok_or(ScanError::InvalidHandle {
        kind: "scene",
        id: scene.0,
    })
}

impl SceneComputeApi for SimulatedRuntime {
    fn enumerate_features(&self) -> ScanResult<Vec<ComputeFeature>> {
        Ok(vec![ComputeFeature::Plane, ComputeFeature::PlaneMesh, ComputeFeature::VisualMesh])
    }

    fn create_observer(&self, _session: SessionId) -> ScanResult<ObserverId> {
        let mut state = self.state();
        let id = state.next_handle();
        state.observers.insert(id);
        Ok(ObserverId(id))
    }

    fn destroy_observer(&self, observer: ObserverId) {
        let mut state = self.state();
        state.observers.remove(&observer.0);
        state.pending.remove(&observer.0);
        state.completed.remove(&observer.0);
    }

    fn compute_new_scene(&self, observer: ObserverId, info: &NewSceneComputeInfo) -> ScanResult<()> {
        let mut state = self.state();
        if !state.observers.contains(&observer.0) {
            return Err(ScanError::InvalidHandle { kind: "observer", id: observer.0 });
        }
        if state.pending.contains_key(&observer.0) {
            return Err(ScanError::runtime("xrComputeNewSceneMSFT", "compute already pending"));
        }
        let (polls_remaining, outcome) = match state.script.pop_front() {
            Some(next) => next,
            None => match &state.last_scan {
                Some(scan) => (0, ScriptedOutcome::Completed(scan.clone())),
                None => (0, ScriptedOutcome::Completed(SimulatedScan::default())),
            },
        };
        let requested_meshes = info.features.contains(&ComputeFeature::PlaneMesh)
            || info.features.contains(&ComputeFeature::VisualMesh);
        state.requests.push(info.clone());
        state.completed.remove(&observer.0);
        state.pending.insert(
            observer.0,
            PendingCompute {
                polls_remaining,
                features: info.features.clone(),
                outcome: match outcome {
                    ScriptedOutcome::Completed(scan) if !requested_meshes => {
                        let mut scan = scan;
                        for surface in &mut scan.surfaces {
                            surface.mesh = None;
                        }
                        ScriptedOutcome::Completed(scan)
                    }
                    other => other,
                },
            },
        );
        log::trace!("Simulated compute queued on observer {}", observer.0);
        Ok(())
    }

    fn compute_state(&self, observer: ObserverId) -> ScanResult<ComputeState> {
        let mut state = self.state();
        if !state.observers.contains(&observer.0) {
            return Err(ScanError::InvalidHandle { kind: "observer", id: observer.0 });
        }
        if state.completed.contains_key(&observer.0) {
            return Ok(ComputeState::Completed);
        }
        let Some(pending) = state.pending.get_mut(&observer.0) else {
            return Ok(ComputeState::None);
        };
        if pending.polls_remaining > 0 {
            pending.polls_remaining -= 1;
            return Ok(ComputeState::Updating);
        }
        let Some(pending) = state.pending.remove(&observer.0) else {
            return Ok(ComputeState::None);
        };
        match pending.outcome {
            ScriptedOutcome::Completed(scan) => {
                state.last_scan = Some(scan.clone());
                state.completed.insert(observer.0, (scan, pending.features));
                Ok(ComputeState::Completed)
            }
            ScriptedOutcome::Failed => Ok(ComputeState::CompletedWithError),
            ScriptedOutcome::Discarded => Ok(ComputeState::None),
        }
    }

    fn create_scene(&self, observer: ObserverId) -> ScanResult<SceneId> {
        let mut state = self.state();
        let Some((scan, features)) = state.completed.get(&observer.0).cloned() else {
            return Err(ScanError::runtime("xrCreateSceneMSFT", "no completed compute"));
        };
        let id = state.next_handle();
        state.scenes.insert(id, StoredScene { scan, features });
        Ok(SceneId(id))
    }

    fn destroy_scene(&self, scene: SceneId) {
        let mut state = self.state();
        if state.scenes.remove(&scene.0).is_some() {
            state.destroyed_scenes += 1;
        }
    }

    fn scene_objects(&self, scene: SceneId) -> ScanResult<Vec<SceneObject>> {
        let state = self.state();
        let stored = scene_of(&state, scene)?;
        Ok(stored
            .scan
            .surfaces
            .iter()
            .map(|s| SceneObject { id: s.parent_id, kind: s.kind })
            .collect())
    }

    fn scene_planes(&self, scene: SceneId, filters: &[PlaneAlignment]) -> ScanResult<Vec<ScenePlaneComponent>> {
        let mut state = self.state();
        if take_fault(&mut state.component_read_failures) {
            return Err(ScanError::runtime("xrGetSceneComponentsMSFT", "simulated read failure"));
        }
        let stored = scene_of(&state, scene)?;
        if !stored.features.contains(&ComputeFeature::Plane) {
            return Ok(Vec::new());
        }
        let plane_meshes = stored.features.contains(&ComputeFeature::PlaneMesh);
        Ok(stored
            .scan
            .surfaces
            .iter()
            .enumerate()
            .filter(|(_, s)| filters.is_empty() || filters.contains(&s.alignment))
            .map(|(index, s)| ScenePlaneComponent {
                id: s.id,
                parent_id: s.parent_id,
                plane: ScenePlane {
                    alignment: s.alignment,
                    size: s.size,
                    mesh_buffer_id: match (&s.mesh, plane_meshes) {
                        (Some(_), true) => index as u64 + 1,
                        _ => 0,
                    },
                },
            })
            .collect())
    }

    fn scene_visual_meshes(&self, scene: SceneId) -> ScanResult<Vec<SceneMeshComponent>> {
        let mut state = self.state();
        if take_fault(&mut state.component_read_failures) {
            return Err(ScanError::runtime("xrGetSceneComponentsMSFT", "simulated read failure"));
        }
        let stored = scene_of(&state, scene)?;
        if !stored.features.contains(&ComputeFeature::VisualMesh) {
            return Ok(Vec::new());
        }
        Ok(stored
            .scan
            .surfaces
            .iter()
            .enumerate()
            .filter(|(_, s)| s.mesh.is_some())
            .map(|(index, s)| SceneMeshComponent {
                id: s.visual_mesh_id(),
                parent_id: s.parent_id,
                mesh_buffer_id: index as u64 + 1,
            })
            .collect())
    }

    fn mesh_buffers(&self, scene: SceneId, mesh_buffer_id: u64) -> ScanResult<MeshBuffers> {
        let state = self.state();
        let stored = scene_of(&state, scene)?;
        mesh_buffer_id
            .checked_sub(1)
            .and_then(|index| stored.scan.surfaces.get(index as usize))
            .and_then(|s| s.mesh.clone())
            .ok_or(ScanError::InvalidHandle {
                kind: "mesh buffer",
                id: mesh_buffer_id,
            })
    }

    fn locate_components(
        &self,
        scene: SceneId,
        _base_space: SpaceId,
        _time: XrTime,
        ids: &[SceneUuid],
    ) -> ScanResult<Vec<ComponentLocation>> {
        let mut state = self.state();
        state.locate_calls += 1;
        if take_fault(&mut state.locate_failures) {
            return Err(ScanError::runtime("xrLocateSceneComponentsMSFT", "simulated locate failure"));
        }
        let short = take_fault(&mut state.short_locates);
        let stored = scene_of(&state, scene)?;
        let mut locations: Vec<ComponentLocation> = ids
            .iter()
            .map(|id| {
                let surface = stored
                    .scan
                    .surfaces
                    .iter()
                    .find(|s| s.id == *id || s.visual_mesh_id() == *id);
                match surface {
                    Some(s) if !state.lost_tracking.contains(&s.id) => ComponentLocation {
                        flags: LocationFlags::all(),
                        pose: s.pose,
                    },
                    _ => ComponentLocation::default(),
                }
            })
            .collect();
        if short {
            locations.pop();
        }
        Ok(locations)
    }
}

// ============================================================================
// INSTANCE
// ============================================================================

/// XR instance exposing a [`SimulatedRuntime`] as its scene-compute table.
pub struct SimulatedInstance {
    runtime: Arc<SimulatedRuntime>,
    extensions: Vec<String>,
    missing_functions: Vec<String>,
}

impl SimulatedInstance {
    pub fn new(runtime: Arc<SimulatedRuntime>) -> Self {
        Self {
            runtime,
            extensions: vec![SCENE_UNDERSTANDING_EXTENSION_NAME.to_string()],
            missing_functions: Vec::new(),
        }
    }

    pub fn with_extension(mut self, name: &str) -> Self {
        self.extensions.push(name.to_string());
        self
    }

    pub fn without_extension(mut self, name: &str) -> Self {
        self.extensions.retain(|e| e != name);
        self
    }

    pub fn without_function(mut self, name: &str) -> Self {
        self.missing_functions.push(name.to_string());
        self
    }
}

impl XrInstance for SimulatedInstance {
    fn is_extension_enabled(&self, name: &str) -> bool {
        self.extensions.iter().any(|e| e == name)
    }

    fn has_function(&self, name: &str) -> bool {
        !self.missing_functions.iter().any(|f| f == name)
    }

    fn scene_compute_api(&self) -> Option<Arc<dyn SceneComputeApi>> {
        Some(self.runtime.clone())
    }
}
