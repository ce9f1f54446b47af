// Scene scan state machine.
//
// One call to `tick` per frame advances exactly one state:
//
//   Idle → Waiting → Processing → AddMeshesToScene → Locating → Idle
//
// with `Idle → Locating` while scanning is disabled and located surfaces
// remain. The same machine serves both scan kinds; spatial mapping publishes
// meshes only. Decoding runs on the async compute pool; everything else, including
// the inventory and both collision maps, is only touched from `tick`.

use std::collections::HashMap;

use bevy_tasks::{AsyncComputeTaskPool, Task, TaskPool};
use futures_lite::future::poll_once;
use glam::Vec3;

use super::decoder::{self, DecodeRequest, PlaneRecord, SceneUpdate};
use super::inventory::PlaneInventory;
use super::reconcile;
use super::trace::{self, TraceChannels, TraceResult};
use crate::config::{ScanKind, ScanSettings, SessionConfig, DEFAULT_LOCATIONS_PER_FRAME};
use crate::engine::*;
use crate::error::{ScanError, ScanResult};
use crate::xr::convert::{plane_transform, to_engine_transform};
use crate::xr::*;

/// Per-frame inputs from the host's tracking system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    pub display_time: XrTime,
    /// Space every published pose is expressed in.
    pub tracking_space: SpaceId,
    /// World units per meter.
    pub world_to_meters: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanState {
    #[default]
    Idle,
    /// A compute request is in flight on the runtime.
    Waiting,
    /// The computed scene is being decoded in the background.
    Processing,
    /// Newly decoded surfaces are being published, a few per frame.
    AddMeshesToScene,
    /// Published surfaces are being re-posed, a few per frame.
    Locating,
}

pub struct SceneScanner<H> {
    kind: ScanKind,
    dispatch: ExtensionDispatch,
    holder: Option<H>,
    observer: Option<SceneObserverHandle>,
    session: Option<SessionId>,
    view_space: Option<SpaceId>,

    remoting: bool,
    scanning: bool,
    session_started: bool,
    features: Vec<ComputeFeature>,
    consistency: ComputeConsistency,
    filters: Vec<PlaneAlignment>,
    radius: f32,
    bound_height: f32,
    locations_per_frame: usize,

    state: ScanState,
    pending_decode: Option<Task<ScanResult<SceneUpdate>>>,
    inventory: PlaneInventory,
    plane_collision: HashMap<TrackableId, TrackedGeometryCollision>,
    mesh_collision: HashMap<TrackableId, TrackedGeometryCollision>,

    locating_scene: Option<SceneHandle>,
    plane_uuids: Vec<SceneUuid>,
    planes: HashMap<SceneUuid, PlaneRecord>,
    locations: Vec<ComponentLocation>,
    cursor: usize,
    relocate_on_entry: bool,
}

impl<H: TrackedMeshHolder> SceneScanner<H> {
    pub fn new(dispatch: ExtensionDispatch, kind: ScanKind) -> Self {
        let defaults = ScanSettings::default();
        Self {
            kind,
            dispatch,
            holder: None,
            observer: None,
            session: None,
            view_space: None,
            remoting: false,
            scanning: false,
            session_started: false,
            features: kind.compute_features(&defaults),
            consistency: kind.consistency(&defaults),
            filters: Vec::new(),
            radius: defaults.radius(),
            bound_height: defaults.bound_height(),
            locations_per_frame: DEFAULT_LOCATIONS_PER_FRAME,
            state: ScanState::Idle,
            pending_decode: None,
            inventory: PlaneInventory::new(),
            plane_collision: HashMap::new(),
            mesh_collision: HashMap::new(),
            locating_scene: None,
            plane_uuids: Vec::new(),
            planes: HashMap::new(),
            locations: Vec::new(),
            cursor: 0,
            relocate_on_entry: false,
        }
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// While remote rendering is active the scanner does nothing.
    pub fn set_remoting(&mut self, enabled: bool) {
        self.remoting = enabled;
    }

    pub fn set_session(&mut self, session: SessionId, view_space: SpaceId) {
        self.session = Some(session);
        self.view_space = Some(view_space);
    }

    pub fn attach_holder(&mut self, holder: H) {
        self.holder = Some(holder);
    }

    /// Apply scan settings and the session's plane detection switches, and
    /// mark the AR session as started. Plane filters do not apply to
    /// spatial mapping.
    pub fn start_session(&mut self, settings: &ScanSettings, config: &SessionConfig) {
        self.radius = settings.radius();
        self.bound_height = settings.bound_height();
        self.locations_per_frame = settings.locations_per_frame.max(1);
        self.features = self.kind.compute_features(settings);
        self.consistency = self.kind.consistency(settings);
        self.filters = if self.kind.publishes_planes() {
            config.plane_filters()
        } else {
            Vec::new()
        };
        self.session_started = true;
        log::info!(
            "{:?} session started: radius {}m, half height {}m, features {:?}, {:?}, filters {:?}",
            self.kind,
            self.radius,
            self.bound_height,
            self.features,
            self.consistency,
            self.filters
        );
    }

    /// Enable or disable new scans. Work already in flight always completes.
    pub fn set_scanning(&mut self, enabled: bool) {
        if enabled != self.scanning {
            log::debug!("Scene scanning {}", if enabled { "enabled" } else { "disabled" });
        }
        self.scanning = enabled;
    }

    /// Disable scanning and retire the locating scene.
    pub fn stop(&mut self) {
        self.scanning = false;
        if let Some(scene) = self.locating_scene.take() {
            scene.dispose_in_background();
        }
    }

    pub fn release_observer(&mut self) {
        self.observer = None;
    }

    /// Hand the consumer back, first removing everything this scanner
    /// published to it. The scanner is left idle with an empty inventory.
    pub fn take_holder(&mut self) -> Option<H> {
        self.stop();
        self.pending_decode = None;
        let mut holder = self.holder.take()?;
        let removed = {
            let mut batch = MeshUpdateBatch::new(&mut holder);
            reconcile::remove_departed(&self.inventory, &HashMap::new(), self.kind, &mut *batch)
        };
        log::debug!("Released consumer after removing {removed} surfaces");
        self.inventory.clear();
        self.plane_collision.clear();
        self.mesh_collision.clear();
        self.plane_uuids.clear();
        self.planes.clear();
        self.locations.clear();
        self.cursor = 0;
        self.state = ScanState::Idle;
        Some(holder)
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn kind(&self) -> ScanKind {
        self.kind
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn has_observer(&self) -> bool {
        self.observer.is_some()
    }

    pub fn inventory(&self) -> &PlaneInventory {
        &self.inventory
    }

    pub fn features(&self) -> &[ComputeFeature] {
        &self.features
    }

    pub fn consistency(&self) -> ComputeConsistency {
        self.consistency
    }

    pub fn filters(&self) -> &[PlaneAlignment] {
        &self.filters
    }

    pub fn locations_per_frame(&self) -> usize {
        self.locations_per_frame
    }

    /// Surfaces of the current cycle, in publish order.
    pub fn surfaces(&self) -> &[SceneUuid] {
        &self.plane_uuids
    }

    pub fn plane_collision_count(&self) -> usize {
        self.plane_collision.len()
    }

    pub fn mesh_collision_count(&self) -> usize {
        self.mesh_collision.len()
    }

    pub fn holder(&self) -> Option<&H> {
        self.holder.as_ref()
    }

    pub fn holder_mut(&mut self) -> Option<&mut H> {
        self.holder.as_mut()
    }

    // ========================================================================
    // FRAME TICK
    // ========================================================================

    pub fn tick(&mut self, frame: &FrameContext) {
        if self.remoting {
            return;
        }

        if self.scanning && self.holder.is_some() && self.observer.is_none() {
            if let Some(session) = self.session {
                match self.dispatch.create_observer(session) {
                    Ok(observer) => {
                        log::debug!("Created scene observer {}", observer.id().0);
                        self.observer = Some(observer);
                    }
                    Err(err) => log::warn!("Could not create scene observer: {err}"),
                }
            }
        }
        if self.observer.is_none() || self.holder.is_none() || !self.session_started {
            return;
        }

        match self.state {
            ScanState::Idle => self.tick_idle(frame),
            ScanState::Waiting => self.tick_waiting(frame),
            ScanState::Processing => self.tick_processing(frame),
            ScanState::AddMeshesToScene => self.tick_add_meshes(frame),
            ScanState::Locating => self.tick_locating(frame),
        }
    }

    fn tick_idle(&mut self, frame: &FrameContext) {
        if self.scanning {
            match self.compute_new_scene(frame) {
                Ok(()) => self.state = ScanState::Waiting,
                Err(err) => log::warn!("Scene compute request failed: {err}"),
            }
            return;
        }

        // Scanning stopped: keep re-posing what was already published.
        if self.plane_uuids.is_empty() {
            return;
        }
        let Some(scene) = self.locating_scene.as_ref() else {
            return;
        };
        self.locations = locate_or_hide(&self.dispatch, scene, frame, &self.plane_uuids);
        self.cursor = 0;
        self.state = ScanState::Locating;
    }

    fn compute_new_scene(&self, frame: &FrameContext) -> ScanResult<()> {
        let observer = self
            .observer
            .as_ref()
            .ok_or_else(|| ScanError::runtime("xrComputeNewSceneMSFT", "no scene observer"))?;
        let mut bounds = SceneBounds {
            space: self.view_space.unwrap_or(frame.tracking_space),
            time: frame.display_time,
            spheres: Vec::new(),
            boxes: Vec::new(),
        };
        if self.bound_height > 0.0 {
            bounds.boxes.push(OrientedBoxBound {
                pose: XrPose::IDENTITY,
                extents: Vec3::new(self.radius, self.bound_height, self.radius),
            });
        } else {
            bounds.spheres.push(SphereBound {
                center: Vec3::ZERO,
                radius: self.radius,
            });
        }
        let info = NewSceneComputeInfo {
            features: self.features.clone(),
            consistency: self.consistency,
            bounds,
        };
        self.dispatch.api().compute_new_scene(observer.id(), &info)
    }

    fn tick_waiting(&mut self, frame: &FrameContext) {
        let Some(observer) = self.observer.as_ref() else {
            return;
        };
        let compute_state = match self.dispatch.api().compute_state(observer.id()) {
            Ok(compute_state) => compute_state,
            Err(err) => {
                log::warn!("Polling scene compute failed: {err}");
                self.state = ScanState::Idle;
                return;
            }
        };
        match compute_state {
            ComputeState::Updating => {}
            ComputeState::None | ComputeState::CompletedWithError => {
                log::debug!("Scene compute ended without a result ({compute_state:?})");
                self.state = ScanState::Idle;
            }
            ComputeState::Completed => match self.dispatch.create_scene(observer) {
                Ok(scene) => {
                    let request = DecodeRequest {
                        kind: self.kind,
                        dispatch: self.dispatch.clone(),
                        scene,
                        previous: self.inventory.clone(),
                        filters: self.filters.clone(),
                        world_to_meters: frame.world_to_meters,
                    };
                    let task = AsyncComputeTaskPool::get_or_init(TaskPool::new)
                        .spawn(async move { decoder::decode(request) });
                    self.pending_decode = Some(task);
                    self.state = ScanState::Processing;
                }
                Err(err) => {
                    log::warn!("Could not create scene from completed compute: {err}");
                    self.state = ScanState::Idle;
                }
            },
        }
    }

    fn tick_processing(&mut self, frame: &FrameContext) {
        let Some(task) = self.pending_decode.as_mut() else {
            self.state = ScanState::Idle;
            return;
        };
        let Some(result) = pollster::block_on(poll_once(task)) else {
            return;
        };
        self.pending_decode = None;
        match result {
            Ok(update) => {
                self.process_scene_update(update, frame);
                self.cursor = 0;
                self.state = ScanState::AddMeshesToScene;
            }
            Err(err) => {
                log::warn!("Discarding scan cycle, scene decode failed: {err}");
                self.state = ScanState::Idle;
            }
        }
    }

    /// Reconcile a decoded cycle against the previous one and make it the
    /// cycle being published.
    fn process_scene_update(&mut self, update: SceneUpdate, frame: &FrameContext) {
        let SceneUpdate {
            scene,
            generation,
            plane_uuids,
            planes,
            plane_collision,
            mesh_collision,
        } = update;
        debug_assert_eq!(
            generation,
            self.inventory.generation(),
            "scene update decoded against a stale inventory"
        );

        self.plane_collision = plane_collision;
        self.mesh_collision = mesh_collision;
        let locations = locate_or_hide(&self.dispatch, &scene, frame, &plane_uuids);

        let mut removed = 0;
        if let Some(holder) = self.holder.as_mut() {
            let mut batch = MeshUpdateBatch::new(holder);
            removed = reconcile::remove_departed(&self.inventory, &planes, self.kind, &mut *batch);
        }
        self.inventory.replace_with(reconcile::inventory_entries(&planes));

        if let Some(previous) = self.locating_scene.replace(scene) {
            previous.dispose_in_background();
        }
        log::info!(
            "Scan cycle {}: {} surfaces, {} meshes, {} removed",
            self.inventory.generation(),
            plane_uuids.len(),
            self.mesh_collision.len(),
            removed
        );
        self.plane_uuids = plane_uuids;
        self.planes = planes;
        self.locations = locations;
    }

    fn tick_add_meshes(&mut self, frame: &FrameContext) {
        if self.plane_uuids.is_empty() || self.locating_scene.is_none() {
            self.state = ScanState::Idle;
            return;
        }
        let Some(holder) = self.holder.as_mut() else {
            return;
        };

        let with_plane = self.kind.publishes_planes();
        let mut batch = MeshUpdateBatch::new(holder);
        for _ in 0..self.locations_per_frame {
            let uuid = self.plane_uuids[self.cursor];
            let location = self.locations.get(self.cursor).copied().unwrap_or_default();
            if let Some(record) = self.planes.get_mut(&uuid) {
                publish_surface(&mut *batch, uuid, record, &location, frame.world_to_meters, with_plane);
            }

            self.cursor += 1;
            if self.cursor >= self.plane_uuids.len() {
                self.cursor = 0;
                self.relocate_on_entry = true;
                self.state = ScanState::Locating;
                break;
            }
        }
    }

    fn tick_locating(&mut self, frame: &FrameContext) {
        if self.plane_uuids.is_empty() {
            self.state = ScanState::Idle;
            return;
        }
        let Some(scene) = self.locating_scene.as_ref() else {
            self.state = ScanState::Idle;
            return;
        };
        if self.relocate_on_entry {
            self.locations = locate_or_hide(&self.dispatch, scene, frame, &self.plane_uuids);
            self.relocate_on_entry = false;
        }
        let Some(holder) = self.holder.as_mut() else {
            return;
        };

        let with_plane = self.kind.publishes_planes();
        let mut batch = MeshUpdateBatch::new(holder);
        for _ in 0..self.locations_per_frame {
            let uuid = self.plane_uuids[self.cursor];
            let location = self.locations.get(self.cursor).copied().unwrap_or_default();
            let mesh_id = self.planes.get(&uuid).and_then(|record| record.mesh_id);
            update_surface_pose(&mut *batch, uuid, mesh_id, &location, frame.world_to_meters, with_plane);

            self.cursor += 1;
            if self.cursor >= self.plane_uuids.len() {
                self.cursor = 0;
                self.state = ScanState::Idle;
                break;
            }
        }
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn line_trace(&mut self, start: Vec3, end: Vec3, channels: TraceChannels) -> Vec<TraceResult> {
        let Some(holder) = self.holder.as_mut() else {
            return Vec::new();
        };
        trace::line_trace(holder, &self.plane_collision, &self.mesh_collision, start, end, channels)
    }
}

// ============================================================================
// PUBLISHING HELPERS
// ============================================================================

/// Locate `ids` in `scene`. A failed call counts as every pose being invalid,
/// which hides the surfaces until the next successful locate.
fn locate_or_hide(
    dispatch: &ExtensionDispatch,
    scene: &SceneHandle,
    frame: &FrameContext,
    ids: &[SceneUuid],
) -> Vec<ComponentLocation> {
    let located = dispatch
        .api()
        .locate_components(scene.id(), frame.tracking_space, frame.display_time, ids)
        .and_then(|locations| {
            if locations.len() == ids.len() {
                Ok(locations)
            } else {
                Err(ScanError::LocationCountMismatch {
                    expected: ids.len(),
                    found: locations.len(),
                })
            }
        });
    match located {
        Ok(locations) => locations,
        Err(err) => {
            log::warn!("Locating {} scene components failed: {err}", ids.len());
            vec![ComponentLocation::default(); ids.len()]
        }
    }
}

fn pose_or_hidden(location: &ComponentLocation, world_to_meters: f32, plane: bool) -> (Transform, TrackingState) {
    if !location.is_pose_valid() {
        return (Transform::HIDDEN, TrackingState::NotTracking);
    }
    let transform = if plane {
        plane_transform(&location.pose, world_to_meters)
    } else {
        to_engine_transform(&location.pose, world_to_meters)
    };
    (transform, TrackingState::Tracking)
}

/// Allocate the plane (and mesh, if any) updates for one decoded surface.
/// Mesh buffers are moved out of the record.
fn publish_surface<H: TrackedMeshHolder + ?Sized>(
    holder: &mut H,
    uuid: SceneUuid,
    record: &mut PlaneRecord,
    location: &ComponentLocation,
    world_to_meters: f32,
    with_plane: bool,
) {
    if with_plane {
        let (transform, tracking_state) = pose_or_hidden(location, world_to_meters, true);
        let plane = holder.allocate_plane_update(TrackableId::from(uuid));
        plane.classification = record.classification;
        plane.extent = record.extent;
        plane.local_to_tracking = transform;
        plane.tracking_state = tracking_state;
    }

    if let Some(mesh_id) = record.mesh_id {
        let (transform, tracking_state) = pose_or_hidden(location, world_to_meters, false);
        let mesh = holder.allocate_mesh_update(mesh_id);
        mesh.classification = record.classification;
        mesh.vertices = std::mem::take(&mut record.vertices);
        mesh.indices = std::mem::take(&mut record.indices);
        mesh.local_to_tracking = transform;
        mesh.tracking_state = tracking_state;
    }
}

fn update_surface_pose<H: TrackedMeshHolder + ?Sized>(
    holder: &mut H,
    uuid: SceneUuid,
    mesh_id: Option<TrackableId>,
    location: &ComponentLocation,
    world_to_meters: f32,
    with_plane: bool,
) {
    if with_plane {
        let (transform, tracking_state) = pose_or_hidden(location, world_to_meters, true);
        holder.object_updated(ObjectUpdate {
            id: TrackableId::from(uuid),
            usage: SpatialMeshUsageFlags::VISIBLE,
            tracking_state,
            local_to_tracking: transform,
        });
    }
    if let Some(mesh_id) = mesh_id {
        let (transform, tracking_state) = pose_or_hidden(location, world_to_meters, false);
        holder.object_updated(ObjectUpdate {
            id: mesh_id,
            usage: SpatialMeshUsageFlags::VISIBLE | SpatialMeshUsageFlags::COLLISION,
            tracking_state,
            local_to_tracking: transform,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn valid_at(position: Vec3) -> ComponentLocation {
        ComponentLocation {
            flags: LocationFlags::all(),
            pose: XrPose {
                orientation: Quat::IDENTITY,
                position,
            },
        }
    }

    #[test]
    fn invalid_pose_hides_and_stops_tracking() {
        let (transform, state) = pose_or_hidden(&ComponentLocation::default(), 100.0, true);
        assert!(transform.is_hidden());
        assert_eq!(state, TrackingState::NotTracking);
    }

    #[test]
    fn valid_pose_converts_to_engine_space() {
        let (transform, state) = pose_or_hidden(&valid_at(Vec3::new(0.0, 1.0, -2.0)), 100.0, false);
        assert_eq!(state, TrackingState::Tracking);
        assert!((transform.translation - Vec3::new(200.0, 0.0, 100.0)).length() < 1e-3);
        assert_eq!(transform.scale, Vec3::ONE);
    }
}
