// Shared fixtures for scenario tests: a recording consumer and plugin drivers.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use scene_understanding::engine::*;
use scene_understanding::scan::*;
use scene_understanding::xr::simulated::{SimulatedInstance, SimulatedRuntime};
use scene_understanding::xr::{SessionId, SpaceId, XrTime};
use scene_understanding::{ScanSettings, SessionConfig};

pub const WORLD_TO_METERS: f32 = 100.0;
pub const MAX_TICKS: usize = 5_000;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// RECORDING CONSUMER
// ============================================================================

/// Everything one start/end bracket carried.
#[derive(Debug, Default, Clone)]
pub struct Batch {
    pub planes: Vec<PlaneUpdate>,
    pub meshes: Vec<MeshUpdate>,
    pub objects: Vec<ObjectUpdate>,
    pub removals: Vec<(GeometryKind, TrackableId)>,
}

impl Batch {
    pub fn allocations(&self) -> usize {
        self.planes.len() + self.meshes.len()
    }
}

#[derive(Debug, Default)]
pub struct RecordingHolder {
    pub batches: Vec<Batch>,
    current: Batch,
    depth: u32,
}

impl RecordingHolder {
    pub fn removals(&self) -> Vec<(GeometryKind, TrackableId)> {
        self.batches.iter().flat_map(|b| b.removals.iter().copied()).collect()
    }

    pub fn plane_updates(&self) -> Vec<&PlaneUpdate> {
        self.batches.iter().flat_map(|b| b.planes.iter()).collect()
    }

    pub fn mesh_updates(&self) -> Vec<&MeshUpdate> {
        self.batches.iter().flat_map(|b| b.meshes.iter()).collect()
    }

    pub fn object_updates(&self) -> Vec<&ObjectUpdate> {
        self.batches.iter().flat_map(|b| b.objects.iter()).collect()
    }

    pub fn publish_batches(&self) -> Vec<&Batch> {
        self.batches.iter().filter(|b| b.allocations() > 0).collect()
    }
}

impl TrackedMeshHolder for RecordingHolder {
    fn start_mesh_updates(&mut self) {
        assert_eq!(self.depth, 0, "batches never nest in the scan pipeline");
        self.depth += 1;
    }

    fn allocate_plane_update(&mut self, id: TrackableId) -> &mut PlaneUpdate {
        assert_eq!(self.depth, 1, "plane allocated outside a batch");
        self.current.planes.push(PlaneUpdate::new(id));
        let last = self.current.planes.len() - 1;
        &mut self.current.planes[last]
    }

    fn allocate_mesh_update(&mut self, id: TrackableId) -> &mut MeshUpdate {
        assert_eq!(self.depth, 1, "mesh allocated outside a batch");
        self.current.meshes.push(MeshUpdate::new(id));
        let last = self.current.meshes.len() - 1;
        &mut self.current.meshes[last]
    }

    fn object_updated(&mut self, update: ObjectUpdate) {
        assert_eq!(self.depth, 1, "object updated outside a batch");
        self.current.objects.push(update);
    }

    fn remove_mesh(&mut self, id: TrackableId) -> bool {
        self.current.removals.push((GeometryKind::Mesh, id));
        true
    }

    fn remove_plane(&mut self, id: TrackableId) -> bool {
        self.current.removals.push((GeometryKind::Plane, id));
        true
    }

    fn end_mesh_updates(&mut self) {
        assert_eq!(self.depth, 1, "unbalanced end_mesh_updates");
        self.depth = 0;
        self.batches.push(std::mem::take(&mut self.current));
    }

    fn tracked_geometries(&mut self, _kind: GeometryKind) -> Vec<TrackedGeometrySnapshot> {
        Vec::new()
    }
}

// ============================================================================
// DRIVERS
// ============================================================================

pub struct Harness<H: TrackedMeshHolder> {
    pub runtime: Arc<SimulatedRuntime>,
    pub plugin: SceneUnderstandingPlugin<H>,
    display_time: XrTime,
}

impl<H: TrackedMeshHolder> Harness<H> {
    /// Plugin with a session begun, the AR session started and capture on.
    pub fn started(settings: ScanSettings, holder: H) -> Self {
        init_logging();
        let runtime = Arc::new(SimulatedRuntime::new());
        let instance = SimulatedInstance::new(runtime.clone());
        let mut harness = Self::with_instance(runtime, &instance, settings, holder, "OpenXR");
        harness.start_capture(SessionConfig::default());
        harness
    }

    /// Like [`Harness::started`], for an already built plugin.
    pub fn started_with(plugin: SceneUnderstandingPlugin<H>) -> Self {
        init_logging();
        let runtime = Arc::new(SimulatedRuntime::new());
        let instance = SimulatedInstance::new(runtime.clone());
        let mut harness = Self::with_plugin(runtime, &instance, plugin, "OpenXR");
        harness.start_capture(SessionConfig::default());
        harness
    }

    /// Plugin with a session begun on `instance`, capture not yet started.
    pub fn with_instance(
        runtime: Arc<SimulatedRuntime>,
        instance: &SimulatedInstance,
        settings: ScanSettings,
        holder: H,
        system_name: &str,
    ) -> Self {
        Self::with_plugin(runtime, instance, SceneUnderstandingPlugin::new(settings, holder), system_name)
    }

    pub fn with_plugin(
        runtime: Arc<SimulatedRuntime>,
        instance: &SimulatedInstance,
        plugin: SceneUnderstandingPlugin<H>,
        system_name: &str,
    ) -> Self {
        let mut harness = Self {
            runtime,
            plugin,
            display_time: 0,
        };
        harness.create_and_begin(instance, system_name);
        harness
    }

    /// Run the host's create then begin session hooks against `instance`.
    pub fn create_and_begin(&mut self, instance: &SimulatedInstance, system_name: &str) {
        self.plugin.on_create_session(instance).expect("extension resolves");
        self.plugin.on_begin_session(&SessionInfo {
            session: SessionId(1),
            view_space: SpaceId(2),
            xr_system_name: system_name.to_string(),
        });
    }

    pub fn start_capture(&mut self, config: SessionConfig) {
        let capture_type = self.plugin.capture_type();
        let capture = self
            .plugin
            .custom_capture_support(capture_type)
            .expect("plugin supports its own capture type");
        capture.on_start_ar_session(&config);
        assert!(capture.on_toggle_ar_capture(true));
    }

    pub fn set_capture(&mut self, on: bool) {
        let capture_type = self.plugin.capture_type();
        let capture = self
            .plugin
            .custom_capture_support(capture_type)
            .expect("plugin supports its own capture type");
        capture.on_toggle_ar_capture(on);
    }

    pub fn tick(&mut self) {
        self.display_time += 11_111_111;
        self.plugin.update_device_locations(&FrameContext {
            display_time: self.display_time,
            tracking_space: SpaceId(3),
            world_to_meters: WORLD_TO_METERS,
        });
    }

    pub fn state(&self) -> ScanState {
        self.plugin.scan_state()
    }

    pub fn scanner(&self) -> &SceneScanner<H> {
        self.plugin.scanner().expect("scanner created")
    }

    pub fn holder(&self) -> &H {
        self.plugin.holder().expect("holder present")
    }

    /// Tick until `done` holds, sleeping briefly so background decodes finish.
    /// Returns the number of ticks taken.
    pub fn tick_until(&mut self, mut done: impl FnMut(&Self) -> bool) -> usize {
        for ticks in 1..=MAX_TICKS {
            self.tick();
            if done(self) {
                return ticks;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("condition not reached after {MAX_TICKS} ticks (state {:?})", self.state());
    }

    /// Wait without ticking until `done` holds, for work retired to the
    /// background pool.
    pub fn eventually(&self, mut done: impl FnMut(&Self) -> bool) {
        for _ in 0..MAX_TICKS {
            if done(self) {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("condition not reached after {MAX_TICKS} waits");
    }

    /// Tick until cycle `generation` has been fully published.
    pub fn run_cycle(&mut self, generation: u64) {
        self.tick_until(|h| {
            h.scanner().inventory().generation() >= generation && h.state() == ScanState::Locating
        });
    }

    /// Tick through the current `Locating` pass until back to `Idle` or `Waiting`.
    pub fn finish_locating(&mut self) {
        self.tick_until(|h| h.state() != ScanState::Locating);
    }
}
