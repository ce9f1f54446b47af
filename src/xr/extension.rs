// Extension gateway for the scene-compute API.
//
// `ExtensionDispatch` is the resolved function table; it is cheap to clone and
// is handed to background tasks together with the handles they consume.
// Observer and scene handles are move-only and release their runtime resource
// when dropped.

use std::fmt;
use std::sync::Arc;

use bevy_tasks::{AsyncComputeTaskPool, TaskPool};

use super::types::*;
use crate::error::{ScanError, ScanResult};

pub const SCENE_UNDERSTANDING_EXTENSION_NAME: &str = "XR_MSFT_scene_understanding";
pub const HOLOGRAPHIC_REMOTING_EXTENSION_NAME: &str = "XR_MSFT_holographic_remoting";

/// Entry points that must resolve before scene understanding can run.
pub const REQUIRED_FUNCTIONS: [&str; 10] = [
    "xrEnumerateSceneComputeFeaturesMSFT",
    "xrCreateSceneObserverMSFT",
    "xrDestroySceneObserverMSFT",
    "xrCreateSceneMSFT",
    "xrDestroySceneMSFT",
    "xrComputeNewSceneMSFT",
    "xrGetSceneComputeStateMSFT",
    "xrGetSceneComponentsMSFT",
    "xrLocateSceneComponentsMSFT",
    "xrGetSceneMeshBuffersMSFT",
];

// ============================================================================
// RUNTIME BOUNDARY
// ============================================================================

/// The scene-compute extension as exposed by an XR runtime.
///
/// Every call is non-blocking from the caller's point of view except the
/// component and mesh reads, which are only issued from background tasks.
pub trait SceneComputeApi: Send + Sync {
    fn enumerate_features(&self) -> ScanResult<Vec<ComputeFeature>>;
    fn create_observer(&self, session: SessionId) -> ScanResult<ObserverId>;
    fn destroy_observer(&self, observer: ObserverId);
    fn compute_new_scene(&self, observer: ObserverId, info: &NewSceneComputeInfo) -> ScanResult<()>;
    fn compute_state(&self, observer: ObserverId) -> ScanResult<ComputeState>;
    fn create_scene(&self, observer: ObserverId) -> ScanResult<SceneId>;
    fn destroy_scene(&self, scene: SceneId);
    /// All scene objects, used to classify planes through their parent id.
    fn scene_objects(&self, scene: SceneId) -> ScanResult<Vec<SceneObject>>;
    /// Plane components, restricted to `filters` unless it is empty.
    fn scene_planes(&self, scene: SceneId, filters: &[PlaneAlignment]) -> ScanResult<Vec<ScenePlaneComponent>>;
    /// Visual mesh components; empty unless `VisualMesh` was computed.
    fn scene_visual_meshes(&self, scene: SceneId) -> ScanResult<Vec<SceneMeshComponent>>;
    fn mesh_buffers(&self, scene: SceneId, mesh_buffer_id: u64) -> ScanResult<MeshBuffers>;
    /// One location per id, in request order.
    fn locate_components(
        &self,
        scene: SceneId,
        base_space: SpaceId,
        time: XrTime,
        ids: &[SceneUuid],
    ) -> ScanResult<Vec<ComponentLocation>>;
}

/// The XR instance the plugin is created against.
pub trait XrInstance {
    fn is_extension_enabled(&self, name: &str) -> bool;
    /// True if the runtime exposes the named entry point.
    fn has_function(&self, name: &str) -> bool;
    fn scene_compute_api(&self) -> Option<Arc<dyn SceneComputeApi>>;
}

// ============================================================================
// DISPATCH TABLE
// ============================================================================

#[derive(Clone)]
pub struct ExtensionDispatch {
    api: Arc<dyn SceneComputeApi>,
}

impl ExtensionDispatch {
    /// Resolve the scene-compute table from an instance.
    pub fn resolve(instance: &dyn XrInstance) -> ScanResult<Self> {
        if !instance.is_extension_enabled(SCENE_UNDERSTANDING_EXTENSION_NAME) {
            return Err(ScanError::ExtensionUnavailable {
                extension: SCENE_UNDERSTANDING_EXTENSION_NAME,
            });
        }
        if let Some(&function) = REQUIRED_FUNCTIONS.iter().find(|name| !instance.has_function(name)) {
            return Err(ScanError::MissingFunction { function });
        }
        let api = instance
            .scene_compute_api()
            .ok_or(ScanError::MissingFunction { function: REQUIRED_FUNCTIONS[0] })?;
        Ok(Self { api })
    }

    pub fn from_api(api: Arc<dyn SceneComputeApi>) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &dyn SceneComputeApi {
        self.api.as_ref()
    }

    pub fn create_observer(&self, session: SessionId) -> ScanResult<SceneObserverHandle> {
        let id = self.api.create_observer(session)?;
        Ok(SceneObserverHandle {
            id,
            api: Arc::clone(&self.api),
        })
    }

    /// Take the result of the last completed compute as a new scene.
    pub fn create_scene(&self, observer: &SceneObserverHandle) -> ScanResult<SceneHandle> {
        let id = self.api.create_scene(observer.id)?;
        Ok(SceneHandle {
            id,
            api: Arc::clone(&self.api),
        })
    }
}

impl fmt::Debug for ExtensionDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionDispatch").finish_non_exhaustive()
    }
}

// ============================================================================
// OWNED HANDLES
// ============================================================================

pub struct SceneObserverHandle {
    id: ObserverId,
    api: Arc<dyn SceneComputeApi>,
}

impl SceneObserverHandle {
    pub fn id(&self) -> ObserverId {
        self.id
    }
}

impl Drop for SceneObserverHandle {
    fn drop(&mut self) {
        self.api.destroy_observer(self.id);
    }
}

impl fmt::Debug for SceneObserverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SceneObserverHandle").field(&self.id.0).finish()
    }
}

/// One computed scene snapshot. Destroying a scene is slow on real runtimes,
/// so the active one is retired with [`SceneHandle::dispose_in_background`].
pub struct SceneHandle {
    id: SceneId,
    api: Arc<dyn SceneComputeApi>,
}

impl SceneHandle {
    pub fn id(&self) -> SceneId {
        self.id
    }

    /// Move the handle onto the async compute pool and destroy it there.
    pub fn dispose_in_background(self) {
        log::trace!("Disposing scene {} in background", self.id.0);
        AsyncComputeTaskPool::get_or_init(TaskPool::new)
            .spawn(async move { drop(self) })
            .detach();
    }
}

impl Drop for SceneHandle {
    fn drop(&mut self) {
        self.api.destroy_scene(self.id);
    }
}

impl fmt::Debug for SceneHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SceneHandle").field(&self.id.0).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xr::simulated::{SimulatedInstance, SimulatedRuntime};

    #[test]
    fn resolve_requires_extension() {
        let runtime = Arc::new(SimulatedRuntime::new());
        let instance = SimulatedInstance::new(runtime).without_extension(SCENE_UNDERSTANDING_EXTENSION_NAME);
        let err = ExtensionDispatch::resolve(&instance).unwrap_err();
        assert!(matches!(err, ScanError::ExtensionUnavailable { .. }), "{err}");
    }

    #[test]
    fn resolve_reports_first_missing_function() {
        let runtime = Arc::new(SimulatedRuntime::new());
        let instance = SimulatedInstance::new(runtime).without_function("xrCreateSceneMSFT");
        match ExtensionDispatch::resolve(&instance) {
            Err(ScanError::MissingFunction { function }) => assert_eq!(function, "xrCreateSceneMSFT"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn dropping_handles_releases_runtime_resources() {
        let runtime = Arc::new(SimulatedRuntime::new());
        let dispatch = ExtensionDispatch::from_api(runtime.clone());
        let observer = dispatch.create_observer(SessionId(1)).unwrap();
        assert_eq!(runtime.live_observers(), 1);
        drop(observer);
        assert_eq!(runtime.live_observers(), 0);
    }
}
