// Session and capture glue between the host's XR plugin system and the scanner.

use glam::Vec3;

use super::orchestrator::{FrameContext, SceneScanner, ScanState};
use super::trace::{TraceChannels, TraceResult};
use crate::config::{ScanKind, ScanSettings, SessionConfig};
use crate::engine::TrackedMeshHolder;
use crate::error::ScanResult;
use crate::xr::{
    ExtensionDispatch, SessionId, SpaceId, XrInstance, HOLOGRAPHIC_REMOTING_EXTENSION_NAME,
    SCENE_UNDERSTANDING_EXTENSION_NAME,
};

/// Name the host reports for an OpenXR-backed tracking system.
pub const OPENXR_SYSTEM_NAME: &str = "OpenXR";

/// Kinds of AR capture a host can toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureType {
    SpatialMapping,
    SceneUnderstanding,
    HandMesh,
    Camera,
    QrCode,
}

impl From<ScanKind> for CaptureType {
    fn from(kind: ScanKind) -> Self {
        match kind {
            ScanKind::SceneUnderstanding => CaptureType::SceneUnderstanding,
            ScanKind::SpatialMapping => CaptureType::SpatialMapping,
        }
    }
}

/// What the host knows about a session once it begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session: SessionId,
    /// View reference space; scan bounds are centred on it.
    pub view_space: SpaceId,
    pub xr_system_name: String,
}

/// Hooks an extension plugin receives from the host's XR system.
pub trait OpenXrExtensionPlugin {
    fn required_extensions(&self) -> Vec<&'static str>;

    /// Resolve extension entry points. A failure means the plugin cannot run.
    fn on_create_session(&mut self, instance: &dyn XrInstance) -> ScanResult<()>;

    fn on_begin_session(&mut self, info: &SessionInfo);

    /// Per-frame update, called once the frame's display time is known.
    fn update_device_locations(&mut self, frame: &FrameContext);

    fn custom_capture_support(&mut self, capture_type: CaptureType) -> Option<&mut dyn CustomCaptureSupport>;

    fn on_line_trace_tracked_objects(&mut self, start: Vec3, end: Vec3, channels: TraceChannels) -> Vec<TraceResult>;
}

/// Capture control for one capture type.
pub trait CustomCaptureSupport {
    /// Returns true if the toggle was accepted.
    fn on_toggle_ar_capture(&mut self, on: bool) -> bool;

    fn on_start_ar_session(&mut self, config: &SessionConfig);
}

/// One scene-compute plugin. A host registers one per scan kind it wants,
/// each with its own consumer.
pub struct SceneUnderstandingPlugin<H> {
    kind: ScanKind,
    settings: ScanSettings,
    /// Consumer waiting for a session to begin.
    detached_holder: Option<H>,
    scanner: Option<SceneScanner<H>>,
    capture_requested: bool,
}

impl<H: TrackedMeshHolder> SceneUnderstandingPlugin<H> {
    pub fn new(settings: ScanSettings, holder: H) -> Self {
        Self::with_kind(ScanKind::SceneUnderstanding, settings, holder)
    }

    /// Visual meshes of the environment instead of planes.
    pub fn spatial_mapping(settings: ScanSettings, holder: H) -> Self {
        Self::with_kind(ScanKind::SpatialMapping, settings, holder)
    }

    pub fn with_kind(kind: ScanKind, settings: ScanSettings, holder: H) -> Self {
        Self {
            kind,
            settings,
            detached_holder: Some(holder),
            scanner: None,
            capture_requested: false,
        }
    }

    pub fn kind(&self) -> ScanKind {
        self.kind
    }

    /// The capture type this plugin answers toggles for.
    pub fn capture_type(&self) -> CaptureType {
        self.kind.into()
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn scanner(&self) -> Option<&SceneScanner<H>> {
        self.scanner.as_ref()
    }

    pub fn scan_state(&self) -> ScanState {
        self.scanner.as_ref().map(SceneScanner::state).unwrap_or_default()
    }

    pub fn holder(&self) -> Option<&H> {
        match &self.scanner {
            Some(scanner) if scanner.holder().is_some() => scanner.holder(),
            _ => self.detached_holder.as_ref(),
        }
    }

    pub fn holder_mut(&mut self) -> Option<&mut H> {
        if let Some(holder) = self.detached_holder.as_mut() {
            return Some(holder);
        }
        self.scanner.as_mut().and_then(SceneScanner::holder_mut)
    }

    /// Stop scanning and release the scene observer.
    pub fn unregister(&mut self) {
        if let Some(scanner) = self.scanner.as_mut() {
            scanner.stop();
            scanner.release_observer();
        }
        self.capture_requested = false;
    }

    pub fn stop(&mut self) {
        if let Some(scanner) = self.scanner.as_mut() {
            scanner.stop();
        }
        self.capture_requested = false;
    }
}

impl<H: TrackedMeshHolder> OpenXrExtensionPlugin for SceneUnderstandingPlugin<H> {
    fn required_extensions(&self) -> Vec<&'static str> {
        vec![SCENE_UNDERSTANDING_EXTENSION_NAME]
    }

    fn on_create_session(&mut self, instance: &dyn XrInstance) -> ScanResult<()> {
        let dispatch = ExtensionDispatch::resolve(instance)?;
        let remoting = instance.is_extension_enabled(HOLOGRAPHIC_REMOTING_EXTENSION_NAME);
        if remoting {
            log::info!("Holographic remoting is active, {:?} is disabled", self.kind);
        }
        let mut scanner = SceneScanner::new(dispatch, self.kind);
        scanner.set_remoting(remoting);
        scanner.set_scanning(self.capture_requested);
        if let Some(mut previous) = self.scanner.replace(scanner) {
            log::debug!("Replacing scanner from a previous session in state {:?}", previous.state());
            // The consumer waits for the next session to begin.
            if let Some(holder) = previous.take_holder() {
                self.detached_holder = Some(holder);
            }
        }
        Ok(())
    }

    fn on_begin_session(&mut self, info: &SessionInfo) {
        let Some(scanner) = self.scanner.as_mut() else {
            log::warn!("Session began before scene understanding was initialised");
            return;
        };
        scanner.set_session(info.session, info.view_space);
        if info.xr_system_name == OPENXR_SYSTEM_NAME {
            if let Some(holder) = self.detached_holder.take() {
                scanner.attach_holder(holder);
            }
        } else {
            log::warn!(
                "XR system {} is not {OPENXR_SYSTEM_NAME}, tracked geometry will not be published",
                info.xr_system_name
            );
        }
    }

    fn update_device_locations(&mut self, frame: &FrameContext) {
        if let Some(scanner) = self.scanner.as_mut() {
            scanner.tick(frame);
        }
    }

    fn custom_capture_support(&mut self, capture_type: CaptureType) -> Option<&mut dyn CustomCaptureSupport> {
        if capture_type == self.capture_type() {
            Some(self as &mut dyn CustomCaptureSupport)
        } else {
            None
        }
    }

    fn on_line_trace_tracked_objects(&mut self, start: Vec3, end: Vec3, channels: TraceChannels) -> Vec<TraceResult> {
        match self.scanner.as_mut() {
            Some(scanner) => scanner.line_trace(start, end, channels),
            None => Vec::new(),
        }
    }
}

impl<H: TrackedMeshHolder> CustomCaptureSupport for SceneUnderstandingPlugin<H> {
    fn on_toggle_ar_capture(&mut self, on: bool) -> bool {
        self.capture_requested = on;
        if let Some(scanner) = self.scanner.as_mut() {
            scanner.set_scanning(on);
        }
        true
    }

    fn on_start_ar_session(&mut self, config: &SessionConfig) {
        match self.scanner.as_mut() {
            Some(scanner) => scanner.start_session(&self.settings, config),
            None => log::warn!("AR session started before scene understanding was initialised"),
        }
    }
}
