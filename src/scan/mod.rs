// Scene scanning pipeline: decode, reconcile, publish and locate.

pub mod decoder;
pub mod inventory;
pub mod orchestrator;
pub mod plugin;
pub mod reconcile;
pub mod trace;

pub use decoder::{classification_for, decode, load_planes, load_visual_meshes, DecodeRequest, PlaneRecord, SceneUpdate};
pub use inventory::PlaneInventory;
pub use orchestrator::{FrameContext, ScanState, SceneScanner};
pub use plugin::{CaptureType, CustomCaptureSupport, OpenXrExtensionPlugin, SceneUnderstandingPlugin, SessionInfo};
pub use trace::{TraceChannels, TraceResult};
