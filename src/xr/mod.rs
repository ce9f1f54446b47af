// XR runtime side of the bridge: wire types, the scene-compute extension
// gateway, coordinate conversion and an in-process simulated runtime.

pub mod convert;
pub mod extension;
pub mod simulated;
pub mod types;

pub use extension::{
    ExtensionDispatch, SceneComputeApi, SceneHandle, SceneObserverHandle, XrInstance,
    HOLOGRAPHIC_REMOTING_EXTENSION_NAME, SCENE_UNDERSTANDING_EXTENSION_NAME,
};
pub use types::*;
