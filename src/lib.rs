// Scene understanding bridge: XR runtime scene computation → engine tracked geometry.

pub mod config;
pub mod engine;
pub mod error;
pub mod scan;
pub mod xr;

pub use config::{ScanKind, ScanSettings, SessionConfig};
pub use error::{ScanError, ScanResult};
