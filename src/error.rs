// Error type for the scene scan pipeline.
//
// Only extension resolution failures are fatal; everything a tick can hit is
// logged and folded back into the scan state machine by the caller.

use std::path::PathBuf;

/// Failure modes across extension resolution, runtime calls and configuration.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The XR instance was created without the scene-understanding extension.
    #[error("XR extension {extension} is not enabled on this instance. Add it to the required extension list before creating the session.")]
    ExtensionUnavailable {
        /// Name of the extension that was expected.
        extension: &'static str,
    },

    /// The runtime advertises the extension but does not expose one of its entry points.
    #[error("XR runtime does not expose {function}. The installed runtime is too old for scene understanding.")]
    MissingFunction {
        /// Entry point that failed to resolve.
        function: &'static str,
    },

    /// A scene-compute call returned a failure code.
    #[error("{call} failed: {reason}")]
    Runtime {
        /// Extension call that failed.
        call: &'static str,
        /// Runtime-provided reason.
        reason: String,
    },

    /// A handle passed to the runtime is unknown or already destroyed.
    #[error("Invalid {kind} handle {id}")]
    InvalidHandle {
        /// Handle kind (`observer`, `scene`, `space`, `mesh buffer`).
        kind: &'static str,
        /// Raw handle value.
        id: u64,
    },

    /// `locate_components` returned a different number of locations than ids requested.
    #[error("Located {found} scene components but {expected} were requested")]
    LocationCountMismatch {
        /// Number of ids passed to the runtime.
        expected: usize,
        /// Number of locations returned.
        found: usize,
    },

    /// A configuration value is out of range.
    #[error("Invalid scan setting {field}: {reason}")]
    InvalidConfig {
        /// Offending field name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The settings file could not be read.
    #[error("Failed to read scan settings from {}: {source}", path.display())]
    ConfigIo {
        /// Path that was attempted.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The settings document is not valid JSON for `ScanSettings`.
    #[error("Failed to parse scan settings: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Convenience alias used by every fallible API in the crate.
pub type ScanResult<T> = Result<T, ScanError>;

impl ScanError {
    pub(crate) fn runtime(call: &'static str, reason: impl Into<String>) -> Self {
        Self::Runtime {
            call,
            reason: reason.into(),
        }
    }
}
