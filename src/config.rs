// Scan settings and per-session configuration.
//
// Settings are plain JSON; every key is optional and falls back to the
// defaults below.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ScanError, ScanResult};
use crate::xr::{ComputeConsistency, ComputeFeature, PlaneAlignment};

/// Surfaces published or located per frame unless configured otherwise.
pub const DEFAULT_LOCATIONS_PER_FRAME: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Diameter of the scanned region, in meters.
    pub volume_size: f32,
    /// Full height of the scanned region in meters. Zero scans a sphere,
    /// any positive value scans a box.
    pub volume_height: f32,
    /// Request per-plane meshes in addition to plane extents.
    pub mesh_detection: bool,
    /// Spatial mapping only: trade occlusion-optimised meshes for faster,
    /// possibly incomplete snapshots.
    pub high_quality_meshing: bool,
    pub locations_per_frame: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            volume_size: 20.0,
            volume_height: 0.0,
            mesh_detection: false,
            high_quality_meshing: false,
            locations_per_frame: DEFAULT_LOCATIONS_PER_FRAME,
        }
    }
}

impl ScanSettings {
    pub fn from_json_str(json: &str) -> ScanResult<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> ScanResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ScanError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_json_str(&json)?;
        log::info!("Loaded scan settings from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> ScanResult<()> {
        if !self.volume_size.is_finite() || self.volume_size <= 0.0 {
            return Err(ScanError::InvalidConfig {
                field: "volume_size",
                reason: format!("must be a positive number of meters, got {}", self.volume_size),
            });
        }
        if !self.volume_height.is_finite() || self.volume_height < 0.0 {
            return Err(ScanError::InvalidConfig {
                field: "volume_height",
                reason: format!("must be zero or positive, got {}", self.volume_height),
            });
        }
        if self.locations_per_frame == 0 {
            return Err(ScanError::InvalidConfig {
                field: "locations_per_frame",
                reason: "at least one surface must be processed per frame".to_string(),
            });
        }
        Ok(())
    }

    /// Radius of the scan sphere, and horizontal half extent of the scan box.
    pub fn radius(&self) -> f32 {
        self.volume_size * 0.5
    }

    /// Half height of the scan box; zero selects a sphere bound.
    pub fn bound_height(&self) -> f32 {
        self.volume_height * 0.5
    }
}

/// Which capture a scanner serves. Both share the scan pipeline and differ in
/// what they ask the runtime to compute and what they publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ScanKind {
    /// Planes, plus plane meshes when mesh detection is on.
    #[default]
    SceneUnderstanding,
    /// Visual meshes only.
    SpatialMapping,
}

impl ScanKind {
    pub fn compute_features(self, settings: &ScanSettings) -> Vec<ComputeFeature> {
        match self {
            ScanKind::SceneUnderstanding if settings.mesh_detection => {
                vec![ComputeFeature::Plane, ComputeFeature::PlaneMesh]
            }
            ScanKind::SceneUnderstanding => vec![ComputeFeature::Plane],
            ScanKind::SpatialMapping => vec![ComputeFeature::VisualMesh],
        }
    }

    pub fn consistency(self, settings: &ScanSettings) -> ComputeConsistency {
        match self {
            ScanKind::SceneUnderstanding => ComputeConsistency::SnapshotComplete,
            ScanKind::SpatialMapping if settings.high_quality_meshing => ComputeConsistency::SnapshotIncompleteFast,
            ScanKind::SpatialMapping => ComputeConsistency::OcclusionOptimized,
        }
    }

    /// Whether surfaces are published as planes. Spatial mapping publishes
    /// meshes only.
    pub fn publishes_planes(self) -> bool {
        self == ScanKind::SceneUnderstanding
    }
}

/// Plane detection switches of the AR session being started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub horizontal_plane_detection: bool,
    pub vertical_plane_detection: bool,
}

impl SessionConfig {
    /// Alignment filter for plane queries. Only a single enabled axis
    /// restricts the query; both or neither leave it unfiltered.
    pub fn plane_filters(&self) -> Vec<PlaneAlignment> {
        match (self.horizontal_plane_detection, self.vertical_plane_detection) {
            (true, false) => vec![PlaneAlignment::Horizontal],
            (false, true) => vec![PlaneAlignment::Vertical],
            _ => Vec::new(),
        }
    }
}
