// Wire-level types of the scene-compute extension.
// These mirror the runtime structures; all coordinates are in the runtime's
// convention (right-handed, +Y up, -Z forward, meters).

use bitflags::bitflags;
use glam::{Quat, Vec3};

/// Runtime time stamp in nanoseconds.
pub type XrTime = i64;

// ============================================================================
// HANDLE IDS
// ============================================================================

/// Raw id of an XR session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// Raw id of a reference space (view space, tracking space).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpaceId(pub u64);

/// Raw id of a scene observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// Raw id of one computed scene snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneId(pub u64);

/// Stable 16-byte identity the runtime assigns to every scene object and component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneUuid(pub [u8; 16]);

impl SceneUuid {
    pub const NIL: SceneUuid = SceneUuid([0; 16]);

    pub fn from_u128(value: u128) -> Self {
        Self(value.to_le_bytes())
    }

    pub fn as_u128(&self) -> u128 {
        u128::from_le_bytes(self.0)
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0; 16]
    }
}

// ============================================================================
// ENUMS
// ============================================================================

/// What the runtime is asked to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeFeature {
    Plane,
    PlaneMesh,
    VisualMesh,
    ColliderMesh,
}

/// Trade-off between completeness and latency of a scene compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeConsistency {
    SnapshotComplete,
    SnapshotIncompleteFast,
    OcclusionOptimized,
}

/// Result of polling a scene observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeState {
    /// No compute was requested, or the last one was discarded.
    None,
    /// A compute is in flight.
    Updating,
    Completed,
    CompletedWithError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaneAlignment {
    NonOrthogonal,
    Horizontal,
    Vertical,
}

/// Runtime classification of a scene object. Planes inherit their parent's kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SceneObjectKind {
    #[default]
    Uncategorized,
    Background,
    Wall,
    Floor,
    Ceiling,
    Platform,
    Inferred,
}

bitflags! {
    /// Validity bits of a located scene component.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct LocationFlags: u32 {
        const ORIENTATION_VALID   = 0x1;
        const POSITION_VALID      = 0x2;
        const ORIENTATION_TRACKED = 0x4;
        const POSITION_TRACKED    = 0x8;
    }
}

impl LocationFlags {
    /// A pose is usable only when both orientation and position are valid.
    pub fn is_pose_valid(self) -> bool {
        self.contains(Self::ORIENTATION_VALID | Self::POSITION_VALID)
    }
}

// ============================================================================
// STRUCTS
// ============================================================================

/// Vertex layout of runtime mesh buffers.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct XrVector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl XrVector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<XrVector3> for Vec3 {
    fn from(v: XrVector3) -> Self {
        Vec3::new(v.x, v.y, v.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XrPose {
    pub orientation: Quat,
    pub position: Vec3,
}

impl XrPose {
    pub const IDENTITY: XrPose = XrPose {
        orientation: Quat::IDENTITY,
        position: Vec3::ZERO,
    };
}

impl Default for XrPose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Extent2D {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereBound {
    pub center: Vec3,
    pub radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBoxBound {
    pub pose: XrPose,
    /// Half extents along the box axes.
    pub extents: Vec3,
}

/// Region the runtime should scan, relative to `space` at `time`.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneBounds {
    pub space: SpaceId,
    pub time: XrTime,
    pub spheres: Vec<SphereBound>,
    pub boxes: Vec<OrientedBoxBound>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSceneComputeInfo {
    pub features: Vec<ComputeFeature>,
    pub consistency: ComputeConsistency,
    pub bounds: SceneBounds,
}

/// A scene object (wall, floor, table, ...) that owns plane components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneObject {
    pub id: SceneUuid,
    pub kind: SceneObjectKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenePlane {
    pub alignment: PlaneAlignment,
    pub size: Extent2D,
    /// Zero when the plane carries no mesh (mesh compute not requested).
    pub mesh_buffer_id: u64,
}

/// One plane component with its parent object id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenePlaneComponent {
    pub id: SceneUuid,
    pub parent_id: SceneUuid,
    pub plane: ScenePlane,
}

/// One visual mesh component with its parent object id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneMeshComponent {
    pub id: SceneUuid,
    pub parent_id: SceneUuid,
    pub mesh_buffer_id: u64,
}

/// Raw mesh buffers as the runtime reports them. `XrVector3` is `Pod`, so the
/// vertex buffer can be viewed as engine vectors without copying.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshBuffers {
    pub vertices: Vec<XrVector3>,
    pub indices: Vec<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ComponentLocation {
    pub flags: LocationFlags,
    pub pose: XrPose,
}

impl ComponentLocation {
    pub fn is_pose_valid(&self) -> bool {
        self.flags.is_pose_valid()
    }
}
