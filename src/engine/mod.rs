// Engine module - tracked geometry world, consumer interface and collision

pub mod collision;
pub mod components;
pub mod holder;
pub mod mesh;
pub mod systems;
pub mod tracked_world;

// Re-export commonly used items
pub use collision::{Hit, TrackedGeometryCollision};
pub use components::*;
pub use holder::*;
pub use tracked_world::EcsTrackedGeometry;
