// Surfaces published by the last completed scan cycle.

use std::collections::HashMap;

use crate::engine::TrackableId;
use crate::xr::SceneUuid;

/// Surface identity → mesh identity of the previous cycle, stamped with the
/// generation it was produced in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaneInventory {
    generation: u64,
    planes: HashMap<SceneUuid, Option<TrackableId>>,
}

impl PlaneInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Mesh identity for a surface that carries a mesh this cycle: the one it
    /// had last cycle if any, otherwise a fresh random id.
    pub fn mesh_id_for(&self, uuid: &SceneUuid) -> TrackableId {
        match self.planes.get(uuid) {
            Some(Some(id)) => *id,
            _ => TrackableId::new_random(),
        }
    }

    /// Mesh identity recorded for `uuid`, if the surface had one.
    pub fn mesh_id(&self, uuid: &SceneUuid) -> Option<TrackableId> {
        self.planes.get(uuid).copied().flatten()
    }

    pub fn contains(&self, uuid: &SceneUuid) -> bool {
        self.planes.contains_key(uuid)
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SceneUuid, &Option<TrackableId>)> {
        self.planes.iter()
    }

    /// Replace the whole table with the surfaces of a new cycle.
    pub fn replace_with(&mut self, planes: impl IntoIterator<Item = (SceneUuid, Option<TrackableId>)>) {
        self.planes = planes.into_iter().collect();
        self.generation += 1;
    }

    pub fn clear(&mut self) {
        self.planes.clear();
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_id_reused_only_when_present() {
        let a = SceneUuid::from_u128(1);
        let b = SceneUuid::from_u128(2);
        let mut inventory = PlaneInventory::new();
        inventory.replace_with([(a, Some(TrackableId(42))), (b, None)]);
        assert_eq!(inventory.mesh_id_for(&a), TrackableId(42));
        assert_ne!(inventory.mesh_id_for(&b), TrackableId(42));
        assert_eq!(inventory.mesh_id(&b), None);
        assert!(inventory.contains(&b));
    }

    #[test]
    fn replace_bumps_generation() {
        let mut inventory = PlaneInventory::new();
        assert_eq!(inventory.generation(), 0);
        inventory.replace_with([(SceneUuid::from_u128(1), None)]);
        inventory.replace_with([]);
        assert_eq!(inventory.generation(), 2);
        assert!(inventory.is_empty());
    }
}
