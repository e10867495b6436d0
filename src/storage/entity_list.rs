use crate::entity::EntityId;

const EMPTY: u32 = u32::MAX;

/// A set of entities with O(1) insertion, removal and membership tests.
///
/// Entities are kept in a dense list for fast iteration
/// and indexed by a sparse table for membership.
/// Removal swaps the last entry into the hole, so iteration order is not insertion order.
#[derive(Debug, Default, Clone)]
pub struct EntityList {
    /// Set this to true to disable any modification.
    frozen:         bool,
    /// Sparse table from entity to the index in `dense`.
    entity_to_data: Vec<u32>,
    dense:          Vec<EntityId>,
}

impl EntityList {
    /// Creates an empty list.
    pub fn new() -> Self { Self::default() }

    /// Ignores all subsequent modifications until [`unfreeze`](Self::unfreeze) or [`clear`](Self::clear).
    pub fn freeze(&mut self) { self.frozen = true; }

    /// Accepts modifications again.
    pub fn unfreeze(&mut self) { self.frozen = false; }

    /// Whether modifications are currently ignored.
    pub fn is_frozen(&self) -> bool { self.frozen }

    /// Adds an entity. Does nothing if it is already present or the list is frozen.
    pub fn insert(&mut self, entity: EntityId) {
        if self.frozen {
            return;
        }

        let index = entity.index();
        if self.entity_to_data.len() <= index {
            self.entity_to_data.resize(index + 1, EMPTY);
        }

        if self.entity_to_data[index] == EMPTY {
            self.entity_to_data[index] =
                u32::try_from(self.dense.len()).expect("entity list cannot exceed u32::MAX entries");
            self.dense.push(entity);
        }
    }

    /// Removes an entity. Does nothing if it is absent or the list is frozen.
    pub fn remove(&mut self, entity: EntityId) {
        if self.frozen {
            return;
        }

        let Some(slot) = self.entity_to_data.get_mut(entity.index()) else { return };
        if *slot == EMPTY {
            return;
        }
        let index = *slot as usize;
        *slot = EMPTY;

        self.dense.swap_remove(index);
        if let Some(&moved) = self.dense.get(index) {
            self.entity_to_data[moved.index()] = index as u32;
        }
    }

    /// Removes and returns the most recently positioned entity.
    pub fn pop(&mut self) -> Option<EntityId> {
        if self.frozen {
            return None;
        }

        let entity = self.dense.pop()?;
        self.entity_to_data[entity.index()] = EMPTY;
        Some(entity)
    }

    /// Whether the entity is in the list.
    pub fn has(&self, entity: EntityId) -> bool {
        if entity.is_null() {
            return false;
        }
        matches!(self.entity_to_data.get(entity.index()), Some(&index) if index != EMPTY)
    }

    /// Number of entities in the list.
    pub fn len(&self) -> usize { self.dense.len() }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool { self.dense.is_empty() }

    /// Iterates the entities in dense order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ { self.dense.iter().copied() }

    /// The entities in dense order.
    pub fn as_slice(&self) -> &[EntityId] { &self.dense }

    /// Empties the list but keeps the allocations for the next frame.
    pub fn clear(&mut self) {
        for &entity in &self.dense {
            self.entity_to_data[entity.index()] = EMPTY;
        }
        self.dense.clear();
        self.frozen = false;
    }

    /// Empties the list and releases its memory.
    pub fn reset(&mut self) {
        self.entity_to_data = Vec::new();
        self.dense = Vec::new();
        self.frozen = false;
    }
}
