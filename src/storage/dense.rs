use super::{ChangeTracker, Space, Storage};
use crate::component::Component;
use crate::config::StorageConfig;
use crate::entity::EntityId;

const EMPTY: u32 = u32::MAX;

/// A packed array of values with a two-way index between entities and slots.
///
/// Removal swaps the last slot into the hole,
/// so the array stays gap-free and only the moved entity is re-indexed.
#[derive(Debug)]
pub(crate) struct DenseVector<T> {
    data:           Vec<T>,
    data_to_entity: Vec<EntityId>,
    entity_to_data: Vec<u32>,
}

impl<T> Default for DenseVector<T> {
    fn default() -> Self {
        Self { data: Vec::new(), data_to_entity: Vec::new(), entity_to_data: Vec::new() }
    }
}

impl<T> DenseVector<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            data:           Vec::with_capacity(capacity),
            data_to_entity: Vec::with_capacity(capacity),
            entity_to_data: Vec::with_capacity(capacity),
        }
    }

    fn slot(&self, entity: EntityId) -> Option<usize> {
        if entity.is_null() {
            return None;
        }
        match self.entity_to_data.get(entity.index()) {
            Some(&index) if index != EMPTY => Some(index as usize),
            _ => None,
        }
    }

    /// Inserts a value, overwriting the existing value in place.
    pub(crate) fn insert(&mut self, entity: EntityId, value: T) -> Option<T> {
        if let Some(index) = self.slot(entity) {
            return Some(std::mem::replace(&mut self.data[index], value));
        }

        let entity_index = entity.index();
        if self.entity_to_data.len() <= entity_index {
            self.entity_to_data.resize(entity_index + 1, EMPTY);
        }

        self.entity_to_data[entity_index] =
            u32::try_from(self.data.len()).expect("dense vector cannot exceed u32::MAX entries");
        self.data.push(value);
        self.data_to_entity.push(entity);
        None
    }

    pub(crate) fn has(&self, entity: EntityId) -> bool { self.slot(entity).is_some() }

    pub(crate) fn get(&self, entity: EntityId) -> Option<&T> {
        self.slot(entity).map(|index| &self.data[index])
    }

    pub(crate) fn get_mut(&mut self, entity: EntityId) -> Option<&mut T> {
        let index = self.slot(entity)?;
        Some(&mut self.data[index])
    }

    pub(crate) fn remove(&mut self, entity: EntityId) -> Option<T> {
        let index = self.slot(entity)?;
        self.entity_to_data[entity.index()] = EMPTY;

        let value = self.data.swap_remove(index);
        self.data_to_entity.swap_remove(index);
        if let Some(&moved) = self.data_to_entity.get(index) {
            self.entity_to_data[moved.index()] = index as u32;
        }

        Some(value)
    }

    pub(crate) fn clear(&mut self) {
        self.data.clear();
        self.data_to_entity.clear();
        self.entity_to_data.clear();
    }

    pub(crate) fn len(&self) -> usize { self.data.len() }

    pub(crate) fn entities(&self) -> &[EntityId] { &self.data_to_entity }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.data_to_entity.iter().copied().zip(self.data.iter())
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> {
        self.data_to_entity.iter().copied().zip(self.data.iter_mut())
    }
}

/// Stores exactly one component per entity in a packed array.
///
/// Lookup, insertion and removal are O(1); iteration visits a contiguous slice.
/// Removal does not preserve insertion order.
#[derive(Debug)]
pub struct DenseVectorStorage<C> {
    storage: DenseVector<C>,
    changes: ChangeTracker,
}

impl<C: Component> Default for DenseVectorStorage<C> {
    fn default() -> Self { Self::with_config(&StorageConfig::default()) }
}

impl<C: Component> DenseVectorStorage<C> {
    /// Number of stored components.
    pub fn len(&self) -> usize { self.storage.len() }

    /// Whether the storage is empty.
    pub fn is_empty(&self) -> bool { self.storage.len() == 0 }

    /// Iterates over all components in packed order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &C)> { self.storage.iter() }

    /// Iterates mutably over all components, marking each visited entity as changed.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut C)> {
        let changes = &mut self.changes;
        self.storage.iter_mut().map(move |(entity, comp)| {
            changes.notify_changed(entity);
            (entity, comp)
        })
    }
}

impl<C: Component> Storage for DenseVectorStorage<C> {
    type Comp = C;
    type Output = C;

    fn with_config(config: &StorageConfig) -> Self {
        let mut changes = ChangeTracker::default();
        changes.set_tracing(config.trace_changes);
        Self { storage: DenseVector::with_capacity(config.pre_allocate), changes }
    }

    fn insert(&mut self, entity: EntityId, comp: C) {
        self.storage.insert(entity, comp);
        self.changes.notify_changed(entity);
    }

    fn has(&self, entity: EntityId) -> bool { self.storage.has(entity) }

    fn remove(&mut self, entity: EntityId) -> bool {
        let removed = self.storage.remove(entity).is_some();
        self.changes.notify_updated(entity);
        removed
    }

    fn clear(&mut self) {
        self.storage.clear();
        self.changes.flush();
    }

    fn entities(&self) -> &[EntityId] { self.storage.entities() }

    fn try_get(&self, entity: EntityId) -> Option<&C> { self.storage.get(entity) }

    fn try_get_mut(&mut self, entity: EntityId) -> Option<&mut C> {
        let comp = self.storage.get_mut(entity)?;
        self.changes.notify_changed(entity);
        Some(comp)
    }

    fn element(&self, entity: EntityId, index: usize, _: Space) -> Option<&C> {
        if index == 0 {
            self.try_get(entity)
        } else {
            None
        }
    }

    fn element_mut(&mut self, entity: EntityId, index: usize, _: Space) -> Option<&mut C> {
        if index == 0 {
            self.try_get_mut(entity)
        } else {
            None
        }
    }

    fn changes(&self) -> &ChangeTracker { &self.changes }

    fn changes_mut(&mut self) -> &mut ChangeTracker { &mut self.changes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::Counter;

    crate::storage::tests::test_storage!(dense => DenseVectorStorage<Counter>);

    #[test]
    fn test_reinsert_overwrites_in_place() {
        let mut storage = DenseVectorStorage::<Counter>::default();
        storage.insert(EntityId(2), Counter::new(1));
        storage.insert(EntityId(5), Counter::new(2));
        storage.insert(EntityId(2), Counter::new(3));

        assert_eq!(storage.len(), 2);
        assert_eq!(storage.entities(), [EntityId(2), EntityId(5)]);
        assert_eq!(storage.get(EntityId(2)), &Counter::new(3));
    }

    #[test]
    fn test_swap_remove_reindexes_last() {
        let mut storage = DenseVectorStorage::<Counter>::default();
        for id in 0..4 {
            storage.insert(EntityId(id), Counter::new(i64::from(id)));
        }
        assert!(storage.remove(EntityId(1)));
        assert_eq!(storage.entities(), [EntityId(0), EntityId(3), EntityId(2)]);
        assert_eq!(storage.get(EntityId(3)), &Counter::new(3));
        assert!(!storage.remove(EntityId(1)));
    }

    #[test]
    fn test_iter_mut_marks_changed() {
        let mut storage = DenseVectorStorage::<Counter>::with_config(&StorageConfig {
            trace_changes: true,
            ..StorageConfig::default()
        });
        storage.insert(EntityId(0), Counter::new(0));
        storage.insert(EntityId(1), Counter::new(1));
        storage.changes_mut().flush();

        for (_, counter) in storage.iter_mut() {
            counter.value += 10;
        }
        assert!(storage.changes().is_changed(EntityId(0)));
        assert!(storage.changes().is_changed(EntityId(1)));
        assert_eq!(storage.get(EntityId(1)).value, 11);
    }

    #[test]
    #[should_panic = "Entity 3 has no Counter component"]
    fn test_get_absent_panics() {
        let storage = DenseVectorStorage::<Counter>::default();
        storage.get(EntityId(3));
    }
}
