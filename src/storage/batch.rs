use smallvec::SmallVec;

use super::{ChangeTracker, DenseVector, Space, Storage};
use crate::component::Component;
use crate::config::{OverflowPolicy, StorageConfig};
use crate::entity::EntityId;
use crate::error::BatchFull;

macro_rules! impl_batch_storage {
    ($storage:ty; $($generics:tt)*) => {
        impl<$($generics)*> $storage {
            /// Number of entities with a batch.
            pub fn len(&self) -> usize { self.batches.len() }

            /// Whether no entity has a batch.
            pub fn is_empty(&self) -> bool { self.batches.len() == 0 }

            /// Removes the `index`th component of the entity's batch.
            ///
            /// The entity is removed from the storage when its batch becomes empty.
            pub fn remove_element(&mut self, entity: EntityId, index: usize) -> Option<C> {
                let batch = self.batches.get_mut(entity)?;
                if index >= batch.len() {
                    return None;
                }
                let comp = batch.remove(index);
                if batch.is_empty() {
                    self.batches.remove(entity);
                    self.changes.notify_updated(entity);
                } else {
                    self.changes.notify_changed(entity);
                }
                Some(comp)
            }

            /// Iterates over all batches in packed order.
            pub fn iter(&self) -> impl Iterator<Item = (EntityId, &[C])> {
                self.batches.iter().map(|(entity, batch)| (entity, &batch[..]))
            }
        }

        impl<$($generics)*> Storage for $storage {
            type Comp = C;
            type Output = [C];

            fn with_config(config: &StorageConfig) -> Self { Self::new(config) }

            fn insert(&mut self, entity: EntityId, comp: C) { self.push(entity, comp) }

            fn has(&self, entity: EntityId) -> bool { self.batches.has(entity) }

            /// Drops the whole batch.
            fn remove(&mut self, entity: EntityId) -> bool {
                let removed = self.batches.remove(entity).is_some();
                self.changes.notify_updated(entity);
                removed
            }

            fn clear(&mut self) {
                self.batches.clear();
                self.changes.flush();
            }

            fn entities(&self) -> &[EntityId] { self.batches.entities() }

            fn try_get(&self, entity: EntityId) -> Option<&[C]> {
                self.batches.get(entity).map(|batch| &batch[..])
            }

            fn try_get_mut(&mut self, entity: EntityId) -> Option<&mut [C]> {
                let batch = self.batches.get_mut(entity)?;
                self.changes.notify_changed(entity);
                Some(&mut batch[..])
            }

            fn element(&self, entity: EntityId, index: usize, _: Space) -> Option<&C> {
                self.batches.get(entity)?.get(index)
            }

            fn element_mut(&mut self, entity: EntityId, index: usize, _: Space) -> Option<&mut C> {
                let comp = self.batches.get_mut(entity)?.get_mut(index)?;
                self.changes.notify_changed(entity);
                Some(comp)
            }

            fn batch_len(&self, entity: EntityId) -> usize {
                self.batches.get(entity).map_or(0, |batch| batch.len())
            }

            fn changes(&self) -> &ChangeTracker { &self.changes }

            fn changes_mut(&mut self) -> &mut ChangeTracker { &mut self.changes }
        }
    }
}

/// Stores up to `SIZE` components per entity inline.
///
/// Inserting appends to the entity's batch.
/// What happens once the batch is full depends on [`OverflowPolicy`];
/// the default silently drops the new component.
#[derive(Debug)]
pub struct BatchStorage<C, const SIZE: usize> {
    batches: DenseVector<SmallVec<[C; SIZE]>>,
    changes: ChangeTracker,
    policy:  OverflowPolicy,
}

impl<C: Component, const SIZE: usize> Default for BatchStorage<C, SIZE> {
    fn default() -> Self { Self::new(&StorageConfig::default()) }
}

impl<C: Component, const SIZE: usize> BatchStorage<C, SIZE> {
    /// The number of components that fit in one batch.
    pub const CAPACITY: usize = SIZE;

    fn new(config: &StorageConfig) -> Self {
        let mut changes = ChangeTracker::default();
        changes.set_tracing(config.trace_changes);
        Self {
            batches: DenseVector::with_capacity(config.pre_allocate),
            changes,
            policy: config.batch_overflow,
        }
    }

    /// The overflow policy of this storage.
    pub fn overflow_policy(&self) -> OverflowPolicy { self.policy }

    /// Appends a component to the entity's batch.
    ///
    /// Returns an error if the batch is full, unless the policy is [`OverflowPolicy::Grow`].
    pub fn try_push(&mut self, entity: EntityId, comp: C) -> Result<(), BatchFull> {
        if let Some(batch) = self.batches.get_mut(entity) {
            if batch.len() >= SIZE && self.policy != OverflowPolicy::Grow {
                return Err(BatchFull { entity, capacity: SIZE });
            }
            batch.push(comp);
        } else {
            let mut batch = SmallVec::new();
            batch.push(comp);
            self.batches.insert(entity, batch);
        }

        self.changes.notify_changed(entity);
        Ok(())
    }

    fn push(&mut self, entity: EntityId, comp: C) {
        match self.try_push(entity, comp) {
            Ok(()) => {}
            Err(err) if self.policy == OverflowPolicy::Error => {
                panic!("Cannot insert {} for entity {}: {}", C::NAME, entity, err)
            }
            Err(err) => log::trace!("Dropped {} component: {}", C::NAME, err),
        }
    }
}

impl_batch_storage!(BatchStorage<C, SIZE>; C: Component, const SIZE: usize);

/// Stores an unbounded list of components per entity.
#[derive(Debug)]
pub struct DynamicBatchStorage<C> {
    batches: DenseVector<Vec<C>>,
    changes: ChangeTracker,
}

impl<C: Component> Default for DynamicBatchStorage<C> {
    fn default() -> Self { Self::new(&StorageConfig::default()) }
}

impl<C: Component> DynamicBatchStorage<C> {
    fn new(config: &StorageConfig) -> Self {
        let mut changes = ChangeTracker::default();
        changes.set_tracing(config.trace_changes);
        Self { batches: DenseVector::with_capacity(config.pre_allocate), changes }
    }

    fn push(&mut self, entity: EntityId, comp: C) {
        match self.batches.get_mut(entity) {
            Some(batch) => batch.push(comp),
            None => {
                self.batches.insert(entity, vec![comp]);
            }
        }
        self.changes.notify_changed(entity);
    }
}

impl_batch_storage!(DynamicBatchStorage<C>; C: Component);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::Counter;

    crate::storage::tests::test_storage!(fixed => BatchStorage<Counter, 4>);
    crate::storage::tests::test_storage!(dynamic => DynamicBatchStorage<Counter>);

    fn with_policy(policy: OverflowPolicy) -> BatchStorage<Counter, 2> {
        BatchStorage::with_config(&StorageConfig {
            batch_overflow: policy,
            ..StorageConfig::default()
        })
    }

    fn values(batch: &[Counter]) -> Vec<i64> { batch.iter().map(|counter| counter.value).collect() }

    #[test]
    fn test_insert_appends() {
        let mut storage = BatchStorage::<Counter, 4>::default();
        storage.insert(EntityId(1), Counter::new(1));
        storage.insert(EntityId(1), Counter::new(2));
        storage.insert(EntityId(3), Counter::new(3));

        assert_eq!(values(storage.get(EntityId(1))), [1, 2]);
        assert_eq!(storage.batch_len(EntityId(1)), 2);
        assert_eq!(storage.batch_len(EntityId(2)), 0);
        assert_eq!(storage.element(EntityId(1), 1, Space::Local), Some(&Counter::new(2)));
        assert_eq!(storage.element(EntityId(1), 2, Space::Local), None);
    }

    #[test]
    fn test_overflow_drops_by_default() {
        let mut storage = with_policy(OverflowPolicy::Drop);
        for value in 0..5 {
            storage.insert(EntityId(0), Counter::new(value));
        }
        assert_eq!(values(storage.get(EntityId(0))), [0, 1]);
        assert_eq!(
            storage.try_push(EntityId(0), Counter::new(9)),
            Err(BatchFull { entity: EntityId(0), capacity: 2 })
        );
    }

    #[test]
    fn test_overflow_grow() {
        let mut storage = with_policy(OverflowPolicy::Grow);
        for value in 0..5 {
            storage.insert(EntityId(0), Counter::new(value));
        }
        assert_eq!(values(storage.get(EntityId(0))), [0, 1, 2, 3, 4]);
    }

    #[test]
    #[should_panic = "the batch of entity 0 is full (capacity 2)"]
    fn test_overflow_error_panics() {
        let mut storage = with_policy(OverflowPolicy::Error);
        for value in 0..3 {
            storage.insert(EntityId(0), Counter::new(value));
        }
    }

    #[test]
    fn test_remove_element_drops_empty_batch() {
        let mut storage = DynamicBatchStorage::<Counter>::default();
        storage.insert(EntityId(2), Counter::new(1));
        storage.insert(EntityId(2), Counter::new(2));

        assert_eq!(storage.remove_element(EntityId(2), 0), Some(Counter::new(1)));
        assert_eq!(values(storage.get(EntityId(2))), [2]);
        assert_eq!(storage.remove_element(EntityId(2), 3), None);
        assert_eq!(storage.remove_element(EntityId(2), 0), Some(Counter::new(2)));
        assert!(!storage.has(EntityId(2)));
        assert!(storage.is_empty());
    }
}
