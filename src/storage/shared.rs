use std::fmt;

use super::{ChangeTracker, DenseVector, Space, SteadyStorage, Storage};
use crate::component::Component;
use crate::config::StorageConfig;
use crate::entity::EntityId;

/// Identifies a component value in a [`SharedSteadyStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SharedId(pub u32);

impl fmt::Display for SharedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "shared #{}", self.0) }
}

/// Stores component values that can be attached to many entities at once.
///
/// Values are created with [`create_shared`](Self::create_shared)
/// and attached with [`insert_shared`](Self::insert_shared).
/// Writing through any entity is visible from every entity sharing the value.
/// Values never move until they are freed, and freed IDs are never reused.
///
/// [`Storage::insert`] creates a new value used only by the entity.
#[derive(Debug)]
pub struct SharedSteadyStorage<C> {
    values:      SteadyStorage<C>,
    next_shared: u32,
    links:       DenseVector<SharedId>,
    changes:     ChangeTracker,
}

impl<C: Component> Default for SharedSteadyStorage<C> {
    fn default() -> Self { Self::with_config(&StorageConfig::default()) }
}

impl<C: Component> SharedSteadyStorage<C> {
    /// Stores a value that entities can be attached to.
    pub fn create_shared(&mut self, comp: C) -> SharedId {
        let id = SharedId(self.next_shared);
        self.next_shared = id.0.checked_add(1).expect("shared IDs cannot exceed u32::MAX");
        self.values.insert(EntityId(id.0), comp);
        id
    }

    /// Drops a value.
    ///
    /// Entities attached to it no longer have the component.
    pub fn free_shared(&mut self, id: SharedId) -> bool { self.values.remove(EntityId(id.0)) }

    /// Whether the value exists.
    pub fn has_shared(&self, id: SharedId) -> bool { self.values.has(EntityId(id.0)) }

    /// Reads a value.
    pub fn shared(&self, id: SharedId) -> Option<&C> { self.values.try_get(EntityId(id.0)) }

    /// Writes a value.
    ///
    /// Change tracing is not notified, because the entities sharing it are not known here.
    pub fn shared_mut(&mut self, id: SharedId) -> Option<&mut C> {
        self.values.try_get_mut(EntityId(id.0))
    }

    /// The value the entity is attached to, even if the value was freed.
    pub fn shared_id_of(&self, entity: EntityId) -> Option<SharedId> {
        self.links.get(entity).copied()
    }

    /// Attaches the entity to an existing value.
    ///
    /// Returns false without changes if the value does not exist.
    pub fn insert_shared(&mut self, entity: EntityId, id: SharedId) -> bool {
        if !self.has_shared(id) {
            log::error!("Cannot attach entity {entity} to freed or unknown {id} of {}", C::NAME);
            return false;
        }

        self.links.insert(entity, id);
        self.changes.notify_changed(entity);
        true
    }
}

impl<C: Component> Storage for SharedSteadyStorage<C> {
    type Comp = C;
    type Output = C;

    fn with_config(config: &StorageConfig) -> Self {
        let mut changes = ChangeTracker::default();
        changes.set_tracing(config.trace_changes);
        Self {
            values: SteadyStorage::with_config(&StorageConfig {
                trace_changes: false,
                ..config.clone()
            }),
            next_shared: 0,
            links: DenseVector::with_capacity(config.pre_allocate),
            changes,
        }
    }

    fn insert(&mut self, entity: EntityId, comp: C) {
        let id = self.create_shared(comp);
        self.links.insert(entity, id);
        self.changes.notify_changed(entity);
    }

    fn has(&self, entity: EntityId) -> bool {
        self.shared_id_of(entity).map_or(false, |id| self.has_shared(id))
    }

    fn remove(&mut self, entity: EntityId) -> bool {
        let removed = self.links.remove(entity).is_some();
        self.changes.notify_updated(entity);
        removed
    }

    fn clear(&mut self) {
        self.values.clear();
        self.next_shared = 0;
        self.links.clear();
        self.changes.flush();
    }

    fn entities(&self) -> &[EntityId] { self.links.entities() }

    fn try_get(&self, entity: EntityId) -> Option<&C> { self.shared(self.shared_id_of(entity)?) }

    fn try_get_mut(&mut self, entity: EntityId) -> Option<&mut C> {
        let id = self.shared_id_of(entity)?;
        if !self.has_shared(id) {
            return None;
        }
        self.changes.notify_changed(entity);
        self.shared_mut(id)
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

    crate::storage::tests::test_storage!(shared => SharedSteadyStorage<Counter>);

    #[test]
    fn test_entities_share_one_value() {
        let mut storage = SharedSteadyStorage::<Counter>::default();
        let id = storage.create_shared(Counter::new(3));
        assert!(storage.insert_shared(EntityId(1), id));
        assert!(storage.insert_shared(EntityId(4), id));

        storage.get_mut(EntityId(1)).value = 8;

        assert_eq!(storage.get(EntityId(4)), &Counter::new(8));
        assert_eq!(storage.shared(id), Some(&Counter::new(8)));
        assert_eq!(storage.shared_id_of(EntityId(4)), Some(id));
    }

    #[test]
    fn test_freed_value_detaches_entities() {
        let mut storage = SharedSteadyStorage::<Counter>::default();
        let id = storage.create_shared(Counter::new(3));
        storage.insert_shared(EntityId(0), id);

        assert!(storage.free_shared(id));
        assert!(!storage.has(EntityId(0)));
        assert!(storage.try_get(EntityId(0)).is_none());
        assert!(storage.try_get_mut(EntityId(0)).is_none());
        assert!(!storage.free_shared(id));

        let next = storage.create_shared(Counter::new(5));
        assert_ne!(next, id);
        assert!(!storage.has(EntityId(0)));
    }

    #[test]
    fn test_attach_to_unknown_value_fails() {
        let mut storage = SharedSteadyStorage::<Counter>::default();
        assert!(!storage.insert_shared(EntityId(0), SharedId(7)));
        assert!(!storage.has(EntityId(0)));
        assert!(storage.entities().is_empty());
    }

    #[test]
    fn test_removing_entity_keeps_value() {
        let mut storage = SharedSteadyStorage::<Counter>::default();
        let id = storage.create_shared(Counter::new(1));
        storage.insert_shared(EntityId(0), id);
        storage.insert_shared(EntityId(1), id);

        assert!(storage.remove(EntityId(0)));
        assert!(storage.has_shared(id));
        assert_eq!(storage.get(EntityId(1)), &Counter::new(1));
    }
}
