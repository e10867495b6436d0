use super::{ChangeTracker, EntityList, Space, Storage};
use crate::component::Component;
use crate::config::StorageConfig;
use crate::entity::EntityId;

const EMPTY: u32 = u32::MAX;

/// Stores one component per entity in fixed-size pages.
///
/// A component never moves after insertion until it is removed,
/// so references into the storage stay stable across unrelated insertions and removals.
/// Freed slots are reused by later insertions.
#[derive(Debug)]
pub struct SteadyStorage<C> {
    pages:          Vec<Box<[Option<C>]>>,
    page_size:      usize,
    entity_to_slot: Vec<u32>,
    free_slots:     Vec<u32>,
    used_slots:     u32,
    present:        EntityList,
    changes:        ChangeTracker,
}

impl<C: Component> Default for SteadyStorage<C> {
    fn default() -> Self { Self::with_config(&StorageConfig::default()) }
}

impl<C: Component> SteadyStorage<C> {
    /// The number of slots per page.
    pub fn page_size(&self) -> usize { self.page_size }

    /// The number of allocated pages.
    pub fn page_count(&self) -> usize { self.pages.len() }

    /// The slot occupied by the entity.
    pub fn slot_of(&self, entity: EntityId) -> Option<usize> {
        if entity.is_null() {
            return None;
        }
        match self.entity_to_slot.get(entity.index()) {
            Some(&slot) if slot != EMPTY => Some(slot as usize),
            _ => None,
        }
    }

    fn cell(&self, slot: usize) -> &Option<C> {
        &self.pages[slot / self.page_size][slot % self.page_size]
    }

    fn cell_mut(&mut self, slot: usize) -> &mut Option<C> {
        &mut self.pages[slot / self.page_size][slot % self.page_size]
    }

    fn allocate_slot(&mut self) -> u32 {
        if let Some(slot) = self.free_slots.pop() {
            return slot;
        }

        let slot = self.used_slots;
        if slot as usize == self.pages.len() * self.page_size {
            let page: Vec<Option<C>> = (0..self.page_size).map(|_| None).collect();
            self.pages.push(page.into_boxed_slice());
        }
        self.used_slots = slot.checked_add(1).expect("steady storage cannot exceed u32::MAX slots");
        slot
    }
}

impl<C: Component> Storage for SteadyStorage<C> {
    type Comp = C;
    type Output = C;

    fn with_config(config: &StorageConfig) -> Self {
        let mut changes = ChangeTracker::default();
        changes.set_tracing(config.trace_changes);
        Self {
            pages: Vec::new(),
            page_size: config.page_size.max(1),
            entity_to_slot: Vec::with_capacity(config.pre_allocate),
            free_slots: Vec::new(),
            used_slots: 0,
            present: EntityList::default(),
            changes,
        }
    }

    fn insert(&mut self, entity: EntityId, comp: C) {
        let slot = match self.slot_of(entity) {
            Some(slot) => slot,
            None => {
                let slot = self.allocate_slot();
                let index = entity.index();
                if self.entity_to_slot.len() <= index {
                    self.entity_to_slot.resize(index + 1, EMPTY);
                }
                self.entity_to_slot[index] = slot;
                self.present.insert(entity);
                slot as usize
            }
        };

        *self.cell_mut(slot) = Some(comp);
        self.changes.notify_changed(entity);
    }

    fn has(&self, entity: EntityId) -> bool { self.slot_of(entity).is_some() }

    fn remove(&mut self, entity: EntityId) -> bool {
        let Some(slot) = self.slot_of(entity) else { return false };

        *self.cell_mut(slot) = None;
        self.entity_to_slot[entity.index()] = EMPTY;
        self.free_slots.push(slot as u32);
        self.present.remove(entity);
        self.changes.notify_updated(entity);
        true
    }

    fn clear(&mut self) {
        self.pages.clear();
        self.entity_to_slot.clear();
        self.free_slots.clear();
        self.used_slots = 0;
        self.present.clear();
        self.changes.flush();
    }

    fn entities(&self) -> &[EntityId] { self.present.as_slice() }

    fn try_get(&self, entity: EntityId) -> Option<&C> {
        let slot = self.slot_of(entity)?;
        self.cell(slot).as_ref()
    }

    fn try_get_mut(&mut self, entity: EntityId) -> Option<&mut C> {
        let slot = self.slot_of(entity)?;
        self.changes.notify_changed(entity);
        self.cell_mut(slot).as_mut()
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

    crate::storage::tests::test_storage!(steady => SteadyStorage<Counter>);

    fn small_pages() -> SteadyStorage<Counter> {
        SteadyStorage::with_config(&StorageConfig { page_size: 2, ..StorageConfig::default() })
    }

    #[test]
    fn test_components_do_not_move() {
        let mut storage = small_pages();
        storage.insert(EntityId(0), Counter::new(0));
        storage.insert(EntityId(1), Counter::new(1));
        let address: *const Counter = storage.get(EntityId(1));

        for id in 2..9 {
            storage.insert(EntityId(id), Counter::new(i64::from(id)));
        }
        storage.remove(EntityId(0));

        assert_eq!(storage.get(EntityId(1)) as *const Counter, address);
        assert_eq!(storage.page_count(), 5);
    }

    #[test]
    fn test_free_slots_reused() {
        let mut storage = small_pages();
        for id in 0..4 {
            storage.insert(EntityId(id), Counter::new(i64::from(id)));
        }
        let slot = storage.slot_of(EntityId(1));
        assert!(storage.remove(EntityId(1)));
        assert_eq!(storage.slot_of(EntityId(1)), None);

        storage.insert(EntityId(7), Counter::new(7));
        assert_eq!(storage.slot_of(EntityId(7)), slot);
        assert_eq!(storage.page_count(), 2);
        assert_eq!(storage.get(EntityId(7)), &Counter::new(7));
    }

    #[test]
    fn test_zero_page_size_is_clamped() {
        let storage = SteadyStorage::<Counter>::with_config(&StorageConfig {
            page_size: 0,
            ..StorageConfig::default()
        });
        assert_eq!(storage.page_size(), 1);
    }
}
