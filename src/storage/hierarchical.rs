use super::{ChangeTracker, DenseVector, EntityList, Hierarchy, Space, Storage};
use crate::component::Component;
use crate::config::StorageConfig;
use crate::entity::EntityId;

/// A value that composes along the hierarchy.
///
/// Composition need not be commutative:
/// `combine` always applies the parent on the outside of the local value.
pub trait Hierarchical: Clone {
    /// Computes the global value from the local value and the parent's global value.
    fn combine(local: &Self, parent_global: &Self) -> Self;

    /// Computes the local value that yields `global` under `parent_global`.
    fn combine_inverse(global: &Self, parent_global: &Self) -> Self;
}

/// The local and global values of one entity.
#[derive(Debug, Clone)]
pub struct LocalGlobal<T> {
    /// The value relative to the parent.
    pub local:            T,
    /// The value composed with all ancestors. Not authoritative if `is_root`.
    pub global:           T,
    /// Whether the entity has no parent with a value in the same storage.
    pub is_root:          bool,
    /// Whether the entity took part in any hierarchy edge at the last propagation.
    pub has_relationship: bool,
    /// Whether the global value was written, so that the local value must be derived from it.
    pub global_changed:   bool,
}

impl<T: Clone> LocalGlobal<T> {
    fn new(value: T) -> Self {
        Self {
            local:            value.clone(),
            global:           value,
            is_root:          true,
            has_relationship: false,
            global_changed:   false,
        }
    }

    /// The authoritative global value.
    pub fn resolved_global(&self) -> &T { if self.is_root { &self.local } else { &self.global } }
}

/// Stores a local and a global value per entity,
/// recomputing the global values lazily when locals or the hierarchy change.
///
/// Writes mark the entity dirty;
/// [`flush_changes`](Self::flush_changes) recomputes every dirty subtree.
/// Removing a value dirties the children of the entity at the next flush.
#[derive(Debug)]
pub struct HierarchicalStorage<C> {
    storage:  DenseVector<LocalGlobal<C>>,
    dirty:    EntityList,
    /// Entities whose value was removed since the last flush.
    detached: EntityList,
    changes:  ChangeTracker,
}

impl<C: Component + Hierarchical> Default for HierarchicalStorage<C> {
    fn default() -> Self { Self::with_config(&StorageConfig::default()) }
}

impl<C: Component + Hierarchical> HierarchicalStorage<C> {
    /// The local and global record of the entity.
    pub fn local_global(&self, entity: EntityId) -> Option<&LocalGlobal<C>> {
        self.storage.get(entity)
    }

    /// Reads the value of the entity in the given space.
    pub fn get_in(&self, entity: EntityId, space: Space) -> Option<&C> {
        let record = self.storage.get(entity)?;
        Some(match space {
            Space::Local => &record.local,
            Space::Global => record.resolved_global(),
        })
    }

    /// Writes the value of the entity in the given space.
    ///
    /// The entity is marked dirty.
    /// Writing the global value of a non-root entity makes the next propagation
    /// derive its local value from the new global value.
    pub fn get_mut_in(&mut self, entity: EntityId, space: Space) -> Option<&mut C> {
        let record = self.storage.get_mut(entity)?;
        self.dirty.insert(entity);
        self.changes.notify_changed(entity);

        if space == Space::Global && !record.is_root {
            record.global_changed = true;
            Some(&mut record.global)
        } else {
            record.global_changed = false;
            Some(&mut record.local)
        }
    }

    /// Whether the entity awaits propagation.
    pub fn is_dirty(&self, entity: EntityId) -> bool { self.dirty.has(entity) }

    /// Recomputes the entity and its whole subtree.
    pub fn propagate_change(&mut self, entity: EntityId, hierarchy: &Hierarchy) {
        let mut stack = vec![entity];

        while let Some(current) = stack.pop() {
            self.dirty.remove(current);

            let parent = hierarchy.parent_of(current);
            let parent_global = parent
                .and_then(|parent| self.storage.get(parent))
                .map(|record| record.resolved_global().clone());

            if let Some(record) = self.storage.get_mut(current) {
                record.has_relationship =
                    parent.is_some() || hierarchy.children(current).next().is_some();

                match parent_global {
                    None => {
                        record.is_root = true;
                        record.global_changed = false;
                        record.global = record.local.clone();
                    }
                    Some(parent_global) => {
                        record.is_root = false;
                        if record.global_changed {
                            record.local = C::combine_inverse(&record.global, &parent_global);
                            record.global_changed = false;
                        } else {
                            record.global = C::combine(&record.local, &parent_global);
                        }
                    }
                }

                self.changes.notify_changed(current);
            }

            stack.extend(hierarchy.children(current));
        }
    }

    /// Propagates every dirty entity until none is left.
    pub fn flush_changes(&mut self, hierarchy: &Hierarchy) {
        while let Some(entity) = self.detached.pop() {
            for child in hierarchy.children(entity) {
                if self.storage.has(child) {
                    self.dirty.insert(child);
                }
            }
        }

        let mut count = 0_usize;
        while let Some(entity) = self.dirty.pop() {
            self.propagate_change(entity, hierarchy);
            count += 1;
        }
        if count > 0 {
            log::trace!("Propagated {} dirty {} subtrees", count, C::NAME);
        }
    }
}

impl<C: Component + Hierarchical> Storage for HierarchicalStorage<C> {
    type Comp = C;
    type Output = C;

    fn with_config(config: &StorageConfig) -> Self {
        let mut changes = ChangeTracker::default();
        changes.set_tracing(config.trace_changes);
        Self {
            storage: DenseVector::with_capacity(config.pre_allocate),
            dirty: EntityList::default(),
            detached: EntityList::default(),
            changes,
        }
    }

    /// Sets the local value.
    ///
    /// The global value follows at the next flush,
    /// or immediately for entities without relationships.
    /// [`insert_in`](Storage::insert_in) propagates eagerly.
    fn insert(&mut self, entity: EntityId, comp: C) {
        match self.storage.get_mut(entity) {
            Some(record) => {
                record.local = comp;
                record.global_changed = false;
                if !record.has_relationship {
                    record.global = record.local.clone();
                }
            }
            None => {
                self.storage.insert(entity, LocalGlobal::new(comp));
            }
        }

        self.dirty.insert(entity);
        self.changes.notify_changed(entity);
    }

    /// Sets the local value and immediately propagates it down the subtree.
    fn insert_in(&mut self, entity: EntityId, comp: C, hierarchy: &Hierarchy) {
        self.insert(entity, comp);
        self.propagate_change(entity, hierarchy);
    }

    fn has(&self, entity: EntityId) -> bool { self.storage.has(entity) }

    fn remove(&mut self, entity: EntityId) -> bool {
        let removed = self.storage.remove(entity).is_some();
        if removed {
            self.dirty.remove(entity);
            self.detached.insert(entity);
        }
        self.changes.notify_updated(entity);
        removed
    }

    fn clear(&mut self) {
        self.storage.clear();
        self.dirty.clear();
        self.detached.clear();
        self.changes.flush();
    }

    fn entities(&self) -> &[EntityId] { self.storage.entities() }

    fn try_get(&self, entity: EntityId) -> Option<&C> { self.get_in(entity, Space::Local) }

    fn try_get_mut(&mut self, entity: EntityId) -> Option<&mut C> {
        self.get_mut_in(entity, Space::Local)
    }

    fn element(&self, entity: EntityId, index: usize, space: Space) -> Option<&C> {
        if index == 0 {
            self.get_in(entity, space)
        } else {
            None
        }
    }

    fn element_mut(&mut self, entity: EntityId, index: usize, space: Space) -> Option<&mut C> {
        if index == 0 {
            self.get_mut_in(entity, space)
        } else {
            None
        }
    }

    fn changes(&self) -> &ChangeTracker { &self.changes }

    fn changes_mut(&mut self) -> &mut ChangeTracker { &mut self.changes }

    fn notify_release_write(&self) -> bool { true }

    fn on_system_release(&mut self, hierarchy: &Hierarchy) { self.flush_changes(hierarchy) }

    fn follows_hierarchy(&self) -> bool { true }

    fn flush_hierarchy_changes(&mut self, hierarchy: &Hierarchy, changed: &[EntityId]) {
        for &entity in changed {
            if self.storage.has(entity) {
                self.dirty.insert(entity);
            } else {
                for child in hierarchy.children(entity) {
                    if self.storage.has(child) {
                        self.dirty.insert(child);
                    }
                }
            }
        }
        self.flush_changes(hierarchy);
    }
}

#[cfg(test)]
mod tests;
