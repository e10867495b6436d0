//! Parent/child relationships between entities.
//!
//! Each entity in the hierarchy has a [`Child`] record
//! linking it to its parent, its first child and its next sibling.
//! The records form a forest of intrusive singly-linked sibling lists.

use super::{ChangeTracker, DenseVector, EntityList, Space, Storage};
use crate::component::Component;
use crate::config::StorageConfig;
use crate::entity::EntityId;
use crate::property::Reflect;

/// The hierarchy edge record of an entity.
///
/// Only `parent` is meaningful when inserting into a [`Hierarchy`];
/// the sibling links are maintained by the hierarchy itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub struct Child {
    /// The parent entity, or null for roots.
    pub parent:      EntityId,
    /// The head of the children list, or null.
    pub first_child: EntityId,
    /// The next sibling under the same parent, or null.
    pub next:        EntityId,
}

impl Child {
    /// A record that attaches the entity to `parent`.
    pub fn new(parent: EntityId) -> Self {
        Self { parent, first_child: EntityId::NULL, next: EntityId::NULL }
    }

    fn is_meaningless(&self) -> bool { self.parent.is_null() && self.first_child.is_null() }
}

impl Default for Child {
    fn default() -> Self { Self::new(EntityId::NULL) }
}

impl Component for Child {
    const NAME: &'static str = "Child";
    type Storage = Hierarchy;
}

/// The authoritative parent/child graph.
///
/// Structural changes are recorded in a dirty set
/// until [`flush_hierarchy_changes`](Self::flush_hierarchy_changes) hands them to the subscribers.
#[derive(Debug)]
pub struct Hierarchy {
    records: DenseVector<Child>,
    dirty:   EntityList,
    changes: ChangeTracker,
}

impl Default for Hierarchy {
    fn default() -> Self { Self::with_config(&StorageConfig::default()) }
}

impl Hierarchy {
    /// The parent of the entity, if any.
    pub fn parent_of(&self, entity: EntityId) -> Option<EntityId> {
        self.records.get(entity).map(|record| record.parent).filter(|parent| !parent.is_null())
    }

    /// Iterates the direct children of the entity, most recently attached first.
    pub fn children(&self, entity: EntityId) -> Children<'_> {
        let cursor = self.records.get(entity).map_or(EntityId::NULL, |record| record.first_child);
        Children { hierarchy: self, cursor }
    }

    /// Iterates the ancestors of the entity, from the parent up to the root.
    pub fn ancestors(&self, entity: EntityId) -> Ancestors<'_> {
        Ancestors { hierarchy: self, cursor: self.parent_of(entity).unwrap_or(EntityId::NULL) }
    }

    /// Calls `visitor` on each child until it returns false.
    pub fn for_each_child(&self, entity: EntityId, mut visitor: impl FnMut(EntityId) -> bool) {
        for child in self.children(entity) {
            if !visitor(child) {
                break;
            }
        }
    }

    /// Calls `visitor` on each ancestor until it returns false.
    pub fn for_each_parent(&self, entity: EntityId, mut visitor: impl FnMut(EntityId) -> bool) {
        for parent in self.ancestors(entity) {
            if !visitor(parent) {
                break;
            }
        }
    }

    /// The entities whose relationships changed since the last flush.
    pub fn pending_changes(&self) -> &[EntityId] { self.dirty.as_slice() }

    /// Drains the dirty set.
    ///
    /// The returned entities must be passed to every storage that
    /// [follows the hierarchy](Storage::follows_hierarchy).
    pub fn flush_hierarchy_changes(&mut self) -> Vec<EntityId> {
        let changed = self.dirty.as_slice().to_vec();
        self.dirty.clear();
        if !changed.is_empty() {
            log::trace!("Flushed {} hierarchy changes", changed.len());
        }
        changed
    }

    fn record(&self, entity: EntityId) -> &Child {
        match self.records.get(entity) {
            Some(record) => record,
            None => panic!("Hierarchy record of {entity} is missing, linkage is corrupted"),
        }
    }

    fn record_mut(&mut self, entity: EntityId) -> &mut Child {
        match self.records.get_mut(entity) {
            Some(record) => record,
            None => panic!("Hierarchy record of {entity} is missing, linkage is corrupted"),
        }
    }

    /// Splices the entity out of its parent's children list.
    fn unlink_from_parent(&mut self, entity: EntityId) {
        let Some(record) = self.records.get(entity) else { return };
        let (parent, next) = (record.parent, record.next);
        if parent.is_null() {
            return;
        }

        if self.record(parent).first_child == entity {
            self.record_mut(parent).first_child = next;
        } else {
            let mut cursor = self.record(parent).first_child;
            loop {
                assert!(!cursor.is_null(), "Entity {entity} is missing from the children of {parent}");
                let sibling = self.record_mut(cursor);
                if sibling.next == entity {
                    sibling.next = next;
                    break;
                }
                cursor = sibling.next;
            }
        }

        let record = self.record_mut(entity);
        record.parent = EntityId::NULL;
        record.next = EntityId::NULL;

        self.dirty.insert(parent);
        self.collect_if_meaningless(parent);
    }

    /// Drops a record that has neither parent nor children.
    fn collect_if_meaningless(&mut self, entity: EntityId) {
        if self.records.get(entity).map_or(false, Child::is_meaningless) {
            self.records.remove(entity);
            self.changes.notify_updated(entity);
            self.dirty.insert(entity);
        }
    }
}

impl Storage for Hierarchy {
    type Comp = Child;
    type Output = Child;

    fn with_config(config: &StorageConfig) -> Self {
        let mut changes = ChangeTracker::default();
        changes.set_tracing(config.trace_changes);
        Self {
            records: DenseVector::with_capacity(config.pre_allocate),
            dirty: EntityList::default(),
            changes,
        }
    }

    /// Attaches the entity to `child.parent`, or detaches it if the parent is null.
    ///
    /// # Panics
    /// Panics if the new parent is the entity itself or one of its descendants.
    fn insert(&mut self, entity: EntityId, child: Child) {
        let parent = child.parent;

        match self.records.get(entity) {
            Some(record) if record.parent == parent => return,
            None if parent.is_null() => return,
            _ => {}
        }

        if !parent.is_null() {
            assert!(parent != entity, "Entity {entity} cannot be its own parent");
            for ancestor in self.ancestors(parent) {
                assert!(
                    ancestor != entity,
                    "Entity {parent} cannot become the parent of its ancestor {entity}"
                );
            }
        }

        self.unlink_from_parent(entity);
        self.dirty.insert(entity);
        self.changes.notify_changed(entity);

        if parent.is_null() {
            self.collect_if_meaningless(entity);
            return;
        }

        if !self.records.has(parent) {
            self.records.insert(parent, Child::default());
        }
        let sibling = self.record(parent).first_child;

        match self.records.get_mut(entity) {
            Some(record) => {
                record.parent = parent;
                record.next = sibling;
            }
            None => {
                self.records.insert(
                    entity,
                    Child { parent, first_child: EntityId::NULL, next: sibling },
                );
            }
        }

        self.record_mut(parent).first_child = entity;
        self.dirty.insert(parent);
    }

    fn has(&self, entity: EntityId) -> bool { self.records.has(entity) }

    /// Detaches the entity from its parent and all its children.
    ///
    /// Children without children of their own are dropped from the hierarchy;
    /// the others become roots.
    fn remove(&mut self, entity: EntityId) -> bool {
        if !self.records.has(entity) {
            return false;
        }

        self.unlink_from_parent(entity);

        let mut child = self.record(entity).first_child;
        while !child.is_null() {
            let record = self.record_mut(child);
            let next = record.next;
            record.parent = EntityId::NULL;
            record.next = EntityId::NULL;

            self.dirty.insert(child);
            self.collect_if_meaningless(child);
            child = next;
        }

        self.records.remove(entity);
        self.dirty.insert(entity);
        self.changes.notify_updated(entity);
        true
    }

    fn clear(&mut self) {
        for &entity in self.records.entities() {
            self.dirty.insert(entity);
        }
        self.records.clear();
        self.changes.flush();
    }

    fn entities(&self) -> &[EntityId] { self.records.entities() }

    fn try_get(&self, entity: EntityId) -> Option<&Child> { self.records.get(entity) }

    fn try_get_mut(&mut self, entity: EntityId) -> Option<&mut Child> {
        panic!(
            "The Child record of entity {entity} cannot be mutated in place; use Hierarchy::insert \
             or Hierarchy::remove"
        )
    }

    fn element(&self, entity: EntityId, index: usize, _: Space) -> Option<&Child> {
        if index == 0 {
            self.records.get(entity)
        } else {
            None
        }
    }

    fn element_mut(&mut self, entity: EntityId, _: usize, _: Space) -> Option<&mut Child> {
        self.try_get_mut(entity)
    }

    fn changes(&self) -> &ChangeTracker { &self.changes }

    fn changes_mut(&mut self) -> &mut ChangeTracker { &mut self.changes }

    fn notify_release_write(&self) -> bool { true }
}

/// Iterator over the direct children of an entity.
pub struct Children<'h> {
    hierarchy: &'h Hierarchy,
    cursor:    EntityId,
}

impl<'h> Iterator for Children<'h> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        if self.cursor.is_null() {
            return None;
        }
        let current = self.cursor;
        self.cursor =
            self.hierarchy.records.get(current).map_or(EntityId::NULL, |record| record.next);
        Some(current)
    }
}

/// Iterator over the ancestors of an entity.
pub struct Ancestors<'h> {
    hierarchy: &'h Hierarchy,
    cursor:    EntityId,
}

impl<'h> Iterator for Ancestors<'h> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        if self.cursor.is_null() {
            return None;
        }
        let current = self.cursor;
        self.cursor = self.hierarchy.parent_of(current).unwrap_or(EntityId::NULL);
        Some(current)
    }
}
