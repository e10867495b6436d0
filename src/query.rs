//! Runtime-composed iteration over multiple storages.
//!
//! A [`DynamicQuery`] is composed from component IDs instead of types,
//! so that systems declared at runtime can access components.
//! Between [`begin`](DynamicQuery::begin) and [`end`](DynamicQuery::end),
//! the query holds a lock on each storage it accesses
//! and yields the matching entities in ascending order.

use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::RawRwLock;

use crate::component::{Component, ComponentId};
use crate::entity::EntityId;
use crate::error::{AccessError, QueryError};
use crate::property::Value;
use crate::registry::Registry;
use crate::storage::{AnyStorage, Space, Storage};
use crate::world::{SharedStorage, World};

/// How a component constrains the matched entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// The entity must have the component.
    With,
    /// The entity may or may not have the component.
    Maybe,
    /// The entity must not have the component.
    Without,
    /// The entity must have the component,
    /// and it must have changed since the storage last flushed its changes.
    ///
    /// Nothing matches unless the storage traces changes.
    Changed,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    component: ComponentId,
    mutable:   bool,
    mode:      FetchMode,
}

/// Iterates the entities matching a runtime-composed set of components.
///
/// ```
/// # use tessera::{query::DynamicQuery, World};
/// # fn run(world: &World, query: &mut DynamicQuery) {
/// query.begin(world);
/// while !query.is_done() {
///     let _health = query.access(0).get("current");
///     query.next_entity();
/// }
/// query.end();
/// # }
/// ```
pub struct DynamicQuery {
    registry:  Arc<Registry>,
    slots:     Vec<Slot>,
    accessors: Vec<AccessComponent>,
    built:     bool,
    valid:     bool,
    begun:     bool,
    current:   EntityId,
    last:      EntityId,
}

impl DynamicQuery {
    /// Creates an empty query.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            slots: Vec::new(),
            accessors: Vec::new(),
            built: false,
            valid: true,
            begun: false,
            current: EntityId::NULL,
            last: EntityId::NULL,
        }
    }

    /// Requires matched entities to have the component.
    ///
    /// Mutable components can be written through their [`AccessComponent`].
    pub fn add_component(
        &mut self,
        component: ComponentId,
        mutable: bool,
    ) -> Result<(), QueryError> {
        self.push(Slot { component, mutable, mode: FetchMode::With })
    }

    /// Fetches the component if the matched entity has it.
    pub fn maybe_component(
        &mut self,
        component: ComponentId,
        mutable: bool,
    ) -> Result<(), QueryError> {
        self.push(Slot { component, mutable, mode: FetchMode::Maybe })
    }

    /// Requires matched entities to have the component with a change
    /// not yet flushed.
    ///
    /// The storage must trace changes,
    /// e.g. through [`watches_component`](crate::SystemDescriptor::watches_component).
    pub fn changed_component(
        &mut self,
        component: ComponentId,
        mutable: bool,
    ) -> Result<(), QueryError> {
        self.push(Slot { component, mutable, mode: FetchMode::Changed })
    }

    /// Requires matched entities not to have the component.
    pub fn without_component(&mut self, component: ComponentId) -> Result<(), QueryError> {
        self.push(Slot { component, mutable: false, mode: FetchMode::Without })
    }

    fn push(&mut self, slot: Slot) -> Result<(), QueryError> {
        if !self.valid {
            return Err(QueryError::Invalid);
        }
        if self.built {
            return Err(QueryError::AlreadyBuilt);
        }
        if self.registry.component(slot.component).is_none() {
            log::error!(
                "Dynamic query refers to unknown {}; the query is now invalid",
                slot.component
            );
            self.valid = false;
            return Err(QueryError::UnknownComponent(slot.component));
        }

        self.slots.push(slot);
        Ok(())
    }

    /// Freezes the component list. Calling this again has no effect.
    pub fn build(&mut self) {
        if self.built {
            return;
        }
        self.built = true;

        let registry = &self.registry;
        self.accessors = self
            .slots
            .iter()
            .map(|slot| AccessComponent::new(Arc::clone(registry), *slot))
            .collect();
    }

    /// Whether [`build`](Self::build) has been called.
    pub fn is_built(&self) -> bool { self.built }

    /// Whether every component added so far was valid.
    pub fn is_valid(&self) -> bool { self.valid }

    /// Locks the storages and moves to the first matching entity.
    ///
    /// The query is built if it was not.
    ///
    /// # Panics
    /// Panics if the query is invalid, a storage is missing,
    /// or a storage is locked by another system.
    pub fn begin(&mut self, world: &World) {
        if let Err(err) = self.try_begin(world) {
            panic!("Cannot begin dynamic query: {err}");
        }
    }

    /// Locks the storages and moves to the first matching entity,
    /// returning an error if the query is invalid or a storage is missing.
    ///
    /// # Panics
    /// Panics if the query has already begun or a storage is locked by another system.
    pub fn try_begin(&mut self, world: &World) -> Result<(), QueryError> {
        assert!(!self.begun, "The dynamic query has already begun; call end() first");
        if !self.valid {
            return Err(QueryError::Invalid);
        }
        self.build();

        let mut guards = Vec::with_capacity(self.accessors.len());
        for accessor in &self.accessors {
            let shared = world
                .get_storage(accessor.component)
                .ok_or(QueryError::MissingStorage(accessor.name))?;
            guards.push(Guard::lock(shared, accessor.name, accessor.mutable));
        }

        for (accessor, guard) in self.accessors.iter_mut().zip(guards) {
            accessor.guard = Some(guard);
        }
        self.begun = true;
        self.last = world.last_entity_id();
        self.seek(0);
        Ok(())
    }

    /// Moves to the next matching entity and returns it,
    /// or returns null if there are no more entities.
    ///
    /// # Panics
    /// Panics if the query has not begun.
    pub fn next_entity(&mut self) -> EntityId {
        assert!(self.begun, "The dynamic query has not begun");
        if !self.current.is_null() {
            self.seek(self.current.0 + 1);
        }
        self.current
    }

    /// The entity the query is positioned at, or null when done.
    pub fn current_entity(&self) -> EntityId { self.current }

    /// Whether all matching entities have been visited.
    pub fn is_done(&self) -> bool { self.current.is_null() }

    /// Releases the storage locks.
    pub fn end(&mut self) {
        for accessor in &mut self.accessors {
            accessor.guard = None;
            accessor.entity = EntityId::NULL;
        }
        self.begun = false;
        self.current = EntityId::NULL;
        self.last = EntityId::NULL;
    }

    /// Ends the query and removes all components,
    /// so that it can be composed again.
    pub fn reset(&mut self) {
        self.end();
        self.slots.clear();
        self.accessors.clear();
        self.built = false;
        self.valid = true;
    }

    /// The number of accessors, one per added component.
    pub fn access_count(&self) -> usize { self.accessors.len() }

    /// The accessor of the `index`th added component.
    ///
    /// # Panics
    /// Panics if the query is not built or the index is out of range.
    pub fn access(&self, index: usize) -> &AccessComponent { &self.accessors[index] }

    /// The accessor of the `index`th added component.
    ///
    /// # Panics
    /// Panics if the query is not built or the index is out of range.
    pub fn access_mut(&mut self, index: usize) -> &mut AccessComponent {
        &mut self.accessors[index]
    }

    fn seek(&mut self, from: u32) {
        let mut found = EntityId::NULL;
        if !self.last.is_null() {
            for id in from..=self.last.0 {
                let entity = EntityId(id);
                if self.accessors.iter().all(|accessor| accessor.matches(entity)) {
                    found = entity;
                    break;
                }
            }
        }

        self.current = found;
        for accessor in &mut self.accessors {
            accessor.entity = found;
        }
    }
}

enum Guard {
    Read(ArcRwLockReadGuard<RawRwLock, Box<dyn AnyStorage>>),
    Write(ArcRwLockWriteGuard<RawRwLock, Box<dyn AnyStorage>>),
}

impl Guard {
    fn lock(shared: &SharedStorage, name: &str, mutable: bool) -> Self {
        if mutable {
            match shared.try_write_arc() {
                Some(guard) => Self::Write(guard),
                None => {
                    panic!("Storage of {name} is locked by another system. Maybe scheduler bug?")
                }
            }
        } else {
            match shared.try_read_arc() {
                Some(guard) => Self::Read(guard),
                None => panic!(
                    "Storage of {name} is locked exclusively by another system. Maybe scheduler bug?"
                ),
            }
        }
    }

    fn storage(&self) -> &(dyn AnyStorage + 'static) {
        match self {
            Self::Read(guard) => &***guard,
            Self::Write(guard) => &***guard,
        }
    }

    fn storage_mut(&mut self) -> Option<&mut (dyn AnyStorage + 'static)> {
        match self {
            Self::Read(_) => None,
            Self::Write(guard) => Some(&mut ***guard),
        }
    }
}

/// Accesses one component of the entity a [`DynamicQuery`] is positioned at.
pub struct AccessComponent {
    registry:  Arc<Registry>,
    component: ComponentId,
    name:      &'static str,
    mutable:   bool,
    mode:      FetchMode,
    space:     Space,
    guard:     Option<Guard>,
    entity:    EntityId,
}

impl AccessComponent {
    fn new(registry: Arc<Registry>, slot: Slot) -> Self {
        let name = registry.component(slot.component).map_or("<unknown>", |info| info.name());
        Self {
            registry,
            component: slot.component,
            name,
            mutable: slot.mutable,
            mode: slot.mode,
            space: Space::Local,
            guard: None,
            entity: EntityId::NULL,
        }
    }

    /// The accessed component.
    pub fn component_id(&self) -> ComponentId { self.component }

    /// The name of the accessed component.
    pub fn name(&self) -> &'static str { self.name }

    /// Whether the component can be written.
    pub fn is_mutable(&self) -> bool { self.mutable }

    /// How the component constrains matched entities.
    pub fn mode(&self) -> FetchMode { self.mode }

    /// The space in which hierarchical components are accessed.
    pub fn space(&self) -> Space { self.space }

    /// Selects the space in which hierarchical components are accessed.
    pub fn set_space(&mut self, space: Space) { self.space = space; }

    /// Whether the current entity has the component.
    pub fn is_valid(&self) -> bool {
        match &self.guard {
            Some(guard) => {
                !self.entity.is_null()
                    && self.mode != FetchMode::Without
                    && guard.storage().has(self.entity)
            }
            None => false,
        }
    }

    /// The number of components the current entity has in this storage.
    pub fn batch_len(&self) -> usize {
        match &self.guard {
            Some(guard) if self.is_valid() => guard.storage().batch_len(self.entity),
            _ => 0,
        }
    }

    /// Reads a property of the component.
    pub fn get(&self, property: &str) -> Result<Value, AccessError> { self.get_at(0, property) }

    /// Reads a property of the `element`th component in a batch.
    pub fn get_at(&self, element: usize, property: &str) -> Result<Value, AccessError> {
        let property = self.property_index(property)?;
        let guard = self.guard.as_ref().ok_or(AccessError::Unbound { component: self.name })?;
        self.ensure_present()?;
        guard.storage().get_property(self.entity, element, self.space, property)
    }

    /// Writes a property of the component.
    ///
    /// Fails without changing anything if the component was added as immutable.
    pub fn set(&mut self, property: &str, value: Value) -> Result<(), AccessError> {
        self.set_at(0, property, value)
    }

    /// Writes a property of the `element`th component in a batch.
    pub fn set_at(
        &mut self,
        element: usize,
        property: &str,
        value: Value,
    ) -> Result<(), AccessError> {
        self.ensure_writable()?;
        let property = self.property_index(property)?;
        self.ensure_present()?;

        let (entity, space, component) = (self.entity, self.space, self.name);
        let storage = self
            .guard
            .as_mut()
            .and_then(Guard::storage_mut)
            .ok_or(AccessError::Unbound { component })?;
        storage.set_property(entity, element, space, property, value)
    }

    /// Reads the component as its Rust type.
    ///
    /// Returns `None` if the current entity does not have it.
    ///
    /// # Panics
    /// Panics if `C` is not the accessed component.
    pub fn read<C: Component>(&self) -> Option<&C> {
        if !self.is_valid() {
            return None;
        }
        let storage = match self.guard.as_ref()?.storage().try_downcast_ref::<C>() {
            Some(storage) => storage,
            None => panic!("Component {} cannot be accessed as {}", self.name, C::NAME),
        };
        storage.element(self.entity, 0, self.space)
    }

    /// Writes the component as its Rust type.
    ///
    /// # Panics
    /// Panics if `C` is not the accessed component.
    pub fn write<C: Component>(&mut self) -> Result<&mut C, AccessError> {
        self.ensure_writable()?;
        self.ensure_present()?;

        let (entity, space, component) = (self.entity, self.space, self.name);
        let storage = self
            .guard
            .as_mut()
            .and_then(Guard::storage_mut)
            .ok_or(AccessError::Unbound { component })?;
        let storage = match storage.try_downcast_mut::<C>() {
            Some(storage) => storage,
            None => panic!("Component {component} cannot be accessed as {}", C::NAME),
        };
        storage.element_mut(entity, 0, space).ok_or(AccessError::NotPresent { component, entity })
    }

    fn property_index(&self, property: &str) -> Result<usize, AccessError> {
        self.registry.property_index(self.component, property).ok_or_else(|| {
            AccessError::UnknownProperty { component: self.name, property: property.to_string() }
        })
    }

    fn ensure_writable(&self) -> Result<(), AccessError> {
        if !self.mutable {
            return Err(AccessError::Immutable { component: self.name });
        }
        if self.component == Registry::CHILD {
            return Err(AccessError::ReadOnly { component: self.name });
        }
        Ok(())
    }

    fn ensure_present(&self) -> Result<(), AccessError> {
        if self.guard.is_none() {
            return Err(AccessError::Unbound { component: self.name });
        }
        if !self.is_valid() {
            return Err(AccessError::NotPresent { component: self.name, entity: self.entity });
        }
        Ok(())
    }

    fn matches(&self, entity: EntityId) -> bool {
        let Some(guard) = &self.guard else { return false };
        match self.mode {
            FetchMode::With => guard.storage().has(entity),
            FetchMode::Without => !guard.storage().has(entity),
            FetchMode::Maybe => true,
            FetchMode::Changed => {
                let storage = guard.storage();
                storage.has(entity) && storage.changes().is_changed(entity)
            }
        }
    }
}
