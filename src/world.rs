//! The world stores the states of the game.
//!
//! Each registered component has at most one storage per world,
//! and each registered databag has at most one instance.
//! Storages and databags are individually locked,
//! so systems running in parallel only contend on the storages they declared.

use std::sync::Arc;

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use crate::component::{AnyDatabag, ComponentId, DatabagId};
use crate::config::Config;
use crate::entity::{Allocator, EntityId};
use crate::error::AccessError;
use crate::property::Value;
use crate::registry::Registry;
use crate::storage::{AnyStorage, Child, Hierarchy, SharedId, SharedSteadyStorage, Storage};
use crate::{Component, Databag};

/// A storage shared between the world and the systems accessing it.
pub type SharedStorage = Arc<RwLock<Box<dyn AnyStorage>>>;

/// A databag shared between the world and the systems accessing it.
pub type SharedDatabag = Arc<RwLock<Box<dyn AnyDatabag>>>;

/// The data structure that stores all states in the game.
pub struct World {
    registry: Arc<Registry>,
    config:   Config,
    entities: Allocator,
    /// Indexed by [`ComponentId`]; `None` until the storage is created.
    storages: Vec<Option<SharedStorage>>,
    /// Indexed by [`DatabagId`]; `None` until the databag is created.
    databags: Vec<Option<SharedDatabag>>,
}

impl World {
    /// Creates an empty world with the default configuration.
    pub fn new(registry: Arc<Registry>) -> Self { Self::with_config(registry, Config::default()) }

    /// Creates an empty world.
    ///
    /// The hierarchy storage is always created.
    pub fn with_config(registry: Arc<Registry>, config: Config) -> Self {
        let mut world = Self {
            storages: vec![None; registry.components().len()],
            databags: vec![None; registry.databags().len()],
            registry,
            config,
            entities: Allocator::default(),
        };
        world.create_storage_dyn(Registry::CHILD);
        world
    }

    /// The registry this world was created from.
    pub fn registry(&self) -> &Arc<Registry> { &self.registry }

    /// The configuration this world was created with.
    pub fn config(&self) -> &Config { &self.config }

    /// Starts creating an entity.
    pub fn create_entity(&mut self) -> EntityBuilder<'_> {
        let entity = self.entities.allocate();
        EntityBuilder { world: self, entity }
    }

    /// Allocates an entity ID without attaching any components.
    ///
    /// Unlike [`create_entity`](Self::create_entity), this can be called from running systems.
    pub fn allocate_entity(&self) -> EntityId { self.entities.allocate() }

    /// Removes all components of an entity.
    ///
    /// The ID is not recycled.
    /// Children of the entity become roots.
    pub fn destroy_entity(&mut self, entity: EntityId) {
        for (shared, info) in self.storages.iter().zip(self.registry.components()) {
            if let Some(shared) = shared {
                write_storage(shared, info.name()).remove(entity);
            }
        }
    }

    /// The highest allocated entity ID, or null if no entities were allocated.
    pub fn last_entity_id(&self) -> EntityId { self.entities.last() }

    /// The number of allocated entity IDs.
    pub fn entity_count(&self) -> usize { self.entities.len() }

    /// Creates the storage of `C` if it does not exist yet.
    pub fn create_storage<C: Component>(&mut self) {
        let component = self.registry.expect_component_id::<C>();
        self.create_storage_dyn(component);
    }

    /// Creates the storage of a component if it does not exist yet.
    ///
    /// # Panics
    /// Panics if the component is not registered.
    pub fn create_storage_dyn(&mut self, component: ComponentId) {
        let info = match self.registry.component(component) {
            Some(info) => info,
            None => panic!("Cannot create storage for unregistered {component}"),
        };

        let slot = &mut self.storages[component.index()];
        if slot.is_none() {
            let config = self.config.storage(info.name());
            *slot = Some(Arc::new(RwLock::new((info.build_storage)(&config))));
            log::debug!("Created storage of {}", info.name());
        }
    }

    /// The shared handle of a component storage, or `None` if it was not created.
    pub fn get_storage(&self, component: ComponentId) -> Option<&SharedStorage> {
        self.storages.get(component.index())?.as_ref()
    }

    /// Locks a component storage for reading, or returns `None` if it was not created.
    ///
    /// # Panics
    /// Panics if the storage is locked for writing.
    pub fn storage_dyn(
        &self,
        component: ComponentId,
    ) -> Option<RwLockReadGuard<'_, Box<dyn AnyStorage>>> {
        let shared = self.get_storage(component)?;
        Some(read_storage(shared, self.component_name(component)))
    }

    /// Locks a component storage for writing, or returns `None` if it was not created.
    ///
    /// # Panics
    /// Panics if the storage is locked.
    pub fn storage_dyn_mut(
        &self,
        component: ComponentId,
    ) -> Option<RwLockWriteGuard<'_, Box<dyn AnyStorage>>> {
        let shared = self.get_storage(component)?;
        Some(write_storage(shared, self.component_name(component)))
    }

    /// Locks the storage of `C` for reading.
    ///
    /// # Panics
    /// Panics if the storage does not exist or is locked for writing.
    pub fn storage<C: Component>(&self) -> MappedRwLockReadGuard<'_, C::Storage> {
        let guard = read_storage(self.expect_storage::<C>(), C::NAME);
        RwLockReadGuard::map(guard, |storage| storage.downcast_ref::<C>())
    }

    /// Locks the storage of `C` for writing.
    ///
    /// # Panics
    /// Panics if the storage does not exist or is locked.
    pub fn storage_mut<C: Component>(&self) -> MappedRwLockWriteGuard<'_, C::Storage> {
        let guard = write_storage(self.expect_storage::<C>(), C::NAME);
        RwLockWriteGuard::map(guard, |storage| storage.downcast_mut::<C>())
    }

    /// Locks the storage of `C` for reading,
    /// returning `None` if it does not exist or is locked for writing.
    pub fn try_storage<C: Component>(&self) -> Option<MappedRwLockReadGuard<'_, C::Storage>> {
        let guard = self.typed_storage::<C>()?.try_read()?;
        Some(RwLockReadGuard::map(guard, |storage| storage.downcast_ref::<C>()))
    }

    /// Locks the storage of `C` for writing,
    /// returning `None` if it does not exist or is locked.
    pub fn try_storage_mut<C: Component>(
        &self,
    ) -> Option<MappedRwLockWriteGuard<'_, C::Storage>> {
        let guard = self.typed_storage::<C>()?.try_write()?;
        Some(RwLockWriteGuard::map(guard, |storage| storage.downcast_mut::<C>()))
    }

    /// Locks the hierarchy for reading.
    pub fn hierarchy(&self) -> MappedRwLockReadGuard<'_, Hierarchy> { self.storage::<Child>() }

    /// Locks the hierarchy for writing.
    pub fn hierarchy_mut(&self) -> MappedRwLockWriteGuard<'_, Hierarchy> {
        self.storage_mut::<Child>()
    }

    /// Attaches a component to an entity, creating the storage if necessary.
    ///
    /// Storages following the hierarchy compute the global value of the entity
    /// and its descendants immediately.
    pub fn add_component<C: Component>(&mut self, entity: EntityId, comp: C) {
        self.create_storage::<C>();
        if self.registry.expect_component_id::<C>() == Registry::CHILD {
            self.storage_mut::<C>().insert(entity, comp);
        } else {
            let hierarchy = self.hierarchy();
            self.storage_mut::<C>().insert_in(entity, comp, &hierarchy);
        }
    }

    /// Stores a value that entities can share,
    /// creating the storage if necessary.
    pub fn create_shared_component<C>(&mut self, comp: C) -> SharedId
    where
        C: Component<Storage = SharedSteadyStorage<C>>,
    {
        self.create_storage::<C>();
        self.storage_mut::<C>().create_shared(comp)
    }

    /// Attaches an entity to a shared value.
    ///
    /// Returns false if the value was freed or never created.
    pub fn add_shared_component<C>(&mut self, entity: EntityId, shared: SharedId) -> bool
    where
        C: Component<Storage = SharedSteadyStorage<C>>,
    {
        match self.typed_storage::<C>() {
            Some(storage) => {
                let mut guard = write_storage(storage, C::NAME);
                guard.downcast_mut::<C>().insert_shared(entity, shared)
            }
            None => false,
        }
    }

    /// Detaches a component from an entity. Returns false if the entity did not have it.
    pub fn remove_component<C: Component>(&mut self, entity: EntityId) -> bool {
        match self.typed_storage::<C>() {
            Some(shared) => write_storage(shared, C::NAME).remove(entity),
            None => false,
        }
    }

    /// Whether the entity has the component.
    pub fn has_component<C: Component>(&self, entity: EntityId) -> bool {
        match self.typed_storage::<C>() {
            Some(shared) => read_storage(shared, C::NAME).has(entity),
            None => false,
        }
    }

    /// Attaches a default component with the named properties set.
    ///
    /// Nothing is inserted if a property is unknown or a value does not convert.
    ///
    /// # Panics
    /// Panics if the component is not registered.
    pub fn insert_dynamic(
        &mut self,
        entity: EntityId,
        component: ComponentId,
        properties: &[(&str, Value)],
    ) -> Result<(), AccessError> {
        let info = match self.registry.component(component) {
            Some(info) => info,
            None => panic!("Cannot insert unregistered {component}"),
        };
        let name = info.name();
        let resolved = properties
            .iter()
            .map(|(property, value)| match info.property_index(property) {
                Some(index) => Ok((index, value.clone())),
                None => Err(AccessError::UnknownProperty {
                    component: name,
                    property:  property.to_string(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.create_storage_dyn(component);
        let shared = self.get_storage(component).expect("storage was just created");
        if component == Registry::CHILD {
            write_storage(shared, name).insert_dynamic(entity, resolved, None)
        } else {
            let hierarchy = self.hierarchy();
            write_storage(shared, name).insert_dynamic(entity, resolved, Some(&hierarchy))
        }
    }

    /// Sets the databag `D`, creating it if necessary.
    pub fn add_databag<D: Databag>(&mut self, databag: D) {
        let id = self.registry.expect_databag_id::<D>();
        let databag: Box<dyn AnyDatabag> = Box::new(databag);
        self.databags[id.index()] = Some(Arc::new(RwLock::new(databag)));
    }

    /// Creates a databag with its default value if it does not exist yet.
    ///
    /// # Panics
    /// Panics if the databag is not registered.
    pub fn create_databag_dyn(&mut self, databag: DatabagId) {
        let info = match self.registry.databag(databag) {
            Some(info) => info,
            None => panic!("Cannot create unregistered {databag}"),
        };

        let slot = &mut self.databags[databag.index()];
        if slot.is_none() {
            *slot = Some(Arc::new(RwLock::new((info.build)())));
            log::debug!("Created databag {}", info.name());
        }
    }

    /// The shared handle of a databag, or `None` if it was not created.
    pub fn get_databag(&self, databag: DatabagId) -> Option<&SharedDatabag> {
        self.databags.get(databag.index())?.as_ref()
    }

    /// Locks the databag `D` for reading.
    ///
    /// # Panics
    /// Panics if the databag does not exist or is locked for writing.
    pub fn databag<D: Databag>(&self) -> MappedRwLockReadGuard<'_, D> {
        let guard = match self.expect_databag::<D>().try_read() {
            Some(guard) => guard,
            None => panic!(
                "Databag {} is locked exclusively by another system. Maybe scheduler bug?",
                D::NAME
            ),
        };
        RwLockReadGuard::map(guard, |databag| databag.downcast_ref::<D>())
    }

    /// Locks the databag `D` for writing.
    ///
    /// # Panics
    /// Panics if the databag does not exist or is locked.
    pub fn databag_mut<D: Databag>(&self) -> MappedRwLockWriteGuard<'_, D> {
        let guard = match self.expect_databag::<D>().try_write() {
            Some(guard) => guard,
            None => panic!("Databag {} is locked by another system. Maybe scheduler bug?", D::NAME),
        };
        RwLockWriteGuard::map(guard, |databag| databag.downcast_mut::<D>())
    }

    /// Locks the databag `D` for reading,
    /// returning `None` if it does not exist or is locked for writing.
    pub fn try_databag<D: Databag>(&self) -> Option<MappedRwLockReadGuard<'_, D>> {
        let id = self.registry.databag_id::<D>()?;
        let guard = self.get_databag(id)?.try_read()?;
        Some(RwLockReadGuard::map(guard, |databag| databag.downcast_ref::<D>()))
    }

    /// Flushes the structural changes of the hierarchy,
    /// then lets every storage following the hierarchy see them
    /// and recompute its dirty entities.
    pub fn flush_hierarchy(&self) {
        let shared =
            self.get_storage(Registry::CHILD).expect("hierarchy storage is always created");
        let mut guard = write_storage(shared, Child::NAME);
        let changed = guard.downcast_mut::<Child>().flush_hierarchy_changes();

        let guard = RwLockWriteGuard::downgrade(guard);
        let hierarchy = guard.downcast_ref::<Child>();
        for (shared, info) in self.storages.iter().zip(self.registry.components()) {
            if info.id() == Registry::CHILD {
                continue;
            }
            if let Some(shared) = shared {
                let mut storage = write_storage(shared, info.name());
                if storage.follows_hierarchy() {
                    storage.flush_hierarchy_changes(hierarchy, &changed);
                }
            }
        }
    }

    /// Runs the release hooks of the written storages.
    ///
    /// If the hierarchy was written, its changes are flushed before any other hook runs.
    pub fn release(&self, written: &[ComponentId]) {
        if written.contains(&Registry::CHILD) {
            self.flush_hierarchy();
        }

        let hierarchy = self.hierarchy();
        for &component in written {
            if component == Registry::CHILD {
                continue;
            }
            if let Some(mut storage) = self.storage_dyn_mut(component) {
                if storage.notify_release_write() {
                    storage.on_system_release(&hierarchy);
                }
            }
        }
    }

    /// Clears the changed lists of all storages.
    pub fn flush_changes(&self) {
        for (shared, info) in self.storages.iter().zip(self.registry.components()) {
            if let Some(shared) = shared {
                write_storage(shared, info.name()).changes_mut().flush();
            }
        }
    }

    fn component_name(&self, component: ComponentId) -> &'static str {
        self.registry.component(component).map_or("<unregistered>", |info| info.name())
    }

    fn typed_storage<C: Component>(&self) -> Option<&SharedStorage> {
        self.get_storage(self.registry.component_id::<C>()?)
    }

    fn expect_storage<C: Component>(&self) -> &SharedStorage {
        match self.typed_storage::<C>() {
            Some(shared) => shared,
            None => panic!(
                "Storage of {} does not exist in this world. Was it declared by any system?",
                C::NAME
            ),
        }
    }

    fn expect_databag<D: Databag>(&self) -> &SharedDatabag {
        match self.registry.databag_id::<D>().and_then(|id| self.get_databag(id)) {
            Some(shared) => shared,
            None => panic!(
                "Databag {} does not exist in this world. Was it declared by any system?",
                D::NAME
            ),
        }
    }
}

fn read_storage<'s>(
    shared: &'s SharedStorage,
    name: &str,
) -> RwLockReadGuard<'s, Box<dyn AnyStorage>> {
    match shared.try_read() {
        Some(guard) => guard,
        None => panic!(
            "Storage of {name} is locked exclusively by another system. Maybe scheduler bug?"
        ),
    }
}

fn write_storage<'s>(
    shared: &'s SharedStorage,
    name: &str,
) -> RwLockWriteGuard<'s, Box<dyn AnyStorage>> {
    match shared.try_write() {
        Some(guard) => guard,
        None => panic!("Storage of {name} is locked by another system. Maybe scheduler bug?"),
    }
}

/// Creates an entity with components.
#[must_use = "the entity has no components until `with` is called"]
pub struct EntityBuilder<'w> {
    world:  &'w mut World,
    entity: EntityId,
}

impl<'w> EntityBuilder<'w> {
    /// Attaches a component.
    pub fn with<C: Component>(self, comp: C) -> Self {
        self.world.add_component(self.entity, comp);
        self
    }

    /// The ID of the entity being built.
    pub fn id(&self) -> EntityId { self.entity }

    /// Finishes building and returns the entity ID.
    pub fn build(self) -> EntityId { self.entity }
}

#[cfg(test)]
mod tests;
