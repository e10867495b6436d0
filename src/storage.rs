//! A storage is the data structure where components of the same type for all entities are stored.
//!
//! Storages perform no internal locking.
//! The [`World`](crate::World) wraps each storage in a lock,
//! and the pipeline only schedules systems with conflicting access in different stages.

use std::any::Any;

use crate::component::Component;
use crate::config::StorageConfig;
use crate::entity::EntityId;
use crate::error::AccessError;
use crate::property::{Reflect, Value};

mod batch;
pub use batch::{BatchStorage, DynamicBatchStorage};

mod changes;
pub use changes::ChangeTracker;

mod dense;
pub(crate) use dense::DenseVector;
pub use dense::DenseVectorStorage;

mod entity_list;
pub use entity_list::EntityList;

pub mod hierarchy;
pub use hierarchy::{Child, Hierarchy};

mod hierarchical;
pub use hierarchical::{Hierarchical, HierarchicalStorage, LocalGlobal};

mod shared;
pub use shared::{SharedId, SharedSteadyStorage};

mod steady;
pub use steady::SteadyStorage;

#[cfg(test)]
mod tests;

/// Selects the value to access on storages that nest entities.
///
/// Storages without nesting ignore the space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Space {
    /// The value relative to the parent.
    #[default]
    Local,
    /// The value composed with all ancestors.
    Global,
}

/// A storage of one component type, keyed by entity.
pub trait Storage: Send + Sync + Sized + 'static {
    /// The component type stored.
    type Comp: Component;

    /// What [`get`](Self::get) returns for an entity.
    ///
    /// This is the component itself for single-value storages
    /// and a slice of components for batch storages.
    type Output: ?Sized;

    /// Constructs an empty storage.
    fn with_config(config: &StorageConfig) -> Self;

    /// Inserts a component for the entity.
    fn insert(&mut self, entity: EntityId, comp: Self::Comp);

    /// Inserts a component for the entity,
    /// recomputing values derived from the hierarchy immediately.
    fn insert_in(&mut self, entity: EntityId, comp: Self::Comp, _hierarchy: &Hierarchy) {
        self.insert(entity, comp)
    }

    /// Whether the entity has data in this storage.
    fn has(&self, entity: EntityId) -> bool;

    /// Removes all data of the entity. Returns false if there was none.
    fn remove(&mut self, entity: EntityId) -> bool;

    /// Removes all data.
    fn clear(&mut self);

    /// The entities with data in this storage.
    fn entities(&self) -> &[EntityId];

    /// Gets the data of an entity, or `None` if absent.
    fn try_get(&self, entity: EntityId) -> Option<&Self::Output>;

    /// Gets the data of an entity mutably, or `None` if absent.
    ///
    /// Successful access marks the entity as changed.
    fn try_get_mut(&mut self, entity: EntityId) -> Option<&mut Self::Output>;

    /// Gets the data of an entity.
    ///
    /// # Panics
    /// Panics if the entity has no data; callers must check [`has`](Self::has) first.
    fn get(&self, entity: EntityId) -> &Self::Output {
        match self.try_get(entity) {
            Some(output) => output,
            None => panic!(
                "Entity {} has no {} component",
                entity,
                <Self::Comp as Component>::NAME
            ),
        }
    }

    /// Gets the data of an entity mutably.
    ///
    /// # Panics
    /// Panics if the entity has no data; callers must check [`has`](Self::has) first.
    fn get_mut(&mut self, entity: EntityId) -> &mut Self::Output {
        match self.try_get_mut(entity) {
            Some(output) => output,
            None => panic!(
                "Entity {} has no {} component",
                entity,
                <Self::Comp as Component>::NAME
            ),
        }
    }

    /// Gets the `index`th component of the entity in the given space.
    fn element(&self, entity: EntityId, index: usize, space: Space) -> Option<&Self::Comp>;

    /// Gets the `index`th component of the entity mutably in the given space.
    fn element_mut(
        &mut self,
        entity: EntityId,
        index: usize,
        space: Space,
    ) -> Option<&mut Self::Comp>;

    /// Number of components stored for the entity.
    fn batch_len(&self, entity: EntityId) -> usize { usize::from(self.has(entity)) }

    /// The change tracker of this storage.
    fn changes(&self) -> &ChangeTracker;

    /// The change tracker of this storage.
    fn changes_mut(&mut self) -> &mut ChangeTracker;

    /// Whether [`on_system_release`](Self::on_system_release)
    /// must be called after a stage that wrote this storage.
    fn notify_release_write(&self) -> bool { false }

    /// Called after a stage that wrote this storage,
    /// after the hierarchy has flushed its own changes.
    fn on_system_release(&mut self, _hierarchy: &Hierarchy) {}

    /// Whether this storage must see hierarchy structure changes.
    fn follows_hierarchy(&self) -> bool { false }

    /// Receives the entities whose hierarchy relationships changed in the last flush.
    fn flush_hierarchy_changes(&mut self, _hierarchy: &Hierarchy, _changed: &[EntityId]) {}
}

/// A type-erased [`Storage`], as held by the world.
pub trait AnyStorage: Send + Sync {
    /// Upcasts to [`Any`].
    fn as_any(&self) -> &(dyn Any + Send + Sync);

    /// Upcasts to [`Any`].
    fn as_any_mut(&mut self) -> &mut (dyn Any + Send + Sync);

    /// The name of the stored component.
    fn component_name(&self) -> &'static str;

    /// See [`Storage::has`].
    fn has(&self, entity: EntityId) -> bool;

    /// See [`Storage::remove`].
    fn remove(&mut self, entity: EntityId) -> bool;

    /// See [`Storage::clear`].
    fn clear(&mut self);

    /// See [`Storage::entities`].
    fn entities(&self) -> &[EntityId];

    /// See [`Storage::batch_len`].
    fn batch_len(&self, entity: EntityId) -> usize;

    /// See [`Storage::changes`].
    fn changes(&self) -> &ChangeTracker;

    /// See [`Storage::changes_mut`].
    fn changes_mut(&mut self) -> &mut ChangeTracker;

    /// Reads a property of the `element`th component of the entity.
    fn get_property(
        &self,
        entity: EntityId,
        element: usize,
        space: Space,
        property: usize,
    ) -> Result<Value, AccessError>;

    /// Writes a property of the `element`th component of the entity.
    fn set_property(
        &mut self,
        entity: EntityId,
        element: usize,
        space: Space,
        property: usize,
        value: Value,
    ) -> Result<(), AccessError>;

    /// Inserts a default component with the given properties set.
    ///
    /// Nothing is inserted if any property fails to convert.
    /// If `hierarchy` is given, the insertion goes through [`Storage::insert_in`].
    fn insert_dynamic(
        &mut self,
        entity: EntityId,
        properties: Vec<(usize, Value)>,
        hierarchy: Option<&Hierarchy>,
    ) -> Result<(), AccessError>;

    /// See [`Storage::notify_release_write`].
    fn notify_release_write(&self) -> bool;

    /// See [`Storage::on_system_release`].
    fn on_system_release(&mut self, hierarchy: &Hierarchy);

    /// See [`Storage::follows_hierarchy`].
    fn follows_hierarchy(&self) -> bool;

    /// See [`Storage::flush_hierarchy_changes`].
    fn flush_hierarchy_changes(&mut self, hierarchy: &Hierarchy, changed: &[EntityId]);
}

impl dyn AnyStorage {
    /// Downcasts to the storage of `C`, or `None` if this is another component's storage.
    pub fn try_downcast_ref<C: Component>(&self) -> Option<&C::Storage> {
        self.as_any().downcast_ref::<ComponentStorage<C>>().map(|storage| &storage.0)
    }

    /// Downcasts to the storage of `C`, or `None` if this is another component's storage.
    pub fn try_downcast_mut<C: Component>(&mut self) -> Option<&mut C::Storage> {
        self.as_any_mut().downcast_mut::<ComponentStorage<C>>().map(|storage| &mut storage.0)
    }

    /// Downcasts to the storage of `C`.
    pub fn downcast_ref<C: Component>(&self) -> &C::Storage {
        self.try_downcast_ref::<C>().expect("TypeId mismatch")
    }

    /// Downcasts to the storage of `C`.
    pub fn downcast_mut<C: Component>(&mut self) -> &mut C::Storage {
        self.try_downcast_mut::<C>().expect("TypeId mismatch")
    }
}

/// Boxes a new storage for `C`.
pub(crate) fn build<C: Component>(config: &StorageConfig) -> Box<dyn AnyStorage> {
    Box::new(ComponentStorage::<C>(C::Storage::with_config(config)))
}

pub(crate) struct ComponentStorage<C: Component>(pub(crate) C::Storage);

impl<C: Component> AnyStorage for ComponentStorage<C> {
    fn as_any(&self) -> &(dyn Any + Send + Sync) { self }

    fn as_any_mut(&mut self) -> &mut (dyn Any + Send + Sync) { self }

    fn component_name(&self) -> &'static str { C::NAME }

    fn has(&self, entity: EntityId) -> bool { self.0.has(entity) }

    fn remove(&mut self, entity: EntityId) -> bool { self.0.remove(entity) }

    fn clear(&mut self) { self.0.clear() }

    fn entities(&self) -> &[EntityId] { self.0.entities() }

    fn batch_len(&self, entity: EntityId) -> usize { self.0.batch_len(entity) }

    fn changes(&self) -> &ChangeTracker { self.0.changes() }

    fn changes_mut(&mut self) -> &mut ChangeTracker { self.0.changes_mut() }

    fn get_property(
        &self,
        entity: EntityId,
        element: usize,
        space: Space,
        property: usize,
    ) -> Result<Value, AccessError> {
        let comp = self
            .0
            .element(entity, element, space)
            .ok_or(AccessError::NotPresent { component: C::NAME, entity })?;
        match comp.get_by_index(property) {
            Some(value) => Ok(value),
            None => panic!("Property index {} is out of range for {}", property, C::NAME),
        }
    }

    fn set_property(
        &mut self,
        entity: EntityId,
        element: usize,
        space: Space,
        property: usize,
        value: Value,
    ) -> Result<(), AccessError> {
        let comp = self
            .0
            .element_mut(entity, element, space)
            .ok_or(AccessError::NotPresent { component: C::NAME, entity })?;
        comp.set_by_index(property, value).map_err(|kind| mismatch::<C>(property, kind))
    }

    fn insert_dynamic(
        &mut self,
        entity: EntityId,
        properties: Vec<(usize, Value)>,
        hierarchy: Option<&Hierarchy>,
    ) -> Result<(), AccessError> {
        let mut comp = C::default();
        for (property, value) in properties {
            comp.set_by_index(property, value).map_err(|kind| mismatch::<C>(property, kind))?;
        }
        match hierarchy {
            Some(hierarchy) => self.0.insert_in(entity, comp, hierarchy),
            None => self.0.insert(entity, comp),
        }
        Ok(())
    }

    fn notify_release_write(&self) -> bool { self.0.notify_release_write() }

    fn on_system_release(&mut self, hierarchy: &Hierarchy) { self.0.on_system_release(hierarchy) }

    fn follows_hierarchy(&self) -> bool { self.0.follows_hierarchy() }

    fn flush_hierarchy_changes(&mut self, hierarchy: &Hierarchy, changed: &[EntityId]) {
        self.0.flush_hierarchy_changes(hierarchy, changed)
    }
}

fn mismatch<C: Component>(property: usize, kind: crate::property::Kind) -> AccessError {
    AccessError::TypeMismatch {
        component: C::NAME,
        property:  C::properties()[property].name,
        expected:  kind.name(),
    }
}
