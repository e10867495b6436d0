//! The registry of component, databag, system and bundle types.
//!
//! A registry is populated once during initialization through a [`RegistryBuilder`]
//! and shared immutably afterwards.
//! It assigns dense IDs to every registered item
//! and indexes component properties by name.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::component::{AnyDatabag, ComponentId, DatabagId};
use crate::config::StorageConfig;
use crate::error::RegistryError;
use crate::property::{PropertyInfo, Reflect};
use crate::storage::{self, AnyStorage, Child};
use crate::system::{AccessTarget, BundleDescriptor, SystemAccess, SystemDescriptor};
use crate::{Component, Databag};

/// Identifies a registered system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SystemId(pub u32);

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "system #{}", self.0) }
}

/// Describes a registered component type.
pub struct ComponentInfo {
    id:                        ComponentId,
    name:                      &'static str,
    type_id:                   TypeId,
    properties:                &'static [PropertyInfo],
    property_index:            IndexMap<&'static str, usize>,
    pub(crate) build_storage: fn(&StorageConfig) -> Box<dyn AnyStorage>,
}

impl ComponentInfo {
    fn new<C: Component>(id: ComponentId) -> Self {
        Self {
            id,
            name: C::NAME,
            type_id: TypeId::of::<C>(),
            properties: C::properties(),
            property_index: index_properties(C::properties()),
            build_storage: storage::build::<C>,
        }
    }

    /// The ID of the component.
    pub fn id(&self) -> ComponentId { self.id }

    /// The name of the component.
    pub fn name(&self) -> &'static str { self.name }

    /// The Rust type of the component.
    pub fn type_id(&self) -> TypeId { self.type_id }

    /// The reflected properties of the component.
    pub fn properties(&self) -> &'static [PropertyInfo] { self.properties }

    /// Resolves a property name to its index.
    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.property_index.get(name).copied()
    }
}

impl fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// Describes a registered databag type.
pub struct DatabagInfo {
    id:                 DatabagId,
    name:               &'static str,
    type_id:            TypeId,
    properties:         &'static [PropertyInfo],
    property_index:     IndexMap<&'static str, usize>,
    pub(crate) build:  fn() -> Box<dyn AnyDatabag>,
}

impl DatabagInfo {
    fn new<D: Databag>(id: DatabagId) -> Self {
        Self {
            id,
            name: D::NAME,
            type_id: TypeId::of::<D>(),
            properties: D::properties(),
            property_index: index_properties(D::properties()),
            build: build_databag::<D>,
        }
    }

    /// The ID of the databag.
    pub fn id(&self) -> DatabagId { self.id }

    /// The name of the databag.
    pub fn name(&self) -> &'static str { self.name }

    /// The Rust type of the databag.
    pub fn type_id(&self) -> TypeId { self.type_id }

    /// The reflected properties of the databag.
    pub fn properties(&self) -> &'static [PropertyInfo] { self.properties }

    /// Resolves a property name to its index.
    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.property_index.get(name).copied()
    }
}

impl fmt::Debug for DatabagInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DatabagInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn build_databag<D: Databag>() -> Box<dyn AnyDatabag> { Box::new(D::default()) }

fn index_properties(properties: &'static [PropertyInfo]) -> IndexMap<&'static str, usize> {
    properties.iter().enumerate().map(|(index, info)| (info.name, index)).collect()
}

/// A registered system with its resolved access.
#[derive(Debug)]
pub struct SystemInfo {
    id:         SystemId,
    descriptor: SystemDescriptor,
    access:     SystemAccess,
    watched:    Vec<ComponentId>,
}

impl SystemInfo {
    /// The ID of the system.
    pub fn id(&self) -> SystemId { self.id }

    /// The unique name of the system.
    pub fn name(&self) -> &str { &self.descriptor.name }

    /// The human-readable description.
    pub fn description(&self) -> &str { &self.descriptor.description }

    /// The declaration of the system.
    pub fn descriptor(&self) -> &SystemDescriptor { &self.descriptor }

    /// The components and databags accessed by the system.
    pub fn access(&self) -> &SystemAccess { &self.access }

    /// The components whose changes the system watches.
    pub fn watched(&self) -> &[ComponentId] { &self.watched }
}

/// All registered types of a process.
#[derive(Debug)]
pub struct Registry {
    components:      Vec<ComponentInfo>,
    component_types: HashMap<TypeId, ComponentId>,
    component_names: HashMap<&'static str, ComponentId>,
    databags:        Vec<DatabagInfo>,
    databag_types:   HashMap<TypeId, DatabagId>,
    databag_names:   HashMap<&'static str, DatabagId>,
    systems:         IndexMap<String, SystemInfo>,
    bundles:         IndexMap<String, BundleDescriptor>,
}

impl Registry {
    /// The ID of [`Child`], which is registered in every registry.
    pub const CHILD: ComponentId = ComponentId(0);

    /// Resolves a component type.
    pub fn component_id<C: Component>(&self) -> Option<ComponentId> {
        self.component_types.get(&TypeId::of::<C>()).copied()
    }

    /// Resolves a component type.
    ///
    /// # Panics
    /// Panics if the component is not registered.
    pub fn expect_component_id<C: Component>(&self) -> ComponentId {
        match self.component_id::<C>() {
            Some(id) => id,
            None => panic!("Component {} is not registered", C::NAME),
        }
    }

    /// Resolves a component name.
    pub fn component_id_by_name(&self, name: &str) -> Option<ComponentId> {
        self.component_names.get(name).copied()
    }

    /// Describes a component.
    pub fn component(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.components.get(id.index())
    }

    /// All registered components in ID order.
    pub fn components(&self) -> &[ComponentInfo] { &self.components }

    /// Resolves a property name of a component.
    pub fn property_index(&self, component: ComponentId, name: &str) -> Option<usize> {
        self.component(component)?.property_index(name)
    }

    /// Resolves a databag type.
    pub fn databag_id<D: Databag>(&self) -> Option<DatabagId> {
        self.databag_types.get(&TypeId::of::<D>()).copied()
    }

    /// Resolves a databag type.
    ///
    /// # Panics
    /// Panics if the databag is not registered.
    pub fn expect_databag_id<D: Databag>(&self) -> DatabagId {
        match self.databag_id::<D>() {
            Some(id) => id,
            None => panic!("Databag {} is not registered", D::NAME),
        }
    }

    /// Resolves a databag name.
    pub fn databag_id_by_name(&self, name: &str) -> Option<DatabagId> {
        self.databag_names.get(name).copied()
    }

    /// Describes a databag.
    pub fn databag(&self, id: DatabagId) -> Option<&DatabagInfo> { self.databags.get(id.index()) }

    /// All registered databags in ID order.
    pub fn databags(&self) -> &[DatabagInfo] { &self.databags }

    /// Resolves a system name.
    pub fn system_id(&self, name: &str) -> Option<SystemId> {
        self.systems.get_index_of(name).map(|index| SystemId(index as u32))
    }

    /// Describes a system.
    pub fn system(&self, id: SystemId) -> Option<&SystemInfo> {
        self.systems.get_index(id.0 as usize).map(|(_, info)| info)
    }

    /// Describes a system by name.
    pub fn system_by_name(&self, name: &str) -> Option<&SystemInfo> { self.systems.get(name) }

    /// All registered systems in ID order.
    pub fn systems(&self) -> impl Iterator<Item = &SystemInfo> { self.systems.values() }

    /// Number of registered systems.
    pub fn system_count(&self) -> usize { self.systems.len() }

    /// Describes a bundle by name.
    pub fn bundle(&self, name: &str) -> Option<&BundleDescriptor> { self.bundles.get(name) }

    /// All registered bundles in registration order.
    pub fn bundles(&self) -> impl Iterator<Item = &BundleDescriptor> { self.bundles.values() }
}

/// Populates a [`Registry`].
#[derive(Debug)]
pub struct RegistryBuilder {
    registry: Registry,
}

impl Default for RegistryBuilder {
    fn default() -> Self { Self::new() }
}

impl RegistryBuilder {
    /// Creates a builder with [`Child`] already registered.
    pub fn new() -> Self {
        let mut builder = Self {
            registry: Registry {
                components:      Vec::new(),
                component_types: HashMap::new(),
                component_names: HashMap::new(),
                databags:        Vec::new(),
                databag_types:   HashMap::new(),
                databag_names:   HashMap::new(),
                systems:         IndexMap::new(),
                bundles:         IndexMap::new(),
            },
        };
        let child = builder.register_component::<Child>().expect("empty registry has no duplicates");
        debug_assert_eq!(child, Registry::CHILD);
        builder
    }

    /// Registers a component type.
    pub fn register_component<C: Component>(&mut self) -> Result<ComponentId, RegistryError> {
        let registry = &mut self.registry;
        if registry.component_types.contains_key(&TypeId::of::<C>())
            || registry.component_names.contains_key(C::NAME)
        {
            return Err(duplicate("component", C::NAME));
        }

        let id = ComponentId(registry.components.len() as u32);
        registry.components.push(ComponentInfo::new::<C>(id));
        registry.component_types.insert(TypeId::of::<C>(), id);
        registry.component_names.insert(C::NAME, id);
        log::debug!("Registered component {} as {}", C::NAME, id);
        Ok(id)
    }

    /// Registers a databag type.
    pub fn register_databag<D: Databag>(&mut self) -> Result<DatabagId, RegistryError> {
        let registry = &mut self.registry;
        if registry.databag_types.contains_key(&TypeId::of::<D>())
            || registry.databag_names.contains_key(D::NAME)
        {
            return Err(duplicate("databag", D::NAME));
        }

        let id = DatabagId(registry.databags.len() as u32);
        registry.databags.push(DatabagInfo::new::<D>(id));
        registry.databag_types.insert(TypeId::of::<D>(), id);
        registry.databag_names.insert(D::NAME, id);
        log::debug!("Registered databag {} as {}", D::NAME, id);
        Ok(id)
    }

    /// Registers a system.
    ///
    /// Every component and databag the system accesses must already be registered.
    pub fn register_system(
        &mut self,
        descriptor: SystemDescriptor,
    ) -> Result<SystemId, RegistryError> {
        if self.registry.systems.contains_key(&descriptor.name) {
            return Err(duplicate("system", &descriptor.name));
        }

        let mut access = SystemAccess::default();
        for request in &descriptor.accesses {
            match self.resolve(&descriptor.name, request.target)? {
                Resolved::Component(id) => access.add_component(id, request.mutable),
                Resolved::Databag(id) => access.add_databag(id, request.mutable),
            }
        }

        let mut watched = Vec::new();
        for &target in &descriptor.watched {
            if let Resolved::Component(id) = self.resolve(&descriptor.name, target)? {
                watched.push(id);
            }
        }

        let id = SystemId(self.registry.systems.len() as u32);
        log::debug!("Registered system {} as {}", descriptor.name, id);
        self.registry
            .systems
            .insert(descriptor.name.clone(), SystemInfo { id, descriptor, access, watched });
        Ok(id)
    }

    /// Registers a bundle.
    ///
    /// Member systems are resolved when a pipeline is built,
    /// so they may be registered later.
    pub fn register_bundle(&mut self, bundle: BundleDescriptor) -> Result<(), RegistryError> {
        if self.registry.bundles.contains_key(&bundle.name) {
            return Err(duplicate("bundle", &bundle.name));
        }
        self.registry.bundles.insert(bundle.name.clone(), bundle);
        Ok(())
    }

    /// The registrations so far, for resolving IDs before the registry is frozen.
    pub fn registry(&self) -> &Registry { &self.registry }

    /// Freezes the registry.
    pub fn build(self) -> Arc<Registry> { Arc::new(self.registry) }

    fn resolve(&self, system: &str, target: AccessTarget) -> Result<Resolved, RegistryError> {
        let registry = &self.registry;
        let unregistered = |kind, name| RegistryError::Unregistered {
            system: system.to_string(),
            kind,
            name,
        };

        match target {
            AccessTarget::ComponentType { type_id, name } => registry
                .component_types
                .get(&type_id)
                .map(|&id| Resolved::Component(id))
                .ok_or_else(|| unregistered("component", name)),
            AccessTarget::Component(id) => match registry.component(id) {
                Some(_) => Ok(Resolved::Component(id)),
                None => Err(unregistered("component", "<unknown id>")),
            },
            AccessTarget::DatabagType { type_id, name } => registry
                .databag_types
                .get(&type_id)
                .map(|&id| Resolved::Databag(id))
                .ok_or_else(|| unregistered("databag", name)),
            AccessTarget::Databag(id) => match registry.databag(id) {
                Some(_) => Ok(Resolved::Databag(id)),
                None => Err(unregistered("databag", "<unknown id>")),
            },
        }
    }
}

enum Resolved {
    Component(ComponentId),
    Databag(DatabagId),
}

fn duplicate(kind: &'static str, name: &str) -> RegistryError {
    log::error!("The {} {} is registered twice", kind, name);
    RegistryError::Duplicate { kind, name: name.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{self, Counter, FrameCount, Transform};

    #[test]
    fn test_child_is_first() {
        let registry = RegistryBuilder::new().build();
        assert_eq!(registry.component_id::<Child>(), Some(Registry::CHILD));
        assert_eq!(registry.component_id_by_name("Child"), Some(Registry::CHILD));
    }

    #[test]
    fn test_component_lookup() {
        let registry = test_util::registry();
        let id = registry.expect_component_id::<Transform>();
        let info = registry.component(id).expect("registered");

        assert_eq!(info.name(), "Transform");
        assert_eq!(registry.component_id_by_name("Transform"), Some(id));
        assert_eq!(registry.property_index(id, "translation"), Some(1));
        assert_eq!(registry.property_index(id, "rotation"), None);
        assert_eq!(registry.databag_id_by_name("FrameCount"), registry.databag_id::<FrameCount>());
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut builder = test_util::registry_builder();
        assert_eq!(
            builder.register_component::<Counter>(),
            Err(RegistryError::Duplicate { kind: "component", name: "Counter".into() })
        );

        builder.register_system(SystemDescriptor::from_fn("tick", |_: &crate::World| {})).unwrap();
        assert!(matches!(
            builder.register_system(SystemDescriptor::from_fn("tick", |_: &crate::World| {})),
            Err(RegistryError::Duplicate { kind: "system", .. })
        ));
    }

    #[test]
    fn test_system_access_resolved() {
        let mut builder = test_util::registry_builder();
        let id = builder
            .register_system(
                SystemDescriptor::from_fn("move", |_: &crate::World| {})
                    .reads::<Counter>()
                    .writes::<Transform>()
                    .writes_databag::<FrameCount>()
                    .watches_changes::<Counter>(),
            )
            .unwrap();
        let registry = builder.build();

        let info = registry.system(id).expect("registered");
        let counter = registry.expect_component_id::<Counter>();
        let transform = registry.expect_component_id::<Transform>();
        assert!(info.access().accesses_component(counter));
        assert!(!info.access().writes_component(counter));
        assert!(info.access().writes_component(transform));
        assert!(info.access().writes_databag(registry.expect_databag_id::<FrameCount>()));
        assert_eq!(info.watched(), [counter]);
        assert_eq!(registry.system_id("move"), Some(id));
    }

    #[test]
    fn test_unregistered_access_rejected() {
        let mut builder = RegistryBuilder::new();
        let err = builder
            .register_system(SystemDescriptor::from_fn("lost", |_: &crate::World| {}).reads::<Counter>())
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::Unregistered {
                system: "lost".into(),
                kind:   "component",
                name:   "Counter",
            }
        );
    }
}
