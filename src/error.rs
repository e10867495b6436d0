//! Recoverable errors.
//!
//! Contract violations between the scheduler and the storages are not represented here;
//! they panic instead.

use thiserror::Error;

use crate::component::ComponentId;
use crate::entity::EntityId;

/// Errors from dynamic component access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// The component was fetched immutably.
    #[error("the component `{component}` was taken as not mutable")]
    Immutable {
        /// The component name.
        component: &'static str,
    },

    /// The component has no property with this name.
    #[error("the component `{component}` has no property `{property}`")]
    UnknownProperty {
        /// The component name.
        component: &'static str,
        /// The requested property.
        property:  String,
    },

    /// The value cannot be converted to the property type.
    #[error("the property `{property}` of `{component}` expects a {expected} value")]
    TypeMismatch {
        /// The component name.
        component: &'static str,
        /// The property name.
        property:  &'static str,
        /// The expected value kind.
        expected:  &'static str,
    },

    /// The entity has no such component.
    #[error("entity {entity} has no component `{component}`")]
    NotPresent {
        /// The component name.
        component: &'static str,
        /// The entity.
        entity:    EntityId,
    },

    /// The accessor is not bound to a world.
    #[error("the accessor for `{component}` is not bound to a world")]
    Unbound {
        /// The component name.
        component: &'static str,
    },

    /// The component cannot be written through the dynamic path.
    #[error("the component `{component}` is read-only through dynamic access")]
    ReadOnly {
        /// The component name.
        component: &'static str,
    },
}

/// Errors from composing a [`DynamicQuery`](crate::query::DynamicQuery).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The component ID is not registered.
    #[error("the component {0:?} does not exist")]
    UnknownComponent(ComponentId),

    /// Components cannot be added after the query is built.
    #[error("the query is already built")]
    AlreadyBuilt,

    /// A previous composition step failed.
    #[error("the query is invalid")]
    Invalid,

    /// The world has no storage for a component.
    #[error("the storage of `{0}` does not exist in this world")]
    MissingStorage(&'static str),
}

/// Errors from building an [`ExecutionGraph`](crate::pipeline::ExecutionGraph).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// A system was requested twice in the same graph.
    #[error("the system `{0}` is used twice; the second usage is dropped")]
    DuplicateSystem(String),

    /// The explicit dependencies contain a cycle.
    #[error("scheduled systems have a cyclic dependency: {0}")]
    Cycle(String),

    /// The system name is not registered.
    #[error("the system `{0}` does not exist")]
    UnknownSystem(String),
}

/// Errors from populating a [`Registry`](crate::Registry).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The name is already registered.
    #[error("the {kind} `{name}` is already registered")]
    Duplicate {
        /// The kind of item, e.g. "component".
        kind: &'static str,
        /// The duplicate name.
        name: String,
    },

    /// A system refers to a type that was never registered.
    #[error("the system `{system}` accesses the unregistered {kind} `{name}`")]
    Unregistered {
        /// The system declaring the access.
        system: String,
        /// The kind of item, e.g. "databag".
        kind:   &'static str,
        /// The type name.
        name:   &'static str,
    },
}

/// Errors from loading a [`Config`](crate::config::Config).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The TOML document is malformed or has unexpected fields.
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

/// A fixed-size batch rejected a component.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("the batch of entity {entity} is full (capacity {capacity})")]
pub struct BatchFull {
    /// The entity owning the batch.
    pub entity:   EntityId,
    /// The batch capacity.
    pub capacity: usize,
}
