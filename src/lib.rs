//! A storage and scheduling engine for entity-component-system runtimes.
//!
//! # Entities, components and databags
//! An entity is a plain integer ID allocated by the [`World`].
//! Entity IDs are never recycled within the lifetime of a world.
//! Components are typed records attached to entities;
//! each component type chooses its own storage layout through [`Component::Storage`]:
//!
//! - [`DenseVectorStorage`](storage::DenseVectorStorage) for components on most entities,
//! - [`SteadyStorage`](storage::SteadyStorage) for components whose address must not move,
//! - [`BatchStorage`](storage::BatchStorage) for a bounded number of values per entity,
//! - [`HierarchicalStorage`](storage::HierarchicalStorage) for components
//!   that compose along the entity hierarchy into a global value.
//!
//! Databags are world-wide singletons with the same access rules as components.
//!
//! # Hierarchy
//! The [`Child`](storage::Child) component links an entity to its parent.
//! Hierarchy edits are buffered and flushed before each dispatch and after each stage,
//! after which every hierarchical storage recomputes the global values of the affected subtrees.
//!
//! # Registry and pipeline
//! All component, databag, system and bundle types are registered once
//! into a frozen [`Registry`].
//! A [`PipelineBuilder`] selects systems from the registry,
//! sorts them by their explicit dependencies and partitions them into stages
//! such that systems in the same stage never write the same storage.
//! The resulting [`Pipeline`] runs each stage concurrently on a thread pool.
//!
//! # Dynamic access
//! Components derive [`Reflect`](property::Reflect) to expose their fields as named properties.
//! [`DynamicQuery`](query::DynamicQuery) iterates the intersection of component storages
//! chosen at runtime and reads or writes properties by name,
//! which allows scripting hosts to implement systems without Rust types.

#![cfg_attr(not(debug_assertions), deny(missing_docs))]
#![cfg_attr(doc, warn(missing_docs))]

extern crate self as tessera;

pub mod config;
pub use config::Config;

pub mod entity;
pub use entity::EntityId;

pub mod error;

pub mod property;

pub mod component;
pub use component::{Component, ComponentId, Databag, DatabagId};

pub mod storage;
pub use storage::Storage;

pub mod registry;
pub use registry::{Registry, RegistryBuilder, SystemId};

pub mod system;
pub use system::{BundleDescriptor, Phase, SystemDescriptor};

pub mod query;

pub mod pipeline;
pub use pipeline::{Pipeline, PipelineBuilder};

pub mod tracer;

#[cfg(any(test, feature = "internal-bench"))]
pub mod test_util;

pub mod world;
pub use world::World;

static_assertions::assert_impl_all!(World: Send, Sync);
static_assertions::assert_impl_all!(Pipeline: Send, Sync);
static_assertions::assert_impl_all!(query::DynamicQuery: Send, Sync);
