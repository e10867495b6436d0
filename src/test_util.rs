#![allow(missing_docs)]

use std::sync::{Arc, Once};

use crate::entity::EntityId;
use crate::property::Reflect;
use crate::registry::{Registry, RegistryBuilder};
use crate::storage::{
    BatchStorage, DenseVectorStorage, Hierarchical, HierarchicalStorage, SharedSteadyStorage,
    SteadyStorage,
};
use crate::{Component, Databag};

mod event_tracer;
pub use event_tracer::EventTracer;

mod stage_rendezvous;
pub use stage_rendezvous::StageRendezvous;

/// Initializes `env_logger` once per process.
pub fn init_logger() {
    static SET_LOGGER_ONCE: Once = Once::new();
    SET_LOGGER_ONCE.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Builds a registry with every test component and databag.
pub fn registry() -> Arc<Registry> { registry_builder().build() }

/// A registry builder with every test component and databag, for tests that add systems.
pub fn registry_builder() -> RegistryBuilder {
    let mut builder = RegistryBuilder::new();
    builder.register_component::<Counter>().expect("fresh registry");
    builder.register_component::<Transform>().expect("fresh registry");
    builder.register_component::<Impulse>().expect("fresh registry");
    builder.register_component::<Anchor>().expect("fresh registry");
    builder.register_component::<Material>().expect("fresh registry");
    builder.register_databag::<FrameCount>().expect("fresh registry");
    builder
}

/// A dense integer component that composes additively along the hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Reflect)]
pub struct Counter {
    pub value: i64,
}

impl Counter {
    pub fn new(value: i64) -> Self { Self { value } }
}

impl Component for Counter {
    const NAME: &'static str = "Counter";
    type Storage = DenseVectorStorage<Self>;
}

impl Hierarchical for Counter {
    fn combine(local: &Self, parent_global: &Self) -> Self {
        Self::new(parent_global.value + local.value)
    }

    fn combine_inverse(global: &Self, parent_global: &Self) -> Self {
        Self::new(global.value - parent_global.value)
    }
}

/// A one-dimensional affine transform, `x -> scale * x + translation`.
///
/// Composition is not commutative, which makes ordering mistakes visible.
#[derive(Debug, Clone, PartialEq, Reflect)]
pub struct Transform {
    pub scale:       f64,
    pub translation: f64,
}

impl Transform {
    pub fn translate(translation: f64) -> Self { Self { scale: 1.0, translation } }

    pub fn scaled(scale: f64) -> Self { Self { scale, translation: 0.0 } }

    pub fn apply(&self, x: f64) -> f64 { self.scale * x + self.translation }
}

impl Default for Transform {
    fn default() -> Self { Self::scaled(1.0) }
}

impl Component for Transform {
    const NAME: &'static str = "Transform";
    type Storage = HierarchicalStorage<Self>;
}

impl Hierarchical for Transform {
    fn combine(local: &Self, parent_global: &Self) -> Self {
        Self {
            scale:       parent_global.scale * local.scale,
            translation: parent_global.apply(local.translation),
        }
    }

    fn combine_inverse(global: &Self, parent_global: &Self) -> Self {
        Self {
            scale:       global.scale / parent_global.scale,
            translation: (global.translation - parent_global.translation) / parent_global.scale,
        }
    }
}

/// A batched component; each entity holds up to four impulses.
#[derive(Debug, Clone, Default, PartialEq, Reflect)]
pub struct Impulse {
    pub strength: f32,
}

impl Component for Impulse {
    const NAME: &'static str = "Impulse";
    type Storage = BatchStorage<Self, 4>;
}

/// A component with stable storage addresses.
#[derive(Debug, Clone, Default, PartialEq, Reflect)]
pub struct Anchor {
    pub target: EntityId,
    pub label:  String,
}

impl Component for Anchor {
    const NAME: &'static str = "Anchor";
    type Storage = SteadyStorage<Self>;
}

/// A component shared between entities.
#[derive(Debug, Clone, Default, PartialEq, Reflect)]
pub struct Material {
    pub roughness: f32,
}

impl Component for Material {
    const NAME: &'static str = "Material";
    type Storage = SharedSteadyStorage<Self>;
}

/// A world-wide frame counter.
#[derive(Debug, Default, Reflect)]
pub struct FrameCount {
    pub frames: u32,
}

impl Databag for FrameCount {
    const NAME: &'static str = "FrameCount";
}
