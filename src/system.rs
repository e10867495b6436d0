//! Systems are actions performed every dispatch to manipulate entities and components.
//!
//! A system is registered through a [`SystemDescriptor`],
//! which names the system, declares the components and databags it reads or writes,
//! and orders it relative to other systems.
//! The pipeline schedules systems such that no two systems
//! with conflicting access run at the same time.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use bitvec::vec::BitVec;

use crate::component::{ComponentId, DatabagId};
use crate::query::DynamicQuery;
use crate::registry::Registry;
use crate::{Component, Databag, World};

/// A unit of behaviour run once per dispatch.
pub trait System: Send {
    /// Runs the system.
    ///
    /// The system may only lock the storages and databags it declared.
    fn run(&mut self, world: &World);
}

impl<F: FnMut(&World) + Send> System for F {
    fn run(&mut self, world: &World) { self(world) }
}

/// A system that runs before every dispatch until it reports completion.
pub trait TemporarySystem: Send {
    /// Runs the system. Returns true when the system is done and should be dropped.
    fn run(&mut self, world: &World) -> bool;
}

impl<F: FnMut(&World) -> bool + Send> TemporarySystem for F {
    fn run(&mut self, world: &World) -> bool { self(world) }
}

/// Coarse ordering of systems.
///
/// Among systems without explicit dependencies on each other,
/// systems in an earlier phase are sorted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Phase {
    /// Applies configuration changes.
    Config,
    /// Reads input.
    Input,
    /// Prepares data for processing.
    PreProcess,
    /// The main simulation.
    #[default]
    Process,
    /// Consumes the simulation results.
    PostProcess,
}

/// An ordering constraint against another system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// The name of the other system.
    pub system:         String,
    /// If true, the declaring system runs before the other system; otherwise after it.
    pub execute_before: bool,
}

impl Dependency {
    /// The declaring system runs after `system`.
    pub fn after(system: impl Into<String>) -> Self {
        Self { system: system.into(), execute_before: false }
    }

    /// The declaring system runs before `system`.
    pub fn before(system: impl Into<String>) -> Self {
        Self { system: system.into(), execute_before: true }
    }
}

/// Instantiates a system for a pipeline.
pub type SystemFactory = Arc<dyn Fn(&Arc<Registry>) -> Box<dyn System> + Send + Sync>;

/// Instantiates a temporary system for a pipeline.
pub type TemporaryFactory = Arc<dyn Fn(&Arc<Registry>) -> Box<dyn TemporarySystem> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Factory {
    Regular(SystemFactory),
    Temporary(TemporaryFactory),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccessTarget {
    ComponentType { type_id: TypeId, name: &'static str },
    Component(ComponentId),
    DatabagType { type_id: TypeId, name: &'static str },
    Databag(DatabagId),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct AccessRequest {
    pub(crate) target:  AccessTarget,
    pub(crate) mutable: bool,
}

/// Declares a system for the [`Registry`].
#[derive(Clone)]
pub struct SystemDescriptor {
    pub(crate) name:         String,
    pub(crate) description:  String,
    pub(crate) phase:        Phase,
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) accesses:     Vec<AccessRequest>,
    pub(crate) watched:      Vec<AccessTarget>,
    pub(crate) factory:      Factory,
}

impl SystemDescriptor {
    /// Declares a system instantiated by `factory` for each pipeline.
    pub fn new(
        name: impl Into<String>,
        factory: impl Fn(&Arc<Registry>) -> Box<dyn System> + Send + Sync + 'static,
    ) -> Self {
        Self::with_factory(name.into(), Factory::Regular(Arc::new(factory)))
    }

    /// Declares a system that runs a clone of `run` in each pipeline.
    pub fn from_fn(
        name: impl Into<String>,
        run: impl FnMut(&World) + Clone + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, move |_| Box::new(run.clone()))
    }

    /// Declares a temporary system.
    ///
    /// Temporary systems run on the dispatching thread before all stages,
    /// until they return true.
    pub fn temporary(
        name: impl Into<String>,
        factory: impl Fn(&Arc<Registry>) -> Box<dyn TemporarySystem> + Send + Sync + 'static,
    ) -> Self {
        Self::with_factory(name.into(), Factory::Temporary(Arc::new(factory)))
    }

    /// Declares a system whose component access is only known at runtime.
    ///
    /// Each dispatch runs `body` with a [`DynamicQuery`] over `components`
    /// that has already begun.
    pub fn dynamic(
        name: impl Into<String>,
        components: Vec<(ComponentId, bool)>,
        body: impl FnMut(&mut DynamicQuery) + Clone + Send + Sync + 'static,
    ) -> Self {
        let query_components = components.clone();
        let mut descriptor = Self::new(name, move |registry| {
            let mut query = DynamicQuery::new(Arc::clone(registry));
            for &(component, mutable) in &query_components {
                query
                    .add_component(component, mutable)
                    .expect("component IDs are validated at system registration");
            }
            Box::new(DynamicSystem::new(query, body.clone()))
        });
        for (component, mutable) in components {
            descriptor = descriptor.with_component(component, mutable);
        }
        descriptor
    }

    fn with_factory(name: String, factory: Factory) -> Self {
        Self {
            name,
            description: String::new(),
            phase: Phase::default(),
            dependencies: Vec::new(),
            accesses: Vec::new(),
            watched: Vec::new(),
            factory,
        }
    }

    /// The unique name of the system.
    pub fn name(&self) -> &str { &self.name }

    /// Whether this is a temporary system.
    pub fn is_temporary(&self) -> bool { matches!(self.factory, Factory::Temporary(_)) }

    /// Sets a human-readable description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the phase.
    pub fn phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    /// Runs this system after `system`.
    pub fn after(mut self, system: impl Into<String>) -> Self {
        self.dependencies.push(Dependency::after(system));
        self
    }

    /// Runs this system before `system`.
    pub fn before(mut self, system: impl Into<String>) -> Self {
        self.dependencies.push(Dependency::before(system));
        self
    }

    /// Reads the storage of `C`.
    pub fn reads<C: Component>(self) -> Self { self.access(component_target::<C>(), false) }

    /// Writes the storage of `C`.
    pub fn writes<C: Component>(self) -> Self { self.access(component_target::<C>(), true) }

    /// Reads the databag `D`.
    pub fn reads_databag<D: Databag>(self) -> Self { self.access(databag_target::<D>(), false) }

    /// Writes the databag `D`.
    pub fn writes_databag<D: Databag>(self) -> Self { self.access(databag_target::<D>(), true) }

    /// Accesses a component by ID.
    pub fn with_component(self, component: ComponentId, mutable: bool) -> Self {
        self.access(AccessTarget::Component(component), mutable)
    }

    /// Accesses a databag by ID.
    pub fn with_databag(self, databag: DatabagId, mutable: bool) -> Self {
        self.access(AccessTarget::Databag(databag), mutable)
    }

    /// Enables change tracing on `C` when the pipeline is prepared.
    pub fn watches_changes<C: Component>(mut self) -> Self {
        self.watched.push(component_target::<C>());
        self
    }

    /// Enables change tracing on a component by ID when the pipeline is prepared.
    pub fn watches_component(mut self, component: ComponentId) -> Self {
        self.watched.push(AccessTarget::Component(component));
        self
    }

    fn access(mut self, target: AccessTarget, mutable: bool) -> Self {
        self.accesses.push(AccessRequest { target, mutable });
        self
    }
}

impl fmt::Debug for SystemDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SystemDescriptor")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("dependencies", &self.dependencies)
            .field("temporary", &self.is_temporary())
            .finish_non_exhaustive()
    }
}

fn component_target<C: Component>() -> AccessTarget {
    AccessTarget::ComponentType { type_id: TypeId::of::<C>(), name: C::NAME }
}

fn databag_target<D: Databag>() -> AccessTarget {
    AccessTarget::DatabagType { type_id: TypeId::of::<D>(), name: D::NAME }
}

/// Declares a group of systems sharing extra dependencies.
#[derive(Debug, Clone)]
pub struct BundleDescriptor {
    pub(crate) name:         String,
    pub(crate) description:  String,
    pub(crate) systems:      Vec<String>,
    pub(crate) dependencies: Vec<Dependency>,
}

impl BundleDescriptor {
    /// Declares an empty bundle.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name:         name.into(),
            description:  String::new(),
            systems:      Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// The unique name of the bundle.
    pub fn name(&self) -> &str { &self.name }

    /// The member systems in declaration order.
    pub fn systems(&self) -> &[String] { &self.systems }

    /// Sets a human-readable description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds a member system.
    pub fn system(mut self, name: impl Into<String>) -> Self {
        self.systems.push(name.into());
        self
    }

    /// Runs every member after `system`.
    pub fn after(mut self, system: impl Into<String>) -> Self {
        self.dependencies.push(Dependency::after(system));
        self
    }

    /// Runs every member before `system`.
    pub fn before(mut self, system: impl Into<String>) -> Self {
        self.dependencies.push(Dependency::before(system));
        self
    }
}

/// The resolved components and databags a system reads and writes.
#[derive(Debug, Clone, Default)]
pub struct SystemAccess {
    component_reads:  BitVec,
    component_writes: BitVec,
    databag_reads:    BitVec,
    databag_writes:   BitVec,
}

impl SystemAccess {
    pub(crate) fn add_component(&mut self, component: ComponentId, mutable: bool) {
        let bits = if mutable { &mut self.component_writes } else { &mut self.component_reads };
        set_bit(bits, component.index());
    }

    pub(crate) fn add_databag(&mut self, databag: DatabagId, mutable: bool) {
        let bits = if mutable { &mut self.databag_writes } else { &mut self.databag_reads };
        set_bit(bits, databag.index());
    }

    /// Whether the component is read or written.
    pub fn accesses_component(&self, component: ComponentId) -> bool {
        bit(&self.component_reads, component.index()) || self.writes_component(component)
    }

    /// Whether the component is written.
    pub fn writes_component(&self, component: ComponentId) -> bool {
        bit(&self.component_writes, component.index())
    }

    /// Whether the databag is read or written.
    pub fn accesses_databag(&self, databag: DatabagId) -> bool {
        bit(&self.databag_reads, databag.index()) || self.writes_databag(databag)
    }

    /// Whether the databag is written.
    pub fn writes_databag(&self, databag: DatabagId) -> bool {
        bit(&self.databag_writes, databag.index())
    }

    /// The components read or written.
    pub fn components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        let max = self.component_reads.len().max(self.component_writes.len());
        (0..max)
            .filter(|&index| bit(&self.component_reads, index) || bit(&self.component_writes, index))
            .map(|index| ComponentId(index as u32))
    }

    /// The components written.
    pub fn written_components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.component_writes.iter_ones().map(|index| ComponentId(index as u32))
    }

    /// The databags read or written.
    pub fn databags(&self) -> impl Iterator<Item = DatabagId> + '_ {
        let max = self.databag_reads.len().max(self.databag_writes.len());
        (0..max)
            .filter(|&index| bit(&self.databag_reads, index) || bit(&self.databag_writes, index))
            .map(|index| DatabagId(index as u32))
    }

    /// Whether the two systems must not run concurrently,
    /// i.e. one of them writes something the other accesses.
    pub fn conflicts_with(&self, other: &Self) -> bool {
        fn one_way(a: &SystemAccess, b: &SystemAccess) -> bool {
            a.component_writes.iter_ones().any(|index| {
                bit(&b.component_reads, index) || bit(&b.component_writes, index)
            }) || a
                .databag_writes
                .iter_ones()
                .any(|index| bit(&b.databag_reads, index) || bit(&b.databag_writes, index))
        }

        one_way(self, other) || one_way(other, self)
    }
}

fn set_bit(bits: &mut BitVec, index: usize) {
    if bits.len() <= index {
        bits.resize(index + 1, false);
    }
    bits.set(index, true);
}

fn bit(bits: &BitVec, index: usize) -> bool { bits.get(index).map_or(false, |bit| *bit) }

/// A system that iterates a [`DynamicQuery`] declared at runtime.
pub struct DynamicSystem<F> {
    query: DynamicQuery,
    body:  F,
}

impl<F: FnMut(&mut DynamicQuery) + Send> DynamicSystem<F> {
    /// Wraps a query and the closure run against it.
    pub fn new(query: DynamicQuery, body: F) -> Self { Self { query, body } }
}

impl<F: FnMut(&mut DynamicQuery) + Send> System for DynamicSystem<F> {
    fn run(&mut self, world: &World) {
        self.query.begin(world);
        (self.body)(&mut self.query);
        self.query.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access(components: &[(u32, bool)]) -> SystemAccess {
        let mut access = SystemAccess::default();
        for &(id, mutable) in components {
            access.add_component(ComponentId(id), mutable);
        }
        access
    }

    #[test]
    fn test_shared_reads_do_not_conflict() {
        assert!(!access(&[(1, false), (2, false)]).conflicts_with(&access(&[(1, false)])));
        assert!(!access(&[(1, true)]).conflicts_with(&access(&[(2, true)])));
    }

    #[test]
    fn test_write_conflicts_both_ways() {
        let writer = access(&[(3, true)]);
        let reader = access(&[(3, false)]);
        assert!(writer.conflicts_with(&reader));
        assert!(reader.conflicts_with(&writer));
        assert!(writer.conflicts_with(&writer));
    }

    #[test]
    fn test_databag_conflicts() {
        let mut a = SystemAccess::default();
        a.add_databag(DatabagId(0), true);
        let mut b = SystemAccess::default();
        b.add_databag(DatabagId(0), false);
        assert!(a.conflicts_with(&b));
        assert!(!b.conflicts_with(&b));
    }

    #[test]
    fn test_listing() {
        let access = access(&[(4, false), (1, true)]);
        assert_eq!(access.components().collect::<Vec<_>>(), [ComponentId(1), ComponentId(4)]);
        assert_eq!(access.written_components().collect::<Vec<_>>(), [ComponentId(1)]);
        assert!(access.accesses_component(ComponentId(4)));
        assert!(!access.writes_component(ComponentId(4)));
        assert!(!access.accesses_component(ComponentId(9)));
    }

    #[test]
    fn test_phase_order() {
        assert!(Phase::Config < Phase::Input);
        assert!(Phase::PreProcess < Phase::Process);
        assert!(Phase::Process < Phase::PostProcess);
        assert_eq!(Phase::default(), Phase::Process);
    }
}
