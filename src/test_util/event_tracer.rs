use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use indexmap::IndexSet;
use parking_lot::Mutex;

use crate::tracer::{Thread, Tracer};

/// Records events and ensures that they happen in the declared order.
pub struct EventTracer<T: fmt::Debug + Eq + Hash> {
    dependencies: HashMap<T, Vec<T>>,
    seen:         Mutex<IndexSet<T>>,
}

impl<T: fmt::Debug + Eq + Hash> EventTracer<T> {
    /// Creates an event tracer that ensures `after` happens after `before`
    /// for each `(before, after)` input.
    pub fn new(orders: impl IntoIterator<Item = (T, T)>) -> Self {
        let mut dependencies: HashMap<T, Vec<T>> = HashMap::new();
        for (before, after) in orders {
            dependencies.entry(after).or_default().push(before);
        }

        Self { dependencies, seen: Mutex::new(IndexSet::new()) }
    }

    /// Records that `event` has happened.
    ///
    /// # Panics
    /// Panics if the same `event` was sent twice or a dependency is not satisfied.
    pub fn trace(&self, event: T) {
        let mut seen = self.seen.lock();

        if let Some(deps) = self.dependencies.get(&event) {
            for dep in deps {
                assert!(seen.contains(dep), "{:?} should happen after {:?}", event, dep);
            }
        }

        let (index, new) = seen.insert_full(event);
        assert!(
            new,
            "{:?} is traced twice",
            seen.get_index(index).expect("insert_full should return valid index")
        );
    }

    /// Whether the event has been traced.
    pub fn has_seen(&self, event: &T) -> bool { self.seen.lock().contains(event) }

    /// Returns the events observed by this tracer in order.
    pub fn get_events(self) -> Vec<T> { self.seen.into_inner().into_iter().collect() }
}

impl EventTracer<String> {
    /// A tracer without ordering constraints.
    pub fn unordered() -> Self { Self::new(None) }
}

impl Tracer for EventTracer<String> {
    fn start_dispatch(&self) { self.trace("dispatch".into()) }

    fn end_dispatch(&self, _: Duration) { self.trace("end dispatch".into()) }

    fn start_stage(&self, stage: usize, _: usize) { self.trace(format!("stage {stage}")) }

    fn end_stage(&self, stage: usize, _: Duration) { self.trace(format!("end stage {stage}")) }

    fn start_system(&self, _: Thread, name: &str) { self.trace(format!("start {name}")) }

    fn end_system(&self, _: Thread, name: &str, _: Duration) { self.trace(format!("end {name}")) }

    fn release_storages(&self, stage: usize, _: &[&'static str]) {
        self.trace(format!("release {stage}"))
    }

    fn temporary_system_done(&self, name: &str) { self.trace(format!("done {name}")) }
}
