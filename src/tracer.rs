//! Exposes testing, profiling and tracing capabilities.

use std::fmt;
use std::time::Duration;

/// A handler that receives scheduling-related events from a [`Pipeline`](crate::pipeline::Pipeline).
///
/// All methods default to doing nothing,
/// so implementations only override the events they are interested in.
pub trait Tracer: Sync {
    /// A dispatch starts.
    fn start_dispatch(&self) {}

    /// A dispatch ends.
    fn end_dispatch(&self, _elapsed: Duration) {}

    /// A stage starts. Also passes the number of systems in the stage.
    fn start_stage(&self, _stage: usize, _systems: usize) {}

    /// A stage ends, before its storages are released.
    fn end_stage(&self, _stage: usize, _elapsed: Duration) {}

    /// A system starts running.
    fn start_system(&self, _thread: Thread, _name: &str) {}

    /// A system stops running.
    fn end_system(&self, _thread: Thread, _name: &str, _elapsed: Duration) {}

    /// The storages written in a stage are released.
    fn release_storages(&self, _stage: usize, _components: &[&'static str]) {}

    /// A temporary system reported completion and is dropped.
    fn temporary_system_done(&self, _name: &str) {}
}

struct ElapsedFmt(Duration);

impl fmt::Display for ElapsedFmt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{:?}", self.0) }
}

/// An empty tracer.
pub struct Noop;

impl Tracer for Noop {}

/// A tracer that logs all events.
pub struct Log(
    /// The log level to log events with.
    pub log::Level,
);

impl Tracer for Log {
    fn start_dispatch(&self) { log::log!(self.0, "start_dispatch()") }

    fn end_dispatch(&self, elapsed: Duration) {
        log::log!(self.0, "end_dispatch(elapsed = {})", ElapsedFmt(elapsed))
    }

    fn start_stage(&self, stage: usize, systems: usize) {
        log::log!(self.0, "start_stage(stage = {stage}, systems = {systems})")
    }

    fn end_stage(&self, stage: usize, elapsed: Duration) {
        log::log!(self.0, "end_stage(stage = {stage}, elapsed = {})", ElapsedFmt(elapsed))
    }

    fn start_system(&self, thread: Thread, name: &str) {
        log::log!(self.0, "start_system(thread = {thread:?}, name = {name})")
    }

    fn end_system(&self, thread: Thread, name: &str, elapsed: Duration) {
        log::log!(
            self.0,
            "end_system(thread = {thread:?}, name = {name}, elapsed = {})",
            ElapsedFmt(elapsed)
        )
    }

    fn release_storages(&self, stage: usize, components: &[&'static str]) {
        log::log!(self.0, "release_storages(stage = {stage}, components = {components:?})")
    }

    fn temporary_system_done(&self, name: &str) {
        log::log!(self.0, "temporary_system_done(name = {name})")
    }
}

/// Groups multiple tracers into a tuple and dispatches each call to them in serial.
pub struct Aggregate<T>(
    /// A tuple of child tracers to execute in serial.
    pub T,
);

macro_rules! impl_aggregate {
    ($($ty:ident $index:tt),*) => {
        impl<$($ty: Tracer),*> Tracer for Aggregate<($($ty,)*)> {
            fn start_dispatch(&self) { $(self.0.$index.start_dispatch();)* }

            fn end_dispatch(&self, elapsed: Duration) { $(self.0.$index.end_dispatch(elapsed);)* }

            fn start_stage(&self, stage: usize, systems: usize) {
                $(self.0.$index.start_stage(stage, systems);)*
            }

            fn end_stage(&self, stage: usize, elapsed: Duration) {
                $(self.0.$index.end_stage(stage, elapsed);)*
            }

            fn start_system(&self, thread: Thread, name: &str) {
                $(self.0.$index.start_system(thread, name);)*
            }

            fn end_system(&self, thread: Thread, name: &str, elapsed: Duration) {
                $(self.0.$index.end_system(thread, name, elapsed);)*
            }

            fn release_storages(&self, stage: usize, components: &[&'static str]) {
                $(self.0.$index.release_storages(stage, components);)*
            }

            fn temporary_system_done(&self, name: &str) {
                $(self.0.$index.temporary_system_done(name);)*
            }
        }
    };
}

impl_aggregate!(A 0, B 1);
impl_aggregate!(A 0, B 1, C 2);
impl_aggregate!(A 0, B 1, C 2, D 3);

/// The thread ID for a system executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Thread {
    /// The thread calling [`dispatch`](crate::pipeline::Pipeline::dispatch).
    Main,
    /// A worker thread. The index is in the range `0..concurrency`.
    Worker(usize),
}
