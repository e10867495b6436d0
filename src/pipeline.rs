//! Builds an execution plan from registered systems and runs it against a [`World`](crate::World).
//!
//! A pipeline is built in two steps.
//! [`PipelineBuilder`] collects the bundles and systems to run
//! and resolves their explicit dependencies into an [`ExecutionGraph`].
//! The graph is then sorted topologically and partitioned into stages,
//! where the systems in each stage have no explicit ordering among each other
//! and no conflicting storage access, so they may run concurrently.
//!
//! [`Pipeline`] owns the system instances and executes the stages
//! in order on every [`dispatch`](Pipeline::dispatch).

mod builder;
pub use builder::PipelineBuilder;

mod graph;
pub use graph::{ExecutionGraph, SystemNode};

mod topology;

mod executor;
pub use executor::Pipeline;
