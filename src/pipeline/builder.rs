use std::sync::Arc;

use super::graph::{ExecutionGraph, SystemNode};
use super::{topology, Pipeline};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::registry::Registry;
use crate::system::BundleDescriptor;

/// Selects the systems of a pipeline.
///
/// ```
/// # use tessera::{PipelineBuilder, RegistryBuilder, SystemDescriptor};
/// # use tessera::config::PipelineConfig;
/// let mut builder = RegistryBuilder::new();
/// builder.register_system(SystemDescriptor::from_fn("tick", |_| {})).unwrap();
/// let registry = builder.build();
///
/// let mut pipeline = PipelineBuilder::new(registry);
/// pipeline.add_system("tick").unwrap();
/// let pipeline = pipeline.build(&PipelineConfig::default()).unwrap();
/// assert_eq!(pipeline.stages(), vec![vec!["tick"]]);
/// ```
pub struct PipelineBuilder {
    registry: Arc<Registry>,
    nodes:    Vec<SystemNode>,
    anchors:  usize,
}

impl PipelineBuilder {
    /// Creates an empty builder for systems in `registry`.
    pub fn new(registry: Arc<Registry>) -> Self {
        let nodes = registry.systems().map(SystemNode::new).collect();
        Self { registry, nodes, anchors: 0 }
    }

    /// Adds all systems of a bundle.
    ///
    /// Unknown bundles are skipped with a warning.
    /// Members that are already in the pipeline are not added again,
    /// and the first such duplicate is returned as an error after the remaining members are added.
    pub fn add_bundle(&mut self, name: &str) -> Result<(), PipelineError> {
        let registry = Arc::clone(&self.registry);
        let bundle = match registry.bundle(name) {
            Some(bundle) => bundle,
            None => {
                log::warn!("Bundle {name} does not exist; skipped");
                return Ok(());
            }
        };

        let anchor = self.next_anchor();
        let mut result = Ok(());
        for (priority, member) in bundle.systems().iter().enumerate() {
            if let Err(err) = self.use_system(member, anchor, priority as i32, Some(bundle)) {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    /// Adds a single system.
    ///
    /// Unknown systems are skipped with a warning.
    pub fn add_system(&mut self, name: &str) -> Result<(), PipelineError> {
        let anchor = self.next_anchor();
        self.use_system(name, anchor, -1, None)
    }

    fn next_anchor(&mut self) -> usize {
        self.anchors += 1;
        self.anchors
    }

    fn use_system(
        &mut self,
        name: &str,
        anchor: usize,
        priority: i32,
        bundle: Option<&BundleDescriptor>,
    ) -> Result<(), PipelineError> {
        let id = match self.registry.system_id(name) {
            Some(id) => id,
            None => {
                log::warn!("System {name} does not exist; skipped");
                return Ok(());
            }
        };

        let node = &mut self.nodes[id.0 as usize];
        if node.is_used {
            let err = PipelineError::DuplicateSystem(name.to_string());
            log::error!("{err}");
            return Err(err);
        }

        node.is_used = true;
        node.anchor = anchor;
        node.explicit_priority = priority;
        if let Some(bundle) = bundle {
            node.bundle = Some(bundle.name().to_string());
            node.extra_dependencies = bundle.dependencies.clone();
        }
        Ok(())
    }

    /// Resolves dependencies, sorts the used systems and partitions them into stages.
    pub fn build_graph(self) -> Result<ExecutionGraph, PipelineError> {
        let mut graph = ExecutionGraph {
            registry: self.registry,
            nodes:    self.nodes,
            sorted:   Vec::new(),
            stages:   Vec::new(),
        };
        graph.resolve_dependencies();
        graph.sorted = topology::sort(&graph.nodes)?;
        graph.stages = topology::partition(&graph);
        Ok(graph)
    }

    /// Builds the graph and instantiates its systems.
    pub fn build(self, config: &PipelineConfig) -> Result<Pipeline, PipelineError> {
        let graph = self.build_graph()?;
        Ok(Pipeline::new(graph, config))
    }
}
