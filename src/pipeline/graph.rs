use std::sync::Arc;

use crate::registry::{Registry, SystemId, SystemInfo};
use crate::system::{Dependency, Phase};

/// A system in an [`ExecutionGraph`].
///
/// The graph has one node for every registered system,
/// but only the nodes requested by the [`PipelineBuilder`](super::PipelineBuilder) are used.
#[derive(Debug, Clone)]
pub struct SystemNode {
    pub(crate) system:             SystemId,
    pub(crate) name:               String,
    pub(crate) is_used:            bool,
    pub(crate) phase:              Phase,
    pub(crate) explicit_priority:  i32,
    pub(crate) bundle:             Option<String>,
    pub(crate) anchor:             usize,
    pub(crate) execute_after:      Vec<usize>,
    pub(crate) extra_dependencies: Vec<Dependency>,
}

impl SystemNode {
    pub(crate) fn new(info: &SystemInfo) -> Self {
        Self {
            system:             info.id(),
            name:               info.name().to_string(),
            is_used:            false,
            phase:              info.descriptor().phase,
            explicit_priority:  -1,
            bundle:             None,
            anchor:             0,
            execute_after:      Vec::new(),
            extra_dependencies: Vec::new(),
        }
    }

    /// The system this node represents.
    pub fn system(&self) -> SystemId { self.system }

    /// The name of the system.
    pub fn name(&self) -> &str { &self.name }

    /// Whether the system was requested for the pipeline.
    pub fn is_used(&self) -> bool { self.is_used }

    /// The phase of the system.
    pub fn phase(&self) -> Phase { self.phase }

    /// The position of the system in its bundle, or `-1` if it was requested individually.
    pub fn explicit_priority(&self) -> i32 { self.explicit_priority }

    /// The bundle that requested this system.
    pub fn bundle(&self) -> Option<&str> { self.bundle.as_deref() }

    /// The systems that must finish before this system starts.
    pub fn execute_after(&self) -> impl Iterator<Item = SystemId> + '_ {
        self.execute_after.iter().map(|&index| SystemId(index as u32))
    }

    /// The tie-breaking key among systems that are ready to run.
    pub(crate) fn rank(&self) -> (Phase, usize, i32, u32) {
        (self.phase, self.anchor, self.explicit_priority, self.system.0)
    }
}

/// The dependency graph of the systems in a pipeline,
/// together with its topological order and stage partition.
#[derive(Debug)]
pub struct ExecutionGraph {
    pub(crate) registry: Arc<Registry>,
    pub(crate) nodes:    Vec<SystemNode>,
    pub(crate) sorted:   Vec<usize>,
    pub(crate) stages:   Vec<Vec<usize>>,
}

impl ExecutionGraph {
    /// The registry the graph was built from.
    pub fn registry(&self) -> &Arc<Registry> { &self.registry }

    /// All nodes, indexed by [`SystemId`].
    pub fn nodes(&self) -> &[SystemNode] { &self.nodes }

    /// Finds the node of a system.
    pub fn node(&self, name: &str) -> Option<&SystemNode> {
        let id = self.registry.system_id(name)?;
        self.nodes.get(id.0 as usize)
    }

    /// The used systems in execution order.
    pub fn sorted_systems(&self) -> impl Iterator<Item = &str> {
        self.sorted.iter().map(|&index| self.nodes[index].name())
    }

    /// The names of the non-temporary systems in each stage.
    pub fn stages(&self) -> Vec<Vec<&str>> {
        self.stages
            .iter()
            .map(|stage| stage.iter().map(|&index| self.nodes[index].name()).collect())
            .collect()
    }

    /// Converts the declared dependencies of each used system into `execute_after` edges.
    ///
    /// Dependencies on unregistered systems are skipped with a warning.
    /// Dependencies on registered systems that are not used are ignored.
    pub(crate) fn resolve_dependencies(&mut self) {
        for index in 0..self.nodes.len() {
            if !self.nodes[index].is_used {
                continue;
            }

            let info = self.registry.system(SystemId(index as u32)).expect("node without system");
            let dependencies: Vec<Dependency> = info
                .descriptor()
                .dependencies
                .iter()
                .chain(&self.nodes[index].extra_dependencies)
                .cloned()
                .collect();

            for dependency in dependencies {
                let target = match self.registry.system_id(&dependency.system) {
                    Some(target) => target.0 as usize,
                    None => {
                        log::warn!(
                            "System {} depends on unknown system {}; the dependency is skipped",
                            self.nodes[index].name,
                            dependency.system,
                        );
                        continue;
                    }
                };

                if target == index || !self.nodes[target].is_used {
                    continue;
                }

                let (dependent, prerequisite) =
                    if dependency.execute_before { (target, index) } else { (index, target) };
                let after = &mut self.nodes[dependent].execute_after;
                if !after.contains(&prerequisite) {
                    after.push(prerequisite);
                }
            }
        }
    }
}
