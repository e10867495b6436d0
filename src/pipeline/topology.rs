use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::iter;

use itertools::Itertools;

use super::graph::{ExecutionGraph, SystemNode};
use crate::error::PipelineError;
use crate::registry::SystemId;

/// Sorts the used nodes such that every node comes after all nodes in its `execute_after`.
///
/// Among nodes that are ready at the same time,
/// the one with the smallest [rank](SystemNode::rank) comes first.
pub(super) fn sort(nodes: &[SystemNode]) -> Result<Vec<usize>, PipelineError> {
    let mut pending = vec![0_usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (index, node) in nodes.iter().enumerate().filter(|(_, node)| node.is_used) {
        for &prerequisite in &node.execute_after {
            pending[index] += 1;
            dependents[prerequisite].push(index);
        }
    }

    let mut ready: BinaryHeap<_> = nodes
        .iter()
        .enumerate()
        .filter(|&(index, node)| node.is_used && pending[index] == 0)
        .map(|(index, node)| Reverse((node.rank(), index)))
        .collect();

    let mut sorted = Vec::new();
    while let Some(Reverse((_, index))) = ready.pop() {
        sorted.push(index);
        for &dependent in &dependents[index] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.push(Reverse((nodes[dependent].rank(), dependent)));
            }
        }
    }

    let used = nodes.iter().filter(|node| node.is_used).count();
    if sorted.len() < used {
        let cycle = find_cycle(nodes, &pending);
        log::error!("Scheduled systems have a cyclic dependency: {cycle}");
        return Err(PipelineError::Cycle(cycle));
    }

    Ok(sorted)
}

/// Formats a cycle among the nodes left unsorted, as `a -> b -> a`.
fn find_cycle(nodes: &[SystemNode], pending: &[usize]) -> String {
    let blocked = |index: usize| nodes[index].is_used && pending[index] > 0;

    // Every blocked node has a blocked prerequisite, so walking prerequisites must revisit a node.
    let mut current = (0..nodes.len()).find(|&index| blocked(index)).expect("no blocked system");
    let mut path = Vec::new();
    let mut visited = HashMap::new();
    let start = loop {
        if let Some(&position) = visited.get(&current) {
            break position;
        }
        visited.insert(current, path.len());
        path.push(current);
        current = *nodes[current]
            .execute_after
            .iter()
            .find(|&&prerequisite| blocked(prerequisite))
            .expect("blocked system without blocked prerequisite");
    };

    let cycle = &path[start..];
    let first = cycle.last().expect("cycle is nonempty");
    cycle.iter().rev().chain(iter::once(first)).map(|&index| nodes[index].name()).join(" -> ")
}

/// Splits the sorted non-temporary systems into stages.
///
/// A system joins the last stage if it has no explicit dependency with any system in it
/// and no conflicting access; otherwise it opens a new stage.
pub(super) fn partition(graph: &ExecutionGraph) -> Vec<Vec<usize>> {
    let info = |index: usize| {
        graph.registry.system(SystemId(index as u32)).expect("node without system")
    };
    let compatible = |a: usize, b: usize| {
        !graph.nodes[a].execute_after.contains(&b)
            && !graph.nodes[b].execute_after.contains(&a)
            && !info(a).access().conflicts_with(info(b).access())
    };

    let mut stages: Vec<Vec<usize>> = Vec::new();
    for &index in &graph.sorted {
        if info(index).descriptor().is_temporary() {
            continue;
        }

        let fits = stages.last().map_or(false, |stage| {
            stage.iter().all(|&member| compatible(index, member))
        });
        if fits {
            if let Some(stage) = stages.last_mut() {
                stage.push(index);
                continue;
            }
        }
        stages.push(vec![index]);
    }
    stages
}
