//! Dependency graph over resource descriptors.
//!
//! An edge runs from a dependency to its dependents; the apply order
//! guarantees every dependency precedes the resources that reference it.
//! Cycle detection runs at build time, before any provider call, and
//! names the cycle. Ordering among unconstrained resources is stable by
//! descriptor id so plans are reproducible.

use std::collections::BTreeMap;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

use crate::descriptor::{DescriptorSet, ResourceId};

/// Graph invariant violations. Fatal; indicate a descriptor-authoring
/// defect, not a transient fault.
#[derive(Debug, Error)]
pub enum GraphError {
  #[error("dependency cycle detected: {}", format_cycle(.cycle))]
  CycleDetected { cycle: Vec<ResourceId> },
}

fn format_cycle(cycle: &[ResourceId]) -> String {
  let mut parts: Vec<&str> = cycle.iter().map(ResourceId::as_str).collect();
  if let Some(first) = parts.first().copied() {
    parts.push(first);
  }
  parts.join(" -> ")
}

/// A DAG over descriptor ids with a deterministic topological order.
#[derive(Debug)]
pub struct DependencyGraph {
  graph: DiGraph<ResourceId, ()>,
  nodes: BTreeMap<ResourceId, NodeIndex>,
}

impl DependencyGraph {
  /// Build the graph from a validated descriptor set.
  ///
  /// Fails with [`GraphError::CycleDetected`] if the declared references
  /// form a cycle; the error names the cycle members in order.
  pub fn build(set: &DescriptorSet) -> Result<Self, GraphError> {
    let mut graph = DiGraph::new();
    let mut nodes = BTreeMap::new();

    for id in set.ids() {
      let idx = graph.add_node(id.clone());
      nodes.insert(id.clone(), idx);
    }

    for descriptor in set.iter() {
      let dependent = nodes[&descriptor.id];
      for reference in descriptor.references() {
        // Edge from dependency to dependent.
        let dependency = nodes[reference];
        graph.add_edge(dependency, dependent, ());
      }
    }

    let built = Self { graph, nodes };
    built.find_cycle()?;
    Ok(built)
  }

  /// Topological apply order: every dependency precedes its dependents;
  /// ties broken by descriptor id.
  ///
  /// Kahn's algorithm with an ordered ready set. The graph is known
  /// acyclic after [`DependencyGraph::build`], so this always yields
  /// every node.
  pub fn apply_order(&self) -> Vec<ResourceId> {
    let mut in_degree: BTreeMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();

    // Ready set keyed by id for the deterministic tie-break.
    let mut ready: BTreeMap<ResourceId, NodeIndex> = self
      .nodes
      .iter()
      .filter(|(_, idx)| in_degree[idx] == 0)
      .map(|(id, idx)| (id.clone(), *idx))
      .collect();

    let mut order = Vec::with_capacity(self.nodes.len());
    while let Some((id, idx)) = ready.pop_first() {
      order.push(id);
      for dependent in self.graph.neighbors_directed(idx, Direction::Outgoing) {
        let degree = in_degree.get_mut(&dependent).expect("node is indexed");
        *degree -= 1;
        if *degree == 0 {
          ready.insert(self.graph[dependent].clone(), dependent);
        }
      }
    }

    debug_assert_eq!(order.len(), self.nodes.len());
    order
  }

  /// Direct dependencies of a resource.
  pub fn dependencies(&self, id: &ResourceId) -> Vec<ResourceId> {
    let Some(&idx) = self.nodes.get(id) else {
      return Vec::new();
    };
    let mut deps: Vec<ResourceId> = self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|dep| self.graph[dep].clone())
      .collect();
    deps.sort();
    deps
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// DFS cycle search returning the cycle path when one exists.
  fn find_cycle(&self) -> Result<(), GraphError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
      White,
      Grey,
      Black,
    }

    let mut marks: BTreeMap<NodeIndex, Mark> =
      self.graph.node_indices().map(|idx| (idx, Mark::White)).collect();

    // Iterate in id order so the reported cycle is deterministic.
    for &start in self.nodes.values() {
      if marks[&start] != Mark::White {
        continue;
      }
      // Explicit stack of (node, unvisited successors).
      let mut path: Vec<NodeIndex> = Vec::new();
      let mut stack: Vec<(NodeIndex, Vec<NodeIndex>)> = Vec::new();
      marks.insert(start, Mark::Grey);
      path.push(start);
      stack.push((start, self.successors(start)));

      while let Some((node, pending)) = stack.last_mut() {
        match pending.pop() {
          Some(next) => match marks[&next] {
            Mark::Grey => {
              // Back edge: the cycle is the path suffix from `next`.
              let from = path.iter().position(|&n| n == next).expect("grey node is on the path");
              let cycle = path[from..].iter().map(|&n| self.graph[n].clone()).collect();
              return Err(GraphError::CycleDetected { cycle });
            }
            Mark::White => {
              marks.insert(next, Mark::Grey);
              path.push(next);
              stack.push((next, self.successors(next)));
            }
            Mark::Black => {}
          },
          None => {
            marks.insert(*node, Mark::Black);
            path.pop();
            stack.pop();
          }
        }
      }
    }

    Ok(())
  }

  fn successors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
    let mut next: Vec<NodeIndex> = self.graph.neighbors_directed(idx, Direction::Outgoing).collect();
    // Reverse-sorted so pop() visits successors in id order.
    next.sort_by(|a, b| self.graph[*b].cmp(&self.graph[*a]));
    next
  }
}
