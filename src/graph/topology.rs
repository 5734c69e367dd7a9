//! Topological analysis and resolution propagation.
//!
//! The topological order is used to decide safe construction and teardown
//! order; execution itself is demand-driven. Resolution propagation walks
//! socket links lazily and memoizes each operation's output size once per
//! execution.

use crate::core::error::{GraphError, GraphResult, OperationId};
use crate::core::geometry::Size;
use crate::graph::operation::Operation;
use crate::graph::structure::OperationGraph;
use std::collections::{HashMap, HashSet, VecDeque};

/// Analyzer for graph topology.
pub struct TopologyAnalyzer<'a> {
    graph: &'a OperationGraph,
}

impl<'a> TopologyAnalyzer<'a> {
    /// Create a new analyzer for the given graph.
    pub fn new(graph: &'a OperationGraph) -> Self {
        Self { graph }
    }

    /// Topological order via Kahn's algorithm.
    ///
    /// Producers come before consumers. The result is deterministic for a
    /// given insertion order because nodes are seeded in insertion order.
    pub fn topological_order(&self) -> GraphResult<Vec<OperationId>> {
        let mut in_degree: HashMap<OperationId, usize> = HashMap::new();
        for id in self.graph.ids() {
            in_degree.insert(id, 0);
        }
        for link in self.graph.links() {
            if let Some(degree) = in_degree.get_mut(&link.to) {
                *degree += 1;
            }
        }

        let mut queue: VecDeque<OperationId> = self
            .graph
            .ids()
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for link in self.graph.links_from(id) {
                if let Some(degree) = in_degree.get_mut(&link.to) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(link.to);
                    }
                }
            }
        }

        if order.len() != self.graph.node_count() {
            let operations: Vec<OperationId> = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(id, _)| id)
                .collect();
            return Err(GraphError::CycleDetected { operations });
        }

        Ok(order)
    }

    /// Whether the graph contains a cycle.
    pub fn has_cycle(&self) -> bool {
        self.topological_order().is_err()
    }

    /// All operations the given operation depends on, itself included.
    pub fn upstream_closure(&self, id: OperationId) -> GraphResult<HashSet<OperationId>> {
        self.graph.node(id)?;
        let mut closure = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(id);
        while let Some(current) = queue.pop_front() {
            if closure.insert(current) {
                for link in self.graph.links_to(current) {
                    queue.push_back(link.from);
                }
            }
        }
        Ok(closure)
    }
}

/// Lazy, memoized output-size resolution.
///
/// Each operation's size is resolved at most once per execution: an
/// explicit override wins, otherwise the operation derives it from its
/// resolved input sizes. Must only be used on graphs already validated
/// acyclic.
pub struct ResolutionResolver<'a> {
    graph: &'a OperationGraph,
    memo: HashMap<OperationId, Size>,
}

impl<'a> ResolutionResolver<'a> {
    /// Create a resolver for the given graph.
    pub fn new(graph: &'a OperationGraph) -> Self {
        Self {
            graph,
            memo: HashMap::new(),
        }
    }

    /// Resolve the output size of an operation.
    ///
    /// Fails with [`GraphError::UnresolvedSize`] naming the first
    /// operation (walking upstream) whose size cannot be determined.
    pub fn resolve(&mut self, id: OperationId) -> GraphResult<Size> {
        if let Some(size) = self.memo.get(&id) {
            return Ok(*size);
        }

        let node = self.graph.node(id)?;
        let size = match node.resolution_override() {
            Some(size) => size,
            None => {
                let socket_count = node.signature().inputs().len();
                let mut input_sizes = Vec::with_capacity(socket_count);
                for socket in 0..socket_count {
                    match self.graph.link_to_socket(id, socket) {
                        Some(link) => input_sizes.push(Some(self.resolve(link.from)?)),
                        None => input_sizes.push(None),
                    }
                }
                node.op()
                    .determine_resolution(&input_sizes)
                    .ok_or(GraphError::UnresolvedSize(id))?
            }
        };

        self.memo.insert(id, size);
        Ok(size)
    }
}
