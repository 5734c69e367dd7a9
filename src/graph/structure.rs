//! Graph structure: operations and the links between their sockets.
//!
//! The [`OperationGraph`] is the central data structure holding every
//! operation and socket link. It validates links as they are made (socket
//! range, type compatibility, single producer per socket, acyclicity), so
//! structural errors surface during construction rather than during
//! execution.

use crate::core::error::{GraphError, GraphResult, OperationId};
use crate::core::geometry::Size;
use crate::graph::operation::{Operation, Signature};
use indexmap::IndexMap;
use std::collections::{HashSet, VecDeque};

/// A link from one operation's output into another's input socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    /// Producing operation.
    pub from: OperationId,
    /// Consuming operation.
    pub to: OperationId,
    /// Input socket index on the consumer.
    pub socket: usize,
}

/// An operation instance in the graph.
pub struct OperationNode {
    id: OperationId,
    op: Box<dyn Operation>,
    signature: Signature,
    resolution_override: Option<Size>,
}

impl OperationNode {
    /// Unique identifier.
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// The operation implementation.
    pub fn op(&self) -> &dyn Operation {
        self.op.as_ref()
    }

    /// Socket layout, captured when the operation was added.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Explicit output-size override, if set.
    pub fn resolution_override(&self) -> Option<Size> {
        self.resolution_override
    }
}

impl std::fmt::Debug for OperationNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationNode")
            .field("id", &self.id)
            .field("kind", &self.signature.kind())
            .field("resolution_override", &self.resolution_override)
            .finish()
    }
}

/// The directed graph of operations connected by sockets.
///
/// Uses IndexMap so iteration (and therefore topological ordering) is
/// deterministic given the insertion order.
#[derive(Debug, Default)]
pub struct OperationGraph {
    nodes: IndexMap<OperationId, OperationNode>,
    links: Vec<Link>,
}

impl OperationGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            links: Vec::new(),
        }
    }

    // ========================================================================
    // Operation management
    // ========================================================================

    /// Add an operation and return its ID.
    pub fn add(&mut self, op: Box<dyn Operation>) -> OperationId {
        let id = OperationId::new();
        let signature = op.signature();
        self.nodes.insert(
            id,
            OperationNode {
                id,
                op,
                signature,
                resolution_override: None,
            },
        );
        id
    }

    /// Force the output size of an operation, bypassing its resolution
    /// socket. Required for size-less constants used as size drivers.
    pub fn set_resolution_override(&mut self, id: OperationId, size: Size) -> GraphResult<()> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(GraphError::OperationNotFound(id))?;
        node.resolution_override = Some(size);
        Ok(())
    }

    /// Get a node by ID.
    pub fn node(&self, id: OperationId) -> GraphResult<&OperationNode> {
        self.nodes.get(&id).ok_or(GraphError::OperationNotFound(id))
    }

    /// Check whether an operation exists.
    pub fn has_node(&self, id: OperationId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// All nodes, in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &OperationNode> {
        self.nodes.values()
    }

    /// All operation IDs, in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = OperationId> + '_ {
        self.nodes.keys().copied()
    }

    /// Number of operations.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ========================================================================
    // Link management
    // ========================================================================

    /// Link `from`'s output into input socket `socket` of `to`.
    ///
    /// Fails when either operation is missing, the socket index is out of
    /// range, the socket types differ, the socket already has a producer,
    /// or the link would close a cycle.
    pub fn connect(&mut self, from: OperationId, to: OperationId, socket: usize) -> GraphResult<()> {
        let from_node = self.node(from)?;
        let to_node = self.node(to)?;

        let inputs = to_node.signature().inputs();
        if socket >= inputs.len() {
            return Err(GraphError::SocketOutOfRange {
                operation: to,
                socket,
                count: inputs.len(),
            });
        }

        let from_type = from_node.signature().output();
        let to_type = inputs[socket].data_type();
        if from_type != to_type {
            return Err(GraphError::SocketTypeMismatch {
                from: from_type,
                to: to_type,
            });
        }

        if self.link_to_socket(to, socket).is_some() {
            return Err(GraphError::SocketAlreadyLinked { operation: to, socket });
        }

        // Adding from -> to closes a cycle iff `from` is already downstream
        // of `to`.
        if from == to || self.reaches(to, from) {
            return Err(GraphError::CycleDetected {
                operations: vec![from, to],
            });
        }

        self.links.push(Link { from, to, socket });
        Ok(())
    }

    /// All links.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Links feeding the given operation's input sockets.
    pub fn links_to(&self, id: OperationId) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(move |l| l.to == id)
    }

    /// Links consuming the given operation's output.
    pub fn links_from(&self, id: OperationId) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(move |l| l.from == id)
    }

    /// The producer link of one specific input socket, if any.
    pub fn link_to_socket(&self, id: OperationId, socket: usize) -> Option<&Link> {
        self.links.iter().find(|l| l.to == id && l.socket == socket)
    }

    /// Whether `goal` is reachable downstream of `start`.
    fn reaches(&self, start: OperationId, goal: OperationId) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);
        while let Some(current) = queue.pop_front() {
            if current == goal {
                return true;
            }
            if visited.insert(current) {
                for link in self.links_from(current) {
                    queue.push_back(link.to);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffer::{Pixel, PixelSampler};
    use crate::execution::reader::Inputs;
    use crate::graph::operation::TileData;

    struct PassThrough;

    impl Operation for PassThrough {
        fn signature(&self) -> Signature {
            Signature::new("pass_through").color_input("color", [0.0, 0.0, 0.0, 1.0])
        }

        fn execute_pixel(
            &self,
            out: &mut Pixel,
            x: f32,
            y: f32,
            sampler: PixelSampler,
            inputs: &Inputs<'_>,
            _tile: Option<&TileData>,
        ) {
            inputs.read(0, out, x, y, sampler);
        }
    }

    struct ValueOnly;

    impl Operation for ValueOnly {
        fn signature(&self) -> Signature {
            Signature::new("value_only").value_input("value", 0.0).value_output()
        }

        fn execute_pixel(
            &self,
            out: &mut Pixel,
            x: f32,
            y: f32,
            sampler: PixelSampler,
            inputs: &Inputs<'_>,
            _tile: Option<&TileData>,
        ) {
            inputs.read(0, out, x, y, sampler);
        }
    }

    #[test]
    fn test_connect_valid_link() {
        let mut graph = OperationGraph::new();
        let a = graph.add(Box::new(PassThrough));
        let b = graph.add(Box::new(PassThrough));
        assert!(graph.connect(a, b, 0).is_ok());
        assert_eq!(graph.links().len(), 1);
        assert!(graph.link_to_socket(b, 0).is_some());
    }

    #[test]
    fn test_connect_socket_out_of_range() {
        let mut graph = OperationGraph::new();
        let a = graph.add(Box::new(PassThrough));
        let b = graph.add(Box::new(PassThrough));
        assert!(matches!(
            graph.connect(a, b, 3),
            Err(GraphError::SocketOutOfRange { socket: 3, .. })
        ));
    }

    #[test]
    fn test_connect_type_mismatch() {
        let mut graph = OperationGraph::new();
        let color = graph.add(Box::new(PassThrough));
        let value = graph.add(Box::new(ValueOnly));
        // Color output into a value socket is rejected.
        assert!(matches!(
            graph.connect(color, value, 0),
            Err(GraphError::SocketTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_connect_rejects_second_producer() {
        let mut graph = OperationGraph::new();
        let a = graph.add(Box::new(PassThrough));
        let b = graph.add(Box::new(PassThrough));
        let c = graph.add(Box::new(PassThrough));
        graph.connect(a, c, 0).unwrap();
        assert!(matches!(
            graph.connect(b, c, 0),
            Err(GraphError::SocketAlreadyLinked { .. })
        ));
    }

    #[test]
    fn test_connect_rejects_cycle() {
        let mut graph = OperationGraph::new();
        let a = graph.add(Box::new(PassThrough));
        let b = graph.add(Box::new(PassThrough));
        graph.connect(a, b, 0).unwrap();
        assert!(matches!(
            graph.connect(b, a, 0),
            Err(GraphError::CycleDetected { .. })
        ));
        // Self-loops are cycles too.
        assert!(matches!(
            graph.connect(a, a, 0),
            Err(GraphError::CycleDetected { .. })
        ));
    }
}
