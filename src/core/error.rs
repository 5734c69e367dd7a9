//! Error types for the compositing engine.
//!
//! Uses thiserror for structured errors. The taxonomy follows the
//! execution model: structural problems (cycles, unresolvable sizes) are
//! fatal and surface before any pixel work starts; degenerate numerics are
//! guarded inside the kernels by substitution and never become errors;
//! cancellation is a clean cooperative stop, not a failure.

use crate::core::geometry::Rect;
use crate::graph::operation::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for an operation in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub Uuid);

impl OperationId {
    /// Create a new random operation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Top-level error type for the crate.
#[derive(Error, Debug)]
pub enum ChitraError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors related to graph structure and resolution propagation.
///
/// All of these are structural: they abort before any tile is dispatched.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum GraphError {
    #[error("Operation {0} not found")]
    OperationNotFound(OperationId),

    #[error("Input socket {socket} out of range on operation {operation} ({count} sockets)")]
    SocketOutOfRange {
        operation: OperationId,
        socket: usize,
        count: usize,
    },

    #[error("Input socket {socket} on operation {operation} is already linked")]
    SocketAlreadyLinked { operation: OperationId, socket: usize },

    #[error("Cannot link {from} output into {to} socket")]
    SocketTypeMismatch { from: DataType, to: DataType },

    #[error("Cycle detected in graph involving operations: {operations:?}")]
    CycleDetected { operations: Vec<OperationId> },

    #[error("Operation {0} cannot determine its output size")]
    UnresolvedSize(OperationId),

    #[error("Unknown operation kind '{0}'")]
    UnknownKind(String),
}

/// Errors raised while executing a validated graph.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionError {
    #[error("Execution cancelled")]
    Cancelled,

    #[error("Render region {requested} lies outside the output extent {extent}")]
    InvalidRegion { requested: Rect, extent: Rect },

    #[error("Failed to build worker pool: {0}")]
    WorkerPool(String),
}

impl ExecutionError {
    /// Whether this is a cooperative stop rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ExecutionError::Cancelled)
    }
}

/// Result type alias for crate-level operations.
pub type ChitraResult<T> = Result<T, ChitraError>;

/// Result type alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;
