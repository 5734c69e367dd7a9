//! # Chitra - Tile-scheduled node-graph compositing
//!
//! Chitra executes directed graphs of image operations against large 2D
//! float pixel buffers. The output region is partitioned into tiles and
//! dispatched across a worker pool; operations pull pixels from their
//! upstream operations on demand, and operations needing whole-image
//! setup (such as tone mapping) compute it exactly once per execution
//! behind a synchronized compute-once cell.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chitra::prelude::*;
//!
//! let image = image::open("input.png")?;
//! let mut graph = OperationGraph::new();
//! let source = graph.add(Box::new(BufferSource::new(PixelBuffer::from_image(&image))));
//! let tonemap = graph.add(Box::new(Tonemap::new(0.18, 1.0, 1.0)));
//! graph.connect(source, tonemap, 0)?;
//!
//! let output = TileScheduler::new()
//!     .execute(&graph, tonemap, &ExecutionContext::new().with_threads(8))?;
//! output.to_rgba_image().save("output.png")?;
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: pixel buffers, region math, errors, execution context
//! - [`graph`]: the Operation contract, graph structure, topology
//! - [`execution`]: tile scheduling, demand-driven reads, caching
//! - [`operations`]: the built-in operation library and registry
//! - [`tracking`]: boundary types for the reconstruction service
//!
//! ## Guarantees
//!
//! - Structural errors (cycles, unresolvable sizes) surface before any
//!   pixel work starts.
//! - `execute_pixel` is pure; tile results are order-independent.
//! - A complex operation's setup pass runs at most once per execution
//!   regardless of worker count.
//! - Cancellation discards partial output and still tears every
//!   initialized operation down.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod execution;
pub mod graph;
pub mod operations;
pub mod tracking;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core types
    pub use crate::core::buffer::{BufferExtend, Pixel, PixelBuffer, PixelSampler};
    pub use crate::core::context::{CancelHandle, ExecutionContext};
    pub use crate::core::error::{
        ChitraError, ChitraResult, ExecutionError, GraphError, GraphResult, OperationId,
    };
    pub use crate::core::geometry::{Rect, Size};

    // Graph
    pub use crate::graph::operation::{DataType, Operation, Signature, SocketDef, TileData};
    pub use crate::graph::structure::{Link, OperationGraph, OperationNode};
    pub use crate::graph::topology::{ResolutionResolver, TopologyAnalyzer};

    // Execution
    pub use crate::execution::cache::ComputeOnce;
    pub use crate::execution::progress::{RenderCallback, RenderEvent, RenderProgress};
    pub use crate::execution::reader::Inputs;
    pub use crate::execution::scheduler::{TileScheduler, DEFAULT_TILE_SIZE};

    // Operations
    pub use crate::operations::blur::BoxBlur;
    pub use crate::operations::channels::{CombineChannels, RgbToYuv, SeparateChannel, YuvToRgb};
    pub use crate::operations::color_balance::{ColorBalanceAscCdl, ColorBalanceLgg};
    pub use crate::operations::mix::Mix;
    pub use crate::operations::registry::{OperationRegistry, ParamValue, Params};
    pub use crate::operations::source::{BufferSource, SetColor, SetValue};
    pub use crate::operations::tonemap::{LuminanceStats, PhotoreceptorTonemap, Tonemap};
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
