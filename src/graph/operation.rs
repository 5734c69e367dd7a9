//! The Operation trait and socket signatures.
//!
//! An operation is one node of the execution graph: it consumes zero or
//! more typed input sockets, produces one output socket, and implements a
//! per-pixel transform plus area-of-interest propagation. Concrete kinds
//! live in [`crate::operations`].
//!
//! # Lifecycle
//!
//! Per execution, every operation moves through
//! `init_execution` -> (optional cache computation, serialized by the
//! operation's compute-once slot) -> `deinit_execution`. Deinit is
//! idempotent and runs on every exit path, including cancellation.

use crate::core::buffer::{Pixel, PixelSampler};
use crate::core::geometry::{Rect, Size};
use crate::execution::reader::Inputs;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Data type carried by a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// A single scalar in channel 0.
    Value,
    /// An RGBA color.
    Color,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Value => write!(f, "value"),
            DataType::Color => write!(f, "color"),
        }
    }
}

/// Definition of one input socket.
#[derive(Debug, Clone)]
pub struct SocketDef {
    name: &'static str,
    data_type: DataType,
    default: Pixel,
}

impl SocketDef {
    /// Socket name, unique within the operation.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Data type this socket accepts.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Constant used when the socket is left unlinked.
    pub fn default(&self) -> Pixel {
        self.default
    }
}

/// Socket layout of an operation: typed inputs, one output, and the
/// designated resolution socket.
///
/// Built fluently, in declaration order:
///
/// ```ignore
/// Signature::new("color_balance_cdl")
///     .value_input("factor", 1.0)
///     .color_input("color", [1.0, 1.0, 1.0, 1.0])
///     .color_output()
///     .resolution_from(1)
/// ```
#[derive(Debug, Clone)]
pub struct Signature {
    kind: &'static str,
    inputs: Vec<SocketDef>,
    output: DataType,
    resolution_input: Option<usize>,
}

impl Signature {
    /// Start a signature for the given operation kind tag.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            inputs: Vec::new(),
            output: DataType::Color,
            resolution_input: None,
        }
    }

    /// Add a scalar input socket with a constant default.
    pub fn value_input(mut self, name: &'static str, default: f32) -> Self {
        self.inputs.push(SocketDef {
            name,
            data_type: DataType::Value,
            default: [default, default, default, 1.0],
        });
        self
    }

    /// Add a color input socket with a constant default.
    pub fn color_input(mut self, name: &'static str, default: Pixel) -> Self {
        self.inputs.push(SocketDef {
            name,
            data_type: DataType::Color,
            default,
        });
        self
    }

    /// Declare the output socket as a color.
    pub fn color_output(mut self) -> Self {
        self.output = DataType::Color;
        self
    }

    /// Declare the output socket as a scalar.
    pub fn value_output(mut self) -> Self {
        self.output = DataType::Value;
        self
    }

    /// Designate the input socket whose size drives the output size.
    ///
    /// Defaults to the first input when not called.
    pub fn resolution_from(mut self, socket: usize) -> Self {
        self.resolution_input = Some(socket);
        self
    }

    /// The operation kind tag.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Input socket definitions, in declaration order.
    pub fn inputs(&self) -> &[SocketDef] {
        &self.inputs
    }

    /// Output socket data type.
    pub fn output(&self) -> DataType {
        self.output
    }

    /// The designated resolution socket, if the operation has inputs.
    pub fn resolution_input(&self) -> Option<usize> {
        self.resolution_input
            .or(if self.inputs.is_empty() { None } else { Some(0) })
    }
}

/// Opaque setup state shared by all pixels of a region.
///
/// Complex operations downcast this to their concrete payload.
pub type TileData = Arc<dyn Any + Send + Sync>;

/// A node in the execution graph.
///
/// Implementations must be thread-safe: once `init_execution` has run,
/// `execute_pixel` is called concurrently from tile workers and must not
/// mutate persistent state. The only sanctioned mutable state is the
/// compute-once cache slot of complex operations.
pub trait Operation: Send + Sync {
    /// Socket layout and kind tag. Must return consistent values.
    fn signature(&self) -> Signature;

    /// Whether this operation needs region-wide setup state beyond pure
    /// per-pixel math. Complex operations get `initialize_tile_data`
    /// called before their pixels are evaluated.
    fn is_complex(&self) -> bool {
        false
    }

    /// Bind per-execution state. Paired with [`Operation::deinit_execution`]
    /// on every exit path of the owning execution.
    fn init_execution(&self) {}

    /// Release per-execution state, including any cached setup payload.
    /// Idempotent.
    fn deinit_execution(&self) {}

    /// Output size, derived from the designated resolution socket by
    /// default. `None` means the size cannot be determined and surfaces
    /// as [`crate::core::error::GraphError::UnresolvedSize`].
    fn determine_resolution(&self, input_sizes: &[Option<Size>]) -> Option<Size> {
        self.signature()
            .resolution_input()
            .and_then(|socket| input_sizes.get(socket).copied().flatten())
    }

    /// Minimal rectangle needed from input `input` to produce `output`.
    ///
    /// Identity by default. Operations with spatial support wider than one
    /// pixel expand the rectangle; operations needing the entire upstream
    /// image return the full `input_extent`.
    fn depending_area_of_interest(&self, input: usize, output: Rect, input_extent: Rect) -> Rect {
        let _ = (input, input_extent);
        output
    }

    /// Compute region-wide setup state for complex operations.
    ///
    /// Called before pixel evaluation with the operation's output extent;
    /// must be guarded by the operation's compute-once slot so concurrent
    /// tile workers serialize on first access and reuse the result.
    fn initialize_tile_data(&self, rect: Rect, inputs: &Inputs<'_>) -> Option<TileData> {
        let _ = (rect, inputs);
        None
    }

    /// The per-pixel kernel.
    ///
    /// Pure function of the resolved input values at `(x, y)` and the
    /// optional tile setup data; re-entrant and callable concurrently
    /// across pixels and tiles.
    fn execute_pixel(
        &self,
        out: &mut Pixel,
        x: f32,
        y: f32,
        sampler: PixelSampler,
        inputs: &Inputs<'_>,
        tile: Option<&TileData>,
    );
}

// Shared operation instances stay inspectable after being added to a graph.
impl<T: Operation + ?Sized> Operation for Arc<T> {
    fn signature(&self) -> Signature {
        (**self).signature()
    }

    fn is_complex(&self) -> bool {
        (**self).is_complex()
    }

    fn init_execution(&self) {
        (**self).init_execution()
    }

    fn deinit_execution(&self) {
        (**self).deinit_execution()
    }

    fn determine_resolution(&self, input_sizes: &[Option<Size>]) -> Option<Size> {
        (**self).determine_resolution(input_sizes)
    }

    fn depending_area_of_interest(&self, input: usize, output: Rect, input_extent: Rect) -> Rect {
        (**self).depending_area_of_interest(input, output, input_extent)
    }

    fn initialize_tile_data(&self, rect: Rect, inputs: &Inputs<'_>) -> Option<TileData> {
        (**self).initialize_tile_data(rect, inputs)
    }

    fn execute_pixel(
        &self,
        out: &mut Pixel,
        x: f32,
        y: f32,
        sampler: PixelSampler,
        inputs: &Inputs<'_>,
        tile: Option<&TileData>,
    ) {
        (**self).execute_pixel(out, x, y, sampler, inputs, tile)
    }
}
