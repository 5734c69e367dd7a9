//! Source operations: buffer inputs and constants.

use crate::core::buffer::{BufferExtend, Pixel, PixelBuffer, PixelSampler};
use crate::core::geometry::Size;
use crate::execution::reader::Inputs;
use crate::graph::operation::{Operation, Signature, TileData};
use crate::operations::registry::{OperationRegistry, Params};
use std::sync::Arc;

/// Register the constant source operations.
///
/// [`BufferSource`] is not registered: it wraps live pixel data and is
/// bound programmatically rather than built from a parameter record.
pub fn register(registry: &mut OperationRegistry) {
    registry.register("set_value", |params| Box::new(SetValue::from_params(params)));
    registry.register("set_color", |params| Box::new(SetColor::from_params(params)));
}

/// Feeds an existing pixel buffer into the graph.
///
/// The buffer is immutable from here on; reads apply the configured
/// boundary policy.
pub struct BufferSource {
    buffer: Arc<PixelBuffer>,
    extend: BufferExtend,
}

impl BufferSource {
    /// Wrap a finished buffer.
    pub fn new(buffer: PixelBuffer) -> Self {
        Self::from_arc(Arc::new(buffer))
    }

    /// Wrap an already-shared buffer.
    pub fn from_arc(buffer: Arc<PixelBuffer>) -> Self {
        Self {
            buffer,
            extend: BufferExtend::Extend,
        }
    }

    /// Select the boundary policy for out-of-bounds reads.
    pub fn with_extend(mut self, extend: BufferExtend) -> Self {
        self.extend = extend;
        self
    }
}

impl Operation for BufferSource {
    fn signature(&self) -> Signature {
        let signature = Signature::new("buffer_source");
        if self.buffer.channels() == 1 {
            signature.value_output()
        } else {
            signature.color_output()
        }
    }

    fn determine_resolution(&self, _input_sizes: &[Option<Size>]) -> Option<Size> {
        Some(self.buffer.size())
    }

    fn execute_pixel(
        &self,
        out: &mut Pixel,
        x: f32,
        y: f32,
        sampler: PixelSampler,
        _inputs: &Inputs<'_>,
        _tile: Option<&TileData>,
    ) {
        self.buffer.read(out, x, y, sampler, self.extend);
    }
}

/// Produces a constant scalar at every pixel.
///
/// Has no intrinsic resolution: give it an explicit size (or a graph-level
/// override) when something derives its size from it.
pub struct SetValue {
    value: f32,
    size: Option<Size>,
}

impl SetValue {
    /// Create a constant value source.
    pub fn new(value: f32) -> Self {
        Self { value, size: None }
    }

    /// Give the source a fixed output size.
    pub fn with_size(mut self, size: Size) -> Self {
        self.size = Some(size);
        self
    }

    /// Build from a parameter record (`value`, optional `width`/`height`).
    pub fn from_params(params: &Params) -> Self {
        let mut op = Self::new(params.float_or("value", 0.0));
        if let Some(size) = params.size() {
            op = op.with_size(size);
        }
        op
    }
}

impl Operation for SetValue {
    fn signature(&self) -> Signature {
        Signature::new("set_value").value_output()
    }

    fn determine_resolution(&self, _input_sizes: &[Option<Size>]) -> Option<Size> {
        self.size
    }

    fn execute_pixel(
        &self,
        out: &mut Pixel,
        _x: f32,
        _y: f32,
        _sampler: PixelSampler,
        _inputs: &Inputs<'_>,
        _tile: Option<&TileData>,
    ) {
        *out = [self.value, self.value, self.value, 1.0];
    }
}

/// Produces a constant color at every pixel.
pub struct SetColor {
    color: Pixel,
    size: Option<Size>,
}

impl SetColor {
    /// Create a constant color source.
    pub fn new(color: Pixel) -> Self {
        Self { color, size: None }
    }

    /// Give the source a fixed output size.
    pub fn with_size(mut self, size: Size) -> Self {
        self.size = Some(size);
        self
    }

    /// Build from a parameter record (`color`, optional `width`/`height`).
    pub fn from_params(params: &Params) -> Self {
        let mut op = Self::new(params.color_or("color", [0.0, 0.0, 0.0, 1.0]));
        if let Some(size) = params.size() {
            op = op.with_size(size);
        }
        op
    }
}

impl Operation for SetColor {
    fn signature(&self) -> Signature {
        Signature::new("set_color").color_output()
    }

    fn determine_resolution(&self, _input_sizes: &[Option<Size>]) -> Option<Size> {
        self.size
    }

    fn execute_pixel(
        &self,
        out: &mut Pixel,
        _x: f32,
        _y: f32,
        _sampler: PixelSampler,
        _inputs: &Inputs<'_>,
        _tile: Option<&TileData>,
    ) {
        *out = self.color;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::ExecutionContext;
    use crate::core::geometry::Rect;
    use crate::execution::scheduler::TileScheduler;
    use crate::graph::structure::OperationGraph;

    #[test]
    fn test_buffer_source_samples_wrapped_buffer() {
        let buffer = PixelBuffer::from_fn(Rect::new(0, 0, 4, 4), 4, |x, _| {
            [x as f32, 0.0, 0.0, 1.0]
        });

        let mut graph = OperationGraph::new();
        let source = graph.add(Box::new(BufferSource::new(buffer)));

        let output = TileScheduler::new()
            .execute(&graph, source, &ExecutionContext::new())
            .unwrap();
        let mut px = [0.0; 4];
        output.read(&mut px, 2.0, 1.0, PixelSampler::Nearest, BufferExtend::Extend);
        assert_eq!(px, [2.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_set_value_requires_explicit_size() {
        let mut graph = OperationGraph::new();
        let value = graph.add(Box::new(SetValue::new(0.7)));

        // Without a size the execution fails up front.
        let result = TileScheduler::new().execute(&graph, value, &ExecutionContext::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_set_color_with_size_renders_flat_field() {
        let mut graph = OperationGraph::new();
        let color = graph.add(Box::new(
            SetColor::new([0.1, 0.2, 0.3, 1.0]).with_size(Size::new(8, 8)),
        ));

        let output = TileScheduler::new()
            .execute(&graph, color, &ExecutionContext::new())
            .unwrap();
        let mut px = [0.0; 4];
        output.read(&mut px, 5.0, 5.0, PixelSampler::Nearest, BufferExtend::Extend);
        assert_eq!(px, [0.1, 0.2, 0.3, 1.0]);
    }
}
