//! Box blur.
//!
//! The representative operation with spatial support wider than one pixel:
//! its area of interest expands the requested rectangle by the blur radius
//! so tile scheduling materializes enough upstream context.

use crate::core::buffer::{Pixel, PixelSampler};
use crate::core::geometry::Rect;
use crate::execution::reader::Inputs;
use crate::graph::operation::{Operation, Signature, TileData};
use crate::operations::registry::{OperationRegistry, Params};

/// Register the blur operations.
pub fn register(registry: &mut OperationRegistry) {
    registry.register("box_blur", |params| Box::new(BoxBlur::from_params(params)));
}

/// Uniform box blur with a square window of edge `2 * radius + 1`.
pub struct BoxBlur {
    radius: u32,
}

impl BoxBlur {
    /// Create a blur with the given radius; 0 is the identity.
    pub fn new(radius: u32) -> Self {
        Self { radius }
    }

    /// Build from a parameter record (`radius`).
    pub fn from_params(params: &Params) -> Self {
        Self::new(params.int_or("radius", 1).max(0) as u32)
    }
}

impl Operation for BoxBlur {
    fn signature(&self) -> Signature {
        Signature::new("box_blur").color_input("image", [0.0, 0.0, 0.0, 1.0])
    }

    fn depending_area_of_interest(&self, _input: usize, output: Rect, input_extent: Rect) -> Rect {
        output.expand_within(self.radius, &input_extent)
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
        let radius = self.radius as i64;
        let mut sum = [0.0f32; 4];
        let mut sample = [0.0; 4];
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                inputs.read(0, &mut sample, x + dx as f32, y + dy as f32, sampler);
                for c in 0..4 {
                    sum[c] += sample[c];
                }
            }
        }
        let window = (2 * radius + 1) * (2 * radius + 1);
        let scale = 1.0 / window as f32;
        for c in 0..4 {
            out[c] = sum[c] * scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffer::{BufferExtend, PixelBuffer};
    use crate::core::context::ExecutionContext;
    use crate::execution::scheduler::TileScheduler;
    use crate::graph::structure::OperationGraph;
    use crate::operations::source::BufferSource;

    #[test]
    fn test_area_of_interest_expands_by_radius() {
        let blur = BoxBlur::new(3);
        let extent = Rect::new(0, 0, 100, 100);
        let out = Rect::new(10, 10, 20, 20);
        assert_eq!(
            blur.depending_area_of_interest(0, out, extent),
            Rect::new(7, 7, 26, 26)
        );

        // Clamped at the image border.
        let corner = Rect::new(0, 0, 8, 8);
        assert_eq!(
            blur.depending_area_of_interest(0, corner, extent),
            Rect::new(0, 0, 11, 11)
        );
    }

    #[test]
    fn test_radius_zero_is_identity() {
        let blur = BoxBlur::new(0);
        let extent = Rect::new(0, 0, 32, 32);
        let out = Rect::new(4, 4, 8, 8);
        assert_eq!(blur.depending_area_of_interest(0, out, extent), out);
    }

    #[test]
    fn test_uniform_field_is_unchanged() {
        let buffer = PixelBuffer::from_fn(Rect::new(0, 0, 8, 8), 4, |_, _| [0.3, 0.6, 0.9, 1.0]);

        let mut graph = OperationGraph::new();
        let source = graph.add(Box::new(BufferSource::new(buffer)));
        let blur = graph.add(Box::new(BoxBlur::new(2)));
        graph.connect(source, blur, 0).unwrap();

        let output = TileScheduler::new()
            .execute(&graph, blur, &ExecutionContext::new())
            .unwrap();
        let mut px = [0.0; 4];
        output.read(
            &mut px,
            4.0,
            4.0,
            PixelSampler::Nearest,
            BufferExtend::Extend,
        );
        assert!((px[0] - 0.3).abs() < 1e-5);
        assert!((px[1] - 0.6).abs() < 1e-5);
        assert!((px[2] - 0.9).abs() < 1e-5);
    }

    #[test]
    fn test_averages_neighborhood() {
        // Single white pixel at (1, 1) in a black 3x3 image: radius-1 blur
        // at the center averages the full window.
        let buffer = PixelBuffer::from_fn(Rect::new(0, 0, 3, 3), 4, |x, y| {
            if x == 1 && y == 1 {
                [1.0, 1.0, 1.0, 1.0]
            } else {
                [0.0, 0.0, 0.0, 1.0]
            }
        });

        let mut graph = OperationGraph::new();
        let source = graph.add(Box::new(BufferSource::new(buffer)));
        let blur = graph.add(Box::new(BoxBlur::new(1)));
        graph.connect(source, blur, 0).unwrap();

        let output = TileScheduler::new()
            .execute(&graph, blur, &ExecutionContext::new())
            .unwrap();
        let mut px = [0.0; 4];
        output.read(
            &mut px,
            1.0,
            1.0,
            PixelSampler::Nearest,
            BufferExtend::Extend,
        );
        assert!((px[0] - 1.0 / 9.0).abs() < 1e-6);
    }
}
