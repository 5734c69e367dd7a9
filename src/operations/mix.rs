//! Mixing of two color inputs.

use crate::core::buffer::{Pixel, PixelSampler};
use crate::execution::reader::Inputs;
use crate::graph::operation::{Operation, Signature, TileData};
use crate::operations::registry::OperationRegistry;

/// Register the mix operation.
pub fn register(registry: &mut OperationRegistry) {
    registry.register("mix", |_| Box::new(Mix));
}

/// Linear blend of two colors by a clamped value factor.
///
/// `factor` 0 keeps the first input, 1 takes the second; alpha comes from
/// the first input.
pub struct Mix;

impl Operation for Mix {
    fn signature(&self) -> Signature {
        Signature::new("mix")
            .value_input("factor", 1.0)
            .color_input("image", [0.0, 0.0, 0.0, 1.0])
            .color_input("image2", [0.0, 0.0, 0.0, 1.0])
            .color_output()
            .resolution_from(1)
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
        let mut value = [0.0; 4];
        let mut first = [0.0; 4];
        let mut second = [0.0; 4];
        inputs.read(0, &mut value, x, y, sampler);
        inputs.read(1, &mut first, x, y, sampler);
        inputs.read(2, &mut second, x, y, sampler);

        let fac = value[0].clamp(0.0, 1.0);
        let mfac = 1.0 - fac;
        for c in 0..3 {
            out[c] = mfac * first[c] + fac * second[c];
        }
        out[3] = first[3];
    }
}
