//! Color balance operations.
//!
//! Two grading models over the same scaffold: ASC-CDL (slope/offset/power)
//! and lift/gamma/gain. Both blend the graded color with the unmodified
//! input by a clamped factor from a value socket and pass alpha through.

use crate::core::buffer::{Pixel, PixelSampler};
use crate::execution::reader::Inputs;
use crate::graph::operation::{Operation, Signature, TileData};
use crate::operations::registry::{OperationRegistry, Params};

/// Register the color balance operations.
pub fn register(registry: &mut OperationRegistry) {
    registry.register("color_balance_cdl", |params| {
        Box::new(ColorBalanceAscCdl::from_params(params))
    });
    registry.register("color_balance_lgg", |params| {
        Box::new(ColorBalanceLgg::from_params(params))
    });
}

/// ASC-CDL transfer for one channel.
#[inline]
fn colorbalance_cdl(input: f32, offset: f32, power: f32, slope: f32) -> f32 {
    // Clamp before pow to prevent NaN.
    let x = (input * slope + offset).clamp(0.0, 1.0);
    x.powf(power)
}

/// Lift/gamma/gain transfer for one channel.
///
/// `lift` arrives preprocessed as `2 - lift` and `gamma` as its inverse.
#[inline]
fn colorbalance_lgg(input: f32, lift_lgg: f32, gamma_inv: f32, gain: f32) -> f32 {
    let x = (gain * ((input - 1.0) * lift_lgg + 1.0)).max(0.0);
    x.powf(gamma_inv)
}

/// Color balance in the ASC-CDL model.
pub struct ColorBalanceAscCdl {
    offset: [f32; 3],
    power: [f32; 3],
    slope: [f32; 3],
}

impl ColorBalanceAscCdl {
    /// Create from per-channel offset/power/slope triples.
    pub fn new(offset: [f32; 3], power: [f32; 3], slope: [f32; 3]) -> Self {
        Self { offset, power, slope }
    }

    /// Build from a parameter record (`offset`, `power`, `slope` triples).
    pub fn from_params(params: &Params) -> Self {
        Self::new(
            params.vec3_or("offset", [0.0; 3]),
            params.vec3_or("power", [1.0; 3]),
            params.vec3_or("slope", [1.0; 3]),
        )
    }
}

impl Operation for ColorBalanceAscCdl {
    fn signature(&self) -> Signature {
        Signature::new("color_balance_cdl")
            .value_input("factor", 1.0)
            .color_input("color", [1.0, 1.0, 1.0, 1.0])
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
        let mut color = [0.0; 4];
        inputs.read(0, &mut value, x, y, sampler);
        inputs.read(1, &mut color, x, y, sampler);

        let fac = value[0].clamp(0.0, 1.0);
        let mfac = 1.0 - fac;

        for c in 0..3 {
            out[c] = mfac * color[c]
                + fac * colorbalance_cdl(color[c], self.offset[c], self.power[c], self.slope[c]);
        }
        out[3] = color[3];
    }
}

/// Color balance in the lift/gamma/gain model.
pub struct ColorBalanceLgg {
    lift_lgg: [f32; 3],
    gamma_inv: [f32; 3],
    gain: [f32; 3],
}

impl ColorBalanceLgg {
    /// Create from per-channel lift/gamma/gain triples.
    pub fn new(lift: [f32; 3], gamma: [f32; 3], gain: [f32; 3]) -> Self {
        let mut lift_lgg = [0.0; 3];
        let mut gamma_inv = [0.0; 3];
        for c in 0..3 {
            lift_lgg[c] = 2.0 - lift[c];
            // Degenerate gamma substitutes a floor rather than erroring.
            gamma_inv[c] = 1.0 / gamma[c].max(1e-6);
        }
        Self {
            lift_lgg,
            gamma_inv,
            gain,
        }
    }

    /// Build from a parameter record (`lift`, `gamma`, `gain` triples).
    pub fn from_params(params: &Params) -> Self {
        Self::new(
            params.vec3_or("lift", [1.0; 3]),
            params.vec3_or("gamma", [1.0; 3]),
            params.vec3_or("gain", [1.0; 3]),
        )
    }
}

impl Operation for ColorBalanceLgg {
    fn signature(&self) -> Signature {
        Signature::new("color_balance_lgg")
            .value_input("factor", 1.0)
            .color_input("color", [1.0, 1.0, 1.0, 1.0])
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
        let mut color = [0.0; 4];
        inputs.read(0, &mut value, x, y, sampler);
        inputs.read(1, &mut color, x, y, sampler);

        let fac = value[0].clamp(0.0, 1.0);
        let mfac = 1.0 - fac;

        for c in 0..3 {
            out[c] = mfac * color[c]
                + fac * colorbalance_lgg(color[c], self.lift_lgg[c], self.gamma_inv[c], self.gain[c]);
        }
        out[3] = color[3];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cdl_identity() {
        // offset 0, power 1, slope 1 leaves the input untouched.
        assert_eq!(colorbalance_cdl(0.5, 0.0, 1.0, 1.0), 0.5);
    }

    #[test]
    fn test_cdl_clamps_before_power() {
        // 0.6 * 2 = 1.2 clamps to 1.0 before pow.
        assert_eq!(colorbalance_cdl(0.6, 0.0, 1.0, 2.0), 1.0);
        // Negative pre-power values clamp to 0 instead of producing NaN.
        let out = colorbalance_cdl(0.1, -0.5, 0.5, 1.0);
        assert_eq!(out, 0.0);
    }

    #[test]
    fn test_cdl_power_applies_after_clamp() {
        let out = colorbalance_cdl(0.25, 0.0, 2.0, 1.0);
        assert!((out - 0.0625).abs() < 1e-6);
    }

    #[test]
    fn test_lgg_identity() {
        // Neutral lift/gamma/gain (lift_lgg = 2 - 1) passes the input through.
        assert_eq!(colorbalance_lgg(0.5, 2.0 - 1.0, 1.0, 1.0), 0.5);
        assert_eq!(colorbalance_lgg(0.25, 2.0 - 1.0, 1.0, 1.0), 0.25);
    }

    #[test]
    fn test_lgg_zero_gain_crushes_to_black() {
        assert_eq!(colorbalance_lgg(0.3, 1.0, 1.0, 0.0), 0.0);
    }

    #[test]
    fn test_lgg_negative_pre_power_clamps() {
        // Crushed lift (lift_lgg above 1) pushes dark input negative; it
        // clamps before pow.
        assert_eq!(colorbalance_lgg(0.0, 2.0, 0.5, 1.0), 0.0);
    }

    #[test]
    fn test_blend_factor_clamps() {
        use crate::core::buffer::BufferExtend;
        use crate::core::context::ExecutionContext;
        use crate::core::geometry::Size;
        use crate::execution::scheduler::TileScheduler;
        use crate::graph::structure::OperationGraph;
        use crate::operations::source::{SetColor, SetValue};

        // factor 2.5 must clamp to 1.0: output is fully graded.
        let mut graph = OperationGraph::new();
        let factor = graph.add(Box::new(SetValue::new(2.5).with_size(Size::new(2, 2))));
        let color = graph.add(Box::new(
            SetColor::new([0.5, 0.5, 0.5, 1.0]).with_size(Size::new(2, 2)),
        ));
        let balance = graph.add(Box::new(ColorBalanceAscCdl::new(
            [0.0; 3],
            [2.0; 3],
            [1.0; 3],
        )));
        graph.connect(factor, balance, 0).unwrap();
        graph.connect(color, balance, 1).unwrap();

        let output = TileScheduler::new()
            .execute(&graph, balance, &ExecutionContext::new())
            .unwrap();
        let mut px = [0.0; 4];
        output.read(
            &mut px,
            0.0,
            0.0,
            crate::core::buffer::PixelSampler::Nearest,
            BufferExtend::Extend,
        );
        assert!((px[0] - 0.25).abs() < 1e-6);
        assert_eq!(px[3], 1.0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn cdl_output_is_finite_and_nonnegative(
                input in -2.0f32..2.0,
                offset in -1.0f32..1.0,
                power in 0.0f32..4.0,
                slope in 0.0f32..4.0,
            ) {
                let out = colorbalance_cdl(input, offset, power, slope);
                prop_assert!(out.is_finite());
                prop_assert!(out >= 0.0);
                prop_assert!(out <= 1.0);
            }

            #[test]
            fn cdl_is_deterministic(
                input in -2.0f32..2.0,
                offset in -1.0f32..1.0,
                power in 0.0f32..4.0,
                slope in 0.0f32..4.0,
            ) {
                let a = colorbalance_cdl(input, offset, power, slope);
                let b = colorbalance_cdl(input, offset, power, slope);
                prop_assert_eq!(a, b);
            }
        }
    }
}
