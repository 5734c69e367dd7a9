//! Channel separation, combination and YUV conversion.
//!
//! Separating YUVA is expressed as a color-space conversion followed by a
//! channel extraction, so the same extraction operation serves RGBA and
//! YUVA graphs.

use crate::core::buffer::{Pixel, PixelSampler};
use crate::execution::reader::Inputs;
use crate::graph::operation::{Operation, Signature, TileData};
use crate::operations::registry::{OperationRegistry, Params};

/// Register the channel operations.
pub fn register(registry: &mut OperationRegistry) {
    registry.register("separate_channel", |params| {
        Box::new(SeparateChannel::from_params(params))
    });
    registry.register("combine_channels", |_| Box::new(CombineChannels));
    registry.register("rgb_to_yuv", |_| Box::new(RgbToYuv));
    registry.register("yuv_to_rgb", |_| Box::new(YuvToRgb));
}

/// Extracts one channel of a color as a scalar.
pub struct SeparateChannel {
    channel: usize,
}

impl SeparateChannel {
    /// Extract the given channel (0..=3), clamped into range.
    pub fn new(channel: usize) -> Self {
        Self {
            channel: channel.min(3),
        }
    }

    /// Build from a parameter record (`channel`).
    pub fn from_params(params: &Params) -> Self {
        Self::new(params.int_or("channel", 0).max(0) as usize)
    }
}

impl Operation for SeparateChannel {
    fn signature(&self) -> Signature {
        Signature::new("separate_channel")
            .color_input("color", [0.0, 0.0, 0.0, 1.0])
            .value_output()
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
        let mut color = [0.0; 4];
        inputs.read(0, &mut color, x, y, sampler);
        let value = color[self.channel];
        *out = [value, value, value, 1.0];
    }
}

/// Combines four scalar inputs into a color.
pub struct CombineChannels;

impl Operation for CombineChannels {
    fn signature(&self) -> Signature {
        Signature::new("combine_channels")
            .value_input("red", 0.0)
            .value_input("green", 0.0)
            .value_input("blue", 0.0)
            .value_input("alpha", 1.0)
            .color_output()
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
        let mut channel = [0.0; 4];
        for c in 0..4 {
            inputs.read(c, &mut channel, x, y, sampler);
            out[c] = channel[0];
        }
    }
}

/// ITU-R BT.601 RGB -> YUV, alpha passed through.
pub struct RgbToYuv;

impl Operation for RgbToYuv {
    fn signature(&self) -> Signature {
        Signature::new("rgb_to_yuv").color_input("color", [0.0, 0.0, 0.0, 1.0])
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
        let mut color = [0.0; 4];
        inputs.read(0, &mut color, x, y, sampler);
        let luma = 0.299 * color[0] + 0.587 * color[1] + 0.114 * color[2];
        out[0] = luma;
        out[1] = (color[2] - luma) * 0.565;
        out[2] = (color[0] - luma) * 0.713;
        out[3] = color[3];
    }
}

/// ITU-R BT.601 YUV -> RGB, alpha passed through.
pub struct YuvToRgb;

impl Operation for YuvToRgb {
    fn signature(&self) -> Signature {
        Signature::new("yuv_to_rgb").color_input("color", [0.0, 0.0, 0.0, 1.0])
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
        let mut color = [0.0; 4];
        inputs.read(0, &mut color, x, y, sampler);
        let (luma, u, v) = (color[0], color[1], color[2]);
        out[0] = luma + 1.403 * v;
        out[1] = luma - 0.344 * u - 0.714 * v;
        out[2] = luma + 1.77 * u;
        out[3] = color[3];
    }
}
