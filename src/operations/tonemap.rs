//! Global tone mapping.
//!
//! Both tone-map operations are complex: they need statistics gathered
//! over the entire upstream image before the first pixel can be produced.
//! The statistics pass runs exactly once per execution behind the
//! operation's compute-once slot, no matter how many tile workers arrive
//! first, and the payload is released on deinit.

use crate::core::buffer::{Pixel, PixelBuffer, PixelSampler};
use crate::core::geometry::Rect;
use crate::execution::cache::ComputeOnce;
use crate::execution::reader::Inputs;
use crate::graph::operation::{Operation, Signature, TileData};
use crate::operations::registry::{OperationRegistry, Params};
use log::debug;

/// Register the tone mapping operations.
pub fn register(registry: &mut OperationRegistry) {
    registry.register("tonemap", |params| Box::new(Tonemap::from_params(params)));
    registry.register("tonemap_photoreceptor", |params| {
        Box::new(PhotoreceptorTonemap::from_params(params))
    });
}

/// Relative luminance, ITU-R BT.709 derived weights.
///
/// The exact constants are part of the numeric contract shared by the
/// statistics pass and the photoreceptor kernel.
#[inline]
pub(crate) fn luminance(pixel: &Pixel) -> f32 {
    0.212671 * pixel[0] + 0.71516 * pixel[1] + 0.072169 * pixel[2]
}

/// Near-black floor applied before logarithms.
const LOG_EPSILON: f32 = 1e-5;

/// Whole-image luminance statistics feeding the tone-map kernels.
///
/// Computed in a single pass; owned by the operation instance that
/// computed it and freed when that operation deinitializes.
#[derive(Debug, Clone, Copy)]
pub struct LuminanceStats {
    /// Average luminance.
    pub lav: f32,
    /// Per-channel color averages.
    pub cav: [f32; 4],
    /// Exposure heuristic from the luminance range; 1.0 when the image is
    /// uniform.
    pub auto_key: f32,
    /// Scale factor `key / geometric-mean luminance`.
    pub al: f32,
    /// Inverse gamma, substituting 1 for a zero gamma.
    pub igm: f32,
}

impl LuminanceStats {
    /// Gather statistics over a materialized color buffer.
    pub fn from_buffer(buffer: &PixelBuffer, key: f32, gamma: f32) -> Self {
        let channels = buffer.channels();
        let pixels = buffer.size().area().max(1) as f32;
        let sc = 1.0 / pixels;

        let mut lsum = 0.0f32;
        let mut lav = 0.0f32;
        let mut cav = [0.0f32; 4];
        let mut maxl = -1e10f32;
        let mut minl = 1e10f32;

        for px in buffer.as_slice().chunks_exact(channels) {
            let mut color = [0.0, 0.0, 0.0, 1.0];
            color[..channels].copy_from_slice(px);
            let l = luminance(&color);
            lav += l;
            for c in 0..4 {
                cav[c] += color[c];
            }
            lsum += (l.max(0.0) + LOG_EPSILON).ln();
            maxl = if l > maxl { l } else { maxl };
            minl = if l < minl { l } else { minl };
        }

        let maxl = (maxl + LOG_EPSILON).ln();
        let minl = (minl + LOG_EPSILON).ln();
        let avl = lsum * sc;
        let auto_key = if maxl > minl {
            (maxl - avl) / (maxl - minl)
        } else {
            1.0
        };
        let al = avl.exp();

        Self {
            lav: lav * sc,
            cav: [cav[0] * sc, cav[1] * sc, cav[2] * sc, cav[3] * sc],
            auto_key,
            al: if al == 0.0 { 0.0 } else { key / al },
            igm: if gamma == 0.0 { 1.0 } else { 1.0 / gamma },
        }
    }
}

/// Simple global tone mapping (Reinhard-style).
pub struct Tonemap {
    key: f32,
    offset: f32,
    gamma: f32,
    cached: ComputeOnce<LuminanceStats>,
}

impl Tonemap {
    /// Create with the given key/offset/gamma.
    pub fn new(key: f32, offset: f32, gamma: f32) -> Self {
        Self {
            key,
            offset,
            gamma,
            cached: ComputeOnce::new(),
        }
    }

    /// Build from a parameter record (`key`, `offset`, `gamma`).
    pub fn from_params(params: &Params) -> Self {
        Self::new(
            params.float_or("key", 0.18),
            params.float_or("offset", 1.0),
            params.float_or("gamma", 1.0),
        )
    }

    fn stats(&self, rect: Rect, inputs: &Inputs<'_>) -> TileData {
        let extent = inputs.extent(0).unwrap_or(rect);
        let full = self.depending_area_of_interest(0, rect, extent);
        self.cached.get_or_compute(|| {
            debug!("tonemap: gathering luminance statistics over {}", full);
            let buffer = inputs.materialize(0, full);
            LuminanceStats::from_buffer(&buffer, self.key, self.gamma)
        })
    }
}

impl Operation for Tonemap {
    fn signature(&self) -> Signature {
        Signature::new("tonemap")
            .color_input("image", [0.0, 0.0, 0.0, 1.0])
            .color_output()
    }

    fn is_complex(&self) -> bool {
        true
    }

    fn deinit_execution(&self) {
        self.cached.clear();
    }

    fn depending_area_of_interest(&self, _input: usize, _output: Rect, input_extent: Rect) -> Rect {
        // Statistics depend on every upstream pixel.
        input_extent
    }

    fn initialize_tile_data(&self, rect: Rect, inputs: &Inputs<'_>) -> Option<TileData> {
        Some(self.stats(rect, inputs))
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
        inputs.read(0, out, x, y, sampler);
        let stats = match tile.and_then(|t| t.downcast_ref::<LuminanceStats>()) {
            Some(stats) => stats,
            // Setup missing: pass the input through untouched.
            None => return,
        };

        for c in 0..3 {
            out[c] *= stats.al;
        }
        for c in 0..3 {
            let d = out[c] + self.offset;
            // Zero denominator divides by 1 instead.
            out[c] /= if d == 0.0 { 1.0 } else { d };
        }
        let igm = stats.igm;
        if igm != 0.0 {
            for c in 0..3 {
                out[c] = out[c].max(0.0).powf(igm);
            }
        }
    }
}

/// Photoreceptor-model tone mapping.
///
/// Blends local and global adaptation per channel; the contrast exponent
/// defaults from the auto-key heuristic when not set explicitly.
pub struct PhotoreceptorTonemap {
    intensity: f32,
    contrast: f32,
    adaptation: f32,
    color_correction: f32,
    cached: ComputeOnce<LuminanceStats>,
}

impl PhotoreceptorTonemap {
    /// Create with the given intensity/contrast/adaptation/color-correction.
    pub fn new(intensity: f32, contrast: f32, adaptation: f32, color_correction: f32) -> Self {
        Self {
            intensity,
            contrast,
            adaptation,
            color_correction,
            cached: ComputeOnce::new(),
        }
    }

    /// Build from a parameter record (`intensity`, `contrast`,
    /// `adaptation`, `color_correction`).
    pub fn from_params(params: &Params) -> Self {
        Self::new(
            params.float_or("intensity", 0.0),
            params.float_or("contrast", 0.0),
            params.float_or("adaptation", 1.0),
            params.float_or("color_correction", 0.0),
        )
    }

    fn stats(&self, rect: Rect, inputs: &Inputs<'_>) -> TileData {
        let extent = inputs.extent(0).unwrap_or(rect);
        let full = self.depending_area_of_interest(0, rect, extent);
        self.cached.get_or_compute(|| {
            debug!(
                "photoreceptor tonemap: gathering luminance statistics over {}",
                full
            );
            let buffer = inputs.materialize(0, full);
            // al/igm are unused by this kernel; neutral key and gamma.
            LuminanceStats::from_buffer(&buffer, 1.0, 1.0)
        })
    }
}

impl Operation for PhotoreceptorTonemap {
    fn signature(&self) -> Signature {
        Signature::new("tonemap_photoreceptor")
            .color_input("image", [0.0, 0.0, 0.0, 1.0])
            .color_output()
    }

    fn is_complex(&self) -> bool {
        true
    }

    fn deinit_execution(&self) {
        self.cached.clear();
    }

    fn depending_area_of_interest(&self, _input: usize, _output: Rect, input_extent: Rect) -> Rect {
        input_extent
    }

    fn initialize_tile_data(&self, rect: Rect, inputs: &Inputs<'_>) -> Option<TileData> {
        Some(self.stats(rect, inputs))
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
        inputs.read(0, out, x, y, sampler);
        let stats = match tile.and_then(|t| t.downcast_ref::<LuminanceStats>()) {
            Some(stats) => stats,
            None => return,
        };

        let f = (-self.intensity).exp();
        let m = if self.contrast > 0.0 {
            self.contrast
        } else {
            0.3 + 0.7 * stats.auto_key.powf(1.4)
        };
        let ic = 1.0 - self.color_correction;
        let ia = 1.0 - self.adaptation;

        let l = luminance(out);
        for c in 0..3 {
            let i_l = out[c] + ic * (l - out[c]);
            let i_g = stats.cav[c] + ic * (stats.lav - stats.cav[c]);
            let i_a = i_l + ia * (i_g - i_l);
            out[c] /= out[c] + (f * i_a).powf(m);
        }
    }
}
