//! Float pixel buffers exchanged between operations.
//!
//! A [`PixelBuffer`] owns a contiguous `f32` store for a rectangular region
//! of image space with 1 to 4 channels per pixel. Buffers are mutated only
//! by the operation producing them; once production finishes they are
//! shared immutably (typically behind an `Arc`), which is what makes
//! concurrent reads from tile workers safe.

use crate::core::geometry::{Rect, Size};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// A single pixel as a fixed-size channel vector.
///
/// Buffers with fewer than four channels fill the missing color channels
/// with `0.0` and alpha with `1.0` on read.
pub type Pixel = [f32; 4];

/// Interpolation policy for fractional-coordinate reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelSampler {
    /// Sample the texel containing the coordinate.
    Nearest,
    /// Blend the four surrounding texels.
    Bilinear,
}

/// Boundary policy for out-of-bounds reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferExtend {
    /// Clamp coordinates to the nearest edge texel.
    Extend,
    /// Out-of-bounds texels read as all-zero.
    Zero,
}

/// A rectangular array of per-pixel float vectors.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    rect: Rect,
    channels: usize,
    data: Vec<f32>,
}

impl PixelBuffer {
    /// Create a zero-filled buffer covering `rect`.
    ///
    /// # Panics
    ///
    /// Panics if `channels` is not in `1..=4`.
    pub fn new(rect: Rect, channels: usize) -> Self {
        assert!(
            (1..=4).contains(&channels),
            "pixel buffers carry 1 to 4 channels, got {}",
            channels
        );
        let len = rect.area() as usize * channels;
        Self {
            rect,
            channels,
            data: vec![0.0; len],
        }
    }

    /// Create a buffer by evaluating `f` at every pixel of `rect`.
    ///
    /// `f` receives absolute image coordinates.
    pub fn from_fn(rect: Rect, channels: usize, mut f: impl FnMut(u32, u32) -> Pixel) -> Self {
        let mut buffer = Self::new(rect, channels);
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                let pixel = f(x, y);
                buffer.write_pixel(x, y, &pixel);
            }
        }
        buffer
    }

    /// Convert a decoded image into a 4-channel buffer at origin.
    ///
    /// Channel values are normalized to `0.0..=1.0`.
    pub fn from_image(image: &DynamicImage) -> Self {
        let rgba = image.to_rgba32f();
        let rect = Rect::new(0, 0, rgba.width(), rgba.height());
        let mut buffer = Self::new(rect, 4);
        buffer.data.copy_from_slice(rgba.as_raw());
        buffer
    }

    /// Convert to an 8-bit RGBA image, clamping channels to `0.0..=1.0`.
    pub fn to_rgba_image(&self) -> image::RgbaImage {
        image::RgbaImage::from_fn(self.rect.width, self.rect.height, |x, y| {
            let px = self.texel(self.rect.x + x, self.rect.y + y);
            image::Rgba([
                (px[0].clamp(0.0, 1.0) * 255.0).round() as u8,
                (px[1].clamp(0.0, 1.0) * 255.0).round() as u8,
                (px[2].clamp(0.0, 1.0) * 255.0).round() as u8,
                (px[3].clamp(0.0, 1.0) * 255.0).round() as u8,
            ])
        })
    }

    /// The region of image space this buffer covers.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Buffer dimensions.
    pub fn size(&self) -> Size {
        self.rect.size()
    }

    /// Channels per pixel (1 to 4).
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Raw channel data, row-major within the buffer's rect.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Write a pixel at absolute image coordinates.
    ///
    /// Only the buffer's channel count is stored; extra channels in
    /// `pixel` are ignored. Writes outside the buffer's rect are ignored.
    pub fn write_pixel(&mut self, x: u32, y: u32, pixel: &Pixel) {
        if !self.rect.contains(x, y) {
            return;
        }
        let offset = self.offset(x, y);
        self.data[offset..offset + self.channels].copy_from_slice(&pixel[..self.channels]);
    }

    /// Copy the overlapping region of `src` into this buffer.
    ///
    /// Both buffers address the same image space; channel counts must
    /// match. Used to assemble finished tiles into the output buffer.
    pub fn blit_from(&mut self, src: &PixelBuffer) {
        debug_assert_eq!(self.channels, src.channels);
        let overlap = self.rect.intersect(&src.rect);
        for y in overlap.y..overlap.bottom() {
            let src_start = src.offset(overlap.x, y);
            let dst_start = self.offset(overlap.x, y);
            let len = overlap.width as usize * self.channels;
            self.data[dst_start..dst_start + len]
                .copy_from_slice(&src.data[src_start..src_start + len]);
        }
    }

    /// Read a pixel with the given sampling and boundary policy.
    ///
    /// Coordinates are absolute image coordinates and may be fractional.
    /// Reads are side-effect-free and safe to call concurrently.
    pub fn read(&self, out: &mut Pixel, x: f32, y: f32, sampler: PixelSampler, extend: BufferExtend) {
        match sampler {
            PixelSampler::Nearest => {
                *out = self.fetch(x.floor() as i64, y.floor() as i64, extend);
            }
            PixelSampler::Bilinear => {
                let x0 = x.floor();
                let y0 = y.floor();
                let tx = x - x0;
                let ty = y - y0;
                let x0 = x0 as i64;
                let y0 = y0 as i64;

                let c00 = self.fetch(x0, y0, extend);
                let c10 = self.fetch(x0 + 1, y0, extend);
                let c01 = self.fetch(x0, y0 + 1, extend);
                let c11 = self.fetch(x0 + 1, y0 + 1, extend);

                for i in 0..4 {
                    let top = c00[i] + (c10[i] - c00[i]) * tx;
                    let bottom = c01[i] + (c11[i] - c01[i]) * tx;
                    out[i] = top + (bottom - top) * ty;
                }
            }
        }
    }

    /// Fetch one texel, applying the boundary policy.
    fn fetch(&self, x: i64, y: i64, extend: BufferExtend) -> Pixel {
        let in_x = x >= self.rect.x as i64 && x < self.rect.right() as i64;
        let in_y = y >= self.rect.y as i64 && y < self.rect.bottom() as i64;
        if in_x && in_y {
            return self.texel(x as u32, y as u32);
        }
        match extend {
            BufferExtend::Zero => [0.0; 4],
            BufferExtend::Extend => {
                let cx = x.clamp(self.rect.x as i64, self.rect.right() as i64 - 1) as u32;
                let cy = y.clamp(self.rect.y as i64, self.rect.bottom() as i64 - 1) as u32;
                self.texel(cx, cy)
            }
        }
    }

    /// In-bounds texel read, padding missing channels.
    fn texel(&self, x: u32, y: u32) -> Pixel {
        let offset = self.offset(x, y);
        let mut out = [0.0, 0.0, 0.0, 1.0];
        out[..self.channels].copy_from_slice(&self.data[offset..offset + self.channels]);
        out
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (((y - self.rect.y) as usize * self.rect.width as usize) + (x - self.rect.x) as usize)
            * self.channels
    }
}
