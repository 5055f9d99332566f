//! Pixel patches — sampled image regions and their luma statistics.

use crate::types::Point;
use thiserror::Error;

/// Largest patch side accepted or produced, in pixels.
pub const MAX_PATCH_SIDE: usize = 512;

/// Upper bound on pixels read when averaging a whole frame.
const SCENE_SAMPLE_BUDGET: usize = 1 << 16;

// Rec. 709 luma coefficients.
const LUMA_R: f64 = 0.2126;
const LUMA_G: f64 = 0.7152;
const LUMA_B: f64 = 0.0722;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PatchError {
    #[error("invalid patch buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("patch {width}x{height} exceeds the 512px side limit")]
    TooLarge { width: usize, height: usize },
    #[error("patch has no pixels")]
    Empty,
}

/// Byte layout of a patch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 8-bit RGB (3 bytes/pixel).
    Rgb8,
    /// Packed 8-bit RGBA (4 bytes/pixel, alpha ignored).
    Rgba8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// A small rectangular region sampled from the source image.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelPatch {
    width: usize,
    height: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

/// Mean and population variance of a patch's luma (0–255 scale).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LumaStats {
    pub mean: f64,
    pub variance: f64,
}

impl PixelPatch {
    pub fn new(
        width: usize,
        height: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, PatchError> {
        if width == 0 || height == 0 {
            return Err(PatchError::Empty);
        }
        if width > MAX_PATCH_SIDE || height > MAX_PATCH_SIDE {
            return Err(PatchError::TooLarge { width, height });
        }
        let expected = width * height * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(PatchError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Single-color patch, mostly useful for tests and synthetic input.
    pub fn uniform(width: usize, height: usize, rgb: [u8; 3]) -> Result<Self, PatchError> {
        let data = rgb.repeat(width * height);
        Self::new(width, height, PixelFormat::Rgb8, data)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Per-pixel luma values in row-major order.
    pub fn luma(&self) -> impl Iterator<Item = f64> + '_ {
        self.data
            .chunks_exact(self.format.bytes_per_pixel())
            .map(|px| luma(px[0], px[1], px[2]))
    }

    pub fn luma_stats(&self) -> LumaStats {
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut n = 0usize;
        for l in self.luma() {
            sum += l;
            sum_sq += l * l;
            n += 1;
        }
        if n == 0 {
            return LumaStats::default();
        }
        let mean = sum / n as f64;
        let variance = (sum_sq / n as f64 - mean * mean).max(0.0);
        LumaStats { mean, variance }
    }
}

pub fn luma(r: u8, g: u8, b: u8) -> f64 {
    LUMA_R * r as f64 + LUMA_G * g as f64 + LUMA_B * b as f64
}

/// A rectangle to sample, centered on `center`, in landmark coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatchRequest {
    pub center: Point,
    pub width: f64,
    pub height: f64,
}

impl PatchRequest {
    pub fn square(center: Point, side: f64) -> Self {
        Self {
            center,
            width: side,
            height: side,
        }
    }
}

/// Capability to read pixels from the image the landmarks were detected on.
/// `Sync` so scoring futures holding a source stay `Send`.
pub trait PatchSource: Sync {
    /// Sample the requested region, clamped to the image bounds and to
    /// [`MAX_PATCH_SIDE`]. Returns `None` when nothing of it lies inside.
    fn sample(&self, request: PatchRequest) -> Option<PixelPatch>;

    /// Mean luma of the whole frame, if the source can provide it.
    fn mean_luma(&self) -> Option<f64> {
        None
    }
}

/// Pixel window `(x, y, w, h)` of `request` intersected with a
/// `width × height` image. `None` when the intersection is empty.
pub fn clamp_window(request: PatchRequest, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    if width == 0 || height == 0 {
        return None;
    }
    let PatchRequest { center, width: rw, height: rh } = request;
    if !center.is_finite() || !rw.is_finite() || !rh.is_finite() || rw < 1.0 || rh < 1.0 {
        return None;
    }

    let rw = rw.min(MAX_PATCH_SIDE as f64).round();
    let rh = rh.min(MAX_PATCH_SIDE as f64).round();
    let x0 = (center.x - rw / 2.0).round();
    let y0 = (center.y - rh / 2.0).round();

    let left = x0.max(0.0);
    let top = y0.max(0.0);
    let right = (x0 + rw).min(width as f64);
    let bottom = (y0 + rh).min(height as f64);

    if right <= left || bottom <= top {
        return None;
    }
    Some((
        left as u32,
        top as u32,
        (right - left) as u32,
        (bottom - top) as u32,
    ))
}

impl PatchSource for image::RgbaImage {
    fn sample(&self, request: PatchRequest) -> Option<PixelPatch> {
        let (x, y, w, h) = clamp_window(request, self.width(), self.height())?;
        let mut data = Vec::with_capacity((w * h) as usize * 4);
        for py in y..y + h {
            for px in x..x + w {
                data.extend_from_slice(&self.get_pixel(px, py).0);
            }
        }
        match PixelPatch::new(w as usize, h as usize, PixelFormat::Rgba8, data) {
            Ok(patch) => Some(patch),
            Err(e) => {
                tracing::warn!(error = %e, "discarding sampled patch");
                None
            }
        }
    }

    fn mean_luma(&self) -> Option<f64> {
        let pixels = (self.width() as usize) * (self.height() as usize);
        if pixels == 0 {
            return None;
        }
        let step = (pixels / SCENE_SAMPLE_BUDGET).max(1);
        let (sum, n) = self
            .pixels()
            .step_by(step)
            .fold((0.0, 0usize), |(sum, n), p| (sum + luma(p.0[0], p.0[1], p.0[2]), n + 1));
        Some(sum / n as f64)
    }
}
