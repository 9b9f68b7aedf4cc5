//! Pixel brightness to depth conversion
//!
//! Captured regions are converted to grayscale, smoothed with a Gaussian
//! blur and normalized to [0, 1]. Bright pixels are high unless inverted.

use image::imageops;

use crate::host::{PixelBuffer, Point, Rect};

/// Normalized depth grid for one captured region
#[derive(Debug, Clone)]
pub struct DepthMap {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl DepthMap {
    /// Build a depth map from captured pixels. `kernel` is the blur side in
    /// pixels; 1 or less disables the blur. Returns `None` for an empty buffer.
    pub fn from_buffer(buffer: &PixelBuffer, kernel: u32, invert: bool) -> Option<Self> {
        let (width, height) = buffer.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let gray = imageops::grayscale(buffer);
        let mut values: Vec<f32> = gray.pixels().map(|p| p.0[0] as f32).collect();

        if kernel > 1 {
            values = gaussian_blur(&values, width as usize, height as usize, kernel as usize);
        }

        for v in values.iter_mut() {
            let d = (*v / 255.0).clamp(0.0, 1.0);
            *v = if invert { 1.0 - d } else { d };
        }

        Some(Self {
            width,
            height,
            values,
        })
    }

    /// Depth at a map coordinate, clamped into the grid
    pub fn sample(&self, x: i64, y: i64) -> f32 {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        self.values[y * self.width as usize + x]
    }

    /// Depth under a screen point. The map is stretched over `region`, so a
    /// capture at a different resolution than the region still lines up.
    pub fn sample_screen(&self, region: Rect, point: Point) -> f32 {
        let (rx, ry) = self.map_point(region, point);
        self.sample(rx, ry)
    }

    fn map_point(&self, region: Rect, point: Point) -> (i64, i64) {
        let scale = |offset: i32, map_len: u32, region_len: i32| -> i64 {
            if region_len <= 0 {
                return 0;
            }
            // Truncation toward zero keeps points left of the region at column 0
            (offset as f64 * map_len as f64 / region_len as f64) as i64
        };
        (
            scale(point.x - region.left, self.width, region.width),
            scale(point.y - region.top, self.height, region.height),
        )
    }
}

/// Map a depth sample to an elevation command in [-scale, scale]
pub fn elevation_for_depth(depth: f32, elevation_scale: f32) -> f32 {
    (depth - 0.5) * 2.0 * elevation_scale
}

/// Sigma for a kernel side when none is given explicitly
fn sigma_for_kernel(kernel: usize) -> f64 {
    0.3 * ((kernel as f64 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Fixed-point tables OpenCV uses instead of the sigma formula for small kernels
const SMALL_KERNELS: [&[f32]; 4] = [
    &[1.0],
    &[0.25, 0.5, 0.25],
    &[0.0625, 0.25, 0.375, 0.25, 0.0625],
    &[0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125],
];

fn gaussian_kernel(kernel: usize) -> Vec<f32> {
    if let Some(table) = SMALL_KERNELS.get(kernel / 2) {
        return table.to_vec();
    }
    let sigma = sigma_for_kernel(kernel);
    let half = (kernel / 2) as f64;
    let weights: Vec<f64> = (0..kernel)
        .map(|i| {
            let x = i as f64 - half;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.into_iter().map(|w| (w / sum) as f32).collect()
}

/// `gfedcb|abcdefgh|gfedcba` border index
fn reflect_101(mut i: isize, len: usize) -> usize {
    let n = len as isize;
    if n <= 1 {
        return 0;
    }
    while i < 0 || i >= n {
        if i < 0 {
            i = -i;
        } else {
            i = 2 * n - 2 - i;
        }
    }
    i as usize
}

/// Separable blur, mirroring past the border without repeating the edge pixel.
///
/// Matches OpenCV's `GaussianBlur` with an explicit kernel size and sigma 0,
/// which the depth levels are calibrated against. `imageops::blur` takes
/// sigma only, picks its own kernel width and has no small-kernel tables.
fn gaussian_blur(src: &[f32], width: usize, height: usize, kernel: usize) -> Vec<f32> {
    let kernel = if kernel % 2 == 0 { kernel + 1 } else { kernel };
    let weights = gaussian_kernel(kernel);
    let half = (kernel / 2) as isize;

    let mut horizontal = vec![0.0f32; src.len()];
    for y in 0..height {
        let row = &src[y * width..(y + 1) * width];
        for x in 0..width {
            let mut acc = 0.0;
            for (k, w) in weights.iter().enumerate() {
                let sx = reflect_101(x as isize + k as isize - half, width);
                acc += row[sx] * w;
            }
            horizontal[y * width + x] = acc;
        }
    }

    let mut out = vec![0.0f32; src.len()];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for (k, w) in weights.iter().enumerate() {
                let sy = reflect_101(y as isize + k as isize - half, height);
                acc += horizontal[sy * width + x] * w;
            }
            out[y * width + x] = acc;
        }
    }
    out
}
