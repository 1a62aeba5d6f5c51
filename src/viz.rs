// SPDX-License-Identifier: GPL-3.0-only

//! Buffer visualization for the demo binary and debugging
//!
//! Converts pipeline grids into RGBA8 byte vectors ready for PNG
//! encoding. The depth views keep the sentinel black so missing sensor
//! returns stay visibly missing.

use glam::Vec3;

use crate::buffers::{ColorGrid, DepthGrid, Grid, depth_valid};
use crate::constants::DEPTH_COLORMAP_BANDS;

/// Histogram bins for brightness equalization; finer than the visible
/// quantization of an 8-bit output.
const HISTOGRAM_BINS: usize = 1024;

const BAND_PALETTE: [Vec3; 6] = [
    Vec3::new(0.90, 0.25, 0.20),
    Vec3::new(0.95, 0.60, 0.15),
    Vec3::new(0.90, 0.85, 0.25),
    Vec3::new(0.30, 0.80, 0.35),
    Vec3::new(0.25, 0.70, 0.85),
    Vec3::new(0.35, 0.40, 0.90),
];

/// Grayscale depth view: nearer is brighter, the sentinel is black.
pub fn depth_to_rgba8(depth: &DepthGrid) -> Vec<u8> {
    let mut out = Vec::with_capacity(depth.len() * 4);
    for (_, _, d) in depth.pixels() {
        let v = if depth_valid(d) {
            channel(1.0 - d.clamp(0.0, 1.0))
        } else {
            0
        };
        out.extend_from_slice(&[v, v, v, 255]);
    }
    out
}

/// Depth drawn as cyclic color bands for reading absolute distance;
/// shading within each band encodes the position inside it.
pub fn depth_bands_rgba8(depth: &DepthGrid) -> Vec<u8> {
    let mut out = Vec::with_capacity(depth.len() * 4);
    for (_, _, d) in depth.pixels() {
        if !depth_valid(d) {
            out.extend_from_slice(&[0, 0, 0, 255]);
            continue;
        }
        let t = d.clamp(0.0, 1.0) * DEPTH_COLORMAP_BANDS;
        let band = (t as usize).min(DEPTH_COLORMAP_BANDS as usize - 1);
        let shade = 1.0 - 0.5 * t.fract();
        let c = BAND_PALETTE[band % BAND_PALETTE.len()] * shade;
        out.extend_from_slice(&[channel(c.x), channel(c.y), channel(c.z), 255]);
    }
    out
}

/// Histogram-equalized depth brightness: `1 - cdf(depth)` over the valid
/// pixels of this frame, so a scene occupying a narrow depth slice still
/// uses the full dynamic range. Nearer stays brighter; invalid maps to 0.
pub fn equalized_brightness(depth: &DepthGrid) -> Grid<f32> {
    let mut histogram = [0u32; HISTOGRAM_BINS];
    let mut points = 0u32;
    for (_, _, d) in depth.pixels() {
        if depth_valid(d) {
            histogram[bin_of(d)] += 1;
            points += 1;
        }
    }

    let mut out = Grid::new(depth.width(), depth.height(), 0.0);
    if points == 0 {
        return out;
    }

    let mut brightness = [0f32; HISTOGRAM_BINS];
    let mut running = 0u32;
    for (i, &count) in histogram.iter().enumerate() {
        running += count;
        brightness[i] = 1.0 - running as f32 / points as f32;
    }

    for (x, y, d) in depth.pixels() {
        if depth_valid(d) {
            out.set(x, y, brightness[bin_of(d)]);
        }
    }
    out
}

/// Clamp a color buffer into RGBA8 bytes.
pub fn color_to_rgba8(color: &ColorGrid) -> Vec<u8> {
    let mut out = Vec::with_capacity(color.len() * 4);
    for (_, _, c) in color.pixels() {
        out.extend_from_slice(&[channel(c.x), channel(c.y), channel(c.z), channel(c.w)]);
    }
    out
}

/// A scalar buffer in `[0, 1]` as grayscale bytes; used for occlusion
/// and confidence dumps.
pub fn scalar_to_rgba8(values: &Grid<f32>) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for (_, _, v) in values.pixels() {
        let g = channel(v);
        out.extend_from_slice(&[g, g, g, 255]);
    }
    out
}

#[inline]
fn channel(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[inline]
fn bin_of(d: f32) -> usize {
    ((d.clamp(0.0, 1.0) * (HISTOGRAM_BINS - 1) as f32) as usize).min(HISTOGRAM_BINS - 1)
}
