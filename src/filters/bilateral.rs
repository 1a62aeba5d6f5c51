// SPDX-License-Identifier: GPL-3.0-only

//! Edge-preserving separable blurs and guided upsampling
//!
//! All blurs combine a cached spatial weight vector with a range weight
//! `normpdf(guide_delta, b_sigma)`, so geometry edges in the guide signal
//! stop the smoothing. The depth self-blur additionally hard-rejects
//! samples beyond a depth threshold. Weights are renormalized per pixel by
//! the sum that actually contributed, which keeps constant regions exact.

use glam::Vec4;

use crate::buffers::{ColorGrid, DepthGrid, Grid, depth_valid};
use crate::constants::DEPTH_INVALID;
use crate::filters::kernel::normpdf;

/// Separable bilateral blur of a depth grid guided by itself.
///
/// Samples whose depth differs from the center by more than `s_thresh` are
/// rejected outright; the rest are weighted by `weights` spatially and by
/// `normpdf(delta, b_sigma)` in range. Invalid pixels stay invalid and never
/// contribute to neighbors.
pub fn blur_depth(src: &DepthGrid, weights: &[f32], b_sigma: f32, s_thresh: f32) -> DepthGrid {
    let horizontal = blur_depth_axis(src, weights, b_sigma, s_thresh, 1, 0);
    blur_depth_axis(&horizontal, weights, b_sigma, s_thresh, 0, 1)
}

fn blur_depth_axis(
    src: &DepthGrid,
    weights: &[f32],
    b_sigma: f32,
    s_thresh: f32,
    step_x: i64,
    step_y: i64,
) -> DepthGrid {
    let radius = (weights.len() / 2) as i64;
    let mut out = DepthGrid::new(src.width(), src.height(), DEPTH_INVALID);

    for y in 0..src.height() {
        for x in 0..src.width() {
            let center = src.get(x, y);
            if !depth_valid(center) {
                continue;
            }
            let mut sum = 0.0;
            let mut weight_sum = 0.0;
            for j in -radius..=radius {
                let sample = src.get_clamped(x as i64 + j * step_x, y as i64 + j * step_y);
                if !depth_valid(sample) {
                    continue;
                }
                let delta = sample - center;
                if delta.abs() > s_thresh {
                    continue;
                }
                let w = weights[(j + radius) as usize] * normpdf(delta, b_sigma);
                sum += sample * w;
                weight_sum += w;
            }
            if weight_sum > 0.0 {
                out.set(x, y, sum / weight_sum);
            } else {
                out.set(x, y, center);
            }
        }
    }
    out
}

/// Joint-bilateral blur of a color grid guided by a depth signal.
///
/// Used for the aligned color buffer (guided by filtered depth) and for the
/// reflection mip chain (guided by G-buffer depth). Samples over an invalid
/// guide pixel are skipped; a center with an invalid guide passes through.
pub fn blur_color_guided(
    src: &ColorGrid,
    guide: &DepthGrid,
    weights: &[f32],
    b_sigma: f32,
) -> ColorGrid {
    let horizontal = blur_color_axis(src, guide, weights, b_sigma, 1, 0);
    blur_color_axis(&horizontal, guide, weights, b_sigma, 0, 1)
}

fn blur_color_axis(
    src: &ColorGrid,
    guide: &DepthGrid,
    weights: &[f32],
    b_sigma: f32,
    step_x: i64,
    step_y: i64,
) -> ColorGrid {
    let radius = (weights.len() / 2) as i64;
    let mut out = ColorGrid::new(src.width(), src.height(), Vec4::ZERO);

    for y in 0..src.height() {
        for x in 0..src.width() {
            let center_guide = guide.get(x, y);
            if !depth_valid(center_guide) {
                out.set(x, y, src.get(x, y));
                continue;
            }
            let mut sum = Vec4::ZERO;
            let mut weight_sum = 0.0;
            for j in -radius..=radius {
                let sx = x as i64 + j * step_x;
                let sy = y as i64 + j * step_y;
                let sample_guide = guide.get_clamped(sx, sy);
                if !depth_valid(sample_guide) {
                    continue;
                }
                let w = weights[(j + radius) as usize]
                    * normpdf(sample_guide - center_guide, b_sigma);
                sum += src.get_clamped(sx, sy) * w;
                weight_sum += w;
            }
            if weight_sum > 0.0 {
                out.set(x, y, sum / weight_sum);
            } else {
                out.set(x, y, src.get(x, y));
            }
        }
    }
    out
}

/// Joint-bilateral blur of a scalar grid (occlusion) guided by depth.
pub fn blur_scalar_guided(
    src: &Grid<f32>,
    guide: &DepthGrid,
    weights: &[f32],
    b_sigma: f32,
) -> Grid<f32> {
    let horizontal = blur_scalar_axis(src, guide, weights, b_sigma, 1, 0);
    blur_scalar_axis(&horizontal, guide, weights, b_sigma, 0, 1)
}

fn blur_scalar_axis(
    src: &Grid<f32>,
    guide: &DepthGrid,
    weights: &[f32],
    b_sigma: f32,
    step_x: i64,
    step_y: i64,
) -> Grid<f32> {
    let radius = (weights.len() / 2) as i64;
    let mut out = Grid::new(src.width(), src.height(), 0.0);

    for y in 0..src.height() {
        for x in 0..src.width() {
            let center_guide = guide.get(x, y);
            if !depth_valid(center_guide) {
                out.set(x, y, src.get(x, y));
                continue;
            }
            let mut sum = 0.0;
            let mut weight_sum = 0.0;
            for j in -radius..=radius {
                let sx = x as i64 + j * step_x;
                let sy = y as i64 + j * step_y;
                let sample_guide = guide.get_clamped(sx, sy);
                if !depth_valid(sample_guide) {
                    continue;
                }
                let w = weights[(j + radius) as usize]
                    * normpdf(sample_guide - center_guide, b_sigma);
                sum += src.get_clamped(sx, sy) * w;
                weight_sum += w;
            }
            if weight_sum > 0.0 {
                out.set(x, y, sum / weight_sum);
            } else {
                out.set(x, y, src.get(x, y));
            }
        }
    }
    out
}

/// Bilateral upsample of a reduced-resolution scalar field.
///
/// Each full-resolution pixel blends the four nearest low-resolution texels
/// with bilinear weights multiplied by a depth-similarity weight between the
/// full-resolution depth and the depth the low-resolution pass saw. This
/// keeps coarse occlusion from bleeding across depth discontinuities. Pixels
/// with invalid full-resolution depth resolve to zero (open).
pub fn upsample_guided(
    low: &Grid<f32>,
    low_depth: &DepthGrid,
    full_depth: &DepthGrid,
    b_sigma: f32,
) -> Grid<f32> {
    let (width, height) = (full_depth.width(), full_depth.height());
    let (low_w, low_h) = (low.width(), low.height());
    let mut out = Grid::new(width, height, 0.0);

    for y in 0..height {
        for x in 0..width {
            let center_depth = full_depth.get(x, y);
            if !depth_valid(center_depth) {
                continue;
            }
            let lx = (x as f32 + 0.5) * low_w as f32 / width as f32 - 0.5;
            let ly = (y as f32 + 0.5) * low_h as f32 / height as f32 - 0.5;
            let bx = lx.floor();
            let by = ly.floor();
            let fx = lx - bx;
            let fy = ly - by;

            let corners = [
                (bx as i64, by as i64, (1.0 - fx) * (1.0 - fy)),
                (bx as i64 + 1, by as i64, fx * (1.0 - fy)),
                (bx as i64, by as i64 + 1, (1.0 - fx) * fy),
                (bx as i64 + 1, by as i64 + 1, fx * fy),
            ];

            let mut sum = 0.0;
            let mut weight_sum = 0.0;
            for (cx, cy, bilinear) in corners {
                let guide = low_depth.get_clamped(cx, cy);
                if !depth_valid(guide) {
                    continue;
                }
                let w = bilinear * normpdf(guide - center_depth, b_sigma);
                sum += low.get_clamped(cx, cy) * w;
                weight_sum += w;
            }
            if weight_sum > 1e-8 {
                out.set(x, y, sum / weight_sum);
            } else {
                // No depth-compatible texel; fall back to plain bilinear.
                let mut sum = 0.0;
                for (cx, cy, bilinear) in corners {
                    sum += low.get_clamped(cx, cy) * bilinear;
                }
                out.set(x, y, sum);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::kernel::{KernelCache, KernelKey};

    fn weights(radius: i32, sigma: f32) -> Vec<f32> {
        let mut cache = KernelCache::new();
        cache.weights(KernelKey::new(radius, sigma, 0.0, 0.0)).to_vec()
    }

    #[test]
    fn test_constant_region_is_unchanged() {
        let frame = DepthGrid::new(8, 8, 0.37);
        let out = blur_depth(&frame, &weights(3, 2.0), 0.1, 0.5);
        for (_, _, d) in out.pixels() {
            assert!((d - 0.37).abs() < 1e-6);
        }
    }

    #[test]
    fn test_identity_kernel_is_identity() {
        let mut frame = DepthGrid::new(4, 4, 0.2);
        frame.set(2, 2, 0.9);
        let out = blur_depth(&frame, &[1.0], 0.1, 10.0);
        assert_eq!(out, frame);
    }

    #[test]
    fn test_threshold_preserves_step_edge() {
        let mut frame = DepthGrid::new(8, 4, 0.2);
        for y in 0..4 {
            for x in 4..8 {
                frame.set(x, y, 0.8);
            }
        }
        // Step of 0.6 exceeds the 0.02 threshold, so both plateaus stay put.
        let out = blur_depth(&frame, &weights(3, 2.0), 1.0, 0.02);
        assert!((out.get(3, 2) - 0.2).abs() < 1e-6);
        assert!((out.get(4, 2) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_center_stays_invalid() {
        let mut frame = DepthGrid::new(5, 5, 0.5);
        frame.set(2, 2, DEPTH_INVALID);
        let out = blur_depth(&frame, &weights(2, 1.5), 0.5, 1.0);
        assert_eq!(out.get(2, 2), DEPTH_INVALID);
        // Valid neighbors ignore the hole and keep their plateau value.
        assert!((out.get(1, 2) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_guided_color_blur_respects_guide_edge() {
        let mut color = ColorGrid::new(8, 1, Vec4::new(1.0, 0.0, 0.0, 1.0));
        let mut guide = DepthGrid::new(8, 1, 0.2);
        for x in 4..8 {
            color.set(x, 0, Vec4::new(0.0, 0.0, 1.0, 1.0));
            guide.set(x, 0, 0.8);
        }
        // A very sharp range sigma confines mixing to each depth plateau.
        let out = blur_color_guided(&color, &guide, &weights(3, 2.0), 1e-5);
        assert!((out.get(3, 0).x - 1.0).abs() < 1e-4);
        assert!((out.get(4, 0).z - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_scalar_blur_smooths_within_plateau() {
        let mut field = Grid::new(9, 1, 0.0);
        field.set(4, 0, 1.0);
        let guide = DepthGrid::new(9, 1, 0.5);
        let out = blur_scalar_guided(&field, &guide, &weights(2, 2.0), 10.0);
        assert!(out.get(4, 0) < 1.0);
        assert!(out.get(3, 0) > 0.0);
    }

    #[test]
    fn test_upsample_preserves_constant_field() {
        let low = Grid::new(4, 4, 0.25);
        let low_depth = DepthGrid::new(4, 4, 0.5);
        let full_depth = DepthGrid::new(8, 8, 0.5);
        let out = upsample_guided(&low, &low_depth, &full_depth, 0.1);
        for (_, _, v) in out.pixels() {
            assert!((v - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn test_upsample_follows_depth_edge() {
        // Left half near with occlusion, right half far without; the
        // full-resolution edge sits between low-resolution texels.
        let mut low = Grid::new(4, 1, 0.0);
        let mut low_depth = DepthGrid::new(4, 1, 0.8);
        for x in 0..2 {
            low.set(x, 0, 1.0);
            low_depth.set(x, 0, 0.2);
        }
        let mut full_depth = DepthGrid::new(8, 1, 0.8);
        for x in 0..4 {
            full_depth.set(x, 0, 0.2);
        }
        let out = upsample_guided(&low, &low_depth, &full_depth, 0.01);
        assert!(out.get(3, 0) > 0.9, "near side keeps its occlusion");
        assert!(out.get(4, 0) < 0.1, "far side stays open");
    }

    #[test]
    fn test_upsample_invalid_full_depth_is_open() {
        let low = Grid::new(2, 2, 1.0);
        let low_depth = DepthGrid::new(2, 2, 0.5);
        let full_depth = DepthGrid::new(4, 4, DEPTH_INVALID);
        let out = upsample_guided(&low, &low_depth, &full_depth, 0.1);
        assert!(out.data().iter().all(|&v| v == 0.0));
    }
}
