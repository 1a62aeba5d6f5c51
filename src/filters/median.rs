// SPDX-License-Identifier: GPL-3.0-only

//! Median filters over depth grids
//!
//! The temporal median collapses sensor flicker by pooling samples across
//! the history ring; the hole-fill median patches dropout pixels from valid
//! neighbors. Both discard sentinel samples outright, so a region with no
//! valid data anywhere stays invalid instead of being invented.

use crate::buffers::{DepthGrid, depth_valid};
use crate::constants::DEPTH_INVALID;

/// Textbook statistical median.
///
/// Sorts in place; an even sample count yields the mean of the two central
/// values. Returns `None` for an empty slice.
pub fn median(samples: &mut [f32]) -> Option<f32> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_unstable_by(|a, b| a.total_cmp(b));
    let mid = samples.len() / 2;
    if samples.len() % 2 == 1 {
        Some(samples[mid])
    } else {
        Some(0.5 * (samples[mid - 1] + samples[mid]))
    }
}

/// Spatiotemporal median across a set of history frames.
///
/// For every pixel, pools the valid samples of a `(2r+1)^2` window from each
/// frame in `frames` and takes their median. A pixel with no valid sample in
/// the whole pool stays at the invalid sentinel. A non-positive radius
/// shrinks the window to the pixel itself.
pub fn temporal_median(frames: &[&DepthGrid], kernel_radius: i32) -> DepthGrid {
    let first = frames.first().expect("temporal median needs history");
    let (width, height) = (first.width(), first.height());
    let radius = kernel_radius.max(0) as i64;

    let mut out = DepthGrid::new(width, height, DEPTH_INVALID);
    let mut pool = Vec::with_capacity(frames.len() * ((2 * radius as usize + 1).pow(2)));

    for y in 0..height {
        for x in 0..width {
            pool.clear();
            for frame in frames {
                for dy in -radius..=radius {
                    for dx in -radius..=radius {
                        let sample = frame.get_clamped(x as i64 + dx, y as i64 + dy);
                        if depth_valid(sample) {
                            pool.push(sample);
                        }
                    }
                }
            }
            if let Some(value) = median(&mut pool) {
                out.set(x, y, value);
            }
        }
    }
    out
}

/// Repeated median fill of invalid pixels from valid neighbors.
///
/// Valid pixels pass through untouched, so a frame without holes is returned
/// unchanged regardless of the pass count. Each pass reads the previous
/// pass's output (ping-pong), which lets holes wider than the kernel close
/// over several passes. A non-positive radius or zero passes is the identity.
pub fn hole_fill(src: &DepthGrid, kernel_radius: i32, passes: u32) -> DepthGrid {
    if kernel_radius <= 0 || passes == 0 {
        return src.clone();
    }
    let radius = kernel_radius as i64;
    let (width, height) = (src.width(), src.height());

    let mut current = src.clone();
    let mut neighbors = Vec::with_capacity((2 * radius as usize + 1).pow(2));

    for _ in 0..passes {
        if current.data().iter().all(|&d| depth_valid(d)) {
            break;
        }
        let mut next = current.clone();
        for y in 0..height {
            for x in 0..width {
                if depth_valid(current.get(x, y)) {
                    continue;
                }
                neighbors.clear();
                for dy in -radius..=radius {
                    for dx in -radius..=radius {
                        let sample = current.get_clamped(x as i64 + dx, y as i64 + dy);
                        if depth_valid(sample) {
                            neighbors.push(sample);
                        }
                    }
                }
                if let Some(value) = median(&mut neighbors) {
                    next.set(x, y, value);
                }
            }
        }
        current = next;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_window() {
        let mut samples = [0.9, 0.1, 0.5, 0.3, 0.7];
        assert_eq!(median(&mut samples), Some(0.5));
    }

    #[test]
    fn test_median_even_window() {
        let mut samples = [0.8, 0.2, 0.4, 0.6];
        assert!((median(&mut samples).unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_median_empty_is_none() {
        assert_eq!(median(&mut []), None);
    }

    #[test]
    fn test_all_invalid_window_stays_invalid() {
        let a = DepthGrid::new(4, 4, DEPTH_INVALID);
        let b = DepthGrid::new(4, 4, DEPTH_INVALID);
        let out = temporal_median(&[&a, &b], 1);
        assert!(out.data().iter().all(|&d| d == DEPTH_INVALID));
    }

    #[test]
    fn test_temporal_median_pools_across_frames() {
        // One pixel valid in two of three frames; radius 0 keeps the
        // window on that pixel alone.
        let mut a = DepthGrid::new(3, 1, DEPTH_INVALID);
        let mut b = DepthGrid::new(3, 1, DEPTH_INVALID);
        let c = DepthGrid::new(3, 1, DEPTH_INVALID);
        a.set(1, 0, 0.4);
        b.set(1, 0, 0.6);
        let out = temporal_median(&[&a, &b, &c], 0);
        assert!((out.get(1, 0) - 0.5).abs() < 1e-6);
        assert_eq!(out.get(0, 0), DEPTH_INVALID);
    }

    #[test]
    fn test_temporal_median_rejects_outlier() {
        let mut frames = Vec::new();
        for i in 0..5 {
            let value = if i == 2 { 0.95 } else { 0.3 };
            frames.push(DepthGrid::new(2, 2, value));
        }
        let refs: Vec<&DepthGrid> = frames.iter().collect();
        let out = temporal_median(&refs, 0);
        assert!((out.get(0, 0) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_hole_fill_is_noop_on_valid_frame() {
        let frame = DepthGrid::new(5, 5, 0.42);
        let out = hole_fill(&frame, 2, 11);
        assert_eq!(out, frame);
    }

    #[test]
    fn test_hole_fill_patches_single_dropout() {
        let mut frame = DepthGrid::new(5, 5, 0.5);
        frame.set(2, 2, DEPTH_INVALID);
        let out = hole_fill(&frame, 1, 1);
        assert!((out.get(2, 2) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_hole_fill_closes_wide_hole_over_passes() {
        let mut frame = DepthGrid::new(9, 9, 0.5);
        for y in 2..7 {
            for x in 2..7 {
                frame.set(x, y, DEPTH_INVALID);
            }
        }
        let one = hole_fill(&frame, 1, 1);
        assert_eq!(one.get(4, 4), DEPTH_INVALID, "center survives one pass");
        let three = hole_fill(&frame, 1, 3);
        assert!(depth_valid(three.get(4, 4)), "center closes by pass three");
    }

    #[test]
    fn test_hole_fill_zero_radius_is_identity() {
        let mut frame = DepthGrid::new(3, 3, 0.7);
        frame.set(1, 1, DEPTH_INVALID);
        assert_eq!(hole_fill(&frame, 0, 5), frame);
        assert_eq!(hole_fill(&frame, -2, 5), frame);
    }
}
