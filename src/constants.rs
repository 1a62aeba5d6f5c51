// SPDX-License-Identifier: GPL-3.0-only

//! Depth-sensor constants - single source of truth
//!
//! All depth range, sentinel and visualization constants live here. They are
//! used across the reconstruction and compositing pipeline.

/// Sentinel raw depth value meaning "no valid return" from the sensor.
pub const DEPTH_SENTINEL: u16 = 0;

/// Maximum valid raw depth in millimeters; values above are invalid.
pub const DEPTH_MAX_MM: u16 = 10000;

/// Invalid marker in filtered (normalized f32) depth buffers.
///
/// Filtered depth is raw millimeters divided by [`DEPTH_MAX_MM`], so valid
/// samples lie in `(0, 1]` and the sentinel stays at zero.
pub const DEPTH_INVALID: f32 = 0.0;

/// Meters spanned by the normalized depth range.
pub const DEPTH_RANGE_M: f32 = DEPTH_MAX_MM as f32 / 1000.0;

/// Focal length X (pixels) at the 640x480 base resolution.
pub const BASE_FX: f32 = 594.21;
/// Focal length Y (pixels) at the 640x480 base resolution.
pub const BASE_FY: f32 = 591.04;
/// Principal point X (pixels) at the 640x480 base resolution.
pub const BASE_CX: f32 = 339.5;
/// Principal point Y (pixels) at the 640x480 base resolution.
pub const BASE_CY: f32 = 242.7;

/// Base width for intrinsics scaling.
pub const BASE_WIDTH: f32 = 640.0;
/// Base height for intrinsics scaling.
pub const BASE_HEIGHT: f32 = 480.0;

/// Near clip plane of the exposed projection matrix, normalized depth units.
pub const PROJ_NEAR: f32 = 0.01;
/// Far clip plane of the exposed projection matrix (the full sensor range).
pub const PROJ_FAR: f32 = 1.0;

/// Upper bound on temporal-median history frames; the ring is allocated at
/// this capacity and `tmf_frame_layers` is clamped to it at use.
pub const TMF_MAX_FRAME_LAYERS: usize = 10;

/// Seed for the deterministic hemisphere kernel and rotation noise.
pub const AO_NOISE_SEED: u64 = 0x5eed_ca11;

/// Side length of the tiled pseudo-random rotation pattern.
pub const AO_NOISE_TILE: usize = 4;

/// Number of quantization bands for depth colormap visualization.
pub const DEPTH_COLORMAP_BANDS: f32 = 32.0;

/// Epsilon for the differential-combine ratio; keeps `full == back`
/// collapsing to exactly 1.0 on dark pixels.
pub const COMBINE_EPSILON: f32 = 1e-3;

/// Clamp ceiling for the differential-combine ratio.
pub const COMBINE_MAX: f32 = 4.0;

/// Build information utilities
pub mod build_info {
    /// Version string from the build script (git describe or the
    /// packaged version).
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_range_matches_sentinel_convention() {
        assert_eq!(DEPTH_SENTINEL, 0);
        assert_eq!(DEPTH_INVALID, 0.0);
        assert!((DEPTH_RANGE_M - 10.0).abs() < f32::EPSILON);
    }
}
