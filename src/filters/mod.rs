// SPDX-License-Identifier: GPL-3.0-only

//! CPU filter stages shared by reconstruction, occlusion and reflection
//!
//! Three building blocks live here:
//! - [`kernel`]: normpdf weights and the lazily recomputed kernel cache
//! - [`median`]: statistical, temporal and hole-filling median filters
//! - [`bilateral`]: edge-preserving separable blurs and guided upsampling
//!
//! Every filter treats the zero depth sentinel as "no data": invalid samples
//! never contribute weight and an invalid center stays invalid in the output.

pub mod bilateral;
pub mod kernel;
pub mod median;

pub use kernel::{KernelCache, KernelKey, normpdf};

/// Clamped hermite ramp between `edge0` and `edge1`.
///
/// Degenerate edges (`edge0 >= edge1`) collapse to a step so callers can
/// feed unvalidated tunables without hitting a division by zero.
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge0 >= edge1 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoothstep_clamps_outside_edges() {
        assert_eq!(smoothstep(0.2, 0.8, 0.0), 0.0);
        assert_eq!(smoothstep(0.2, 0.8, 1.0), 1.0);
        assert!((smoothstep(0.2, 0.8, 0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_smoothstep_degenerate_edges_step() {
        assert_eq!(smoothstep(0.5, 0.5, 0.4), 0.0);
        assert_eq!(smoothstep(0.5, 0.5, 0.6), 1.0);
    }
}
