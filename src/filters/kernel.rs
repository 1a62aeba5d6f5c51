// SPDX-License-Identifier: GPL-3.0-only

//! Gaussian weight kernels with lazy parameter-keyed caching
//!
//! Blur kernels are pure functions of their parameter tuple, so they are
//! memoized: a [`KernelCache`] holds the last computed weight vector and its
//! [`KernelKey`], and only recomputes when a lookup arrives with a different
//! key. Parameter setters therefore never trigger work themselves; the first
//! draw after a change pays for the recompute.

use tracing::debug;

/// Unnormalized normal distribution value, the shared weight function for
/// every blur in the pipeline.
///
/// For `s <= 0` the distribution is degenerate: all weight at zero offset.
#[inline]
pub fn normpdf(x: f32, s: f32) -> f32 {
    if s <= 0.0 {
        return if x == 0.0 { 1.0 } else { 0.0 };
    }
    0.39894 * (-0.5 * x * x / (s * s)).exp() / s
}

/// Cache key covering every parameter that shapes a blur kernel.
///
/// Floats are compared by bit pattern: any observable change to a parameter
/// produces a different key, while re-setting an identical value does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelKey {
    radius: i32,
    sigma_bits: u32,
    b_sigma_bits: u32,
    thresh_bits: u32,
}

impl KernelKey {
    pub fn new(radius: i32, sigma: f32, b_sigma: f32, thresh: f32) -> Self {
        Self {
            radius,
            sigma_bits: sigma.to_bits(),
            b_sigma_bits: b_sigma.to_bits(),
            thresh_bits: thresh.to_bits(),
        }
    }

    /// Effective kernel radius; zero or negative degrades to the identity.
    pub fn effective_radius(&self) -> i32 {
        self.radius.max(0)
    }

    pub fn sigma(&self) -> f32 {
        f32::from_bits(self.sigma_bits)
    }

    pub fn b_sigma(&self) -> f32 {
        f32::from_bits(self.b_sigma_bits)
    }

    pub fn threshold(&self) -> f32 {
        f32::from_bits(self.thresh_bits)
    }
}

/// Memoized spatial weight vector for one blur context.
///
/// The weight vector has length `2 * radius + 1` with the center at index
/// `radius`; a non-positive radius yields the identity kernel `[1.0]`.
#[derive(Debug, Default, Clone)]
pub struct KernelCache {
    key: Option<KernelKey>,
    weights: Vec<f32>,
}

impl KernelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the spatial weights for `key`, recomputing only on a key
    /// mismatch.
    pub fn weights(&mut self, key: KernelKey) -> &[f32] {
        if self.key != Some(key) {
            self.weights = compute_weights(key.effective_radius(), key.sigma());
            self.key = Some(key);
            debug!(
                radius = key.effective_radius(),
                sigma = key.sigma(),
                len = self.weights.len(),
                "blur kernel recomputed"
            );
        }
        &self.weights
    }

    /// True when the cache already holds weights for `key`.
    pub fn is_cached(&self, key: KernelKey) -> bool {
        self.key == Some(key)
    }

    /// Drop the cached weights; the next lookup recomputes.
    pub fn invalidate(&mut self) {
        self.key = None;
        self.weights.clear();
    }

    pub fn cached_key(&self) -> Option<KernelKey> {
        self.key
    }

    /// Last computed weights; empty until the first lookup.
    pub fn cached_weights(&self) -> &[f32] {
        &self.weights
    }
}

fn compute_weights(radius: i32, sigma: f32) -> Vec<f32> {
    if radius <= 0 {
        return vec![1.0];
    }
    let mut weights = Vec::with_capacity(2 * radius as usize + 1);
    for j in -radius..=radius {
        weights.push(normpdf(j as f32, sigma));
    }
    weights
}
