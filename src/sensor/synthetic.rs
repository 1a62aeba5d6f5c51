// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic depth sensor for tests and the demo binary
//!
//! Renders an analytic scene (floor plane, back wall, one sphere) through
//! the pinhole model, then degrades it with seeded per-frame noise and
//! dropout so the reconstruction stages have something real to clean up.
//! Frames are deterministic for a given seed and sequence number.

use std::time::Instant;

use glam::Vec3;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::constants::{DEPTH_MAX_MM, DEPTH_SENTINEL};
use crate::errors::SensorError;
use crate::sensor::{CameraIntrinsics, SensorFrame, SensorStream};

/// Floor plane height in view space, normalized units.
pub const FLOOR_Y: f32 = -0.06;
/// Back wall distance in view space, normalized units.
pub const WALL_Z: f32 = -0.24;
/// Sphere center in view space, normalized units.
pub const SPHERE_CENTER: Vec3 = Vec3::new(-0.045, -0.03, -0.15);
/// Sphere radius, normalized units.
pub const SPHERE_RADIUS: f32 = 0.03;

const LIGHT_DIR: Vec3 = Vec3::new(0.3, 0.8, 0.5);

struct Hit {
    t: f32,
    normal: Vec3,
    albedo: Vec3,
}

/// Deterministic stand-in for a depth camera.
pub struct SyntheticSensor {
    intrinsics: CameraIntrinsics,
    seed: u64,
    noise_mm: f32,
    dropout: f32,
    drop_every: Option<u64>,
    sequence: u64,
}

impl SyntheticSensor {
    pub fn new(width: u32, height: u32, seed: u64) -> Self {
        Self {
            intrinsics: CameraIntrinsics::scaled_to(width, height),
            seed,
            noise_mm: 25.0,
            dropout: 0.08,
            drop_every: None,
            sequence: 0,
        }
    }

    /// Override measurement noise (uniform, millimeters) and dropout rate.
    pub fn with_noise(mut self, noise_mm: f32, dropout: f32) -> Self {
        self.noise_mm = noise_mm.max(0.0);
        self.dropout = dropout.clamp(0.0, 1.0);
        self
    }

    /// Fail every `n`-th capture with [`SensorError::NoFrameAvailable`].
    pub fn with_drop_every(mut self, n: u64) -> Self {
        self.drop_every = (n > 0).then_some(n);
        self
    }

    pub fn intrinsics(&self) -> CameraIntrinsics {
        self.intrinsics
    }

    /// Closest surface along the ray through pixel `(px, py)`.
    ///
    /// Rays are parameterized with `z == -1`, so the hit parameter `t` is
    /// the normalized depth directly. The back wall covers the whole frame,
    /// so every ray hits something.
    fn trace(&self, px: f32, py: f32) -> Hit {
        let d = self.intrinsics.pixel_ray(px, py);

        let mut hit = Hit {
            t: -WALL_Z,
            normal: Vec3::Z,
            albedo: Vec3::new(0.55, 0.58, 0.62),
        };

        if d.y < 0.0 {
            let t = FLOOR_Y / d.y;
            if t < hit.t {
                let p = d * t;
                let checker = ((p.x / 0.02).floor() as i64 + (p.z / 0.02).floor() as i64) & 1;
                hit = Hit {
                    t,
                    normal: Vec3::Y,
                    albedo: if checker == 0 {
                        Vec3::new(0.82, 0.80, 0.76)
                    } else {
                        Vec3::new(0.35, 0.36, 0.38)
                    },
                };
            }
        }

        // Smallest positive root of |t*d - c|^2 = R^2
        let a = d.dot(d);
        let b = -2.0 * d.dot(SPHERE_CENTER);
        let c = SPHERE_CENTER.dot(SPHERE_CENTER) - SPHERE_RADIUS * SPHERE_RADIUS;
        let disc = b * b - 4.0 * a * c;
        if disc > 0.0 {
            let t = (-b - disc.sqrt()) / (2.0 * a);
            if t > 0.0 && t < hit.t {
                let p = d * t;
                hit = Hit {
                    t,
                    normal: (p - SPHERE_CENTER) / SPHERE_RADIUS,
                    albedo: Vec3::new(0.72, 0.20, 0.18),
                };
            }
        }

        hit
    }
}

impl SensorStream for SyntheticSensor {
    fn next_frame(&mut self) -> Result<SensorFrame, SensorError> {
        let seq = self.sequence;
        self.sequence += 1;

        if let Some(n) = self.drop_every {
            if seq % n == n - 1 {
                return Err(SensorError::NoFrameAvailable);
            }
        }

        let (w, h) = (self.intrinsics.width as usize, self.intrinsics.height as usize);
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(seq));
        let light = LIGHT_DIR.normalize();

        let mut depth = vec![DEPTH_SENTINEL; w * h];
        let mut color = vec![0u8; w * h * 4];
        for py in 0..h {
            for px in 0..w {
                let hit = self.trace(px as f32, py as f32);

                let i = py * w + px;
                let dropped = self.dropout > 0.0 && rng.random::<f32>() < self.dropout;
                if !dropped {
                    let jitter = (rng.random::<f32>() * 2.0 - 1.0) * self.noise_mm;
                    let mm = (hit.t * DEPTH_MAX_MM as f32 + jitter)
                        .clamp(1.0, DEPTH_MAX_MM as f32);
                    depth[i] = mm as u16;
                }

                let shade = 0.35 + 0.65 * hit.normal.dot(light).max(0.0);
                let rgb = hit.albedo * shade;
                color[i * 4] = (rgb.x.clamp(0.0, 1.0) * 255.0) as u8;
                color[i * 4 + 1] = (rgb.y.clamp(0.0, 1.0) * 255.0) as u8;
                color[i * 4 + 2] = (rgb.z.clamp(0.0, 1.0) * 255.0) as u8;
                color[i * 4 + 3] = 255;
            }
        }

        Ok(SensorFrame {
            width: self.intrinsics.width,
            height: self.intrinsics.height,
            depth: depth.into(),
            color: color.into(),
            intrinsics: self.intrinsics,
            sequence: seq,
            captured_at: Instant::now(),
        })
    }
}
