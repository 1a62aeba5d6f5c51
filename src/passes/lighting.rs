// SPDX-License-Identifier: GPL-3.0-only

//! Directional lighting over a G-buffer
//!
//! One directional light plus an ambient term fed by the environment map's
//! mean color. Occlusion attenuates the ambient term only. Pixels without
//! geometry sample the environment along their view ray, so both scene
//! variants get a consistent background instead of black holes.

use glam::{Vec3, Vec4};
use tracing::warn;

use crate::buffers::{ColorGrid, Grid, texel_valid};
use crate::errors::PassError;
use crate::passes::env::EnvironmentMap;
use crate::passes::gbuffer::GBuffer;
use crate::sensor::CameraIntrinsics;

/// Directional light with an environment-fed ambient term.
pub struct LightingPass {
    light_dir: Vec3,
    light_color: Vec3,
    ambient_strength: f32,
}

impl Default for LightingPass {
    fn default() -> Self {
        Self {
            light_dir: Vec3::new(0.3, 0.8, 0.5).normalize(),
            light_color: Vec3::splat(0.9),
            ambient_strength: 0.5,
        }
    }
}

impl LightingPass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shade a G-buffer. `occlusion` darkens the ambient term; invalid
    /// pixels fall through to the environment.
    pub fn shade(
        &self,
        gbuffer: &GBuffer,
        occlusion: &Grid<f32>,
        environment: &EnvironmentMap,
        intrinsics: CameraIntrinsics,
    ) -> Result<ColorGrid, PassError> {
        let (w, h) = (gbuffer.width(), gbuffer.height());
        if occlusion.width() != w || occlusion.height() != h {
            return Err(PassError::SizeMismatch {
                expected: (w, h),
                got: (occlusion.width(), occlusion.height()),
            });
        }

        let irradiance = environment.average();
        let mut out = Grid::new(w, h, Vec4::ZERO);
        for y in 0..h {
            for x in 0..w {
                let p = gbuffer.position.get(x, y);
                let n = gbuffer.normal.get(x, y);
                if !texel_valid(p) || !texel_valid(n) {
                    let background = environment.sample(intrinsics.pixel_ray(x as f32, y as f32));
                    out.set(x, y, background.extend(1.0));
                    continue;
                }

                let albedo = gbuffer.albedo.get(x, y).truncate();
                let visibility = (1.0 - occlusion.get(x, y)).clamp(0.0, 1.0);
                let ambient = irradiance * self.ambient_strength * visibility;
                let diffuse = self.light_color * n.truncate().dot(self.light_dir).max(0.0);
                out.set(x, y, (albedo * (ambient + diffuse)).extend(1.0));
            }
        }
        Ok(out)
    }

    pub fn light_dir(&self) -> Vec3 {
        self.light_dir
    }

    /// Set the direction toward the light; normalized on entry.
    pub fn set_light_dir(&mut self, dir: Vec3) {
        let n = dir.normalize_or_zero();
        if n == Vec3::ZERO {
            warn!("Ignoring zero light direction");
            return;
        }
        self.light_dir = n;
    }

    pub fn light_color(&self) -> Vec3 {
        self.light_color
    }

    pub fn set_light_color(&mut self, color: Vec3) {
        self.light_color = color.max(Vec3::ZERO);
    }

    pub fn ambient_strength(&self) -> f32 {
        self.ambient_strength
    }

    pub fn set_ambient_strength(&mut self, strength: f32) {
        if strength < 0.0 {
            warn!(strength, "Negative ambient strength clamps to zero");
        }
        self.ambient_strength = strength.max(0.0);
    }
}
