// SPDX-License-Identifier: GPL-3.0-only

//! Equirectangular environment maps
//!
//! Reflection misses and background pixels sample an [`EnvironmentMap`]
//! instead of leaving black holes. Maps are small equirectangular color
//! grids sampled bilinearly by direction; helpers build the solid and
//! gradient maps the demo uses for environment, prefiltered and
//! irradiance inputs.

use glam::{Vec3, Vec4};

use crate::buffers::{ColorGrid, Grid};

/// Direction-indexed color map, equirectangular layout.
#[derive(Debug, Clone)]
pub struct EnvironmentMap {
    texels: ColorGrid,
}

impl EnvironmentMap {
    pub fn from_grid(texels: ColorGrid) -> Self {
        Self { texels }
    }

    /// Single-color map.
    pub fn solid(color: Vec3) -> Self {
        Self {
            texels: Grid::new(1, 1, color.extend(1.0)),
        }
    }

    /// Map blending from `top` straight up through `horizon` to `bottom`
    /// straight down.
    pub fn vertical_gradient(top: Vec3, horizon: Vec3, bottom: Vec3) -> Self {
        let (w, h) = (4, 64);
        let mut texels = Grid::new(w, h, Vec4::ZERO);
        for y in 0..h {
            // v = 0 at the zenith, 1 at the nadir.
            let v = (y as f32 + 0.5) / h as f32;
            let color = if v < 0.5 {
                top.lerp(horizon, v * 2.0)
            } else {
                horizon.lerp(bottom, v * 2.0 - 1.0)
            };
            for x in 0..w {
                texels.set(x, y, color.extend(1.0));
            }
        }
        Self { texels }
    }

    /// Mean color over the map, usable as a flat irradiance estimate.
    pub fn average(&self) -> Vec3 {
        let mut sum = Vec3::ZERO;
        for texel in self.texels.data() {
            sum += texel.truncate();
        }
        sum / self.texels.len() as f32
    }

    /// Sample the map in direction `dir` (need not be normalized).
    pub fn sample(&self, dir: Vec3) -> Vec3 {
        let mut d = dir.normalize_or_zero();
        if d == Vec3::ZERO {
            d = Vec3::NEG_Z;
        }
        let u = 0.5 + d.x.atan2(-d.z) / (2.0 * std::f32::consts::PI);
        let v = 0.5 - d.y.clamp(-1.0, 1.0).asin() / std::f32::consts::PI;
        self.sample_uv(u, v)
    }

    fn sample_uv(&self, u: f32, v: f32) -> Vec3 {
        let (w, h) = (self.texels.width(), self.texels.height());
        if w == 1 && h == 1 {
            return self.texels.get(0, 0).truncate();
        }

        let fx = u * w as f32 - 0.5;
        let fy = (v * h as f32 - 0.5).clamp(0.0, h as f32 - 1.0);
        let x0 = fx.floor();
        let y0 = fy.floor() as usize;
        let y1 = (y0 + 1).min(h - 1);
        let tx = fx - x0;
        let ty = fy - y0 as f32;

        // Wrap horizontally, clamp vertically.
        let xa = (x0 as i64).rem_euclid(w as i64) as usize;
        let xb = (x0 as i64 + 1).rem_euclid(w as i64) as usize;

        let top = self
            .texels
            .get(xa, y0)
            .truncate()
            .lerp(self.texels.get(xb, y0).truncate(), tx);
        let bottom = self
            .texels
            .get(xa, y1)
            .truncate()
            .lerp(self.texels.get(xb, y1).truncate(), tx);
        top.lerp(bottom, ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_map_ignores_direction() {
        let map = EnvironmentMap::solid(Vec3::new(0.2, 0.4, 0.6));
        for dir in [Vec3::Y, Vec3::NEG_Y, Vec3::X, Vec3::NEG_Z] {
            assert!((map.sample(dir) - Vec3::new(0.2, 0.4, 0.6)).length() < 1e-6);
        }
    }

    #[test]
    fn test_gradient_follows_elevation() {
        let top = Vec3::new(0.1, 0.3, 0.8);
        let horizon = Vec3::new(0.6, 0.6, 0.6);
        let bottom = Vec3::new(0.3, 0.2, 0.1);
        let map = EnvironmentMap::vertical_gradient(top, horizon, bottom);

        assert!((map.sample(Vec3::Y) - top).length() < 0.05);
        assert!((map.sample(Vec3::NEG_Y) - bottom).length() < 0.05);
        assert!((map.sample(Vec3::NEG_Z) - horizon).length() < 0.05);
    }

    #[test]
    fn test_average_sits_between_extremes() {
        let map = EnvironmentMap::vertical_gradient(
            Vec3::splat(1.0),
            Vec3::splat(0.5),
            Vec3::splat(0.0),
        );
        let avg = map.average();
        assert!(avg.x > 0.3 && avg.x < 0.7);
    }

    #[test]
    fn test_zero_direction_is_defined() {
        let map = EnvironmentMap::vertical_gradient(Vec3::ONE, Vec3::splat(0.5), Vec3::ZERO);
        let c = map.sample(Vec3::ZERO);
        assert!(c.x.is_finite());
    }
}
