// SPDX-License-Identifier: GPL-3.0-only

//! Screen-space ray-marched reflections
//!
//! Each pixel reflects its view ray off the G-buffer normal and marches
//! the reflected ray against the position buffer. A depth crossing within
//! `ray_z_thickness` is refined by bisection; misses fall back to the
//! prefiltered environment. Hit colors are sampled from a Gaussian mip
//! chain of the lit image, with the level chosen by a roughness-driven
//! cone spread, and faded near screen edges and camera-facing rays.

use std::time::Instant;

use glam::{Vec3, Vec4};
use tracing::{debug, info, warn};

use crate::buffers::{ColorGrid, Grid, VecGrid, texel_valid};
use crate::config::ReflectionSettings;
use crate::errors::PassError;
use crate::filters::{KernelCache, KernelKey, bilateral, smoothstep};
use crate::passes::env::EnvironmentMap;
use crate::sensor::CameraIntrinsics;

/// Per-frame reflection output.
pub struct ReflectionResult {
    /// Reflection contribution per pixel; `w == 0` where no reflection was
    /// computed (invalid geometry or near-plane rejection).
    pub color: ColorGrid,
    /// Hit confidence scaled by remaining ray travel, usable as a cheap
    /// directional occlusion term.
    pub aux_ao: Grid<f32>,
}

/// Screen-space reflection pass.
pub struct ReflectionPass {
    width: usize,
    height: usize,
    settings: ReflectionSettings,
    blur_cache: KernelCache,
}

impl ReflectionPass {
    pub fn new(width: u32, height: u32, settings: ReflectionSettings) -> Self {
        Self {
            width: width as usize,
            height: height as usize,
            settings,
            blur_cache: KernelCache::new(),
        }
    }

    /// Drop cached blur weights; parameters are preserved. The mip chain
    /// is rebuilt from scratch every frame regardless.
    pub fn rebuild_programs(&mut self) {
        self.blur_cache.invalidate();
        info!("Rebuilt reflection kernels");
    }

    /// Trace reflections for a frame.
    ///
    /// `lit_color` feeds the mip chain, `fallback_color` replaces faded
    /// hits at the source pixel, `prefiltered` and `irradiance` cover
    /// misses. Pure in the inputs and current parameters.
    #[allow(clippy::too_many_arguments)]
    pub fn draw(
        &mut self,
        position: &VecGrid,
        normal: &VecGrid,
        lit_color: &ColorGrid,
        fallback_color: &ColorGrid,
        irradiance: &EnvironmentMap,
        prefiltered: &EnvironmentMap,
        intrinsics: CameraIntrinsics,
    ) -> Result<ReflectionResult, PassError> {
        let started = Instant::now();
        self.check_size(position.width(), position.height())?;
        self.check_size(normal.width(), normal.height())?;
        self.check_size(lit_color.width(), lit_color.height())?;
        self.check_size(fallback_color.width(), fallback_color.height())?;

        let mips = self.build_mips(lit_color, position);
        let s = self.settings;
        let max_dist = s.max_ray_trace_distance.max(f32::EPSILON);
        let attenuation = self.attenuation();
        let level_exponent = if s.mip_base_power > 0.0 {
            1.0 / s.mip_base_power
        } else {
            1.0
        };
        let roughness = s.roughness.clamp(0.0, 1.0);

        let mut color = Grid::new(self.width, self.height, Vec4::ZERO);
        let mut aux_ao = Grid::new(self.width, self.height, 0.0);

        for y in 0..self.height {
            for x in 0..self.width {
                let p_texel = position.get(x, y);
                let n_texel = normal.get(x, y);
                if !texel_valid(p_texel) || !texel_valid(n_texel) {
                    continue;
                }
                let p = p_texel.truncate();
                // Geometry nearer than the near plane does not reflect.
                if p.z > s.near_plane_z {
                    continue;
                }
                let view = p.normalize_or_zero();
                let n = n_texel.truncate();
                let r = (view - 2.0 * view.dot(n) * n).normalize_or_zero();
                if r == Vec3::ZERO {
                    continue;
                }

                let jitter = pixel_hash(x, y) * s.jitter_factor.max(0.0);
                let rgb = match self.march(p, r, jitter, position, intrinsics) {
                    Some((t, u, v)) => {
                        let fade = self.fade_factor(r, p, u, v);
                        let spread = (roughness * t / max_dist).clamp(0.0, 1.0);
                        let level = s.cone_trace_mip_level
                            + (mips.len() - 1) as f32 * spread.powf(level_exponent);
                        let hx = (u.floor().max(0.0) as usize).min(self.width - 1);
                        let hy = (v.floor().max(0.0) as usize).min(self.height - 1);
                        let hit = sample_mips(&mips, level, hx, hy);
                        aux_ao.set(x, y, fade * (1.0 - t / max_dist).max(0.0));
                        fallback_color.get(x, y).truncate().lerp(hit, fade)
                    }
                    None => prefiltered.sample(r).lerp(irradiance.sample(n), roughness),
                };
                color.set(x, y, (rgb * attenuation).extend(1.0));
            }
        }

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Reflections traced"
        );
        Ok(ReflectionResult { color, aux_ao })
    }

    /// Gaussian mip chain of the lit image, each level blurred from the
    /// previous one guided by G-buffer depth.
    fn build_mips(&mut self, lit_color: &ColorGrid, position: &VecGrid) -> Vec<ColorGrid> {
        let levels = self.settings.max_mip_levels.max(1);
        let key = KernelKey::new(
            self.settings.gaussian_kernel_radius,
            self.settings.gaussian_sigma,
            self.settings.gaussian_b_sigma,
            0.0,
        );
        let weights = self.blur_cache.weights(key).to_vec();

        let mut guide = Grid::new(position.width(), position.height(), crate::constants::DEPTH_INVALID);
        for (x, y, p) in position.pixels() {
            if texel_valid(p) {
                guide.set(x, y, -p.z);
            }
        }

        let mut mips = Vec::with_capacity(levels);
        mips.push(lit_color.clone());
        for level in 1..levels {
            let blurred = bilateral::blur_color_guided(
                &mips[level - 1],
                &guide,
                &weights,
                self.settings.gaussian_b_sigma,
            );
            mips.push(blurred);
        }
        mips
    }

    /// March the reflected ray until a depth crossing or a miss. Returns
    /// the hit parameter and its floating pixel coordinates.
    fn march(
        &self,
        p: Vec3,
        r: Vec3,
        jitter: f32,
        position: &VecGrid,
        intrinsics: CameraIntrinsics,
    ) -> Option<(f32, f32, f32)> {
        let s = &self.settings;
        if s.stride <= 0.0 || s.max_steps == 0 {
            return None;
        }
        let max_dist = s.max_ray_trace_distance;
        let base_step = max_dist / s.max_steps as f32;

        let mut t = base_step * jitter;
        for _ in 0..s.max_steps {
            // Distant geometry shortens the step to keep screen-space
            // increments comparable.
            let here_z = (p.z + r.z * t).abs();
            let scale = if here_z > s.stride_z_cutoff {
                s.stride_z_cutoff / here_z
            } else {
                1.0
            };
            let t_prev = t;
            t += base_step * s.stride * scale;
            if t > max_dist {
                return None;
            }

            let ray_p = p + r * t;
            let (u, v) = intrinsics.project(ray_p)?;
            let (px, py) = (u.floor() as i64, v.floor() as i64);
            if !position.contains(px, py) {
                return None;
            }
            let scene = position.get(px as usize, py as usize);
            if !texel_valid(scene) {
                continue;
            }
            if ray_p.z < scene.z && ray_p.z > scene.z - s.ray_z_thickness {
                return Some(self.refine(p, r, t_prev, t, position, intrinsics));
            }
        }
        None
    }

    /// Bisect between the last point in front of the surface and the first
    /// point behind it.
    fn refine(
        &self,
        p: Vec3,
        r: Vec3,
        mut lo: f32,
        mut hi: f32,
        position: &VecGrid,
        intrinsics: CameraIntrinsics,
    ) -> (f32, f32, f32) {
        for _ in 0..self.settings.binary_search_steps {
            let mid = 0.5 * (lo + hi);
            let ray_p = p + r * mid;
            let behind = match intrinsics.project(ray_p) {
                Some((u, v)) => {
                    let (px, py) = (u.floor() as i64, v.floor() as i64);
                    if position.contains(px, py) {
                        let scene = position.get(px as usize, py as usize);
                        texel_valid(scene) && ray_p.z < scene.z
                    } else {
                        false
                    }
                }
                None => false,
            };
            if behind {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        let t = 0.5 * (lo + hi);
        let ray_p = p + r * t;
        let (u, v) = intrinsics.project(ray_p).unwrap_or((0.0, 0.0));
        (t, u, v)
    }

    /// Blend a traced reflection over its lit source image. Traced texels
    /// already carry the sharpness attenuation from [`Self::draw`]; the
    /// base color keeps the complementary weight. Untraced pixels pass
    /// through unchanged.
    pub fn compose(&self, lit: &ColorGrid, result: &ReflectionResult) -> ColorGrid {
        debug_assert!(lit.same_size(&result.color));
        let base = 1.0 - self.attenuation();
        let mut out = lit.clone();
        for (x, y, refl) in result.color.pixels() {
            if refl.w == 0.0 {
                continue;
            }
            let lit_px = lit.get(x, y);
            out.set(
                x,
                y,
                (lit_px.truncate() * base + refl.truncate()).extend(lit_px.w),
            );
        }
        out
    }

    /// Reflection weight in the composed image.
    fn attenuation(&self) -> f32 {
        self.settings
            .sharpness
            .max(0.0)
            .powf(self.settings.sharpness_power)
            .min(1.0)
    }

    /// Combined screen-edge and camera-facing fade for a hit.
    fn fade_factor(&self, r: Vec3, p: Vec3, u: f32, v: f32) -> f32 {
        let s = &self.settings;
        let ndc_x = 2.0 * u / self.width as f32 - 1.0;
        let ndc_y = 1.0 - 2.0 * v / self.height as f32;
        let edge = 1.0 - smoothstep(s.screen_edge_fade_start, 1.0, ndc_x.abs().max(ndc_y.abs()));

        let facing = r.dot(-p.normalize_or_zero());
        let camera = 1.0
            - smoothstep(
                s.camera_fade_start,
                s.camera_fade_start + s.camera_fade_length,
                facing,
            );
        edge * camera
    }

    fn check_size(&self, width: usize, height: usize) -> Result<(), PassError> {
        if width != self.width || height != self.height {
            return Err(PassError::SizeMismatch {
                expected: (self.width, self.height),
                got: (width, height),
            });
        }
        Ok(())
    }

    pub fn settings(&self) -> &ReflectionSettings {
        &self.settings
    }

    pub fn max_steps(&self) -> u32 {
        self.settings.max_steps
    }

    pub fn set_max_steps(&mut self, value: u32) {
        if value == 0 {
            warn!("Zero march steps disable reflections");
        }
        self.settings.max_steps = value;
    }

    pub fn binary_search_steps(&self) -> u32 {
        self.settings.binary_search_steps
    }

    pub fn set_binary_search_steps(&mut self, value: u32) {
        self.settings.binary_search_steps = value;
    }

    pub fn max_ray_trace_distance(&self) -> f32 {
        self.settings.max_ray_trace_distance
    }

    pub fn set_max_ray_trace_distance(&mut self, value: f32) {
        if value <= 0.0 {
            warn!(value, "Non-positive trace distance disables reflections");
        }
        self.settings.max_ray_trace_distance = value;
    }

    pub fn near_plane_z(&self) -> f32 {
        self.settings.near_plane_z
    }

    pub fn set_near_plane_z(&mut self, value: f32) {
        self.settings.near_plane_z = value;
    }

    pub fn ray_z_thickness(&self) -> f32 {
        self.settings.ray_z_thickness
    }

    pub fn set_ray_z_thickness(&mut self, value: f32) {
        if value <= 0.0 {
            warn!(value, "Non-positive thickness rejects every crossing");
        }
        self.settings.ray_z_thickness = value;
    }

    pub fn stride(&self) -> f32 {
        self.settings.stride
    }

    pub fn set_stride(&mut self, value: f32) {
        if value <= 0.0 {
            warn!(value, "Non-positive stride disables marching");
        }
        self.settings.stride = value;
    }

    pub fn stride_z_cutoff(&self) -> f32 {
        self.settings.stride_z_cutoff
    }

    pub fn set_stride_z_cutoff(&mut self, value: f32) {
        self.settings.stride_z_cutoff = value;
    }

    pub fn jitter_factor(&self) -> f32 {
        self.settings.jitter_factor
    }

    pub fn set_jitter_factor(&mut self, value: f32) {
        self.settings.jitter_factor = value;
    }

    pub fn screen_edge_fade_start(&self) -> f32 {
        self.settings.screen_edge_fade_start
    }

    pub fn set_screen_edge_fade_start(&mut self, value: f32) {
        self.settings.screen_edge_fade_start = value;
    }

    pub fn camera_fade_start(&self) -> f32 {
        self.settings.camera_fade_start
    }

    pub fn set_camera_fade_start(&mut self, value: f32) {
        self.settings.camera_fade_start = value;
    }

    pub fn camera_fade_length(&self) -> f32 {
        self.settings.camera_fade_length
    }

    pub fn set_camera_fade_length(&mut self, value: f32) {
        self.settings.camera_fade_length = value;
    }

    pub fn max_mip_levels(&self) -> usize {
        self.settings.max_mip_levels
    }

    pub fn set_max_mip_levels(&mut self, value: usize) {
        if value == 0 {
            warn!("Mip levels floored at one");
        }
        self.settings.max_mip_levels = value;
    }

    pub fn mip_base_power(&self) -> f32 {
        self.settings.mip_base_power
    }

    pub fn set_mip_base_power(&mut self, value: f32) {
        if value <= 0.0 {
            warn!(value, "Non-positive mip power degrades to linear selection");
        }
        self.settings.mip_base_power = value;
    }

    pub fn gaussian_kernel_radius(&self) -> i32 {
        self.settings.gaussian_kernel_radius
    }

    pub fn set_gaussian_kernel_radius(&mut self, value: i32) {
        if value <= 0 {
            warn!(value, "Mip blur degrades to identity");
        }
        self.settings.gaussian_kernel_radius = value;
    }

    pub fn gaussian_sigma(&self) -> f32 {
        self.settings.gaussian_sigma
    }

    pub fn set_gaussian_sigma(&mut self, value: f32) {
        if value <= 0.0 {
            warn!(value, "Non-positive spatial sigma degrades to a point kernel");
        }
        self.settings.gaussian_sigma = value;
    }

    pub fn gaussian_b_sigma(&self) -> f32 {
        self.settings.gaussian_b_sigma
    }

    pub fn set_gaussian_b_sigma(&mut self, value: f32) {
        if value <= 0.0 {
            warn!(value, "Non-positive range sigma degrades to a point kernel");
        }
        self.settings.gaussian_b_sigma = value;
    }

    pub fn roughness(&self) -> f32 {
        self.settings.roughness
    }

    pub fn set_roughness(&mut self, value: f32) {
        self.settings.roughness = value;
    }

    pub fn sharpness(&self) -> f32 {
        self.settings.sharpness
    }

    pub fn set_sharpness(&mut self, value: f32) {
        self.settings.sharpness = value;
    }

    pub fn sharpness_power(&self) -> f32 {
        self.settings.sharpness_power
    }

    pub fn set_sharpness_power(&mut self, value: f32) {
        self.settings.sharpness_power = value;
    }

    pub fn cone_trace_mip_level(&self) -> f32 {
        self.settings.cone_trace_mip_level
    }

    pub fn set_cone_trace_mip_level(&mut self, value: f32) {
        self.settings.cone_trace_mip_level = value;
    }
}

/// Blend between adjacent mip levels at one pixel.
fn sample_mips(mips: &[ColorGrid], level: f32, x: usize, y: usize) -> Vec3 {
    let top = mips.len() - 1;
    let clamped = level.clamp(0.0, top as f32);
    let l0 = clamped.floor() as usize;
    let l1 = (l0 + 1).min(top);
    let frac = clamped - l0 as f32;
    mips[l0]
        .get(x, y)
        .truncate()
        .lerp(mips[l1].get(x, y).truncate(), frac)
}

/// Deterministic per-pixel hash in `[0, 1)`.
fn pixel_hash(x: usize, y: usize) -> f32 {
    let mut h = (x as u32).wrapping_mul(0x9E37_79B9) ^ (y as u32).wrapping_mul(0x85EB_CA6B);
    h ^= h >> 15;
    h = h.wrapping_mul(0x2C1B_3C6D);
    h ^= h >> 12;
    h = h.wrapping_mul(0x297A_2D39);
    h ^= h >> 15;
    (h >> 8) as f32 / (1u32 << 24) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::valid_texel;

    /// Floor mirror at `floor_y` meeting a back wall at `wall_z`, exact
    /// planes. The lit image paints the wall red and the floor blue.
    fn mirror_scene(
        w: usize,
        h: usize,
        floor_y: f32,
        wall_z: f32,
        intrinsics: CameraIntrinsics,
    ) -> (VecGrid, VecGrid, ColorGrid) {
        let mut position = Grid::new(w, h, Vec4::ZERO);
        let mut normal = Grid::new(w, h, Vec4::ZERO);
        let mut lit = Grid::new(w, h, Vec4::ZERO);
        for y in 0..h {
            for x in 0..w {
                let d = intrinsics.pixel_ray(x as f32, y as f32);
                let t_wall = -wall_z;
                let (t, n, c) = if d.y < 0.0 && floor_y / d.y < t_wall {
                    (floor_y / d.y, Vec3::Y, Vec3::new(0.0, 0.0, 1.0))
                } else {
                    (t_wall, Vec3::Z, Vec3::new(1.0, 0.0, 0.0))
                };
                position.set(x, y, valid_texel(d * t));
                normal.set(x, y, valid_texel(n));
                lit.set(x, y, c.extend(1.0));
            }
        }
        (position, normal, lit)
    }

    fn exact_settings() -> ReflectionSettings {
        ReflectionSettings {
            jitter_factor: 0.0,
            roughness: 0.0,
            sharpness: 1.0,
            sharpness_power: 1.0,
            max_mip_levels: 2,
            gaussian_kernel_radius: 2,
            gaussian_sigma: 2.0,
            ..ReflectionSettings::default()
        }
    }

    #[test]
    fn test_planar_mirror_hits_analytic_point() {
        let intr = CameraIntrinsics::scaled_to(64, 48);
        let (position, normal, _lit) = mirror_scene(64, 48, -0.05, -0.2, intr);
        let pass = ReflectionPass::new(64, 48, exact_settings());

        // A floor pixel below the corner reflects onto the wall.
        let (x, y) = (32usize, 40usize);
        let p = position.get(x, y).truncate();
        let n = normal.get(x, y).truncate();
        assert!(n.y > 0.9, "test pixel must lie on the floor");

        let view = p.normalize();
        let r = (view - 2.0 * view.dot(n) * n).normalize();
        let t_expected = (-0.2 - p.z) / r.z;

        let (t, u, v) = pass
            .march(p, r, 0.0, &position, intr)
            .expect("mirror ray must hit the wall");
        assert!((t - t_expected).abs() < 2e-4, "t={t} expected={t_expected}");

        let hit = p + r * t;
        assert!((hit.z + 0.2).abs() < 2e-4);
        let (eu, ev) = intr.project(p + r * t_expected).unwrap();
        assert!((u - eu).abs() < 0.5);
        assert!((v - ev).abs() < 0.5);
    }

    #[test]
    fn test_mirror_pixel_reflects_wall_color() {
        let intr = CameraIntrinsics::scaled_to(64, 48);
        let (position, normal, lit) = mirror_scene(64, 48, -0.05, -0.2, intr);
        let mut pass = ReflectionPass::new(64, 48, exact_settings());

        let env = EnvironmentMap::solid(Vec3::ZERO);
        let result = pass
            .draw(&position, &normal, &lit, &lit, &env, &env, intr)
            .unwrap();

        let c = result.color.get(32, 40);
        assert_eq!(c.w, 1.0);
        assert!(c.x > 0.9, "floor should reflect the red wall, got {c:?}");
        assert!(result.aux_ao.get(32, 40) > 0.5);
    }

    #[test]
    fn test_miss_falls_back_to_environment() {
        let intr = CameraIntrinsics::scaled_to(64, 48);
        // Floor only; upward reflections leave the geometry.
        let mut position = Grid::new(64, 48, Vec4::ZERO);
        let mut normal = Grid::new(64, 48, Vec4::ZERO);
        let lit = Grid::new(64, 48, Vec4::new(0.0, 0.0, 1.0, 1.0));
        for y in 0..48 {
            for x in 0..64 {
                let d = intr.pixel_ray(x as f32, y as f32);
                if d.y < 0.0 {
                    position.set(x, y, valid_texel(d * (-0.05 / d.y)));
                    normal.set(x, y, valid_texel(Vec3::Y));
                }
            }
        }

        let mut pass = ReflectionPass::new(64, 48, exact_settings());
        let prefiltered = EnvironmentMap::solid(Vec3::new(0.0, 1.0, 0.0));
        let irradiance = EnvironmentMap::solid(Vec3::new(0.0, 0.2, 0.0));
        let result = pass
            .draw(&position, &normal, &lit, &lit, &irradiance, &prefiltered, intr)
            .unwrap();

        let c = result.color.get(32, 44);
        assert!((c.y - 1.0).abs() < 1e-5, "miss should sample prefiltered, got {c:?}");
        assert_eq!(result.aux_ao.get(32, 44), 0.0);
    }

    #[test]
    fn test_invalid_and_near_geometry_is_skipped() {
        let intr = CameraIntrinsics::scaled_to(16, 16);
        let mut position = Grid::new(16, 16, Vec4::ZERO);
        let mut normal = Grid::new(16, 16, Vec4::ZERO);
        // One valid pixel closer than the near plane.
        position.set(8, 8, valid_texel(Vec3::new(0.0, 0.0, -0.005)));
        normal.set(8, 8, valid_texel(Vec3::Z));
        let lit = Grid::new(16, 16, Vec4::new(1.0, 1.0, 1.0, 1.0));

        let mut pass = ReflectionPass::new(16, 16, exact_settings());
        let env = EnvironmentMap::solid(Vec3::ONE);
        let result = pass
            .draw(&position, &normal, &lit, &lit, &env, &env, intr)
            .unwrap();
        assert!(result.color.data().iter().all(|c| c.w == 0.0));
        assert!(result.aux_ao.data().iter().all(|&a| a == 0.0));
    }

    #[test]
    fn test_camera_facing_rays_fade_out() {
        let pass = ReflectionPass::new(64, 48, ReflectionSettings::default());
        let p = Vec3::new(0.0, 0.0, -0.2);

        // Reflection straight back at the camera.
        let toward_camera = pass.fade_factor(Vec3::Z, p, 32.0, 24.0);
        assert_eq!(toward_camera, 0.0);

        // Sideways reflection at the screen center keeps full weight.
        let sideways = pass.fade_factor(Vec3::X, p, 32.0, 24.0);
        assert!((sideways - 1.0).abs() < 1e-6);

        // The same ray loses weight near the screen edge.
        let at_edge = pass.fade_factor(Vec3::X, p, 62.0, 24.0);
        assert!(at_edge < sideways);
    }

    #[test]
    fn test_sharpness_attenuates_output() {
        let intr = CameraIntrinsics::scaled_to(32, 24);
        let (position, normal, lit) = mirror_scene(32, 24, -0.05, -0.2, intr);
        let mut settings = exact_settings();
        settings.sharpness = 0.5;
        settings.sharpness_power = 2.0;
        let mut pass = ReflectionPass::new(32, 24, settings);

        let env = EnvironmentMap::solid(Vec3::ONE);
        let result = pass
            .draw(&position, &normal, &lit, &lit, &env, &env, intr)
            .unwrap();
        // Every computed pixel is attenuated by 0.25.
        for c in result.color.data() {
            if c.w > 0.0 {
                assert!(c.x <= 0.2501 && c.y <= 0.2501 && c.z <= 0.2501);
            }
        }
    }

    #[test]
    fn test_compose_blends_only_traced_pixels() {
        let intr = CameraIntrinsics::scaled_to(32, 24);
        let (position, normal, lit) = mirror_scene(32, 24, -0.05, -0.2, intr);
        // Unit sharpness makes the reflection replace the base entirely.
        let mut pass = ReflectionPass::new(32, 24, exact_settings());
        let env = EnvironmentMap::solid(Vec3::splat(0.5));
        let result = pass
            .draw(&position, &normal, &lit, &lit, &env, &env, intr)
            .unwrap();

        let composed = pass.compose(&lit, &result);
        for (x, y, refl) in result.color.pixels() {
            if refl.w == 0.0 {
                assert_eq!(composed.get(x, y), lit.get(x, y));
            } else {
                assert_eq!(composed.get(x, y).truncate(), refl.truncate());
            }
        }
    }

    #[test]
    fn test_draw_is_deterministic() {
        let intr = CameraIntrinsics::scaled_to(48, 36);
        let (position, normal, lit) = mirror_scene(48, 36, -0.05, -0.2, intr);
        let mut settings = exact_settings();
        settings.jitter_factor = 0.5;
        let mut pass = ReflectionPass::new(48, 36, settings);
        let env = EnvironmentMap::solid(Vec3::ZERO);

        let a = pass
            .draw(&position, &normal, &lit, &lit, &env, &env, intr)
            .unwrap();
        let b = pass
            .draw(&position, &normal, &lit, &lit, &env, &env, intr)
            .unwrap();
        assert_eq!(a.color.data(), b.color.data());
        assert_eq!(a.aux_ao.data(), b.aux_ao.data());
    }

    #[test]
    fn test_rebuild_preserves_parameters_and_output() {
        let intr = CameraIntrinsics::scaled_to(32, 24);
        let (position, normal, lit) = mirror_scene(32, 24, -0.05, -0.2, intr);
        let mut settings = exact_settings();
        settings.jitter_factor = 0.3;
        let mut pass = ReflectionPass::new(32, 24, settings);
        let env = EnvironmentMap::solid(Vec3::splat(0.25));

        let before = pass
            .draw(&position, &normal, &lit, &lit, &env, &env, intr)
            .unwrap();
        pass.rebuild_programs();
        assert_eq!(*pass.settings(), settings);

        let after = pass
            .draw(&position, &normal, &lit, &lit, &env, &env, intr)
            .unwrap();
        assert_eq!(before.color.data(), after.color.data());
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let intr = CameraIntrinsics::scaled_to(16, 16);
        let (position, normal, lit) = mirror_scene(16, 16, -0.05, -0.2, intr);
        let mut pass = ReflectionPass::new(32, 32, ReflectionSettings::default());
        let env = EnvironmentMap::solid(Vec3::ZERO);
        assert!(matches!(
            pass.draw(&position, &normal, &lit, &lit, &env, &env, intr),
            Err(PassError::SizeMismatch { .. })
        ));
    }
}
