// SPDX-License-Identifier: GPL-3.0-only

//! Screen-space ambient occlusion over two geometry layers
//!
//! Occlusion is estimated at reduced resolution with a seeded hemisphere
//! kernel, bilateral-upsampled guided by full-resolution depth, then
//! smoothed with the cached normpdf blur. Two layers are held per frame:
//! layer 0 covers the full composed geometry, layer 1 the sensor-only
//! geometry. The merge takes the per-pixel maximum, so identical layers
//! merge to themselves and a frame without virtual geometry leaves the
//! combined buffer equal to either layer.

use std::time::Instant;

use glam::{Vec3, Vec4};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, info, warn};

use crate::buffers::{ColorGrid, Grid, VecGrid, texel_valid};
use crate::config::AoSettings;
use crate::constants::{AO_NOISE_SEED, AO_NOISE_TILE};
use crate::errors::PassError;
use crate::filters::{KernelCache, KernelKey, bilateral, smoothstep};
use crate::passes::Slot;
use crate::sensor::CameraIntrinsics;

/// Layer index for occlusion over the full composed geometry.
pub const LAYER_FULL: usize = 0;
/// Layer index for occlusion over the sensor-only geometry.
pub const LAYER_SENSOR: usize = 1;
/// Number of occlusion layers held per frame.
pub const AO_LAYERS: usize = 2;

const LAYER_SLOTS: [Slot; AO_LAYERS] = [Slot::OcclusionFull, Slot::OcclusionBack];

/// Two-layer screen-space ambient occlusion.
pub struct AmbientOcclusionPass {
    width: usize,
    height: usize,
    settings: AoSettings,
    kernel: Vec<Vec3>,
    noise: Vec<Vec3>,
    layers: Vec<Grid<f32>>,
    drawn: [bool; AO_LAYERS],
    combined: Grid<f32>,
    modulated: ColorGrid,
    blur_cache: KernelCache,
}

impl AmbientOcclusionPass {
    pub fn new(width: u32, height: u32, settings: AoSettings) -> Self {
        let (w, h) = (width as usize, height as usize);
        let (kernel, noise) = build_kernel(settings.kernel_size);
        Self {
            width: w,
            height: h,
            settings,
            kernel,
            noise,
            layers: (0..AO_LAYERS).map(|_| Grid::new(w, h, 0.0)).collect(),
            drawn: [false; AO_LAYERS],
            combined: Grid::new(w, h, 0.0),
            modulated: Grid::new(w, h, Vec4::ZERO),
            blur_cache: KernelCache::new(),
        }
    }

    /// Forget per-frame layer state.
    pub fn begin_frame(&mut self) {
        self.drawn = [false; AO_LAYERS];
    }

    /// Regenerate the hemisphere kernel and rotation noise and drop cached
    /// blur weights. Parameters are preserved; with unchanged parameters
    /// the regenerated kernel is identical.
    pub fn rebuild_programs(&mut self) {
        let (kernel, noise) = build_kernel(self.settings.kernel_size);
        self.kernel = kernel;
        self.noise = noise;
        self.blur_cache.invalidate();
        info!("Rebuilt occlusion kernels");
    }

    /// Compute occlusion for one geometry layer.
    ///
    /// `color` travels with the geometry for interface symmetry and size
    /// validation; the geometric estimate reads position and normal only.
    pub fn draw_layer(
        &mut self,
        layer: usize,
        position: &VecGrid,
        normal: &VecGrid,
        color: &ColorGrid,
        intrinsics: CameraIntrinsics,
    ) -> Result<(), PassError> {
        let started = Instant::now();
        if layer >= AO_LAYERS {
            return Err(PassError::LayerOutOfRange(layer));
        }
        self.check_size(position.width(), position.height())?;
        self.check_size(normal.width(), normal.height())?;
        self.check_size(color.width(), color.height())?;

        let factor = self.settings.downscale_factor.max(1) as usize;
        let low_w = (self.width / factor).max(1);
        let low_h = (self.height / factor).max(1);
        let low_intrinsics = intrinsics.rescaled(low_w as u32, low_h as u32);

        // Nearest-pick geometry at reduced resolution.
        let mut low_position = Grid::new(low_w, low_h, Vec4::ZERO);
        let mut low_normal = Grid::new(low_w, low_h, Vec4::ZERO);
        for y in 0..low_h {
            for x in 0..low_w {
                low_position.set(x, y, position.get(x * factor, y * factor));
                low_normal.set(x, y, normal.get(x * factor, y * factor));
            }
        }

        let mut low_occlusion = Grid::new(low_w, low_h, 0.0);
        for y in 0..low_h {
            for x in 0..low_w {
                let value = self.occlusion_at(x, y, &low_position, &low_normal, low_intrinsics);
                low_occlusion.set(x, y, value);
            }
        }

        let low_depth = derived_depth(&low_position);
        let full_depth = derived_depth(position);
        let upsampled = bilateral::upsample_guided(
            &low_occlusion,
            &low_depth,
            &full_depth,
            self.settings.blur_b_sigma,
        );

        let key = KernelKey::new(
            self.settings.blur_kernel_radius,
            self.settings.blur_sigma,
            self.settings.blur_b_sigma,
            0.0,
        );
        let weights = self.blur_cache.weights(key);
        let smoothed = bilateral::blur_scalar_guided(
            &upsampled,
            &full_depth,
            weights,
            self.settings.blur_b_sigma,
        );

        self.layers[layer] = smoothed;
        self.drawn[layer] = true;
        debug!(
            layer,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Occlusion layer drawn"
        );
        Ok(())
    }

    /// Hemisphere occlusion estimate for one reduced-resolution pixel.
    fn occlusion_at(
        &self,
        x: usize,
        y: usize,
        position: &VecGrid,
        normal: &VecGrid,
        intrinsics: CameraIntrinsics,
    ) -> f32 {
        let p_texel = position.get(x, y);
        let n_texel = normal.get(x, y);
        if !texel_valid(p_texel) || !texel_valid(n_texel) {
            return 0.0;
        }
        let p = p_texel.truncate();
        let n = n_texel.truncate();
        let radius = self.settings.kernel_radius;
        if radius <= 0.0 {
            return 0.0;
        }
        let samples = self.settings.samples.min(self.kernel.len());
        if samples == 0 {
            return 0.0;
        }

        let rot = self.noise[(y % AO_NOISE_TILE) * AO_NOISE_TILE + (x % AO_NOISE_TILE)];
        let mut tangent = (rot - n * rot.dot(n)).normalize_or_zero();
        if tangent == Vec3::ZERO {
            let any = if n.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
            tangent = (any - n * any.dot(n)).normalize_or_zero();
        }
        let bitangent = n.cross(tangent);

        let mut occlusion = 0.0;
        for offset in &self.kernel[..samples] {
            let dir = tangent * offset.x + bitangent * offset.y + n * offset.z;
            let sample_p = p + dir * radius;
            let Some((u, v)) = intrinsics.project(sample_p) else {
                continue;
            };
            let (sx, sy) = (u.floor() as i64, v.floor() as i64);
            if !position.contains(sx, sy) {
                continue;
            }
            let scene = position.get(sx as usize, sy as usize);
            if !texel_valid(scene) {
                continue;
            }
            // Scene geometry in front of the sample point occludes it.
            if scene.z >= sample_p.z + self.settings.bias {
                let range = smoothstep(0.0, 1.0, radius / (p.z - scene.z).abs());
                occlusion += range;
            }
        }

        let raw = occlusion / samples as f32;
        (raw * self.settings.intensity)
            .clamp(0.0, 1.0)
            .powf(self.settings.power)
    }

    /// Merge drawn layers into the combined occlusion buffer and modulate
    /// `color` by the result.
    pub fn draw_combined(&mut self, color: &ColorGrid) -> Result<(), PassError> {
        for layer in 0..AO_LAYERS {
            if !self.drawn[layer] {
                return Err(PassError::MissingInput {
                    pass: "ao-combine",
                    slot: LAYER_SLOTS[layer].name(),
                });
            }
        }
        self.check_size(color.width(), color.height())?;

        for i in 0..self.combined.len() {
            let mut max = 0.0f32;
            for layer in &self.layers {
                max = max.max(layer.data()[i]);
            }
            self.combined.data_mut()[i] = max;

            let c = color.data()[i];
            let visibility = 1.0 - max;
            self.modulated.data_mut()[i] =
                Vec4::new(c.x * visibility, c.y * visibility, c.z * visibility, c.w);
        }
        Ok(())
    }

    /// Read one layer's full-resolution occlusion.
    pub fn texture_layer(&self, layer: usize) -> Result<&Grid<f32>, PassError> {
        self.layers
            .get(layer)
            .ok_or(PassError::LayerOutOfRange(layer))
    }

    pub fn combined(&self) -> &Grid<f32> {
        &self.combined
    }

    pub fn modulated_color(&self) -> &ColorGrid {
        &self.modulated
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

    pub fn settings(&self) -> &AoSettings {
        &self.settings
    }

    pub fn downscale_factor(&self) -> u32 {
        self.settings.downscale_factor
    }

    pub fn set_downscale_factor(&mut self, value: u32) {
        if value == 0 {
            warn!("Zero downscale factor clamps to full resolution");
        }
        self.settings.downscale_factor = value;
    }

    pub fn kernel_size(&self) -> usize {
        self.settings.kernel_size
    }

    /// Changing the kernel size regenerates the hemisphere immediately.
    pub fn set_kernel_size(&mut self, value: usize) {
        if value == 0 {
            warn!("Zero kernel size clamps to one offset");
        }
        self.settings.kernel_size = value;
        let (kernel, noise) = build_kernel(value);
        self.kernel = kernel;
        self.noise = noise;
    }

    pub fn kernel_radius(&self) -> f32 {
        self.settings.kernel_radius
    }

    pub fn set_kernel_radius(&mut self, value: f32) {
        if value <= 0.0 {
            warn!(value, "Non-positive occlusion radius yields zero occlusion");
        }
        self.settings.kernel_radius = value;
    }

    pub fn samples(&self) -> usize {
        self.settings.samples
    }

    pub fn set_samples(&mut self, value: usize) {
        if value == 0 {
            warn!("Zero samples yield zero occlusion");
        }
        self.settings.samples = value;
    }

    pub fn bias(&self) -> f32 {
        self.settings.bias
    }

    pub fn set_bias(&mut self, value: f32) {
        self.settings.bias = value;
    }

    pub fn intensity(&self) -> f32 {
        self.settings.intensity
    }

    pub fn set_intensity(&mut self, value: f32) {
        self.settings.intensity = value;
    }

    pub fn power(&self) -> f32 {
        self.settings.power
    }

    pub fn set_power(&mut self, value: f32) {
        self.settings.power = value;
    }

    pub fn blur_kernel_radius(&self) -> i32 {
        self.settings.blur_kernel_radius
    }

    pub fn set_blur_kernel_radius(&mut self, value: i32) {
        if value <= 0 {
            warn!(value, "Occlusion smoothing degrades to identity");
        }
        self.settings.blur_kernel_radius = value;
    }

    pub fn blur_sigma(&self) -> f32 {
        self.settings.blur_sigma
    }

    pub fn set_blur_sigma(&mut self, value: f32) {
        if value <= 0.0 {
            warn!(value, "Non-positive spatial sigma degrades to a point kernel");
        }
        self.settings.blur_sigma = value;
    }

    pub fn blur_b_sigma(&self) -> f32 {
        self.settings.blur_b_sigma
    }

    pub fn set_blur_b_sigma(&mut self, value: f32) {
        if value <= 0.0 {
            warn!(value, "Non-positive range sigma degrades to a point kernel");
        }
        self.settings.blur_b_sigma = value;
    }
}

/// Seeded hemisphere offsets plus the tiled rotation noise.
///
/// Offsets lie in the `z >= 0` hemisphere and are pulled toward the origin
/// quadratically so nearby geometry dominates the estimate.
fn build_kernel(kernel_size: usize) -> (Vec<Vec3>, Vec<Vec3>) {
    let size = kernel_size.max(1);
    let mut rng = StdRng::seed_from_u64(AO_NOISE_SEED);

    let mut kernel = Vec::with_capacity(size);
    for i in 0..size {
        let mut sample = Vec3::new(
            rng.random::<f32>() * 2.0 - 1.0,
            rng.random::<f32>() * 2.0 - 1.0,
            rng.random::<f32>(),
        )
        .normalize_or_zero();
        if sample == Vec3::ZERO {
            sample = Vec3::Z;
        }
        sample *= rng.random::<f32>();
        let t = i as f32 / size as f32;
        let scale = 0.1 + 0.9 * t * t;
        kernel.push(sample * scale);
    }

    let mut noise = Vec::with_capacity(AO_NOISE_TILE * AO_NOISE_TILE);
    for _ in 0..AO_NOISE_TILE * AO_NOISE_TILE {
        noise.push(Vec3::new(
            rng.random::<f32>() * 2.0 - 1.0,
            rng.random::<f32>() * 2.0 - 1.0,
            0.0,
        ));
    }

    (kernel, noise)
}

/// Normalized depth from a position grid; invalid texels stay invalid.
fn derived_depth(position: &VecGrid) -> Grid<f32> {
    let mut depth = Grid::new(position.width(), position.height(), crate::constants::DEPTH_INVALID);
    for (x, y, p) in position.pixels() {
        if texel_valid(p) {
            depth.set(x, y, -p.z);
        }
    }
    depth
}
