// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline configuration
//!
//! Serde-backed settings for every tunable in the pipeline, grouped per
//! component. A [`PipelineConfig`] can be loaded from and saved to JSON;
//! missing fields fall back to the defaults below, which reproduce the
//! reference tuning for a 10 m depth range.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::errors::{FusionError, FusionResult};

/// Depth reconstruction tunables
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructSettings {
    /// Spatial radius of the temporal median window (pixels)
    pub tmf_kernel_radius: i32,
    /// History frames pooled by the temporal median (clamped to 10)
    pub tmf_frame_layers: usize,
    /// Median radius for hole filling (pixels)
    pub fill_kernel_radius: i32,
    /// Hole-fill iterations (odd preferred, even accepted)
    pub fill_passes: u32,
    /// Bilateral smoothing radius (pixels)
    pub blur_kernel_radius: i32,
    /// Spatial sigma of the bilateral kernel
    pub blur_sigma: f32,
    /// Range sigma for depth-guided smoothing
    pub blur_b_sigma: f32,
    /// Range sigma when the blur is guided by a second signal
    pub blur_b_sigma_jbf: f32,
    /// Depth delta beyond which bilateral samples are rejected
    pub blur_s_thresh: f32,
}

impl Default for ReconstructSettings {
    fn default() -> Self {
        Self {
            tmf_kernel_radius: 1,
            tmf_frame_layers: 10,
            fill_kernel_radius: 5,
            fill_passes: 11,
            blur_kernel_radius: 22,
            blur_sigma: 32.0,
            blur_b_sigma: 1.0,
            blur_b_sigma_jbf: 1e-5,
            blur_s_thresh: 0.02,
        }
    }
}

/// Ambient occlusion tunables
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AoSettings {
    /// Occlusion is computed at full resolution divided by this factor
    pub downscale_factor: u32,
    /// Hemisphere kernel size (offsets generated once per rebuild)
    pub kernel_size: usize,
    /// Sampling radius in view-space units
    pub kernel_radius: f32,
    /// Offsets actually sampled per pixel (clamped to kernel_size)
    pub samples: usize,
    /// Depth bias applied before counting a sample as occluded
    pub bias: f32,
    /// Linear scale on the raw occlusion fraction
    pub intensity: f32,
    /// Exponent shaping the scaled occlusion
    pub power: f32,
    /// Radius of the post-upsample smoothing blur (pixels)
    pub blur_kernel_radius: i32,
    /// Spatial sigma of the smoothing blur
    pub blur_sigma: f32,
    /// Range sigma of the depth-guided smoothing blur
    pub blur_b_sigma: f32,
}

impl Default for AoSettings {
    fn default() -> Self {
        Self {
            downscale_factor: 2,
            kernel_size: 64,
            kernel_radius: 0.05,
            samples: 24,
            bias: 0.003,
            intensity: 0.05,
            power: 1.0,
            blur_kernel_radius: 10,
            blur_sigma: 10.0,
            blur_b_sigma: 0.1,
        }
    }
}

/// Screen-space reflection tunables
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionSettings {
    /// Hard cap on ray-march iterations
    pub max_steps: u32,
    /// Bisection iterations refining a depth crossing
    pub binary_search_steps: u32,
    /// Maximum view-space ray travel before falling back to the environment
    pub max_ray_trace_distance: f32,
    /// Surfaces nearer than this view-space Z are not reflected
    pub near_plane_z: f32,
    /// Depth thickness treated as solid when testing a crossing
    pub ray_z_thickness: f32,
    /// March step scale
    pub stride: f32,
    /// Beyond this |view Z| the stride shrinks proportionally
    pub stride_z_cutoff: f32,
    /// Deterministic per-pixel jitter on the march start
    pub jitter_factor: f32,
    /// Screen-edge fade begins at this |NDC| coordinate
    pub screen_edge_fade_start: f32,
    /// Camera-facing fade start (dot of ray and view direction)
    pub camera_fade_start: f32,
    /// Camera-facing fade length
    pub camera_fade_length: f32,
    /// Gaussian mip chain depth (floored at 1)
    pub max_mip_levels: usize,
    /// Exponent mapping cone spread to mip level
    pub mip_base_power: f32,
    /// Radius of the mip-chain blur (pixels)
    pub gaussian_kernel_radius: i32,
    /// Spatial sigma of the mip-chain blur
    pub gaussian_sigma: f32,
    /// Range sigma of the depth-guided mip-chain blur
    pub gaussian_b_sigma: f32,
    /// Surface roughness driving cone spread
    pub roughness: f32,
    /// Reflection sharpness scale
    pub sharpness: f32,
    /// Exponent applied to sharpness
    pub sharpness_power: f32,
    /// Bias added to the selected mip level
    pub cone_trace_mip_level: f32,
}

impl Default for ReflectionSettings {
    fn default() -> Self {
        Self {
            max_steps: 200,
            binary_search_steps: 20,
            max_ray_trace_distance: 0.2,
            near_plane_z: -0.01,
            ray_z_thickness: 0.01,
            stride: 1.0,
            stride_z_cutoff: 1.0,
            jitter_factor: 0.5,
            screen_edge_fade_start: 0.8,
            camera_fade_start: 0.98,
            camera_fade_length: 0.01,
            max_mip_levels: 7,
            mip_base_power: 2.5,
            gaussian_kernel_radius: 5,
            gaussian_sigma: 5.0,
            gaussian_b_sigma: 10.1,
            roughness: 1.0,
            sharpness: 0.2,
            sharpness_power: 2.0,
            cone_trace_mip_level: 0.0,
        }
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Depth reconstruction settings
    pub reconstruct: ReconstructSettings,
    /// Ambient occlusion settings
    pub ao: AoSettings,
    /// Screen-space reflection settings
    pub reflection: ReflectionSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            width: 640, // Base sensor resolution
            height: 480,
            reconstruct: ReconstructSettings::default(),
            ao: AoSettings::default(),
            reflection: ReflectionSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file.
    pub fn load(path: &Path) -> FusionResult<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> FusionResult<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Reject configurations the pipeline cannot be constructed with.
    pub fn validate(&self) -> FusionResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(FusionError::Config(format!(
                "resolution must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}
