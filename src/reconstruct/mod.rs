// SPDX-License-Identifier: GPL-3.0-only

//! Depth reconstruction from raw sensor frames
//!
//! [`DepthReconstructor`] turns the noisy millimeter depth image of a
//! [`SensorFrame`] into clean view-space position, normal and color
//! buffers. The filter chain runs in a fixed order: temporal median over
//! recent history, hole filling, bilateral smoothing, then unprojection
//! and normal estimation. Sentinel depth stays invalid through every
//! stage; consumers check texel validity instead of trusting zeros.

use std::collections::VecDeque;
use std::time::Instant;

use glam::{Mat4, Vec3, Vec4};
use tracing::{debug, warn};

use crate::buffers::{
    ColorGrid, DepthGrid, Grid, VecGrid, depth_valid, invalid_texel, texel_valid, valid_texel,
};
use crate::config::ReconstructSettings;
use crate::constants::{DEPTH_INVALID, DEPTH_MAX_MM, TMF_MAX_FRAME_LAYERS};
use crate::errors::{FusionResult, SensorError};
use crate::filters::{
    KernelCache, KernelKey,
    bilateral::{blur_color_guided, blur_depth},
    median::{hole_fill, temporal_median},
};
use crate::sensor::{CameraIntrinsics, SensorFrame};

/// Ring of recent normalized depth frames for the temporal median.
pub struct TemporalHistory {
    frames: VecDeque<DepthGrid>,
    capacity: usize,
}

impl TemporalHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push the newest frame, evicting the oldest past capacity.
    pub fn push(&mut self, frame: DepthGrid) {
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Up to the `n` most recent frames, newest last.
    pub fn recent(&self, n: usize) -> Vec<&DepthGrid> {
        let n = n.min(self.frames.len());
        self.frames.iter().skip(self.frames.len() - n).collect()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

/// Raw depth to clean position/normal/color buffers.
pub struct DepthReconstructor {
    width: usize,
    height: usize,
    intrinsics: CameraIntrinsics,
    settings: ReconstructSettings,
    history: TemporalHistory,
    filtered: DepthGrid,
    position: VecGrid,
    normal: VecGrid,
    color: ColorGrid,
    blur_cache: KernelCache,
    jbf_cache: KernelCache,
    stale: bool,
}

impl DepthReconstructor {
    pub fn new(width: u32, height: u32, settings: ReconstructSettings) -> Self {
        let (w, h) = (width as usize, height as usize);
        Self {
            width: w,
            height: h,
            intrinsics: CameraIntrinsics::scaled_to(width, height),
            settings,
            history: TemporalHistory::new(TMF_MAX_FRAME_LAYERS),
            filtered: Grid::new(w, h, DEPTH_INVALID),
            position: Grid::new(w, h, invalid_texel()),
            normal: Grid::new(w, h, invalid_texel()),
            color: Grid::new(w, h, Vec4::ZERO),
            blur_cache: KernelCache::new(),
            jbf_cache: KernelCache::new(),
            stale: true,
        }
    }

    /// Ingest one raw frame and run the full filter chain.
    pub fn ingest(&mut self, frame: &SensorFrame) -> FusionResult<()> {
        let started = Instant::now();
        frame.validate()?;
        if frame.width as usize != self.width || frame.height as usize != self.height {
            return Err(SensorError::BadFrame(format!(
                "frame {}x{} does not match reconstructor {}x{}",
                frame.width, frame.height, self.width, self.height
            ))
            .into());
        }
        self.intrinsics = frame.intrinsics;

        self.history.push(normalize_depth(frame, self.width, self.height));

        let layers = self.settings.tmf_frame_layers.clamp(1, TMF_MAX_FRAME_LAYERS);
        let pooled = temporal_median(
            &self.history.recent(layers),
            self.settings.tmf_kernel_radius,
        );
        let filled = hole_fill(
            &pooled,
            self.settings.fill_kernel_radius,
            self.settings.fill_passes,
        );

        let blur_key = KernelKey::new(
            self.settings.blur_kernel_radius,
            self.settings.blur_sigma,
            self.settings.blur_b_sigma,
            self.settings.blur_s_thresh,
        );
        let weights = self.blur_cache.weights(blur_key);
        self.filtered = blur_depth(
            &filled,
            weights,
            self.settings.blur_b_sigma,
            self.settings.blur_s_thresh,
        );

        self.rebuild_geometry();

        let jbf_key = KernelKey::new(
            self.settings.blur_kernel_radius,
            self.settings.blur_sigma,
            self.settings.blur_b_sigma_jbf,
            0.0,
        );
        let jbf_weights = self.jbf_cache.weights(jbf_key);
        let raw_color = color_to_grid(frame, self.width, self.height);
        self.color = blur_color_guided(
            &raw_color,
            &self.filtered,
            jbf_weights,
            self.settings.blur_b_sigma_jbf,
        );

        self.stale = false;
        debug!(
            sequence = frame.sequence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Depth frame reconstructed"
        );
        Ok(())
    }

    /// Unproject filtered depth and derive normals from central differences.
    fn rebuild_geometry(&mut self) {
        let (w, h) = (self.width, self.height);
        for y in 0..h {
            for x in 0..w {
                let d = self.filtered.get(x, y);
                let texel = if depth_valid(d) {
                    valid_texel(self.intrinsics.unproject(x as f32, y as f32, d))
                } else {
                    invalid_texel()
                };
                self.position.set(x, y, texel);
            }
        }

        for y in 0..h {
            for x in 0..w {
                self.normal.set(x, y, self.normal_at(x, y));
            }
        }
    }

    fn normal_at(&self, x: usize, y: usize) -> Vec4 {
        if x == 0 || y == 0 || x + 1 >= self.width || y + 1 >= self.height {
            return invalid_texel();
        }
        let center = self.position.get(x, y);
        let left = self.position.get(x - 1, y);
        let right = self.position.get(x + 1, y);
        let up = self.position.get(x, y - 1);
        let down = self.position.get(x, y + 1);
        if !texel_valid(center)
            || !texel_valid(left)
            || !texel_valid(right)
            || !texel_valid(up)
            || !texel_valid(down)
        {
            return invalid_texel();
        }

        let dx = right.truncate() - left.truncate();
        let dy = down.truncate() - up.truncate();
        let mut n = dx.cross(dy).normalize_or_zero();
        if n == Vec3::ZERO {
            return invalid_texel();
        }
        // Orient toward the camera.
        if n.dot(center.truncate()) > 0.0 {
            n = -n;
        }
        valid_texel(n)
    }

    /// Mark the current buffers as reused from a previous frame.
    pub fn note_missed_frame(&mut self) {
        debug!("Reusing previous depth frame");
        self.stale = true;
    }

    /// Whether the buffers come from a frame that is no longer current.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn filtered_depth(&self) -> &DepthGrid {
        &self.filtered
    }

    pub fn position(&self) -> &VecGrid {
        &self.position
    }

    pub fn normal(&self) -> &VecGrid {
        &self.normal
    }

    pub fn color(&self) -> &ColorGrid {
        &self.color
    }

    pub fn intrinsics(&self) -> CameraIntrinsics {
        self.intrinsics
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.intrinsics.projection_matrix()
    }

    pub fn inverse_projection_matrix(&self) -> Mat4 {
        self.intrinsics.inverse_projection_matrix()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Valid view-space positions in a window around the image center, for
    /// anchoring virtual content on reconstructed surfaces.
    pub fn anchor_positions(&self, sample_radius: i32) -> Vec<Vec3> {
        let r = sample_radius.max(0) as i64;
        let (cx, cy) = (self.width as i64 / 2, self.height as i64 / 2);
        let mut out = Vec::new();
        for y in (cy - r)..=(cy + r) {
            for x in (cx - r)..=(cx + r) {
                if !self.position.contains(x, y) {
                    continue;
                }
                let texel = self.position.get(x as usize, y as usize);
                if texel_valid(texel) {
                    out.push(texel.truncate());
                }
            }
        }
        out
    }

    pub fn settings(&self) -> &ReconstructSettings {
        &self.settings
    }

    pub fn tmf_kernel_radius(&self) -> i32 {
        self.settings.tmf_kernel_radius
    }

    pub fn set_tmf_kernel_radius(&mut self, value: i32) {
        if value <= 0 {
            warn!(value, "Temporal median radius degrades to a single pixel");
        }
        self.settings.tmf_kernel_radius = value;
    }

    pub fn tmf_frame_layers(&self) -> usize {
        self.settings.tmf_frame_layers
    }

    pub fn set_tmf_frame_layers(&mut self, value: usize) {
        if value == 0 || value > TMF_MAX_FRAME_LAYERS {
            warn!(
                value,
                cap = TMF_MAX_FRAME_LAYERS,
                "Frame layers clamped to history capacity"
            );
        }
        self.settings.tmf_frame_layers = value;
    }

    pub fn fill_kernel_radius(&self) -> i32 {
        self.settings.fill_kernel_radius
    }

    pub fn set_fill_kernel_radius(&mut self, value: i32) {
        if value <= 0 {
            warn!(value, "Hole filling degrades to identity");
        }
        self.settings.fill_kernel_radius = value;
    }

    pub fn fill_passes(&self) -> u32 {
        self.settings.fill_passes
    }

    pub fn set_fill_passes(&mut self, value: u32) {
        if value == 0 {
            warn!("Zero fill passes degrade hole filling to identity");
        }
        self.settings.fill_passes = value;
    }

    pub fn blur_kernel_radius(&self) -> i32 {
        self.settings.blur_kernel_radius
    }

    pub fn set_blur_kernel_radius(&mut self, value: i32) {
        if value <= 0 {
            warn!(value, "Bilateral smoothing degrades to identity");
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

    pub fn blur_b_sigma_jbf(&self) -> f32 {
        self.settings.blur_b_sigma_jbf
    }

    pub fn set_blur_b_sigma_jbf(&mut self, value: f32) {
        if value <= 0.0 {
            warn!(value, "Non-positive range sigma degrades to a point kernel");
        }
        self.settings.blur_b_sigma_jbf = value;
    }

    pub fn blur_s_thresh(&self) -> f32 {
        self.settings.blur_s_thresh
    }

    pub fn set_blur_s_thresh(&mut self, value: f32) {
        if value <= 0.0 {
            warn!(value, "Non-positive threshold rejects every neighbor");
        }
        self.settings.blur_s_thresh = value;
    }
}

/// Raw millimeter depth to normalized `(0, 1]`; sentinel and out-of-range
/// values become invalid.
fn normalize_depth(frame: &SensorFrame, width: usize, height: usize) -> DepthGrid {
    let mut grid = Grid::new(width, height, DEPTH_INVALID);
    for (i, &mm) in frame.depth.iter().enumerate() {
        if mm > 0 && mm <= DEPTH_MAX_MM {
            grid.data_mut()[i] = mm as f32 / DEPTH_MAX_MM as f32;
        }
    }
    grid
}

fn color_to_grid(frame: &SensorFrame, width: usize, height: usize) -> ColorGrid {
    let mut grid = Grid::new(width, height, Vec4::ZERO);
    for i in 0..width * height {
        let c = &frame.color[i * 4..i * 4 + 4];
        grid.data_mut()[i] = Vec4::new(
            c[0] as f32 / 255.0,
            c[1] as f32 / 255.0,
            c[2] as f32 / 255.0,
            1.0,
        );
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SensorStream;
    use crate::sensor::synthetic::SyntheticSensor;
    use std::sync::Arc;
    use std::time::Instant;

    fn flat_frame(width: u32, height: u32, mm: u16) -> SensorFrame {
        let pixels = (width * height) as usize;
        SensorFrame {
            width,
            height,
            depth: vec![mm; pixels].into(),
            color: vec![128u8; pixels * 4].into(),
            intrinsics: CameraIntrinsics::scaled_to(width, height),
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    fn small_settings() -> ReconstructSettings {
        ReconstructSettings {
            blur_kernel_radius: 3,
            blur_sigma: 3.0,
            fill_kernel_radius: 2,
            fill_passes: 3,
            ..ReconstructSettings::default()
        }
    }

    #[test]
    fn test_quiet_frame_reconstructs_fully() {
        let mut sensor = SyntheticSensor::new(48, 36, 1).with_noise(0.0, 0.0);
        let frame = sensor.next_frame().unwrap();
        let mut recon = DepthReconstructor::new(48, 36, small_settings());
        recon.ingest(&frame).unwrap();

        assert!(!recon.is_stale());
        assert!(recon.filtered_depth().data().iter().all(|&d| depth_valid(d)));
        for (_, _, p) in recon.position().pixels() {
            assert!(texel_valid(p));
            assert!(p.z < 0.0);
        }
    }

    #[test]
    fn test_dropout_holes_are_filled() {
        let mut sensor = SyntheticSensor::new(48, 36, 2).with_noise(0.0, 0.3);
        let frame = sensor.next_frame().unwrap();
        let raw_holes = frame.depth.iter().filter(|&&d| d == 0).count();
        assert!(raw_holes > 0);

        let mut recon = DepthReconstructor::new(48, 36, small_settings());
        recon.ingest(&frame).unwrap();
        let remaining = recon
            .filtered_depth()
            .data()
            .iter()
            .filter(|&&d| !depth_valid(d))
            .count();
        assert!(remaining * 10 < raw_holes);
    }

    #[test]
    fn test_planar_normals_face_the_camera() {
        let mut sensor = SyntheticSensor::new(64, 48, 1).with_noise(0.0, 0.0);
        let frame = sensor.next_frame().unwrap();
        let mut recon = DepthReconstructor::new(64, 48, small_settings());
        recon.ingest(&frame).unwrap();

        // Top corner sees the back wall head-on.
        let wall = recon.normal().get(6, 4);
        assert!(texel_valid(wall));
        assert!(wall.truncate().dot(Vec3::Z) > 0.95);

        // Bottom center sees the floor.
        let floor = recon.normal().get(32, 44);
        assert!(texel_valid(floor));
        assert!(floor.truncate().dot(Vec3::Y) > 0.95);
    }

    #[test]
    fn test_temporal_median_rejects_flicker() {
        let mut recon = DepthReconstructor::new(16, 16, small_settings());
        for _ in 0..4 {
            recon.ingest(&flat_frame(16, 16, 2000)).unwrap();
        }
        let mut spike = flat_frame(16, 16, 2000);
        let mut depth = spike.depth.to_vec();
        depth[8 * 16 + 8] = 9000;
        spike.depth = Arc::from(depth);
        recon.ingest(&spike).unwrap();

        let d = recon.filtered_depth().get(8, 8);
        assert!((d - 0.2).abs() < 0.01);
    }

    #[test]
    fn test_staleness_tracks_frame_flow() {
        let mut recon = DepthReconstructor::new(8, 8, small_settings());
        assert!(recon.is_stale());
        recon.ingest(&flat_frame(8, 8, 1500)).unwrap();
        assert!(!recon.is_stale());
        recon.note_missed_frame();
        assert!(recon.is_stale());
    }

    #[test]
    fn test_mismatched_frame_is_rejected() {
        let mut recon = DepthReconstructor::new(8, 8, small_settings());
        assert!(recon.ingest(&flat_frame(16, 16, 1500)).is_err());

        let mut torn = flat_frame(8, 8, 1500);
        torn.depth = vec![1500u16; 63].into();
        assert!(recon.ingest(&torn).is_err());
    }

    #[test]
    fn test_history_is_capped_at_capacity() {
        let mut recon = DepthReconstructor::new(8, 8, small_settings());
        for _ in 0..15 {
            recon.ingest(&flat_frame(8, 8, 1500)).unwrap();
        }
        assert_eq!(recon.history_len(), TMF_MAX_FRAME_LAYERS);
    }

    #[test]
    fn test_anchor_positions_sample_around_center() {
        let mut sensor = SyntheticSensor::new(32, 24, 1).with_noise(0.0, 0.0);
        let frame = sensor.next_frame().unwrap();
        let mut recon = DepthReconstructor::new(32, 24, small_settings());
        recon.ingest(&frame).unwrap();

        let anchors = recon.anchor_positions(2);
        assert!(!anchors.is_empty());
        assert!(anchors.len() <= 25);
        assert!(anchors.iter().all(|p| p.z < 0.0));
    }

    #[test]
    fn test_degraded_settings_still_reconstruct() {
        let mut settings = small_settings();
        settings.tmf_kernel_radius = -1;
        settings.fill_passes = 0;
        settings.blur_kernel_radius = 0;

        let mut recon = DepthReconstructor::new(16, 16, settings);
        recon.ingest(&flat_frame(16, 16, 2000)).unwrap();
        let d = recon.filtered_depth().get(8, 8);
        assert!((d - 0.2).abs() < 1e-4);
    }
}
