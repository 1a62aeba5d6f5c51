// SPDX-License-Identifier: GPL-3.0-only

//! Sensor frames, camera intrinsics and the stream abstraction
//!
//! A [`SensorFrame`] carries one raw depth/color pair plus the intrinsics it
//! was captured with. [`SensorStream`] is the only contract the pipeline has
//! with hardware; the [`synthetic`] implementation stands in for a real
//! depth camera in tests and the demo binary.
//!
//! View space follows the GL convention (camera at the origin looking down
//! -Z, +Y up) and is measured in normalized depth units: `1.0` equals the
//! full sensor range of [`DEPTH_MAX_MM`](crate::constants::DEPTH_MAX_MM)
//! millimeters. All pass tunables (radii, thicknesses, trace distances) are
//! expressed in these units.

pub mod acquire;
pub mod synthetic;

pub use acquire::{AcquisitionLoop, FrameCell};
pub use synthetic::SyntheticSensor;

use std::sync::Arc;
use std::time::Instant;

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::constants::{
    BASE_CX, BASE_CY, BASE_FX, BASE_FY, BASE_HEIGHT, BASE_WIDTH, PROJ_FAR, PROJ_NEAR,
};
use crate::errors::SensorError;

/// Pinhole camera intrinsics in pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length X in pixels
    pub fx: f32,
    /// Focal length Y in pixels
    pub fy: f32,
    /// Principal point X in pixels
    pub cx: f32,
    /// Principal point Y in pixels
    pub cy: f32,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl CameraIntrinsics {
    /// Base sensor intrinsics scaled to an arbitrary resolution.
    pub fn scaled_to(width: u32, height: u32) -> Self {
        let sx = width as f32 / BASE_WIDTH;
        let sy = height as f32 / BASE_HEIGHT;
        Self {
            fx: BASE_FX * sx,
            fy: BASE_FY * sy,
            cx: BASE_CX * sx,
            cy: BASE_CY * sy,
            width,
            height,
        }
    }

    /// These intrinsics rescaled to another resolution.
    pub fn rescaled(&self, width: u32, height: u32) -> Self {
        let sx = width as f32 / self.width as f32;
        let sy = height as f32 / self.height as f32;
        Self {
            fx: self.fx * sx,
            fy: self.fy * sy,
            cx: self.cx * sx,
            cy: self.cy * sy,
            width,
            height,
        }
    }

    /// View-space direction through the center of pixel `(px, py)`,
    /// parameterized so that `z == -1`. Multiplying by a normalized depth
    /// yields the view-space position at that depth.
    #[inline]
    pub fn pixel_ray(&self, px: f32, py: f32) -> Vec3 {
        Vec3::new(
            (px + 0.5 - self.cx) / self.fx,
            (self.cy - (py + 0.5)) / self.fy,
            -1.0,
        )
    }

    /// Unproject a pixel at a normalized depth into view space.
    #[inline]
    pub fn unproject(&self, px: f32, py: f32, depth: f32) -> Vec3 {
        self.pixel_ray(px, py) * depth
    }

    /// Project a view-space point to floating pixel coordinates.
    ///
    /// Returns `None` for points at or behind the camera plane.
    #[inline]
    pub fn project(&self, p: Vec3) -> Option<(f32, f32)> {
        if p.z >= 0.0 {
            return None;
        }
        let z = -p.z;
        Some((p.x * self.fx / z + self.cx, self.cy - p.y * self.fy / z))
    }

    /// GL-style projection matrix built from the intrinsics, clipping at
    /// [`PROJ_NEAR`] and [`PROJ_FAR`] normalized depth.
    pub fn projection_matrix(&self) -> Mat4 {
        let w = self.width as f32;
        let h = self.height as f32;
        let (n, f) = (PROJ_NEAR, PROJ_FAR);
        Mat4::from_cols(
            glam::Vec4::new(2.0 * self.fx / w, 0.0, 0.0, 0.0),
            glam::Vec4::new(0.0, 2.0 * self.fy / h, 0.0, 0.0),
            glam::Vec4::new(
                1.0 - 2.0 * self.cx / w,
                2.0 * self.cy / h - 1.0,
                -(f + n) / (f - n),
                -1.0,
            ),
            glam::Vec4::new(0.0, 0.0, -2.0 * f * n / (f - n), 0.0),
        )
    }

    pub fn inverse_projection_matrix(&self) -> Mat4 {
        self.projection_matrix().inverse()
    }
}

/// One raw frame from a depth sensor.
///
/// Payloads are shared slices so a frame can be cloned cheaply between the
/// acquisition thread and the render loop.
#[derive(Debug, Clone)]
pub struct SensorFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Raw depth in millimeters, row-major; `0` means no return
    pub depth: Arc<[u16]>,
    /// RGBA8 color aligned to the depth image
    pub color: Arc<[u8]>,
    /// Intrinsics the frame was captured with
    pub intrinsics: CameraIntrinsics,
    /// Monotonic frame sequence number
    pub sequence: u64,
    /// Timestamp when the frame was captured
    pub captured_at: Instant,
}

impl SensorFrame {
    /// Check payload sizes against the declared dimensions.
    pub fn validate(&self) -> Result<(), SensorError> {
        let pixels = self.width as usize * self.height as usize;
        if self.depth.len() != pixels {
            return Err(SensorError::BadFrame(format!(
                "depth payload {} for {}x{}",
                self.depth.len(),
                self.width,
                self.height
            )));
        }
        if self.color.len() != pixels * 4 {
            return Err(SensorError::BadFrame(format!(
                "color payload {} for {}x{}",
                self.color.len(),
                self.width,
                self.height
            )));
        }
        Ok(())
    }
}

/// Source of sensor frames.
///
/// `next_frame` may report [`SensorError::NoFrameAvailable`], which is
/// non-fatal: the caller keeps the previous frame and flags it stale.
pub trait SensorStream {
    fn next_frame(&mut self) -> Result<SensorFrame, SensorError>;
}
