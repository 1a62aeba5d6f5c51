// SPDX-License-Identifier: GPL-3.0-only

//! Geometry buffers and virtual-object composition
//!
//! A [`GBuffer`] holds view-space position, normal and albedo per pixel,
//! either copied from the reconstructed sensor buffers or composed with
//! analytic virtual geometry under a per-pixel depth test. Composition
//! also yields a coverage mask marking pixels where virtual geometry is
//! the front surface; the differential combine shows those pixels from
//! the full scene directly.

use glam::Vec3;

use crate::buffers::{
    ColorGrid, DepthGrid, Grid, VecGrid, invalid_texel, texel_valid, valid_texel,
};
use crate::constants::DEPTH_INVALID;
use crate::sensor::CameraIntrinsics;

/// Per-pixel geometry: view-space position, unit normal, albedo.
#[derive(Debug, Clone)]
pub struct GBuffer {
    pub position: VecGrid,
    pub normal: VecGrid,
    pub albedo: ColorGrid,
}

impl GBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            position: Grid::new(width, height, invalid_texel()),
            normal: Grid::new(width, height, invalid_texel()),
            albedo: Grid::new(width, height, invalid_texel()),
        }
    }

    /// Copy the reconstructed sensor buffers into a standalone G-buffer.
    pub fn from_sensor(position: &VecGrid, normal: &VecGrid, albedo: &ColorGrid) -> Self {
        Self {
            position: position.clone(),
            normal: normal.clone(),
            albedo: albedo.clone(),
        }
    }

    pub fn width(&self) -> usize {
        self.position.width()
    }

    pub fn height(&self) -> usize {
        self.position.height()
    }

    /// Normalized depth derived from the position buffer, used as a blur
    /// and upsample guide. Invalid texels map to the invalid depth marker.
    pub fn derived_depth(&self) -> DepthGrid {
        let mut depth = Grid::new(self.width(), self.height(), DEPTH_INVALID);
        for (x, y, p) in self.position.pixels() {
            if texel_valid(p) {
                depth.set(x, y, -p.z);
            }
        }
        depth
    }
}

/// Analytic virtual geometry rasterized into the G-buffer.
#[derive(Debug, Clone, Copy)]
pub enum VirtualObject {
    Sphere {
        center: Vec3,
        radius: f32,
        albedo: Vec3,
    },
}

impl VirtualObject {
    /// Nearest hit along the pixel ray `d` (parameterized with `z == -1`).
    /// Returns the ray parameter, surface normal and albedo.
    fn hit(&self, d: Vec3) -> Option<(f32, Vec3, Vec3)> {
        match *self {
            VirtualObject::Sphere {
                center,
                radius,
                albedo,
            } => {
                let a = d.dot(d);
                let b = -2.0 * d.dot(center);
                let c = center.dot(center) - radius * radius;
                let disc = b * b - 4.0 * a * c;
                if disc <= 0.0 {
                    return None;
                }
                let t = (-b - disc.sqrt()) / (2.0 * a);
                if t <= 0.0 {
                    return None;
                }
                let p = d * t;
                Some((t, (p - center) / radius, albedo))
            }
        }
    }
}

/// Compose virtual objects over sensor geometry with a per-pixel depth
/// test. Returns the composed G-buffer and the virtual-front mask.
pub fn compose_scene(
    sensor: &GBuffer,
    objects: &[VirtualObject],
    intrinsics: CameraIntrinsics,
) -> (GBuffer, Grid<bool>) {
    let (w, h) = (sensor.width(), sensor.height());
    let mut composed = sensor.clone();
    let mut virtual_front = Grid::new(w, h, false);

    if objects.is_empty() {
        return (composed, virtual_front);
    }

    for y in 0..h {
        for x in 0..w {
            let d = intrinsics.pixel_ray(x as f32, y as f32);
            let mut nearest: Option<(f32, Vec3, Vec3)> = None;
            for object in objects {
                if let Some(hit) = object.hit(d) {
                    if nearest.map_or(true, |(t, _, _)| hit.0 < t) {
                        nearest = Some(hit);
                    }
                }
            }
            let Some((t, normal, albedo)) = nearest else {
                continue;
            };

            let existing = composed.position.get(x, y);
            // Virtual wins where the sensor saw nothing or saw farther.
            let front = !texel_valid(existing) || -existing.z > t;
            if !front {
                continue;
            }
            composed.position.set(x, y, valid_texel(d * t));
            composed.normal.set(x, y, valid_texel(normal));
            composed.albedo.set(x, y, albedo.extend(1.0));
            virtual_front.set(x, y, true);
        }
    }

    (composed, virtual_front)
}
