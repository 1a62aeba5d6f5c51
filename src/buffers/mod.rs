// SPDX-License-Identifier: GPL-3.0-only

//! Typed pixel grids shared by every pass
//!
//! All render targets in the pipeline are [`Grid`]s: a flat, row-major
//! `Vec<T>` with explicit dimensions. Position and normal buffers use
//! [`glam::Vec4`] texels where `xyz` is the view-space vector and `w` is a
//! 0/1 validity flag, mirroring the invalid-propagation rule: a sentinel
//! input never turns into fabricated geometry.

use glam::{Vec3, Vec4};

/// Row-major pixel container with copy-on-read access helpers.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Copy> Grid<T> {
    /// Allocate a grid filled with `fill`.
    pub fn new(width: usize, height: usize, fill: T) -> Self {
        Self {
            width,
            height,
            data: vec![fill; width * height],
        }
    }

    /// Wrap an existing row-major vector; `data.len()` must be
    /// `width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(data.len(), width * height, "grid payload size mismatch");
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Total number of pixels.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn idx(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[y * self.width + x]
    }

    /// Read with coordinates clamped to the grid edge; filter kernels use
    /// this for border pixels.
    #[inline]
    pub fn get_clamped(&self, x: i64, y: i64) -> T {
        let cx = x.clamp(0, self.width as i64 - 1) as usize;
        let cy = y.clamp(0, self.height as i64 - 1) as usize;
        self.data[cy * self.width + cx]
    }

    /// True when signed coordinates land inside the grid.
    #[inline]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let idx = y * self.width + x;
        self.data[idx] = value;
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// True when `other` has identical dimensions.
    pub fn same_size<U>(&self, other: &Grid<U>) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Iterate `(x, y, value)` in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let width = self.width;
        self.data
            .iter()
            .enumerate()
            .map(move |(i, &v)| (i % width, i / width, v))
    }
}

/// Normalized filtered depth; `0.0` is the invalid sentinel.
pub type DepthGrid = Grid<f32>;

/// View-space vectors with validity in `w`.
pub type VecGrid = Grid<Vec4>;

/// Linear RGBA color in `[0, 1]`.
pub type ColorGrid = Grid<Vec4>;

/// Valid normalized depth lies in `(0, 1]`.
#[inline]
pub fn depth_valid(depth: f32) -> bool {
    depth > 0.0 && depth <= 1.0
}

/// Wrap a view-space vector as a valid texel.
#[inline]
pub fn valid_texel(v: Vec3) -> Vec4 {
    v.extend(1.0)
}

/// The all-zero invalid texel.
#[inline]
pub fn invalid_texel() -> Vec4 {
    Vec4::ZERO
}

/// Validity test for position/normal texels.
#[inline]
pub fn texel_valid(t: Vec4) -> bool {
    t.w != 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped_reads_stay_on_the_edge() {
        let mut grid = Grid::new(3, 2, 0u16);
        grid.set(0, 0, 7);
        grid.set(2, 1, 9);
        assert_eq!(grid.get_clamped(-5, -5), 7);
        assert_eq!(grid.get_clamped(10, 10), 9);
    }

    #[test]
    fn test_pixels_iterates_row_major() {
        let grid = Grid::from_vec(2, 2, vec![1, 2, 3, 4]);
        let collected: Vec<_> = grid.pixels().collect();
        assert_eq!(
            collected,
            vec![(0, 0, 1), (1, 0, 2), (0, 1, 3), (1, 1, 4)]
        );
    }

    #[test]
    fn test_texel_validity_round_trip() {
        let t = valid_texel(Vec3::new(1.0, 2.0, -3.0));
        assert!(texel_valid(t));
        assert!(!texel_valid(invalid_texel()));
        assert_eq!(t.truncate(), Vec3::new(1.0, 2.0, -3.0));
    }

    #[test]
    fn test_depth_validity_bounds() {
        assert!(!depth_valid(0.0));
        assert!(depth_valid(0.5));
        assert!(depth_valid(1.0));
        assert!(!depth_valid(1.2));
        assert!(!depth_valid(-0.1));
    }
}
