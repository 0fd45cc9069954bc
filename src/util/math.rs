//! Math type re-exports and scene-specific math utilities.
//!
//! Re-exports the `glam` double precision types used for transforms and
//! provides [`BBox3d`], the bound type stored at every scene location.

pub use glam::{DMat4, DVec3};

use bytemuck::{Pod, Zeroable};
use std::fmt;

/// Time value (seconds).
pub type Chrono = f64;

/// 3D bounding box with double precision.
#[derive(Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct BBox3d {
    pub min: DVec3,
    pub max: DVec3,
}

impl BBox3d {
    /// Empty bounding box (inverted, will expand on first point).
    pub const EMPTY: Self = Self {
        min: DVec3::splat(f64::INFINITY),
        max: DVec3::splat(f64::NEG_INFINITY),
    };

    /// Create a new bounding box from min and max points.
    #[inline]
    pub const fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Check if this box is empty (has no volume).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand this box to include a point.
    #[inline]
    pub fn expand_by_point(&mut self, p: DVec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Expand this box to include another box.
    #[inline]
    pub fn expand_by_box(&mut self, other: &Self) {
        if !other.is_empty() {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
    }

    /// Get the center of the box.
    #[inline]
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the size (extents) of the box.
    #[inline]
    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    /// Bound of this box after transforming its eight corners by `m`.
    pub fn transformed(&self, m: &DMat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        let mut out = Self::EMPTY;
        for i in 0..8 {
            let corner = DVec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.expand_by_point(m.transform_point3(corner));
        }
        out
    }

    /// Linear interpolation of both corners. Empty operands are not blended.
    pub fn lerp(&self, other: &Self, alpha: f64) -> Self {
        if self.is_empty() || other.is_empty() {
            return if alpha < 0.5 { *self } else { *other };
        }
        Self {
            min: self.min.lerp(other.min, alpha),
            max: self.max.lerp(other.max, alpha),
        }
    }

    /// Raw bytes, for hashing.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl Default for BBox3d {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for BBox3d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BBox3d({:?} - {:?})", self.min, self.max)
    }
}

/// Element-wise linear interpolation of two matrices.
pub fn lerp_matrix(a: &DMat4, b: &DMat4, alpha: f64) -> DMat4 {
    let a = a.to_cols_array();
    let b = b.to_cols_array();
    let mut out = [0.0; 16];
    for i in 0..16 {
        out[i] = a[i] + (b[i] - a[i]) * alpha;
    }
    DMat4::from_cols_array(&out)
}
