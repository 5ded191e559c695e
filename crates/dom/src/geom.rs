//! Geometry primitives: vectors, affine transforms, bounding boxes.
//!
//! Only the subset the DOM actually needs. No linear-algebra crate.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

/// Tolerance used by the colocation and colinearity checks.
pub const EPSILON: f64 = 1e-6;

/// A point or direction in LDraw units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3d {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Component-wise comparison within [`EPSILON`].
    pub fn approx_eq(self, other: Self) -> bool {
        (self.x - other.x).abs() <= EPSILON
            && (self.y - other.y).abs() <= EPSILON
            && (self.z - other.z).abs() <= EPSILON
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }
}

impl Add for Vector3d {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3d {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vector3d {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vector3d {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// A column-major 4×4 affine transform.
///
/// Each inner array is one column. An LDraw type-1 line
/// `x y z a b c d e f g h i` maps to the rows `[a b c x]`, `[d e f y]`,
/// `[g h i z]`, `[0 0 0 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matrix4d {
    pub cols: [[f64; 4]; 4],
}

impl Matrix4d {
    pub const IDENTITY: Self = Self {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub fn translation(offset: Vector3d) -> Self {
        let mut m = Self::IDENTITY;
        m.cols[3] = [offset.x, offset.y, offset.z, 1.0];
        m
    }

    pub fn scale(factor: f64) -> Self {
        let mut m = Self::IDENTITY;
        m.cols[0][0] = factor;
        m.cols[1][1] = factor;
        m.cols[2][2] = factor;
        m
    }

    /// Build from the twelve numbers of a type-1 line, in file order.
    pub fn from_ldraw(v: [f64; 12]) -> Self {
        let [x, y, z, a, b, c, d, e, f, g, h, i] = v;
        Self {
            cols: [
                [a, d, g, 0.0],
                [b, e, h, 0.0],
                [c, f, i, 0.0],
                [x, y, z, 1.0],
            ],
        }
    }

    /// The twelve numbers of a type-1 line, in file order.
    pub fn to_ldraw(&self) -> [f64; 12] {
        let c = &self.cols;
        [
            c[3][0], c[3][1], c[3][2], c[0][0], c[1][0], c[2][0], c[0][1], c[1][1], c[2][1],
            c[0][2], c[1][2], c[2][2],
        ]
    }

    pub fn position(&self) -> Vector3d {
        Vector3d::new(self.cols[3][0], self.cols[3][1], self.cols[3][2])
    }

    pub fn transform_point(&self, p: Vector3d) -> Vector3d {
        let c = &self.cols;
        Vector3d::new(
            c[0][0] * p.x + c[1][0] * p.y + c[2][0] * p.z + c[3][0],
            c[0][1] * p.x + c[1][1] * p.y + c[2][1] * p.z + c[3][1],
            c[0][2] * p.x + c[1][2] * p.y + c[2][2] * p.z + c[3][2],
        )
    }

    /// Determinant of the upper-left 3×3 block. Negative means the
    /// transform mirrors, which flips winding.
    pub fn determinant3(&self) -> f64 {
        let c = &self.cols;
        c[0][0] * (c[1][1] * c[2][2] - c[2][1] * c[1][2])
            - c[1][0] * (c[0][1] * c[2][2] - c[2][1] * c[0][2])
            + c[2][0] * (c[0][1] * c[1][2] - c[1][1] * c[0][2])
    }

    pub fn is_finite(&self) -> bool {
        self.cols.iter().flatten().all(|v| v.is_finite())
    }
}

impl Default for Matrix4d {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Matrix4d {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let mut out = [[0.0; 4]; 4];
        for (c, col) in out.iter_mut().enumerate() {
            for (r, cell) in col.iter_mut().enumerate() {
                *cell = (0..4).map(|k| self.cols[k][r] * rhs.cols[c][k]).sum();
            }
        }
        Self { cols: out }
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vector3d,
    pub max: Vector3d,
}

impl BoundingBox {
    pub fn from_points(points: &[Vector3d]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bounds = Self {
            min: *first,
            max: *first,
        };
        for p in rest {
            bounds.include(*p);
        }
        Some(bounds)
    }

    pub fn include(&mut self, p: Vector3d) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn size(&self) -> Vector3d {
        self.max - self.min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ldraw_matrix_roundtrip() {
        let values = [1.0, 2.0, 3.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let m = Matrix4d::from_ldraw(values);
        assert_eq!(m, Matrix4d::translation(Vector3d::new(1.0, 2.0, 3.0)));
        assert_eq!(m.to_ldraw(), values);
    }

    #[test]
    fn test_transform_compose() {
        let t = Matrix4d::translation(Vector3d::new(10.0, 0.0, 0.0));
        let s = Matrix4d::scale(2.0);
        let p = Vector3d::new(1.0, 1.0, 1.0);

        // scale first, then translate
        assert_eq!((t * s).transform_point(p), Vector3d::new(12.0, 2.0, 2.0));
        assert_eq!((s * t).transform_point(p), Vector3d::new(22.0, 2.0, 2.0));
    }

    #[test]
    fn test_mirror_determinant() {
        let mut m = Matrix4d::IDENTITY;
        m.cols[0][0] = -1.0;
        assert!(m.determinant3() < 0.0);
        assert_eq!(Matrix4d::IDENTITY.determinant3(), 1.0);
    }

    #[test]
    fn test_bounding_box() {
        let points = [
            Vector3d::new(1.0, -2.0, 0.0),
            Vector3d::new(-1.0, 4.0, 3.0),
        ];
        let bounds = BoundingBox::from_points(&points).unwrap();
        assert_eq!(bounds.min, Vector3d::new(-1.0, -2.0, 0.0));
        assert_eq!(bounds.max, Vector3d::new(1.0, 4.0, 3.0));
        assert!(BoundingBox::from_points(&[]).is_none());
    }
}
