//! Colorant matrices
//!
//! Matrix/TRC profiles map linear device values to XYZ through a matrix
//! whose columns are the red, green and blue colorant tags. The output
//! direction needs its inverse. Arithmetic is f64; the apply path takes an
//! f32 copy.

use std::ops::Mul;

/// A 3x3 matrix, row-major: m[row][col]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix3x3 {
    pub m: [[f64; 3]; 3],
}

fn cross(u: [f64; 3], v: [f64; 3]) -> [f64; 3] {
    [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ]
}

fn dot(u: [f64; 3], v: [f64; 3]) -> f64 {
    u[0] * v[0] + u[1] * v[1] + u[2] * v[2]
}

impl Matrix3x3 {
    pub const IDENTITY: Self = Self {
        m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    /// Matrix whose columns are the three colorants
    pub fn from_columns(red: [f32; 3], green: [f32; 3], blue: [f32; 3]) -> Self {
        let widen = |v: [f32; 3]| v.map(f64::from);
        Self::from_f64_columns([widen(red), widen(green), widen(blue)])
    }

    fn from_f64_columns(cols: [[f64; 3]; 3]) -> Self {
        Self {
            m: std::array::from_fn(|row| std::array::from_fn(|col| cols[col][row])),
        }
    }

    fn column(&self, col: usize) -> [f64; 3] {
        [self.m[0][col], self.m[1][col], self.m[2][col]]
    }

    /// Inverse, or `None` when the colorants are linearly dependent or not
    /// finite
    ///
    /// The rows of the inverse are the pairwise cross products of the
    /// columns, divided by their triple product.
    pub fn inverse(&self) -> Option<Self> {
        let [c0, c1, c2] = [self.column(0), self.column(1), self.column(2)];
        let rows = [cross(c1, c2), cross(c2, c0), cross(c0, c1)];
        let det = dot(c0, rows[0]);
        if !det.is_finite() || det.abs() < 1e-14 {
            return None;
        }
        Some(Self {
            m: rows.map(|row| row.map(|v| v / det)),
        })
    }

    /// Single-precision copy for the apply path
    pub fn to_f32(&self) -> [[f32; 3]; 3] {
        self.m.map(|row| row.map(|v| v as f32))
    }
}

impl Mul<[f64; 3]> for Matrix3x3 {
    type Output = [f64; 3];

    fn mul(self, v: [f64; 3]) -> [f64; 3] {
        self.m.map(|row| dot(row, v))
    }
}

impl Mul for Matrix3x3 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::from_f64_columns([0, 1, 2].map(|col| self * rhs.column(col)))
    }
}
