//! Mathematical operations for color management
//!
//! - Colorant matrices and their inverses
//! - Parametric curve evaluation
//! - Interpolation for LUT and CLUT evaluation

pub mod gamma;
pub mod interpolation;
pub mod matrix;

pub use gamma::{ParametricCurve, ParametricCurveType};
pub use interpolation::Interpolation;
pub use matrix::Matrix3x3;
