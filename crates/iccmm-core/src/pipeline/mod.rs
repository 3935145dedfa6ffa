//! Color transform pipeline
//!
//! A chain is built from profiles, one [`Xform`] per profile:
//! 1. Input nodes map device values to the PCS (A2B, D2B, matrix/TRC)
//! 2. Output nodes map the PCS to device values (B2A, B2D, inverse matrix/TRC)
//! 3. Device links and abstract profiles map straight through their A2B0
//!
//! Between nodes, `begin` inserts [`PcsLink`]s that convert Lab and XYZ
//! encodings and apply media white scaling for absolute colorimetry.

mod cmm;
mod context;
mod matrix_shaper;
mod pcs;
mod xform;

pub use cmm::{Cmm, ProfileSource, MAX_CHANNELS};
pub use context::{CmmConfig, Direction, XformOptions};
pub use matrix_shaper::MatrixShaper;
pub use pcs::{absolute_scale, lab_to_xyz, xyz_to_lab, PcsEncoding, PcsLink};
pub use xform::Xform;
