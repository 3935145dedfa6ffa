//! # iccmm - ICC profile engine
//!
//! Parses, validates and writes ICC profiles (v2, v4 and v5/iccMAX), and
//! chains them into color transforms.
//!
//! ## Layers
//!
//! - [`io`]: byte sources and sinks with big-endian helpers
//! - [`icc`]: header, tag directory, tag types and the validator
//! - [`mpe`]: multi-process elements and the calculator language
//! - [`pipeline`]: the transform chain ([`Cmm`])
//! - [`textual`]: JSON form of a profile
//!
//! Attaching a profile reads only the header and the tag directory. Tags
//! are parsed on first lookup and cached.
//!
//! ## Quick Start
//!
//! ```no_run
//! use iccmm_core::{Cmm, CmmConfig, IccProfile, XformOptions};
//!
//! let camera = IccProfile::open("camera.icc")?;
//! let report = camera.validate();
//! println!("{}", report);
//!
//! let mut cmm = Cmm::new(CmmConfig::default());
//! cmm.add_transform(camera, &XformOptions::default())?;
//! cmm.add_transform(std::path::PathBuf::from("printer.icc"), &XformOptions::default())?;
//! cmm.begin()?;
//!
//! let mut cmyk = [0.0f32; 4];
//! cmm.apply(&mut cmyk, &[0.2, 0.4, 0.6])?;
//! # Ok::<(), iccmm_core::Error>(())
//! ```

pub mod error;
pub mod icc;
pub mod io;
pub mod math;
pub mod mpe;
pub mod pipeline;
pub mod simd;
pub mod textual;

pub use error::{Error, EvaluationFault, Result, TransformError};
pub use icc::{
    AttachOptions, Check, ColorSpace, IccHeader, IccProfile, ParseError, ProfileClass, ProfileIdPolicy,
    RenderingIntent, Severity, TagRegistry, TagSignature, TypeSignature, ValidationReport, WriteError,
};
pub use io::{FileIo, IccIo, MemIo};
pub use math::Interpolation;
pub use pipeline::{Cmm, CmmConfig, ProfileSource, XformOptions};

/// Version of iccmm
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
