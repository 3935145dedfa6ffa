//! ICC profile container
//!
//! Native reading, validation and writing of ICC profiles (ICC.1:2022 and
//! ICC.2 for v5 extensions).
//!
//! # Structure
//!
//! An ICC profile consists of:
//! 1. A 128-byte header
//! 2. A tag table listing all tags
//! 3. Tag data (may be shared between entries)
//!
//! Tags are parsed on demand through a [`TagRegistry`]; types the registry
//! does not know are kept as raw bytes so every profile round-trips.
//!
//! # Example
//!
//! ```ignore
//! use iccmm_core::icc::{IccProfile, TagSignature};
//!
//! let profile = IccProfile::open("display.icc")?;
//! let report = profile.validate();
//! if !report.is_valid() {
//!     eprintln!("{}", report);
//! }
//! ```

pub mod error;
pub mod header;
pub mod profile;
pub mod registry;
pub mod tags;
pub mod types;
pub mod validate;

pub use error::{ParseError, WriteError};
pub use header::{
    ColorSpace, HEADER_SIZE, IccHeader, ProfileClass, ProfileVersion, RenderingIntent,
};
pub use profile::{AttachOptions, IccProfile, ProfileIdPolicy, TAG_ENTRY_SIZE, TagEntry};
pub use registry::{StandardTagFactory, TagFactory, TagRegistry};
pub use tags::{Tag, TagContext};
pub use types::{
    DateTimeNumber, S15Fixed16, SpectralRange, TagSignature, TypeSignature, XyzNumber,
    f16_to_f32, f32_to_f16,
};
pub use validate::{Check, CheckStatus, Severity, ValidationFinding, ValidationReport};
