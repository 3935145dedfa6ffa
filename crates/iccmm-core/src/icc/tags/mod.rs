//! ICC Profile Tag Types
//!
//! Tags contain the actual profile data. Each tag payload has:
//! - A 4-byte type signature identifying the data format
//! - 4 reserved bytes
//! - Type-specific data
//!
//! Every variant implements [`Tag`]: parse from its payload bytes, write
//! them back, describe itself, and report problems during validation.
//! Variants are created by type signature through
//! [`TagRegistry`](crate::icc::TagRegistry).
//!
//! Offsets stored inside a payload are relative to the start of the
//! payload, i.e. the first byte of the type signature.
//!
//! See ICC.1:2022 Section 10.

mod colorant;
mod curves;
mod lut;
mod mpe;
mod numeric;
mod spectral;
mod text;
mod unknown;
mod xyz;

use std::any::Any;
use std::fmt;

pub use colorant::{ColorantEntry, ColorantTableTag};
pub use curves::{Curve, CurveTag, ParametricCurveTag};
pub use lut::{ClutTable, LutAbTag, LutCurve, LutDirection, LutTag, LutPrecision};
pub use mpe::MultiProcessElementTag;
pub use numeric::{Float32ArrayTag, S15Fixed16ArrayTag, SignatureTag};
pub use spectral::{SpectralDataInfoTag, SpectralViewingConditionsTag};
pub use text::{MultiLocalizedUnicodeTag, TextDescriptionTag, TextTag};
pub use unknown::UnknownTag;
pub use xyz::XyzTag;

use super::error::{ParseError, WriteError};
use super::profile::IccProfile;
use super::types::{TagSignature, TypeSignature};
use super::validate::ValidationReport;
use crate::io::{BeWrite, ByteReader};

/// A parsed tag payload
pub trait Tag: fmt::Debug + Send + Sync {
    /// Type signature written at the start of the payload
    fn type_sig(&self) -> TypeSignature;

    /// Parse from the complete payload, starting at the type signature
    fn read(&mut self, data: &[u8]) -> Result<(), ParseError>;

    /// Append the complete payload, starting at the type signature
    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError>;

    /// Human-readable dump. Higher verbosity shows more of the data.
    fn describe(&self, verbosity: u32) -> String;

    /// Report type-specific problems. Never fails.
    fn validate(&self, _ctx: &TagContext<'_>, _report: &mut ValidationReport) {}

    /// Tag holds an array of other tags
    fn is_array_type(&self) -> bool {
        false
    }

    /// False for opaque payloads the engine does not interpret
    fn is_supported(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any;

    fn clone_box(&self) -> Box<dyn Tag>;
}

impl Clone for Box<dyn Tag> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl dyn Tag + '_ {
    /// Downcast to a concrete tag type
    pub fn downcast_ref<T: Tag + 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Serialize into a fresh buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>, WriteError> {
        let mut out = Vec::new();
        self.write(&mut out)?;
        Ok(out)
    }
}

/// What a tag may look at while validating itself
///
/// Holds a non-owning reference back to the containing profile so a tag
/// can check itself against the header and other tags.
#[derive(Clone, Copy)]
pub struct TagContext<'a> {
    pub profile: &'a IccProfile,
    pub signature: TagSignature,
}

impl<'a> TagContext<'a> {
    pub fn new(profile: &'a IccProfile, signature: TagSignature) -> Self {
        Self { profile, signature }
    }

    /// Device/PCS channel counts expected for this tag's position, if the
    /// signature implies a direction
    pub fn expected_channels(&self) -> Option<(usize, usize)> {
        let header = self.profile.header();
        let device = header.color_space.channels();
        let pcs = header.pcs.channels();
        let b = self.signature.0.to_be_bytes();
        match &b[..3] {
            b"A2B" | b"D2B" => Some((device, pcs)),
            b"B2A" | b"B2D" => Some((pcs, device)),
            b"pre" => Some((pcs, pcs)),
            b"gam" => Some((pcs, 1)),
            _ => None,
        }
    }
}

/// Read and check the 8-byte type header
pub(crate) fn read_type_header(
    r: &mut ByteReader<'_>,
    expected: TypeSignature,
) -> Result<(), ParseError> {
    let sig = r.u32()?;
    if sig != expected.0 {
        return Err(ParseError::TypeMismatch {
            expected: expected.0,
            actual: sig,
        });
    }
    r.skip(4)?;
    Ok(())
}

pub(crate) fn write_type_header(out: &mut Vec<u8>, sig: TypeSignature) {
    out.put_u32(sig.0);
    out.put_u32(0);
}

/// Guard against allocation requests larger than the payload could hold
pub(crate) fn check_count(count: usize, elem_size: usize, remaining: usize) -> Result<(), ParseError> {
    let needed = count.checked_mul(elem_size).ok_or_else(|| {
        ParseError::CorruptedData(format!("element count {} overflows", count))
    })?;
    if needed > remaining {
        return Err(ParseError::Truncated {
            wanted: needed,
            available: remaining,
        });
    }
    Ok(())
}

/// Format a list of floats for describe output, truncated at `limit`
pub(crate) fn describe_values(values: &[f32], limit: usize) -> String {
    let mut s: Vec<String> = values.iter().take(limit).map(|v| format!("{:.6}", v)).collect();
    if values.len() > limit {
        s.push(format!("... ({} more)", values.len() - limit));
    }
    s.join(" ")
}
