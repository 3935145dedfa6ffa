//! Numeric array and signature tag types
//!
//! sf32 (chromatic adaptation and other matrices), fl32 (spectral white
//! point and float arrays) and sig.

use std::any::Any;

use super::{Tag, TagContext, describe_values, read_type_header, write_type_header};
use crate::icc::error::{ParseError, WriteError, sig_str};
use crate::icc::types::{TagSignature, TypeSignature};
use crate::icc::validate::{Check, Severity, ValidationReport};
use crate::io::{BeWrite, ByteReader};

/// 'sf32' - array of s15Fixed16Number
#[derive(Debug, Clone, Default, PartialEq)]
pub struct S15Fixed16ArrayTag {
    pub values: Vec<f32>,
}

impl S15Fixed16ArrayTag {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Interpret as a row-major 3x3 matrix (chad)
    pub fn matrix3x3(&self) -> Option<[[f32; 3]; 3]> {
        if self.values.len() < 9 {
            return None;
        }
        let v = &self.values;
        Some([[v[0], v[1], v[2]], [v[3], v[4], v[5]], [v[6], v[7], v[8]]])
    }
}

impl Tag for S15Fixed16ArrayTag {
    fn type_sig(&self) -> TypeSignature {
        TypeSignature::SF32
    }

    fn read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = ByteReader::new(data);
        read_type_header(&mut r, TypeSignature::SF32)?;
        let count = r.remaining() / 4;
        self.values = r.array_of(count, 4, |r| r.s15f16())?;
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        write_type_header(out, TypeSignature::SF32);
        for &v in &self.values {
            out.put_s15f16(v);
        }
        Ok(())
    }

    fn describe(&self, verbosity: u32) -> String {
        let limit = if verbosity > 50 { usize::MAX } else { 16 };
        format!("{}\n", describe_values(&self.values, limit))
    }

    fn validate(&self, ctx: &TagContext<'_>, report: &mut ValidationReport) {
        if ctx.signature == TagSignature::CHAD && self.values.len() != 9 {
            report.tag_content(
                Check::TagContents,
                ctx.signature,
                Severity::NonCompliant,
                format!("chad needs 9 values, found {}", self.values.len()),
            );
        }
    }

    fn is_array_type(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn Tag> {
        Box::new(self.clone())
    }
}

/// 'fl32' - array of IEEE float32
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Float32ArrayTag {
    pub values: Vec<f32>,
}

impl Float32ArrayTag {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }
}

impl Tag for Float32ArrayTag {
    fn type_sig(&self) -> TypeSignature {
        TypeSignature::FL32
    }

    fn read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = ByteReader::new(data);
        read_type_header(&mut r, TypeSignature::FL32)?;
        let count = r.remaining() / 4;
        self.values = r.array_of(count, 4, |r| r.f32())?;
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        write_type_header(out, TypeSignature::FL32);
        for &v in &self.values {
            out.put_f32(v);
        }
        Ok(())
    }

    fn describe(&self, verbosity: u32) -> String {
        let limit = if verbosity > 50 { usize::MAX } else { 16 };
        format!("{}\n", describe_values(&self.values, limit))
    }

    fn validate(&self, ctx: &TagContext<'_>, report: &mut ValidationReport) {
        if ctx.signature == TagSignature::SPECTRAL_WHITE_POINT {
            let expected = ctx.profile.header().spectral_range.steps as usize;
            if expected != 0 && self.values.len() != expected {
                report.tag_content(
                    Check::TagContents,
                    ctx.signature,
                    Severity::NonCompliant,
                    format!(
                        "spectral white point has {} samples, header range has {}",
                        self.values.len(),
                        expected
                    ),
                );
            }
        }
    }

    fn is_array_type(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn Tag> {
        Box::new(self.clone())
    }
}

/// 'sig ' - a single signature
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignatureTag {
    pub signature: u32,
}

impl SignatureTag {
    pub fn new(signature: u32) -> Self {
        Self { signature }
    }
}

impl Tag for SignatureTag {
    fn type_sig(&self) -> TypeSignature {
        TypeSignature::SIG
    }

    fn read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = ByteReader::new(data);
        read_type_header(&mut r, TypeSignature::SIG)?;
        self.signature = r.u32()?;
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        write_type_header(out, TypeSignature::SIG);
        out.put_u32(self.signature);
        Ok(())
    }

    fn describe(&self, _verbosity: u32) -> String {
        format!("'{}'\n", sig_str(self.signature))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn Tag> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sf32_matrix() {
        let tag = S15Fixed16ArrayTag::new(vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        let mut out = Vec::new();
        tag.write(&mut out).unwrap();
        assert_eq!(out.len(), 8 + 36);

        let mut back = S15Fixed16ArrayTag::default();
        back.read(&out).unwrap();
        assert_eq!(back.matrix3x3().unwrap()[1][1], 1.0);
    }

    #[test]
    fn test_fl32_keeps_non_finite() {
        let tag = Float32ArrayTag::new(vec![f32::NAN, f32::INFINITY, -0.0]);
        let mut out = Vec::new();
        tag.write(&mut out).unwrap();
        let mut back = Float32ArrayTag::default();
        back.read(&out).unwrap();
        assert!(back.values[0].is_nan());
        assert_eq!(back.values[1], f32::INFINITY);
        assert!(back.values[2].is_sign_negative());
    }

    #[test]
    fn test_signature_tag() {
        let mut tag = SignatureTag::default();
        tag.read(b"sig \0\0\0\0CRT ").unwrap();
        assert_eq!(tag.describe(0), "'CRT '\n");
        assert!(tag.read(b"sig \0\0\0\0CR").is_err());
    }
}
