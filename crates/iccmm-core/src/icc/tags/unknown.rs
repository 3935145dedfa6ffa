//! Opaque tag payloads
//!
//! Anything no factory recognises lands here and is written back
//! byte-for-byte.

use std::any::Any;

use super::{Tag, TagContext};
use crate::icc::error::{ParseError, WriteError};
use crate::icc::types::TypeSignature;
use crate::icc::validate::{Check, Severity, ValidationReport};
use crate::io::{BeWrite, ByteReader};

#[derive(Debug, Clone, PartialEq)]
pub struct UnknownTag {
    type_sig: TypeSignature,
    /// Everything after the type signature, reserved bytes included
    pub data: Vec<u8>,
}

impl UnknownTag {
    pub fn new(type_sig: TypeSignature) -> Self {
        Self {
            type_sig,
            data: Vec::new(),
        }
    }

    pub fn from_payload(payload: &[u8]) -> Self {
        let mut r = ByteReader::new(payload);
        let type_sig = TypeSignature(r.u32().unwrap_or(0));
        Self {
            type_sig,
            data: payload.get(4..).unwrap_or_default().to_vec(),
        }
    }
}

impl Tag for UnknownTag {
    fn type_sig(&self) -> TypeSignature {
        self.type_sig
    }

    fn read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = ByteReader::new(data);
        self.type_sig = TypeSignature(r.u32()?);
        self.data = data[4..].to_vec();
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        out.put_u32(self.type_sig.0);
        out.extend_from_slice(&self.data);
        Ok(())
    }

    fn describe(&self, verbosity: u32) -> String {
        let mut s = format!(
            "Unknown type '{}', {} bytes\n",
            self.type_sig,
            self.data.len() + 4
        );
        if verbosity > 0 {
            let limit = if verbosity > 50 { self.data.len() } else { 64 };
            for chunk in self.data.chunks(16).take(limit.div_ceil(16)) {
                s.push_str(&hex::encode(chunk));
                s.push('\n');
            }
        }
        s
    }

    fn validate(&self, ctx: &TagContext<'_>, report: &mut ValidationReport) {
        report.tag_content(
            Check::TagContents,
            ctx.signature,
            Severity::Warning,
            format!("unrecognised tag type '{}'", self.type_sig),
        );
    }

    fn is_supported(&self) -> bool {
        false
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
    fn test_unknown_roundtrip_verbatim() {
        let payload = b"zzzz\0\0\0\x01\x02\x03\x04\x05";
        let mut tag = UnknownTag::new(TypeSignature(0));
        tag.read(payload).unwrap();
        assert_eq!(tag.type_sig(), TypeSignature::from_bytes(*b"zzzz"));
        let mut out = Vec::new();
        tag.write(&mut out).unwrap();
        assert_eq!(out, payload);
        assert!(!tag.is_supported());
    }

    #[test]
    fn test_unknown_short_payload() {
        let mut tag = UnknownTag::new(TypeSignature(0));
        assert!(tag.read(b"ab").is_err());
        assert_eq!(UnknownTag::from_payload(b"ab").data.len(), 0);
    }
}
