//! Colorant table tag ('clrt')
//!
//! Each entry is a 32-byte name followed by the colorant's PCS value as
//! three u16. Names fill all 32 bytes when they have no NUL; decoding
//! never looks past the field.

use std::any::Any;

use super::{Tag, TagContext, check_count, read_type_header, write_type_header};
use crate::icc::error::{ParseError, WriteError};
use crate::icc::types::TypeSignature;
use crate::icc::validate::{Check, Severity, ValidationReport};
use crate::io::{BeWrite, ByteReader};

const NAME_LEN: usize = 32;
const ENTRY_LEN: usize = NAME_LEN + 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorantEntry {
    /// Raw name field, exactly as stored
    pub name: [u8; NAME_LEN],
    pub pcs: [u16; 3],
}

impl ColorantEntry {
    /// Build an entry; names longer than 31 bytes are cut to keep a NUL
    pub fn new(name: &str, pcs: [u16; 3]) -> Self {
        let mut raw = [0u8; NAME_LEN];
        let bytes = name.as_bytes();
        let n = bytes.len().min(NAME_LEN - 1);
        raw[..n].copy_from_slice(&bytes[..n]);
        Self { name: raw, pcs }
    }

    /// Name up to the first NUL or the end of the field
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    pub fn is_terminated(&self) -> bool {
        self.name.contains(&0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorantTableTag {
    pub entries: Vec<ColorantEntry>,
}

impl ColorantTableTag {
    pub fn new(entries: Vec<ColorantEntry>) -> Self {
        Self { entries }
    }
}

impl Tag for ColorantTableTag {
    fn type_sig(&self) -> TypeSignature {
        TypeSignature::CLRT
    }

    fn read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = ByteReader::new(data);
        read_type_header(&mut r, TypeSignature::CLRT)?;
        let count = r.u32()? as usize;
        check_count(count, ENTRY_LEN, r.remaining())?;
        self.entries = r.array_of(count, ENTRY_LEN, |r| {
            let mut name = [0u8; NAME_LEN];
            name.copy_from_slice(r.bytes(NAME_LEN)?);
            Ok(ColorantEntry {
                name,
                pcs: [r.u16()?, r.u16()?, r.u16()?],
            })
        })?;
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        let count = u32::try_from(self.entries.len())
            .map_err(|_| WriteError::TooLarge(self.entries.len()))?;
        write_type_header(out, TypeSignature::CLRT);
        out.put_u32(count);
        for e in &self.entries {
            out.extend_from_slice(&e.name);
            for &v in &e.pcs {
                out.put_u16(v);
            }
        }
        Ok(())
    }

    fn describe(&self, verbosity: u32) -> String {
        let mut s = format!("Colorant count: {}\n", self.entries.len());
        let limit = if verbosity > 50 { usize::MAX } else { 16 };
        for e in self.entries.iter().take(limit) {
            s.push_str(&format!(
                "  {:<32} {:5} {:5} {:5}\n",
                e.name(),
                e.pcs[0],
                e.pcs[1],
                e.pcs[2]
            ));
        }
        s
    }

    fn validate(&self, ctx: &TagContext<'_>, report: &mut ValidationReport) {
        let unterminated = self.entries.iter().filter(|e| !e.is_terminated()).count();
        if unterminated > 0 {
            report.tag_content(
                Check::TagContents,
                ctx.signature,
                Severity::NonCompliant,
                format!("{} colorant names are not NUL-terminated", unterminated),
            );
        }
        let channels = ctx.profile.header().color_space.channels();
        if channels > 0 && !self.entries.is_empty() && self.entries.len() != channels {
            report.tag_content(
                Check::TagContents,
                ctx.signature,
                Severity::Warning,
                format!(
                    "{} colorants for a {}-channel color space",
                    self.entries.len(),
                    channels
                ),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_width_name() {
        let mut data = b"clrt\0\0\0\0".to_vec();
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&[b'A'; 32]);
        data.extend_from_slice(&[0x64, 0x00, 0x80, 0x00, 0x80, 0x00]);

        let mut tag = ColorantTableTag::default();
        tag.read(&data).unwrap();
        assert_eq!(tag.entries.len(), 1);
        assert_eq!(tag.entries[0].name(), "A".repeat(32));
        assert!(!tag.entries[0].is_terminated());
        assert!(tag.describe(100).contains(&"A".repeat(32)));

        let mut out = Vec::new();
        tag.write(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_count_exceeds_payload() {
        let mut data = b"clrt\0\0\0\0".to_vec();
        data.extend_from_slice(&u32::MAX.to_be_bytes());
        data.extend_from_slice(&[0; 38]);
        let mut tag = ColorantTableTag::default();
        assert!(tag.read(&data).is_err());
    }

    #[test]
    fn test_new_truncates_name() {
        let e = ColorantEntry::new(&"x".repeat(40), [1, 2, 3]);
        assert_eq!(e.name().len(), 31);
        assert!(e.is_terminated());
    }
}
