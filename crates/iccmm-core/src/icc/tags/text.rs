//! Text Tag Types
//!
//! ICC profiles can contain text in several formats:
//! - text: Simple ASCII text
//! - desc: Profile description (v2 format)
//! - mluc: Multi-localized Unicode (v4 format)
//!
//! See ICC.1:2022 Sections 10.24 (text), 10.14 (desc), 10.15 (mluc)

use std::any::Any;

use super::{Tag, TagContext, check_count, read_type_header, write_type_header};
use crate::icc::error::{ParseError, WriteError};
use crate::icc::types::TypeSignature;
use crate::icc::validate::{Check, Severity, ValidationReport};
use crate::io::{BeWrite, ByteReader};

/// 'text' - NUL-terminated ASCII
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextTag {
    pub text: String,
}

impl TextTag {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Tag for TextTag {
    fn type_sig(&self) -> TypeSignature {
        TypeSignature::TEXT
    }

    fn read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = ByteReader::new(data);
        read_type_header(&mut r, TypeSignature::TEXT)?;
        self.text = ascii_until_nul(r.bytes(r.remaining())?);
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        write_type_header(out, TypeSignature::TEXT);
        out.extend_from_slice(&latin1_bytes(&self.text));
        out.put_u8(0);
        Ok(())
    }

    fn describe(&self, _verbosity: u32) -> String {
        format!("{}\n", self.text)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn Tag> {
        Box::new(self.clone())
    }
}

/// 'desc' - v2 profile description
///
/// The Unicode and ScriptCode parts are optional on read; many v2 profiles
/// in the wild stop after the ASCII string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextDescriptionTag {
    pub ascii: String,
    pub unicode_language: u32,
    pub unicode: Option<String>,
    pub script_code: u16,
    pub script: Vec<u8>,
    ascii_missing_nul: bool,
}

impl TextDescriptionTag {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            ascii: text.into(),
            ..Default::default()
        }
    }
}

impl Tag for TextDescriptionTag {
    fn type_sig(&self) -> TypeSignature {
        TypeSignature::DESC
    }

    fn read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = ByteReader::new(data);
        read_type_header(&mut r, TypeSignature::DESC)?;

        let ascii_count = r.u32()? as usize;
        let ascii = r.bytes(ascii_count)?;
        self.ascii_missing_nul = ascii_count > 0 && !ascii.contains(&0);
        self.ascii = ascii_until_nul(ascii);

        self.unicode_language = 0;
        self.unicode = None;
        self.script_code = 0;
        self.script.clear();
        if r.remaining() < 8 {
            return Ok(());
        }
        self.unicode_language = r.u32()?;
        let unicode_count = r.u32()? as usize;
        check_count(unicode_count, 2, r.remaining())?;
        if unicode_count > 0 {
            self.unicode = decode_utf16be(r.bytes(unicode_count * 2)?);
        }

        if r.remaining() < 3 {
            return Ok(());
        }
        self.script_code = r.u16()?;
        let script_count = usize::from(r.u8()?).min(67);
        let script = r.bytes(r.remaining().min(67))?;
        self.script = script[..script_count.min(script.len())].to_vec();
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        write_type_header(out, TypeSignature::DESC);
        let ascii = latin1_bytes(&self.ascii);
        out.put_u32(ascii.len() as u32 + 1);
        out.extend_from_slice(&ascii);
        out.put_u8(0);

        out.put_u32(self.unicode_language);
        match &self.unicode {
            Some(text) => {
                let units: Vec<u16> = text.encode_utf16().chain(std::iter::once(0)).collect();
                out.put_u32(units.len() as u32);
                for u in units {
                    out.put_u16(u);
                }
            }
            None => out.put_u32(0),
        }

        out.put_u16(self.script_code);
        let script_len = self.script.len().min(67);
        out.put_u8(script_len as u8);
        out.extend_from_slice(&self.script[..script_len]);
        out.put_zeros(67 - script_len);
        Ok(())
    }

    fn describe(&self, verbosity: u32) -> String {
        let mut s = format!("{}\n", self.ascii);
        if verbosity > 0 {
            if let Some(u) = &self.unicode {
                s.push_str(&format!("Unicode: {}\n", u));
            }
        }
        s
    }

    fn validate(&self, ctx: &TagContext<'_>, report: &mut ValidationReport) {
        if self.ascii_missing_nul {
            report.tag_content(
                Check::TagContents,
                ctx.signature,
                Severity::NonCompliant,
                "ASCII description is not NUL terminated",
            );
        }
        if ctx.profile.header().version.major >= 4 {
            report.tag_content(
                Check::TagContents,
                ctx.signature,
                Severity::NonCompliant,
                "textDescriptionType is not allowed in v4 profiles",
            );
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn Tag> {
        Box::new(self.clone())
    }
}

/// One localized string of an 'mluc' tag
#[derive(Debug, Clone, PartialEq)]
pub struct LocalizedString {
    pub language: [u8; 2],
    pub country: [u8; 2],
    pub text: String,
}

/// 'mluc' - multi-localized Unicode
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiLocalizedUnicodeTag {
    pub strings: Vec<LocalizedString>,
    bad_records: usize,
}

impl MultiLocalizedUnicodeTag {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            strings: vec![LocalizedString {
                language: *b"en",
                country: *b"US",
                text: text.into(),
            }],
            bad_records: 0,
        }
    }

    /// Text for a language code, falling back to the first entry
    pub fn text(&self, language: &str) -> Option<&str> {
        self.strings
            .iter()
            .find(|s| s.language == language.as_bytes())
            .or_else(|| self.strings.first())
            .map(|s| s.text.as_str())
    }
}

impl Tag for MultiLocalizedUnicodeTag {
    fn type_sig(&self) -> TypeSignature {
        TypeSignature::MLUC
    }

    fn read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = ByteReader::new(data);
        read_type_header(&mut r, TypeSignature::MLUC)?;

        let record_count = r.u32()? as usize;
        let record_size = r.u32()? as usize;
        if record_size < 12 {
            return Err(ParseError::CorruptedData(format!(
                "mluc record size {} too small",
                record_size
            )));
        }
        check_count(record_count, record_size, r.remaining())?;

        self.strings.clear();
        self.bad_records = 0;
        let table = r.position();
        for i in 0..record_count {
            r.seek_to(table + i * record_size)?;
            let language = [r.u8()?, r.u8()?];
            let country = [r.u8()?, r.u8()?];
            let len = r.u32()? as usize;
            let offset = r.u32()? as usize;

            // offset is from the start of the tag
            let text = offset
                .checked_add(len)
                .and_then(|end| data.get(offset..end))
                .and_then(decode_utf16be);
            match text {
                Some(text) => self.strings.push(LocalizedString {
                    language,
                    country,
                    text,
                }),
                None => self.bad_records += 1,
            }
        }
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        let start = out.len();
        write_type_header(out, TypeSignature::MLUC);
        out.put_u32(self.strings.len() as u32);
        out.put_u32(12);

        let encoded: Vec<Vec<u16>> = self
            .strings
            .iter()
            .map(|s| s.text.encode_utf16().collect())
            .collect();
        let mut offset = 16 + 12 * self.strings.len();
        for (s, units) in self.strings.iter().zip(&encoded) {
            out.extend_from_slice(&s.language);
            out.extend_from_slice(&s.country);
            out.put_u32(units.len() as u32 * 2);
            out.put_u32(offset as u32);
            offset += units.len() * 2;
        }
        for units in &encoded {
            for &u in units {
                out.put_u16(u);
            }
        }
        debug_assert_eq!(out.len() - start, offset);
        Ok(())
    }

    fn describe(&self, verbosity: u32) -> String {
        let mut s = String::new();
        for (i, entry) in self.strings.iter().enumerate() {
            if i > 0 && verbosity == 0 {
                break;
            }
            s.push_str(&format!(
                "({}_{}) {}\n",
                String::from_utf8_lossy(&entry.language),
                String::from_utf8_lossy(&entry.country),
                entry.text
            ));
        }
        s
    }

    fn validate(&self, ctx: &TagContext<'_>, report: &mut ValidationReport) {
        if self.bad_records > 0 {
            report.tag_content(
                Check::TagContents,
                ctx.signature,
                Severity::NonCompliant,
                format!("{} mluc records point outside the tag", self.bad_records),
            );
        }
        if self.strings.is_empty() {
            report.tag_content(
                Check::TagContents,
                ctx.signature,
                Severity::Warning,
                "no localized strings",
            );
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn Tag> {
        Box::new(self.clone())
    }
}

fn ascii_until_nul(data: &[u8]) -> String {
    data.iter()
        .take_while(|&&b| b != 0)
        .map(|&b| b as char)
        .collect()
}

/// Inverse of `ascii_until_nul`; characters outside Latin-1 become '?'
fn latin1_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .filter(|&c| c != '\0')
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// Decode UTF-16BE bytes to String
fn decode_utf16be(data: &[u8]) -> Option<String> {
    if data.len() % 2 != 0 {
        return None;
    }

    let utf16: Vec<u16> = data
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .take_while(|&c| c != 0)
        .collect();

    Some(String::from_utf16_lossy(&utf16))
}
