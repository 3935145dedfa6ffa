//! XYZ Tag Type
//!
//! Used for colorants (rXYZ, gXYZ, bXYZ), the media white point (wtpt) and
//! the luminance tag. See ICC.1:2022 Section 10.31.

use std::any::Any;

use super::{Tag, TagContext, read_type_header, write_type_header};
use crate::icc::error::{ParseError, WriteError};
use crate::icc::types::{TagSignature, TypeSignature, XyzNumber};
use crate::icc::validate::{Check, Severity, ValidationReport};
use crate::io::ByteReader;

/// 'XYZ ' - array of XYZNumbers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XyzTag {
    pub values: Vec<XyzNumber>,
    trailing_bytes: usize,
}

impl XyzTag {
    pub fn new(xyz: [f32; 3]) -> Self {
        Self {
            values: vec![XyzNumber::from_f32(xyz)],
            trailing_bytes: 0,
        }
    }

    /// First entry as floating point
    pub fn xyz(&self) -> Option<[f32; 3]> {
        self.values.first().map(XyzNumber::to_f32)
    }
}

impl Tag for XyzTag {
    fn type_sig(&self) -> TypeSignature {
        TypeSignature::XYZ
    }

    fn read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = ByteReader::new(data);
        read_type_header(&mut r, TypeSignature::XYZ)?;
        let count = r.remaining() / XyzNumber::SIZE;
        self.trailing_bytes = r.remaining() % XyzNumber::SIZE;
        self.values = r.array_of(count, XyzNumber::SIZE, XyzNumber::read)?;
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        write_type_header(out, TypeSignature::XYZ);
        for v in &self.values {
            v.write(out);
        }
        Ok(())
    }

    fn describe(&self, _verbosity: u32) -> String {
        self.values
            .iter()
            .map(|v| {
                let [x, y, z] = v.to_f32();
                format!("X={:.4}, Y={:.4}, Z={:.4}\n", x, y, z)
            })
            .collect()
    }

    fn validate(&self, ctx: &TagContext<'_>, report: &mut ValidationReport) {
        if self.values.is_empty() {
            report.tag_content(
                Check::TagContents,
                ctx.signature,
                Severity::NonCompliant,
                "XYZ tag holds no values",
            );
            return;
        }
        if self.trailing_bytes != 0 {
            report.tag_content(
                Check::TagContents,
                ctx.signature,
                Severity::Warning,
                format!("{} trailing bytes after XYZ values", self.trailing_bytes),
            );
        }
        if ctx.signature == TagSignature::MEDIA_WHITE {
            let [x, y, z] = self.values[0].to_f32();
            if !(x > 0.0 && y > 0.0 && z > 0.0) {
                report.tag_content(
                    Check::TagContents,
                    ctx.signature,
                    Severity::Warning,
                    "media white point is not positive",
                );
            }
        }
    }

    fn is_array_type(&self) -> bool {
        self.values.len() > 1
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
    fn test_parse_xyz_tag() {
        let mut data = b"XYZ \0\0\0\0".to_vec();
        data.extend_from_slice(&[
            0x00, 0x00, 0xF6, 0xD6, // X = 0.9642
            0x00, 0x01, 0x00, 0x00, // Y = 1.0
            0x00, 0x00, 0xD3, 0x2D, // Z = 0.8249
        ]);

        let mut tag = XyzTag::default();
        tag.read(&data).unwrap();
        let [x, y, z] = tag.xyz().unwrap();
        assert!((x - 0.9642).abs() < 0.001);
        assert!((y - 1.0).abs() < 0.001);
        assert!((z - 0.8249).abs() < 0.001);

        let mut out = Vec::new();
        tag.write(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_empty_xyz_tag() {
        let mut tag = XyzTag::default();
        tag.read(b"XYZ \0\0\0\0\0\0").unwrap();
        assert!(tag.values.is_empty());
        assert_eq!(tag.trailing_bytes, 2);
    }
}
