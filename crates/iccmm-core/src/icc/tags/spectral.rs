//! Spectral descriptor tags
//!
//! - svcn: spectral viewing conditions (observer, illuminant, surround)
//! - sdin: spectral data info (spectral color signature and ranges)
//!
//! Sample arrays are written with exactly as many values as their range
//! declares, zero-filled when the in-memory vector is short, so a tag
//! built with missing data still serializes to a readable payload.

use std::any::Any;

use super::{Tag, TagContext, check_count, describe_values, read_type_header, write_type_header};
use crate::icc::error::{ParseError, WriteError, sig_str};
use crate::icc::types::{SpectralRange, TypeSignature};
use crate::icc::validate::{Check, Severity, ValidationReport};
use crate::io::{BeWrite, ByteReader};

fn read_range(r: &mut ByteReader<'_>) -> Result<SpectralRange, ParseError> {
    let range = SpectralRange::read(r)?;
    r.skip(2)?;
    Ok(range)
}

fn write_range(out: &mut Vec<u8>, range: &SpectralRange) {
    out.extend_from_slice(&range.to_bytes());
    out.put_u16(0);
}

fn read_samples(r: &mut ByteReader<'_>, count: usize) -> Result<Vec<f32>, ParseError> {
    check_count(count, 4, r.remaining())?;
    Ok(r.array_of(count, 4, |r| r.f32())?)
}

fn write_samples(out: &mut Vec<u8>, values: &[f32], count: usize) {
    for i in 0..count {
        out.put_f32(values.get(i).copied().unwrap_or(0.0));
    }
}

fn check_range(
    ctx: &TagContext<'_>,
    report: &mut ValidationReport,
    what: &str,
    range: &SpectralRange,
) {
    if range.steps > 1 && !(range.start < range.end) {
        report.tag_content(
            Check::TagContents,
            ctx.signature,
            Severity::NonCompliant,
            format!(
                "{} range {}..{} nm is not increasing",
                what, range.start, range.end
            ),
        );
    }
}

/// 'svcn' - spectral viewing conditions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectralViewingConditionsTag {
    /// Standard observer signature
    pub observer: u32,
    pub observer_range: SpectralRange,
    /// Three matching functions of `observer_range.steps` samples each
    pub observer_functions: Vec<f32>,
    /// Standard illuminant signature
    pub illuminant: u32,
    pub color_temperature: f32,
    pub illuminant_range: SpectralRange,
    pub illuminant_values: Vec<f32>,
    pub illuminant_xyz: [f32; 3],
    pub surround_xyz: [f32; 3],
}

impl Tag for SpectralViewingConditionsTag {
    fn type_sig(&self) -> TypeSignature {
        TypeSignature::SVCN
    }

    fn read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = ByteReader::new(data);
        read_type_header(&mut r, TypeSignature::SVCN)?;

        self.observer = r.u32()?;
        self.observer_range = read_range(&mut r)?;
        self.observer_functions = read_samples(&mut r, 3 * self.observer_range.steps as usize)?;

        self.illuminant = r.u32()?;
        self.color_temperature = r.f32()?;
        self.illuminant_range = read_range(&mut r)?;
        self.illuminant_values = read_samples(&mut r, self.illuminant_range.steps as usize)?;

        for v in self.illuminant_xyz.iter_mut() {
            *v = r.f32()?;
        }
        for v in self.surround_xyz.iter_mut() {
            *v = r.f32()?;
        }
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        write_type_header(out, TypeSignature::SVCN);
        out.put_u32(self.observer);
        write_range(out, &self.observer_range);
        write_samples(
            out,
            &self.observer_functions,
            3 * self.observer_range.steps as usize,
        );
        out.put_u32(self.illuminant);
        out.put_f32(self.color_temperature);
        write_range(out, &self.illuminant_range);
        write_samples(
            out,
            &self.illuminant_values,
            self.illuminant_range.steps as usize,
        );
        for &v in self.illuminant_xyz.iter().chain(&self.surround_xyz) {
            out.put_f32(v);
        }
        Ok(())
    }

    fn describe(&self, verbosity: u32) -> String {
        let mut s = format!(
            "Observer: {}, {}..{} nm in {} steps\nIlluminant: {}, {} K, {}..{} nm in {} steps\n",
            sig_str(self.observer),
            self.observer_range.start,
            self.observer_range.end,
            self.observer_range.steps,
            sig_str(self.illuminant),
            self.color_temperature,
            self.illuminant_range.start,
            self.illuminant_range.end,
            self.illuminant_range.steps,
        );
        s.push_str(&format!(
            "Illuminant XYZ: {:?}\nSurround XYZ: {:?}\n",
            self.illuminant_xyz, self.surround_xyz
        ));
        if verbosity > 50 {
            s.push_str(&format!(
                "Illuminant: {}\n",
                describe_values(&self.illuminant_values, usize::MAX)
            ));
        }
        s
    }

    fn validate(&self, ctx: &TagContext<'_>, report: &mut ValidationReport) {
        check_range(ctx, report, "observer", &self.observer_range);
        check_range(ctx, report, "illuminant", &self.illuminant_range);
        let want = 3 * self.observer_range.steps as usize;
        if self.observer_functions.len() != want {
            report.tag_content(
                Check::TagContents,
                ctx.signature,
                Severity::NonCompliant,
                format!(
                    "observer has {} samples, range declares {}",
                    self.observer_functions.len(),
                    want
                ),
            );
        }
        if self.illuminant_values.len() != self.illuminant_range.steps as usize {
            report.tag_content(
                Check::TagContents,
                ctx.signature,
                Severity::NonCompliant,
                format!(
                    "illuminant has {} samples, range declares {}",
                    self.illuminant_values.len(),
                    self.illuminant_range.steps
                ),
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

/// 'sdin' - spectral data info
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectralDataInfoTag {
    pub spectral_color: u32,
    pub spectral_range: SpectralRange,
    /// Present for bi-spectral data only
    pub bispectral_range: Option<SpectralRange>,
}

impl Tag for SpectralDataInfoTag {
    fn type_sig(&self) -> TypeSignature {
        TypeSignature::SDIN
    }

    fn read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = ByteReader::new(data);
        read_type_header(&mut r, TypeSignature::SDIN)?;
        self.spectral_color = r.u32()?;
        self.spectral_range = read_range(&mut r)?;
        self.bispectral_range = if r.remaining() >= SpectralRange::SIZE + 2 {
            let range = read_range(&mut r)?;
            (!range.is_empty()).then_some(range)
        } else {
            None
        };
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        write_type_header(out, TypeSignature::SDIN);
        out.put_u32(self.spectral_color);
        write_range(out, &self.spectral_range);
        if let Some(range) = &self.bispectral_range {
            write_range(out, range);
        }
        Ok(())
    }

    fn describe(&self, _verbosity: u32) -> String {
        let mut s = format!(
            "Spectral color: {}\nRange: {}..{} nm in {} steps\n",
            sig_str(self.spectral_color),
            self.spectral_range.start,
            self.spectral_range.end,
            self.spectral_range.steps
        );
        if let Some(b) = &self.bispectral_range {
            s.push_str(&format!(
                "Bi-spectral range: {}..{} nm in {} steps\n",
                b.start, b.end, b.steps
            ));
        }
        s
    }

    fn validate(&self, ctx: &TagContext<'_>, report: &mut ValidationReport) {
        check_range(ctx, report, "spectral", &self.spectral_range);
        if let Some(b) = &self.bispectral_range {
            check_range(ctx, report, "bi-spectral", b);
        }
        let header = ctx.profile.header();
        if !header.spectral_range.is_empty() && header.spectral_range != self.spectral_range {
            report.tag_content(
                Check::TagContents,
                ctx.signature,
                Severity::Warning,
                "spectral range differs from the header",
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

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: f32, end: f32, steps: u16) -> SpectralRange {
        SpectralRange { start, end, steps }
    }

    #[test]
    fn test_svcn_roundtrip() {
        let tag = SpectralViewingConditionsTag {
            observer: 1,
            observer_range: range(400.0, 700.0, 4),
            observer_functions: (0..12).map(|i| i as f32 / 12.0).collect(),
            illuminant: 1,
            color_temperature: 5000.0,
            illuminant_range: range(400.0, 700.0, 4),
            illuminant_values: vec![1.0, 0.9, 0.8, 0.7],
            illuminant_xyz: [0.9642, 1.0, 0.8249],
            surround_xyz: [0.2, 0.2, 0.2],
        };
        let bytes = (&tag as &dyn Tag).to_bytes().unwrap();
        assert_eq!(bytes.len(), 8 + 4 + 8 + 48 + 8 + 8 + 16 + 24);

        let mut parsed = SpectralViewingConditionsTag::default();
        parsed.read(&bytes).unwrap();
        assert_eq!(parsed, tag);
    }

    #[test]
    fn test_svcn_missing_data_writes() {
        let tag = SpectralViewingConditionsTag {
            observer_range: range(380.0, 780.0, 81),
            ..Default::default()
        };
        let bytes = (&tag as &dyn Tag).to_bytes().unwrap();
        let mut parsed = SpectralViewingConditionsTag::default();
        parsed.read(&bytes).unwrap();
        assert_eq!(parsed.observer_functions.len(), 3 * 81);
    }

    #[test]
    fn test_svcn_truncated() {
        let mut data = b"svcn\0\0\0\0".to_vec();
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&SpectralRange { start: 380.0, end: 780.0, steps: 0xFFFF }.to_bytes());
        data.extend_from_slice(&[0, 0]);
        let mut tag = SpectralViewingConditionsTag::default();
        assert!(tag.read(&data).is_err());
    }

    #[test]
    fn test_sdin_optional_bispectral() {
        let mut tag = SpectralDataInfoTag {
            spectral_color: u32::from_be_bytes(*b"rs00"),
            spectral_range: range(380.0, 780.0, 41),
            bispectral_range: None,
        };
        let bytes = (&tag as &dyn Tag).to_bytes().unwrap();
        assert_eq!(bytes.len(), 20);
        let mut parsed = SpectralDataInfoTag::default();
        parsed.read(&bytes).unwrap();
        assert_eq!(parsed, tag);

        tag.bispectral_range = Some(range(300.0, 400.0, 11));
        let bytes = (&tag as &dyn Tag).to_bytes().unwrap();
        parsed.read(&bytes).unwrap();
        assert_eq!(parsed, tag);
    }
}
