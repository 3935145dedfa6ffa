//! Curve set element ('cvst') and segmented curves ('curf')
//!
//! A segmented curve splits the real line at its breakpoints. Segment i
//! covers (bp[i-1], bp[i]], with the first and last segments running to
//! minus and plus infinity. Segments are formulas ('parf') or sampled
//! runs ('samf'); a sampled run starts from the value the previous
//! segment reaches at the shared breakpoint.

use std::any::Any;

use super::{
    ApplyContext, Element, read_element_header, read_positions, write_element_header,
    write_positioned,
};
use crate::error::EvaluationFault;
use crate::icc::error::{ParseError, WriteError};
use crate::icc::tags::check_count;
use crate::icc::types::{TagSignature, TypeSignature};
use crate::icc::validate::{Check, Severity, ValidationReport};
use crate::io::{BeWrite, ByteReader};

/// One piece of a segmented curve
#[derive(Debug, Clone, PartialEq)]
pub enum CurveSegment {
    /// Function types:
    /// - 0: Y = (a*X + b)^g + c, params g a b c
    /// - 1: Y = a*log10(b*X^g + c) + d, params g a b c d
    /// - 2: Y = a*b^(c*X + d) + e, params a b c d e
    /// - 3: Y = a*(b*X + c)^g + d, params g a b c d
    Formula { function: u16, params: Vec<f32> },
    /// Evenly spaced samples over the segment, the start point excluded
    Sampled(Vec<f32>),
}

fn formula_param_count(function: u16) -> Option<usize> {
    match function {
        0 => Some(4),
        1 | 2 | 3 => Some(5),
        _ => None,
    }
}

impl CurveSegment {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, ParseError> {
        let sig = TypeSignature(r.u32()?);
        r.skip(4)?;
        match sig {
            TypeSignature::FORMULA_SEGMENT => {
                let function = r.u16()?;
                r.skip(2)?;
                let count = formula_param_count(function).ok_or_else(|| {
                    ParseError::CorruptedData(format!("unknown formula segment type {}", function))
                })?;
                let params = r.array_of(count, 4, |r| r.f32())?;
                Ok(Self::Formula { function, params })
            }
            TypeSignature::SAMPLED_SEGMENT => {
                let count = r.u32()? as usize;
                check_count(count, 4, r.remaining())?;
                Ok(Self::Sampled(r.array_of(count, 4, |r| r.f32())?))
            }
            other => Err(ParseError::CorruptedData(format!(
                "expected parf or samf, found '{}'",
                other
            ))),
        }
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        match self {
            Self::Formula { function, params } => {
                let want = formula_param_count(*function).ok_or_else(|| {
                    WriteError::tag(
                        TypeSignature::FORMULA_SEGMENT.0,
                        format!("unknown formula type {}", function),
                    )
                })?;
                out.put_u32(TypeSignature::FORMULA_SEGMENT.0);
                out.put_u32(0);
                out.put_u16(*function);
                out.put_u16(0);
                for i in 0..want {
                    out.put_f32(params.get(i).copied().unwrap_or(0.0));
                }
            }
            Self::Sampled(samples) => {
                out.put_u32(TypeSignature::SAMPLED_SEGMENT.0);
                out.put_u32(0);
                out.put_u32(
                    u32::try_from(samples.len()).map_err(|_| WriteError::TooLarge(samples.len()))?,
                );
                for &v in samples {
                    out.put_f32(v);
                }
            }
        }
        Ok(())
    }

    fn eval_formula(function: u16, p: &[f32], x: f32) -> f32 {
        let p = |i: usize| p.get(i).copied().unwrap_or(0.0);
        match function {
            0 => (p(1) * x + p(2)).powf(p(0)) + p(3),
            1 => p(1) * (p(2) * x.powf(p(0)) + p(3)).log10() + p(4),
            2 => p(0) * p(1).powf(p(2) * x + p(3)) + p(4),
            3 => p(1) * (p(2) * x + p(3)).powf(p(0)) + p(4),
            _ => f32::NAN,
        }
    }
}

fn eval_sampled(samples: &[f32], start: f32, end: f32, start_value: f32, x: f32) -> f32 {
    let n = samples.len();
    if n == 0 || !(end > start) {
        return start_value;
    }
    let pos = (x - start) / (end - start) * n as f32;
    if pos.is_nan() {
        return f32::NAN;
    }
    let pos = pos.clamp(0.0, n as f32);
    let idx = (pos.floor() as usize).min(n - 1);
    let t = pos - idx as f32;
    let v0 = if idx == 0 { start_value } else { samples[idx - 1] };
    let v1 = samples[idx];
    v0 + t * (v1 - v0)
}

/// 'curf' segmented curve
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedCurve {
    pub breakpoints: Vec<f32>,
    pub segments: Vec<CurveSegment>,
}

impl Default for SegmentedCurve {
    fn default() -> Self {
        Self::identity()
    }
}

impl SegmentedCurve {
    /// y = x everywhere
    pub fn identity() -> Self {
        Self {
            breakpoints: Vec::new(),
            segments: vec![CurveSegment::Formula {
                function: 0,
                params: vec![1.0, 1.0, 0.0, 0.0],
            }],
        }
    }

    /// Segment index whose interval holds x. NaN lands in the first.
    fn segment_for(&self, x: f32) -> usize {
        self.breakpoints.iter().take_while(|&&b| x > b).count()
    }

    pub fn eval(&self, x: f32) -> f32 {
        if self.segments.is_empty() {
            return x;
        }
        let i = self.segment_for(x).min(self.segments.len() - 1);

        // walk back to the closest formula so sampled runs know their start
        let mut first = i;
        while first > 0 && matches!(self.segments[first], CurveSegment::Sampled(_)) {
            first -= 1;
        }

        let mut carry = f32::NAN;
        for j in first..=i {
            let at = if j == i {
                x
            } else {
                self.breakpoints.get(j).copied().unwrap_or(f32::NAN)
            };
            carry = match &self.segments[j] {
                CurveSegment::Formula { function, params } => {
                    CurveSegment::eval_formula(*function, params, at)
                }
                CurveSegment::Sampled(samples) => {
                    let start = match j.checked_sub(1).and_then(|k| self.breakpoints.get(k)) {
                        Some(&s) => s,
                        None => return f32::NAN,
                    };
                    let Some(&end) = self.breakpoints.get(j) else {
                        return f32::NAN;
                    };
                    eval_sampled(samples, start, end, carry, at)
                }
            };
        }
        carry
    }

    fn read(r: &mut ByteReader<'_>) -> Result<Self, ParseError> {
        let sig = TypeSignature(r.u32()?);
        if sig != TypeSignature::SEGMENTED_CURVE {
            return Err(ParseError::TypeMismatch {
                expected: TypeSignature::SEGMENTED_CURVE.0,
                actual: sig.0,
            });
        }
        r.skip(4)?;
        let count = r.u16()? as usize;
        r.skip(2)?;
        if count == 0 {
            return Err(ParseError::CorruptedData("segmented curve has no segments".to_string()));
        }
        let breakpoints = r.array_of(count - 1, 4, |r| r.f32())?;
        check_count(count, 12, r.remaining())?;
        let segments = (0..count)
            .map(|_| CurveSegment::read(r))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            breakpoints,
            segments,
        })
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        if self.segments.is_empty() || self.breakpoints.len() + 1 != self.segments.len() {
            return Err(WriteError::tag(
                TypeSignature::SEGMENTED_CURVE.0,
                "segment and breakpoint counts disagree",
            ));
        }
        let count = u16::try_from(self.segments.len())
            .map_err(|_| WriteError::TooLarge(self.segments.len()))?;
        out.put_u32(TypeSignature::SEGMENTED_CURVE.0);
        out.put_u32(0);
        out.put_u16(count);
        out.put_u16(0);
        for &b in &self.breakpoints {
            out.put_f32(b);
        }
        for s in &self.segments {
            s.write(out)?;
        }
        Ok(())
    }

    fn problems(&self) -> Vec<String> {
        let mut found = Vec::new();
        if self.breakpoints.windows(2).any(|w| !(w[0] < w[1])) {
            found.push("breakpoints are not increasing".to_string());
        }
        if matches!(self.segments.first(), Some(CurveSegment::Sampled(_))) {
            found.push("first segment is sampled over an infinite range".to_string());
        }
        if self.segments.len() > 1 && matches!(self.segments.last(), Some(CurveSegment::Sampled(_))) {
            found.push("last segment is sampled over an infinite range".to_string());
        }
        found
    }
}

/// 'cvst' - one segmented curve per channel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurveSetElement {
    pub curves: Vec<SegmentedCurve>,
}

impl CurveSetElement {
    pub fn new(curves: Vec<SegmentedCurve>) -> Self {
        Self { curves }
    }
}

impl Element for CurveSetElement {
    fn type_sig(&self) -> TypeSignature {
        TypeSignature::CURVE_SET
    }

    fn input_channels(&self) -> usize {
        self.curves.len()
    }

    fn output_channels(&self) -> usize {
        self.curves.len()
    }

    fn read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = ByteReader::new(data);
        let (inputs, outputs) = read_element_header(&mut r, TypeSignature::CURVE_SET)?;
        if inputs != outputs {
            return Err(ParseError::CorruptedData(format!(
                "curve set maps {} channels to {}",
                inputs, outputs
            )));
        }
        let regions = read_positions(&mut r, data, inputs)?;
        self.curves = regions
            .into_iter()
            .map(|region| SegmentedCurve::read(&mut ByteReader::new(region)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        let base = out.len();
        let n = self.curves.len();
        write_element_header(out, TypeSignature::CURVE_SET, n, n)?;
        let table_at = out.len();
        out.put_zeros(8 * n);
        let parts = self
            .curves
            .iter()
            .map(|c| {
                let mut part = Vec::new();
                c.write(&mut part)?;
                Ok(part)
            })
            .collect::<Result<Vec<_>, WriteError>>()?;
        write_positioned(out, base, table_at, &parts)
    }

    fn describe(&self, verbosity: u32) -> String {
        let mut s = format!("Curve set, {} channels\n", self.curves.len());
        if verbosity > 25 {
            for (i, c) in self.curves.iter().enumerate() {
                s.push_str(&format!(
                    "  curve {}: {} segments, breakpoints {:?}\n",
                    i,
                    c.segments.len(),
                    c.breakpoints
                ));
            }
        }
        s
    }

    fn validate(&self, tag: TagSignature, report: &mut ValidationReport) {
        for (i, c) in self.curves.iter().enumerate() {
            for problem in c.problems() {
                report.tag_content(
                    Check::TagContents,
                    tag,
                    Severity::NonCompliant,
                    format!("curve {}: {}", i, problem),
                );
            }
        }
    }

    fn apply(
        &self,
        _ctx: &mut ApplyContext,
        dst: &mut [f32],
        src: &[f32],
    ) -> Result<(), EvaluationFault> {
        for ((d, &s), curve) in dst.iter_mut().zip(src).zip(&self.curves) {
            *d = curve.eval(s);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn Element> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_piece() -> SegmentedCurve {
        SegmentedCurve {
            breakpoints: vec![0.0, 1.0],
            segments: vec![
                CurveSegment::Formula {
                    function: 0,
                    params: vec![1.0, 0.0, 0.0, 0.0],
                },
                CurveSegment::Sampled(vec![0.25, 0.5, 0.75, 1.0]),
                CurveSegment::Formula {
                    function: 0,
                    params: vec![1.0, 0.0, 1.0, 0.0],
                },
            ],
        }
    }

    #[test]
    fn test_identity_curve() {
        let c = SegmentedCurve::identity();
        for x in [-1.0f32, 0.0, 0.5, 2.0] {
            assert!((c.eval(x) - x).abs() < 1e-6);
        }
        assert!(c.eval(f32::NAN).is_nan());
    }

    #[test]
    fn test_sampled_segment_starts_at_previous_value() {
        let c = two_piece();
        assert!((c.eval(-5.0) - 0.0).abs() < 1e-6);
        assert!((c.eval(0.125) - 0.125).abs() < 1e-6);
        assert!((c.eval(0.5) - 0.5).abs() < 1e-6);
        assert!((c.eval(1.0) - 1.0).abs() < 1e-6);
        assert!((c.eval(3.0) - 1.0).abs() < 1e-6);
        assert!(c.problems().is_empty());
    }

    #[test]
    fn test_curve_set_roundtrip() {
        let set = CurveSetElement::new(vec![two_piece(), SegmentedCurve::identity()]);
        let mut bytes = Vec::new();
        set.write(&mut bytes).unwrap();
        assert_eq!(&bytes[..4], b"cvst");
        // first curve sits right after the header and position table
        assert_eq!(u32::from_be_bytes(bytes[12..16].try_into().unwrap()), 28);

        let mut parsed = CurveSetElement::default();
        parsed.read(&bytes).unwrap();
        assert_eq!(parsed, set);

        let mut out = [0.0f32; 2];
        parsed
            .apply(&mut ApplyContext::default(), &mut out, &[0.5, f32::INFINITY])
            .unwrap();
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert_eq!(out[1], f32::INFINITY);
    }

    #[test]
    fn test_unknown_formula_rejected() {
        let mut bytes = b"curf\0\0\0\0\0\x01\0\0".to_vec();
        bytes.extend_from_slice(b"parf\0\0\0\0\0\x09\0\0");
        bytes.extend_from_slice(&[0; 20]);
        assert!(SegmentedCurve::read(&mut ByteReader::new(&bytes)).is_err());
    }

    #[test]
    fn test_sampled_first_segment_flagged() {
        let c = SegmentedCurve {
            breakpoints: vec![0.0],
            segments: vec![
                CurveSegment::Sampled(vec![1.0]),
                CurveSegment::Formula {
                    function: 0,
                    params: vec![1.0, 1.0, 0.0, 0.0],
                },
            ],
        };
        assert_eq!(c.problems().len(), 1);
        assert!(c.eval(-1.0).is_nan());
    }
}
