//! Curve Tag Types
//!
//! ICC profiles use curves for tone reproduction (TRC) and inside LUT
//! tags. Two types:
//! - curv: identity, simple gamma or lookup table
//! - para: parametric curve with formula
//!
//! See ICC.1:2022 Sections 10.6 (curv) and 10.18 (para)

use std::any::Any;

use super::{Tag, TagContext, check_count, read_type_header, write_type_header};
use crate::icc::error::{ParseError, WriteError};
use crate::icc::types::TypeSignature;
use crate::icc::validate::{Check, Severity, ValidationReport};
use crate::io::{BeWrite, ByteReader};
use crate::math::gamma::{
    ParametricCurve, ParametricCurveType, parametric_curve_eval, parametric_curve_eval_inverse,
};

/// Curve tag data (curv type)
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CurveTag {
    /// Identity curve (count = 0)
    #[default]
    Identity,
    /// Simple gamma (count = 1, value is u8Fixed8)
    Gamma(f32),
    /// Lookup table (count > 1, values are u16)
    Table(Vec<u16>),
}

impl CurveTag {
    /// Evaluate the curve at a given input (0.0 to 1.0)
    pub fn eval(&self, x: f32) -> f32 {
        let x = x.clamp(0.0, 1.0);

        match self {
            Self::Identity => x,
            Self::Gamma(g) => x.powf(*g),
            Self::Table(table) => {
                if table.is_empty() {
                    return x;
                }
                if table.len() == 1 {
                    return table[0] as f32 / 65535.0;
                }

                let pos = x * (table.len() - 1) as f32;
                // NaN casts to 0 and propagates through frac
                let idx = pos.floor() as usize;
                let frac = pos - idx as f32;

                if idx >= table.len() - 1 {
                    return table[table.len() - 1] as f32 / 65535.0;
                }

                let v0 = table[idx] as f32;
                let v1 = table[idx + 1] as f32;
                (v0 + frac * (v1 - v0)) / 65535.0
            }
        }
    }

    /// Evaluate the inverse curve (for encoding)
    pub fn eval_inverse(&self, y: f32) -> f32 {
        let y = y.clamp(0.0, 1.0);

        match self {
            Self::Identity => y,
            Self::Gamma(g) => {
                if *g == 0.0 {
                    return y;
                }
                y.powf(1.0 / *g)
            }
            Self::Table(table) => {
                if table.len() < 2 || y.is_nan() {
                    return y;
                }
                let target = y * 65535.0;
                let descending = table[0] > table[table.len() - 1];
                let value = |i: usize| {
                    let v = table[i] as f32;
                    if descending { 65535.0 - v } else { v }
                };
                let target = if descending { 65535.0 - target } else { target };

                // first entry not below target
                let mut lo = 0usize;
                let mut hi = table.len() - 1;
                while lo < hi {
                    let mid = (lo + hi) / 2;
                    if value(mid) < target {
                        lo = mid + 1;
                    } else {
                        hi = mid;
                    }
                }

                if lo == 0 {
                    return 0.0;
                }
                let v0 = value(lo - 1);
                let v1 = value(lo);
                let t = if v1 > v0 { (target - v0) / (v1 - v0) } else { 0.0 };
                ((lo - 1) as f32 + t.clamp(0.0, 1.0)) / (table.len() - 1) as f32
            }
        }
    }

    /// Check if this is a linear (identity) curve
    pub fn is_identity(&self) -> bool {
        match self {
            Self::Identity => true,
            Self::Gamma(g) => (*g - 1.0).abs() < 1e-6,
            Self::Table(table) => {
                if table.len() < 2 {
                    return table.is_empty();
                }
                table.iter().enumerate().all(|(i, &v)| {
                    let expected = (i as f64 / (table.len() - 1) as f64 * 65535.0).round() as i32;
                    (v as i32 - expected).abs() <= 1
                })
            }
        }
    }

    fn is_monotonic(&self) -> bool {
        match self {
            Self::Table(t) => {
                t.windows(2).all(|w| w[0] <= w[1]) || t.windows(2).all(|w| w[0] >= w[1])
            }
            _ => true,
        }
    }
}

impl Tag for CurveTag {
    fn type_sig(&self) -> TypeSignature {
        TypeSignature::CURVE
    }

    fn read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = ByteReader::new(data);
        read_type_header(&mut r, TypeSignature::CURVE)?;
        let count = r.u32()? as usize;

        *self = match count {
            0 => Self::Identity,
            1 => Self::Gamma(r.u16()? as f32 / 256.0),
            _ => {
                check_count(count, 2, r.remaining())?;
                Self::Table(r.array_of(count, 2, |r| r.u16())?)
            }
        };
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        write_type_header(out, TypeSignature::CURVE);
        match self {
            Self::Identity => out.put_u32(0),
            Self::Gamma(g) => {
                out.put_u32(1);
                out.put_u16((g * 256.0).round().clamp(0.0, 65535.0) as u16);
            }
            Self::Table(table) => {
                out.put_u32(table.len() as u32);
                for &v in table {
                    out.put_u16(v);
                }
            }
        }
        Ok(())
    }

    fn describe(&self, verbosity: u32) -> String {
        match self {
            Self::Identity => "Identity curve\n".to_string(),
            Self::Gamma(g) => format!("Gamma {:.4}\n", g),
            Self::Table(t) => {
                let mut s = format!("Table with {} entries\n", t.len());
                if verbosity > 50 {
                    for (i, v) in t.iter().enumerate() {
                        s.push_str(&format!("{:5} {:5}\n", i, v));
                    }
                }
                s
            }
        }
    }

    fn validate(&self, ctx: &TagContext<'_>, report: &mut ValidationReport) {
        if !self.is_monotonic() {
            report.tag_content(
                Check::TagContents,
                ctx.signature,
                Severity::Warning,
                "curve table is not monotonic",
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

/// Parametric curve tag data (para type)
#[derive(Debug, Clone, PartialEq)]
pub struct ParametricCurveTag {
    pub curve: ParametricCurve,
}

impl Default for ParametricCurveTag {
    fn default() -> Self {
        Self {
            curve: ParametricCurve::gamma(1.0),
        }
    }
}

impl ParametricCurveTag {
    pub fn new(curve: ParametricCurve) -> Self {
        Self { curve }
    }

    pub fn eval(&self, x: f32) -> f32 {
        parametric_curve_eval(&self.curve, f64::from(x)) as f32
    }

    pub fn eval_inverse(&self, y: f32) -> f32 {
        parametric_curve_eval_inverse(&self.curve, f64::from(y)) as f32
    }
}

impl Tag for ParametricCurveTag {
    fn type_sig(&self) -> TypeSignature {
        TypeSignature::PARA
    }

    fn read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = ByteReader::new(data);
        read_type_header(&mut r, TypeSignature::PARA)?;

        let func_type = r.u16()?;
        r.skip(2)?;
        let curve_type = ParametricCurveType::from_icc(func_type).ok_or_else(|| {
            ParseError::CorruptedData(format!("Unknown parametric curve type: {}", func_type))
        })?;
        let params = r.array_of(curve_type.param_count(), 4, |r| {
            r.s15f16().map(f64::from)
        })?;
        self.curve = ParametricCurve::from_params(curve_type, &params).ok_or_else(|| {
            ParseError::CorruptedData("parametric curve parameters missing".to_string())
        })?;
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        write_type_header(out, TypeSignature::PARA);
        out.put_u16(self.curve.curve_type.to_icc());
        out.put_u16(0);
        for p in self.curve.params() {
            out.put_s15f16(p as f32);
        }
        Ok(())
    }

    fn describe(&self, _verbosity: u32) -> String {
        let params: Vec<String> = self
            .curve
            .params()
            .iter()
            .map(|p| format!("{:.6}", p))
            .collect();
        format!(
            "Parametric type {}: {}\n",
            self.curve.curve_type.to_icc(),
            params.join(", ")
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn Tag> {
        Box::new(self.clone())
    }
}

/// Either curve type, as found in TRC tags and LUT curve sets
#[derive(Debug, Clone, PartialEq)]
pub enum Curve {
    Sampled(CurveTag),
    Parametric(ParametricCurveTag),
}

impl Curve {
    /// Read one curve starting at the reader's position. The reader is left
    /// after the curve, unaligned.
    pub fn read(r: &mut ByteReader<'_>) -> Result<Self, ParseError> {
        let start = r.position();
        let data = &r.data()[start..];
        let sig = TypeSignature(ByteReader::new(data).u32()?);
        let (curve, len) = match sig {
            TypeSignature::CURVE => {
                let mut c = CurveTag::default();
                c.read(data)?;
                let len = match &c {
                    CurveTag::Identity => 12,
                    CurveTag::Gamma(_) => 14,
                    CurveTag::Table(t) => 12 + 2 * t.len(),
                };
                (Self::Sampled(c), len)
            }
            TypeSignature::PARA => {
                let mut c = ParametricCurveTag::default();
                c.read(data)?;
                let len = 12 + 4 * c.curve.curve_type.param_count();
                (Self::Parametric(c), len)
            }
            other => {
                return Err(ParseError::CorruptedData(format!(
                    "expected curv or para, found '{}'",
                    other
                )));
            }
        };
        r.seek_to(start + len)?;
        Ok(curve)
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        match self {
            Self::Sampled(c) => c.write(out),
            Self::Parametric(c) => c.write(out),
        }
    }

    pub fn eval(&self, x: f32) -> f32 {
        match self {
            Self::Sampled(c) => c.eval(x),
            Self::Parametric(c) => c.eval(x),
        }
    }

    pub fn eval_inverse(&self, y: f32) -> f32 {
        match self {
            Self::Sampled(c) => c.eval_inverse(y),
            Self::Parametric(c) => c.eval_inverse(y),
        }
    }

    pub fn is_identity(&self) -> bool {
        match self {
            Self::Sampled(c) => c.is_identity(),
            Self::Parametric(c) => {
                c.curve.curve_type == ParametricCurveType::Gamma && (c.curve.g - 1.0).abs() < 1e-6
            }
        }
    }

    pub fn describe(&self, verbosity: u32) -> String {
        match self {
            Self::Sampled(c) => c.describe(verbosity),
            Self::Parametric(c) => c.describe(verbosity),
        }
    }

    /// Wrap a tag object if it is one of the two curve types
    pub fn from_tag(tag: &dyn Tag) -> Option<Self> {
        if let Some(c) = tag.downcast_ref::<CurveTag>() {
            return Some(Self::Sampled(c.clone()));
        }
        tag.downcast_ref::<ParametricCurveTag>()
            .map(|c| Self::Parametric(c.clone()))
    }
}

impl Default for Curve {
    fn default() -> Self {
        Self::Sampled(CurveTag::Identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(body: &[u8], sig: &[u8; 4]) -> Vec<u8> {
        let mut data = sig.to_vec();
        data.extend_from_slice(&[0; 4]);
        data.extend_from_slice(body);
        data
    }

    #[test]
    fn test_curve_identity() {
        let mut curve = CurveTag::Gamma(2.0);
        curve.read(&payload(&[0, 0, 0, 0], b"curv")).unwrap();
        assert_eq!(curve, CurveTag::Identity);
        assert!(curve.is_identity());
        assert!((curve.eval(0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_curve_gamma() {
        // Gamma 2.2 as u8Fixed8 = 563 = 0x0233
        let mut curve = CurveTag::default();
        curve
            .read(&payload(&[0, 0, 0, 1, 0x02, 0x33], b"curv"))
            .unwrap();
        match curve {
            CurveTag::Gamma(g) => assert!((g - 2.199).abs() < 0.01),
            other => panic!("Expected Gamma curve, got {:?}", other),
        }
    }

    #[test]
    fn test_curve_table() {
        let mut curve = CurveTag::default();
        curve
            .read(&payload(
                &[0, 0, 0, 3, 0x00, 0x00, 0x80, 0x00, 0xFF, 0xFF],
                b"curv",
            ))
            .unwrap();
        assert!(matches!(&curve, CurveTag::Table(t) if t.len() == 3));

        assert!(curve.eval(0.0).abs() < 0.001);
        assert!((curve.eval(0.5) - 0.5).abs() < 0.001);
        assert!((curve.eval(1.0) - 1.0).abs() < 0.001);
        assert!((curve.eval_inverse(0.25) - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_curve_table_non_finite() {
        let curve = CurveTag::Table(vec![0, 30000, 65535]);
        assert!(curve.eval(f32::NAN).is_nan());
        assert_eq!(curve.eval(f32::INFINITY), 1.0);
        assert_eq!(curve.eval(-0.1), 0.0);
        assert!(curve.eval_inverse(f32::NAN).is_nan());
    }

    #[test]
    fn test_curve_table_count_too_large() {
        let mut curve = CurveTag::default();
        let err = curve
            .read(&payload(&[0xFF, 0xFF, 0xFF, 0xFF, 0, 0], b"curv"))
            .unwrap_err();
        assert!(matches!(err, ParseError::Truncated { .. }));
    }

    #[test]
    fn test_parametric_type0() {
        // g = 2.2 as s15Fixed16 = 0x00023333
        let mut curve = ParametricCurveTag::default();
        curve
            .read(&payload(&[0, 0, 0, 0, 0x00, 0x02, 0x33, 0x33], b"para"))
            .unwrap();
        assert_eq!(curve.curve.curve_type, ParametricCurveType::Gamma);
        assert!((curve.curve.g - 2.2).abs() < 0.001);
        assert!((curve.eval(0.5) - 0.2176).abs() < 0.001);
    }

    #[test]
    fn test_parametric_unknown_type() {
        let mut curve = ParametricCurveTag::default();
        assert!(curve.read(&payload(&[0, 9, 0, 0], b"para")).is_err());
    }

    #[test]
    fn test_curve_sequence_read() {
        let mut data = Vec::new();
        CurveTag::Table(vec![0, 65535]).write(&mut data).unwrap();
        ParametricCurveTag::new(ParametricCurve::srgb())
            .write(&mut data)
            .unwrap();
        let mut r = ByteReader::new(&data);
        let a = Curve::read(&mut r).unwrap();
        assert_eq!(r.position(), 16);
        let b = Curve::read(&mut r).unwrap();
        assert_eq!(r.position(), data.len());
        assert!(a.is_identity());
        assert!(!b.is_identity());
    }
}
