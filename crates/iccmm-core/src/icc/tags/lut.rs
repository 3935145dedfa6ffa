//! LUT Tag Types
//!
//! LUT (Look-Up Table) tags define complex color transformations.
//!
//! Types:
//! - mft1 (Lut8Type): 8-bit precision LUT
//! - mft2 (Lut16Type): 16-bit precision LUT
//! - mAB (lutAToBType): v4 A-to-B transform
//! - mBA (lutBToAType): v4 B-to-A transform
//!
//! See ICC.1:2022 Sections 10.10-10.13

use std::any::Any;

use super::curves::Curve;
use super::{Tag, TagContext, check_count, write_type_header};
use crate::icc::error::{ParseError, WriteError};
use crate::icc::header::ColorSpace;
use crate::icc::types::TypeSignature;
use crate::icc::validate::{Check, Severity, ValidationReport};
use crate::io::{BeWrite, ByteReader};
use crate::math::interpolation::{Interpolation, clut_interp, grid_len, lut1d_interp};

/// Largest channel count a LUT tag may declare
pub const MAX_LUT_CHANNELS: usize = 15;

/// Multi-dimensional color lookup table
///
/// Samples are normalized to [0, 1] for the integer encodings and kept
/// as-is for float tables.
#[derive(Debug, Clone, PartialEq)]
pub struct ClutTable {
    /// Grid points per input dimension
    pub grid: Vec<u8>,
    pub outputs: usize,
    pub data: Vec<f32>,
    /// Bytes per sample on the wire: 1, 2, or 4 for float32
    pub precision: u8,
}

impl ClutTable {
    pub fn new(grid: Vec<u8>, outputs: usize, data: Vec<f32>, precision: u8) -> Self {
        Self {
            grid,
            outputs,
            data,
            precision,
        }
    }

    /// Table mapping every input straight through, `channels` in and out
    pub fn identity(channels: usize, points: u8, precision: u8) -> Self {
        let grid = vec![points; channels];
        let total = (points as usize).pow(channels as u32);
        let mut data = Vec::with_capacity(total * channels);
        let step = (points.max(2) - 1) as f32;
        for i in 0..total {
            let start = data.len();
            data.resize(start + channels, 0.0);
            let mut rem = i;
            for d in (0..channels).rev() {
                data[start + d] = (rem % points as usize) as f32 / step;
                rem /= points as usize;
            }
        }
        Self::new(grid, channels, data, precision)
    }

    pub fn inputs(&self) -> usize {
        self.grid.len()
    }

    /// Sample count matches the grid
    pub fn is_consistent(&self) -> bool {
        grid_len(&self.grid, self.outputs) == Some(self.data.len())
    }

    pub fn interpolate(&self, input: &[f32], out: &mut [f32], method: Interpolation) {
        let n = self.outputs.min(out.len());
        clut_interp(&self.grid, &self.data, input, &mut out[..n], method);
    }

    /// Read `count` samples of the given precision
    pub(crate) fn read_samples(
        r: &mut ByteReader<'_>,
        count: usize,
        precision: u8,
    ) -> Result<Vec<f32>, ParseError> {
        let values = match precision {
            1 => r.array_of(count, 1, |r| Ok(r.u8()? as f32 / 255.0))?,
            2 => r.array_of(count, 2, |r| Ok(r.u16()? as f32 / 65535.0))?,
            4 => r.array_of(count, 4, |r| r.f32())?,
            p => {
                return Err(ParseError::CorruptedData(format!(
                    "CLUT precision {} is not 1 or 2",
                    p
                )));
            }
        };
        Ok(values)
    }

    pub(crate) fn write_samples(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        match self.precision {
            1 => {
                for &v in &self.data {
                    out.put_u8(quantize(v, 255.0) as u8);
                }
            }
            2 => {
                for &v in &self.data {
                    out.put_u16(quantize(v, 65535.0) as u16);
                }
            }
            4 => {
                for &v in &self.data {
                    out.put_f32(v);
                }
            }
            p => {
                return Err(WriteError::tag(
                    0,
                    format!("CLUT precision {} is not writable", p),
                ));
            }
        }
        Ok(())
    }

    /// Sample count for a grid, refusing sizes the payload cannot hold
    pub(crate) fn checked_len(
        grid: &[u8],
        outputs: usize,
        elem_size: usize,
        remaining: usize,
    ) -> Result<usize, ParseError> {
        let count = grid_len(grid, outputs).ok_or_else(|| {
            ParseError::CorruptedData("CLUT grid size overflows".to_string())
        })?;
        check_count(count, elem_size, remaining)?;
        Ok(count)
    }

    /// Read the lutAToB/lutBToA CLUT layout: 16 grid bytes, precision,
    /// 3 pad bytes, samples
    pub fn read_ab(r: &mut ByteReader<'_>, inputs: usize, outputs: usize) -> Result<Self, ParseError> {
        let dims = r.bytes(16)?;
        let grid = dims[..inputs.min(16)].to_vec();
        let precision = r.u8()?;
        r.skip(3)?;
        let elem = match precision {
            1 | 2 => precision as usize,
            _ => {
                return Err(ParseError::CorruptedData(format!(
                    "CLUT precision {} is not 1 or 2",
                    precision
                )));
            }
        };
        let count = Self::checked_len(&grid, outputs, elem, r.remaining())?;
        let data = Self::read_samples(r, count, precision)?;
        Ok(Self::new(grid, outputs, data, precision))
    }

    pub fn write_ab(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        let mut dims = [0u8; 16];
        for (d, &g) in dims.iter_mut().zip(&self.grid) {
            *d = g;
        }
        out.extend_from_slice(&dims);
        out.put_u8(self.precision);
        out.put_zeros(3);
        self.write_samples(out)
    }
}

fn quantize(v: f32, scale: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        (v.clamp(0.0, 1.0) * scale).round()
    }
}

/// One-dimensional table of a legacy LUT, normalized to [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct LutCurve {
    pub table: Vec<f32>,
}

impl LutCurve {
    pub fn new(table: Vec<f32>) -> Self {
        Self { table }
    }

    pub fn identity(entries: usize) -> Self {
        let step = (entries.max(2) - 1) as f32;
        Self::new((0..entries).map(|i| i as f32 / step).collect())
    }

    pub fn eval(&self, x: f32) -> f32 {
        lut1d_interp(&self.table, x)
    }

    /// Sample this curve at `entries` evenly spaced points
    fn resampled(&self, entries: usize) -> Vec<f32> {
        if self.table.len() == entries {
            return self.table.clone();
        }
        let step = (entries.max(2) - 1) as f32;
        (0..entries).map(|i| self.eval(i as f32 / step)).collect()
    }
}

/// Sample width of a legacy LUT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LutPrecision {
    /// mft1
    Eight,
    /// mft2
    Sixteen,
}

impl LutPrecision {
    fn type_sig(self) -> TypeSignature {
        match self {
            Self::Eight => TypeSignature::LUT8,
            Self::Sixteen => TypeSignature::LUT16,
        }
    }
}

/// mft1 / mft2 legacy LUT: matrix, input tables, CLUT, output tables
#[derive(Debug, Clone, PartialEq)]
pub struct LutTag {
    pub precision: LutPrecision,
    /// Row-major 3x3, used only with three input channels
    pub matrix: [f32; 9],
    pub input_tables: Vec<LutCurve>,
    pub clut: ClutTable,
    pub output_tables: Vec<LutCurve>,
}

const IDENTITY_3X3: [f32; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

impl LutTag {
    pub fn new(precision: LutPrecision) -> Self {
        Self {
            precision,
            matrix: IDENTITY_3X3,
            input_tables: Vec::new(),
            clut: ClutTable::new(Vec::new(), 0, Vec::new(), 2),
            output_tables: Vec::new(),
        }
    }

    pub fn input_channels(&self) -> usize {
        self.input_tables.len()
    }

    pub fn output_channels(&self) -> usize {
        self.output_tables.len()
    }

    pub fn matrix_is_identity(&self) -> bool {
        self.matrix
            .iter()
            .zip(IDENTITY_3X3.iter())
            .all(|(a, b)| (a - b).abs() < 1e-6)
    }

    /// Run one color through the LUT. The matrix only applies to XYZ
    /// input; `input_space` is the space on the LUT's input side.
    pub fn eval(&self, input_space: ColorSpace, input: &[f32], out: &mut [f32], method: Interpolation) {
        let n_in = self.input_channels().min(MAX_LUT_CHANNELS);
        let n_out = self.output_channels().min(MAX_LUT_CHANNELS);
        let mut buf = [0.0f32; MAX_LUT_CHANNELS];
        for (b, &x) in buf.iter_mut().zip(input).take(n_in) {
            *b = x;
        }

        if input_space == ColorSpace::Xyz && n_in == 3 && !self.matrix_is_identity() {
            let m = &self.matrix;
            let v = [buf[0], buf[1], buf[2]];
            for (row, b) in buf.iter_mut().take(3).enumerate() {
                *b = m[row * 3] * v[0] + m[row * 3 + 1] * v[1] + m[row * 3 + 2] * v[2];
            }
        }

        for (b, curve) in buf.iter_mut().zip(&self.input_tables) {
            *b = curve.eval(*b);
        }

        let mut mid = [0.0f32; MAX_LUT_CHANNELS];
        self.clut.interpolate(&buf[..n_in], &mut mid[..n_out], method);

        for ((o, &m), curve) in out.iter_mut().zip(&mid[..n_out]).zip(&self.output_tables) {
            *o = curve.eval(m);
        }
    }

    fn entries(&self) -> usize {
        match self.precision {
            LutPrecision::Eight => 256,
            LutPrecision::Sixteen => 0,
        }
    }
}

impl Tag for LutTag {
    fn type_sig(&self) -> TypeSignature {
        self.precision.type_sig()
    }

    fn read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = ByteReader::new(data);
        let sig = TypeSignature(r.u32()?);
        self.precision = match sig {
            TypeSignature::LUT8 => LutPrecision::Eight,
            TypeSignature::LUT16 => LutPrecision::Sixteen,
            other => {
                return Err(ParseError::TypeMismatch {
                    expected: TypeSignature::LUT16.0,
                    actual: other.0,
                });
            }
        };
        r.skip(4)?;

        let inputs = r.u8()? as usize;
        let outputs = r.u8()? as usize;
        let points = r.u8()?;
        r.skip(1)?;
        if inputs == 0 || inputs > MAX_LUT_CHANNELS || outputs == 0 || outputs > MAX_LUT_CHANNELS {
            return Err(ParseError::CorruptedData(format!(
                "LUT channel counts {} -> {} out of range",
                inputs, outputs
            )));
        }

        let mut matrix = [0.0f32; 9];
        for m in matrix.iter_mut() {
            *m = r.s15f16()?;
        }

        let (in_entries, out_entries, elem) = match self.precision {
            LutPrecision::Eight => (256, 256, 1u8),
            LutPrecision::Sixteen => (r.u16()? as usize, r.u16()? as usize, 2u8),
        };
        if !(1..=4096).contains(&in_entries) || !(1..=4096).contains(&out_entries) {
            return Err(ParseError::CorruptedData(format!(
                "LUT table sizes {} / {} out of range",
                in_entries, out_entries
            )));
        }

        let read_tables = |r: &mut ByteReader<'_>,
                           count: usize,
                           entries: usize|
         -> Result<Vec<LutCurve>, ParseError> {
            check_count(count * entries, elem as usize, r.remaining())?;
            (0..count)
                .map(|_| ClutTable::read_samples(r, entries, elem).map(LutCurve::new))
                .collect::<Result<Vec<_>, ParseError>>()
        };

        let input_tables = read_tables(&mut r, inputs, in_entries)?;
        let grid = vec![points; inputs];
        let count = ClutTable::checked_len(&grid, outputs, elem as usize, r.remaining())?;
        let clut = ClutTable::new(grid, outputs, ClutTable::read_samples(&mut r, count, elem)?, elem);
        let output_tables = read_tables(&mut r, outputs, out_entries)?;

        self.matrix = matrix;
        self.input_tables = input_tables;
        self.clut = clut;
        self.output_tables = output_tables;
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        let n_in = self.input_channels();
        let n_out = self.output_channels();
        if n_in == 0 || n_in > MAX_LUT_CHANNELS || n_out == 0 || n_out > MAX_LUT_CHANNELS {
            return Err(WriteError::tag(
                self.type_sig().0,
                format!("channel counts {} -> {} out of range", n_in, n_out),
            ));
        }
        let points = self.clut.grid.first().copied().unwrap_or(0);
        if self.clut.grid.len() != n_in
            || self.clut.grid.iter().any(|&g| g != points)
            || self.clut.outputs != n_out
            || !self.clut.is_consistent()
        {
            return Err(WriteError::tag(
                self.type_sig().0,
                "CLUT shape does not match the tables",
            ));
        }

        write_type_header(out, self.type_sig());
        out.put_u8(n_in as u8);
        out.put_u8(n_out as u8);
        out.put_u8(points);
        out.put_u8(0);
        for &m in &self.matrix {
            out.put_s15f16(m);
        }

        let fixed = self.entries();
        let table_len = |tables: &[LutCurve]| {
            if fixed > 0 {
                fixed
            } else {
                tables
                    .iter()
                    .map(|t| t.table.len())
                    .max()
                    .unwrap_or(2)
                    .clamp(2, 4096)
            }
        };
        let in_entries = table_len(&self.input_tables);
        let out_entries = table_len(&self.output_tables);
        if self.precision == LutPrecision::Sixteen {
            out.put_u16(in_entries as u16);
            out.put_u16(out_entries as u16);
        }

        let elem = match self.precision {
            LutPrecision::Eight => 1,
            LutPrecision::Sixteen => 2,
        };
        let put_table = |out: &mut Vec<u8>, curve: &LutCurve, entries: usize| -> Result<(), WriteError> {
            ClutTable::new(Vec::new(), 1, curve.resampled(entries), elem).write_samples(out)
        };

        for t in &self.input_tables {
            put_table(out, t, in_entries)?;
        }
        ClutTable {
            precision: elem,
            ..self.clut.clone()
        }
        .write_samples(out)?;
        for t in &self.output_tables {
            put_table(out, t, out_entries)?;
        }
        Ok(())
    }

    fn describe(&self, verbosity: u32) -> String {
        let mut s = format!(
            "{} LUT, {} -> {} channels, {} grid points\n",
            match self.precision {
                LutPrecision::Eight => "8-bit",
                LutPrecision::Sixteen => "16-bit",
            },
            self.input_channels(),
            self.output_channels(),
            self.clut.grid.first().copied().unwrap_or(0)
        );
        if verbosity > 25 {
            s.push_str(&format!("Matrix: {:?}\n", self.matrix));
            for (i, t) in self.input_tables.iter().enumerate() {
                s.push_str(&format!("Input table {}: {} entries\n", i, t.table.len()));
            }
            for (i, t) in self.output_tables.iter().enumerate() {
                s.push_str(&format!("Output table {}: {} entries\n", i, t.table.len()));
            }
        }
        s
    }

    fn validate(&self, ctx: &TagContext<'_>, report: &mut ValidationReport) {
        check_channels(ctx, self.input_channels(), self.output_channels(), report);
        if self.clut.grid.first().is_some_and(|&g| g < 2) {
            report.tag_content(
                Check::TagContents,
                ctx.signature,
                Severity::Warning,
                "CLUT has fewer than 2 grid points",
            );
        }
        if self
            .input_tables
            .iter()
            .chain(&self.output_tables)
            .any(|t| t.table.len() < 2)
        {
            report.tag_content(
                Check::TagContents,
                ctx.signature,
                Severity::NonCompliant,
                "LUT table has fewer than 2 entries",
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

/// Which way a lutAToB/lutBToA tag runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LutDirection {
    /// mAB: A curves, CLUT, M curves, matrix, B curves
    AToB,
    /// mBA: B curves, matrix, M curves, CLUT, A curves
    BToA,
}

/// mAB / mBA tag
#[derive(Debug, Clone, PartialEq)]
pub struct LutAbTag {
    pub direction: LutDirection,
    pub input_channels: u8,
    pub output_channels: u8,
    pub b_curves: Option<Vec<Curve>>,
    /// Row-major 3x3 followed by three offsets
    pub matrix: Option<[f32; 12]>,
    pub m_curves: Option<Vec<Curve>>,
    pub clut: Option<ClutTable>,
    pub a_curves: Option<Vec<Curve>>,
}

impl LutAbTag {
    pub fn new(direction: LutDirection, input_channels: u8, output_channels: u8) -> Self {
        Self {
            direction,
            input_channels,
            output_channels,
            b_curves: None,
            matrix: None,
            m_curves: None,
            clut: None,
            a_curves: None,
        }
    }

    /// Channel count on the side of the B curves, matrix and M curves
    fn b_side(&self) -> usize {
        match self.direction {
            LutDirection::AToB => self.output_channels as usize,
            LutDirection::BToA => self.input_channels as usize,
        }
    }

    /// Channel count on the side of the A curves
    fn a_side(&self) -> usize {
        match self.direction {
            LutDirection::AToB => self.input_channels as usize,
            LutDirection::BToA => self.output_channels as usize,
        }
    }

    /// Run one color through the LUT
    pub fn eval(&self, input: &[f32], out: &mut [f32], method: Interpolation) {
        let n_in = (self.input_channels as usize).min(MAX_LUT_CHANNELS);
        let n_out = (self.output_channels as usize).min(MAX_LUT_CHANNELS);
        let mut buf = [0.0f32; MAX_LUT_CHANNELS];
        for (b, &x) in buf.iter_mut().zip(input).take(n_in) {
            *b = x;
        }

        match self.direction {
            LutDirection::AToB => {
                apply_curves(self.a_curves.as_deref(), &mut buf[..n_in]);
                self.apply_clut(&mut buf, n_in, n_out, method);
                apply_curves(self.m_curves.as_deref(), &mut buf[..n_out]);
                self.apply_matrix(&mut buf[..n_out]);
                apply_curves(self.b_curves.as_deref(), &mut buf[..n_out]);
            }
            LutDirection::BToA => {
                apply_curves(self.b_curves.as_deref(), &mut buf[..n_in]);
                self.apply_matrix(&mut buf[..n_in]);
                apply_curves(self.m_curves.as_deref(), &mut buf[..n_in]);
                self.apply_clut(&mut buf, n_in, n_out, method);
                apply_curves(self.a_curves.as_deref(), &mut buf[..n_out]);
            }
        }

        for (o, &b) in out.iter_mut().zip(&buf[..n_out]) {
            *o = b;
        }
    }

    fn apply_clut(
        &self,
        buf: &mut [f32; MAX_LUT_CHANNELS],
        n_in: usize,
        n_out: usize,
        method: Interpolation,
    ) {
        if let Some(clut) = &self.clut {
            let mut tmp = [0.0f32; MAX_LUT_CHANNELS];
            clut.interpolate(&buf[..n_in], &mut tmp[..n_out], method);
            *buf = tmp;
        } else {
            for b in buf.iter_mut().skip(n_in) {
                *b = 0.0;
            }
        }
    }

    fn apply_matrix(&self, buf: &mut [f32]) {
        let (Some(m), 3) = (&self.matrix, buf.len()) else {
            return;
        };
        let v = [buf[0], buf[1], buf[2]];
        for (row, b) in buf.iter_mut().enumerate() {
            *b = m[row * 3] * v[0] + m[row * 3 + 1] * v[1] + m[row * 3 + 2] * v[2] + m[9 + row];
        }
    }
}

fn apply_curves(curves: Option<&[Curve]>, buf: &mut [f32]) {
    if let Some(curves) = curves {
        for (b, curve) in buf.iter_mut().zip(curves) {
            *b = curve.eval(*b);
        }
    }
}

/// Read a set of `count` curves at `offset`, each starting 4-byte aligned
fn read_curve_set(data: &[u8], offset: usize, count: usize) -> Result<Vec<Curve>, ParseError> {
    let mut r = ByteReader::new(data);
    r.seek_to(offset)?;
    check_count(count, 12, r.remaining())?;
    let mut curves = Vec::with_capacity(count);
    for i in 0..count {
        if i > 0 {
            let aligned = r.position().next_multiple_of(4).min(data.len());
            r.seek_to(aligned)?;
        }
        curves.push(Curve::read(&mut r)?);
    }
    Ok(curves)
}

fn pad_from(out: &mut Vec<u8>, base: usize) {
    while (out.len() - base) % 4 != 0 {
        out.push(0);
    }
}

impl Tag for LutAbTag {
    fn type_sig(&self) -> TypeSignature {
        match self.direction {
            LutDirection::AToB => TypeSignature::LUTA2B,
            LutDirection::BToA => TypeSignature::LUTB2A,
        }
    }

    fn read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = ByteReader::new(data);
        let sig = TypeSignature(r.u32()?);
        self.direction = match sig {
            TypeSignature::LUTA2B => LutDirection::AToB,
            TypeSignature::LUTB2A => LutDirection::BToA,
            other => {
                return Err(ParseError::TypeMismatch {
                    expected: self.type_sig().0,
                    actual: other.0,
                });
            }
        };
        r.skip(4)?;

        let inputs = r.u8()?;
        let outputs = r.u8()?;
        r.skip(2)?;
        if inputs == 0
            || inputs as usize > MAX_LUT_CHANNELS
            || outputs == 0
            || outputs as usize > MAX_LUT_CHANNELS
        {
            return Err(ParseError::CorruptedData(format!(
                "LUT channel counts {} -> {} out of range",
                inputs, outputs
            )));
        }
        self.input_channels = inputs;
        self.output_channels = outputs;

        let off_b = r.u32()? as usize;
        let off_matrix = r.u32()? as usize;
        let off_m = r.u32()? as usize;
        let off_clut = r.u32()? as usize;
        let off_a = r.u32()? as usize;

        let b_side = self.b_side();
        let a_side = self.a_side();

        self.b_curves = match off_b {
            0 => None,
            off => Some(read_curve_set(data, off, b_side)?),
        };
        self.m_curves = match off_m {
            0 => None,
            off => Some(read_curve_set(data, off, b_side)?),
        };
        self.a_curves = match off_a {
            0 => None,
            off => Some(read_curve_set(data, off, a_side)?),
        };
        self.matrix = match off_matrix {
            0 => None,
            off => {
                r.seek_to(off)?;
                let mut m = [0.0f32; 12];
                for v in m.iter_mut() {
                    *v = r.s15f16()?;
                }
                Some(m)
            }
        };
        self.clut = match off_clut {
            0 => None,
            off => {
                r.seek_to(off)?;
                Some(ClutTable::read_ab(&mut r, inputs as usize, outputs as usize)?)
            }
        };
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        let base = out.len();
        write_type_header(out, self.type_sig());
        out.put_u8(self.input_channels);
        out.put_u8(self.output_channels);
        out.put_u16(0);
        let offsets_at = out.len();
        out.put_zeros(20);

        let mut offsets = [0u32; 5];
        let mut record = |out: &mut Vec<u8>, slot: usize| -> Result<(), WriteError> {
            pad_from(out, base);
            offsets[slot] = u32::try_from(out.len() - base)
                .map_err(|_| WriteError::TooLarge(out.len() - base))?;
            Ok(())
        };

        if let Some(curves) = &self.b_curves {
            record(out, 0)?;
            for c in curves {
                pad_from(out, base);
                c.write(out)?;
            }
        }
        if let Some(m) = &self.matrix {
            record(out, 1)?;
            for &v in m {
                out.put_s15f16(v);
            }
        }
        if let Some(curves) = &self.m_curves {
            record(out, 2)?;
            for c in curves {
                pad_from(out, base);
                c.write(out)?;
            }
        }
        if let Some(clut) = &self.clut {
            if !clut.is_consistent() {
                return Err(WriteError::tag(self.type_sig().0, "CLUT size does not match its grid"));
            }
            record(out, 3)?;
            clut.write_ab(out)?;
        }
        if let Some(curves) = &self.a_curves {
            record(out, 4)?;
            for c in curves {
                pad_from(out, base);
                c.write(out)?;
            }
        }

        for (i, off) in offsets.iter().enumerate() {
            let at = offsets_at + i * 4;
            out[at..at + 4].copy_from_slice(&off.to_be_bytes());
        }
        Ok(())
    }

    fn describe(&self, verbosity: u32) -> String {
        let present = |b: bool| if b { "yes" } else { "no" };
        let mut s = format!(
            "{} LUT, {} -> {} channels\nB curves: {}, matrix: {}, M curves: {}, CLUT: {}, A curves: {}\n",
            match self.direction {
                LutDirection::AToB => "AToB",
                LutDirection::BToA => "BToA",
            },
            self.input_channels,
            self.output_channels,
            present(self.b_curves.is_some()),
            present(self.matrix.is_some()),
            present(self.m_curves.is_some()),
            present(self.clut.is_some()),
            present(self.a_curves.is_some()),
        );
        if verbosity > 25 {
            if let Some(clut) = &self.clut {
                s.push_str(&format!(
                    "CLUT grid {:?}, {}-byte samples\n",
                    clut.grid, clut.precision
                ));
            }
            if let Some(m) = &self.matrix {
                s.push_str(&format!("Matrix: {:?}\n", m));
            }
        }
        s
    }

    fn validate(&self, ctx: &TagContext<'_>, report: &mut ValidationReport) {
        check_channels(
            ctx,
            self.input_channels as usize,
            self.output_channels as usize,
            report,
        );
        if self.b_curves.is_none() {
            report.tag_content(
                Check::TagContents,
                ctx.signature,
                Severity::NonCompliant,
                "B curves are required",
            );
        }
        if self.matrix.is_some() && self.m_curves.is_none() {
            report.tag_content(
                Check::TagContents,
                ctx.signature,
                Severity::NonCompliant,
                "matrix present without M curves",
            );
        }
        if self.matrix.is_some() && self.b_side() != 3 {
            report.tag_content(
                Check::TagContents,
                ctx.signature,
                Severity::NonCompliant,
                format!("matrix needs 3 channels, found {}", self.b_side()),
            );
        }
        if self.clut.is_some() != self.a_curves.is_some() {
            report.tag_content(
                Check::TagContents,
                ctx.signature,
                Severity::NonCompliant,
                "CLUT and A curves must appear together",
            );
        }
        if self.clut.is_none() && self.input_channels != self.output_channels {
            report.tag_content(
                Check::TagContents,
                ctx.signature,
                Severity::NonCompliant,
                "channel counts differ but there is no CLUT",
            );
        }
        if let Some(clut) = &self.clut {
            if clut.grid.iter().any(|&g| g < 2) {
                report.tag_content(
                    Check::TagContents,
                    ctx.signature,
                    Severity::Warning,
                    "CLUT has fewer than 2 grid points in some dimension",
                );
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn Tag> {
        Box::new(self.clone())
    }
}

fn check_channels(ctx: &TagContext<'_>, inputs: usize, outputs: usize, report: &mut ValidationReport) {
    let Some((want_in, want_out)) = ctx.expected_channels() else {
        return;
    };
    if want_in != 0 && want_in != inputs {
        report.tag_content(
            Check::TagContents,
            ctx.signature,
            Severity::NonCompliant,
            format!("{} input channels, header implies {}", inputs, want_in),
        );
    }
    if want_out != 0 && want_out != outputs {
        report.tag_content(
            Check::TagContents,
            ctx.signature,
            Severity::NonCompliant,
            format!("{} output channels, header implies {}", outputs, want_out),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icc::tags::CurveTag;

    fn identity_ab(direction: LutDirection, channels: u8) -> LutAbTag {
        let curves = || Some(vec![Curve::default(); channels as usize]);
        let mut lut = LutAbTag::new(direction, channels, channels);
        lut.b_curves = curves();
        lut.a_curves = curves();
        lut.clut = Some(ClutTable::identity(channels as usize, 3, 2));
        lut
    }

    #[test]
    fn test_lut16_roundtrip() {
        let mut lut = LutTag::new(LutPrecision::Sixteen);
        lut.input_tables = vec![LutCurve::identity(2); 3];
        lut.output_tables = vec![LutCurve::identity(2); 3];
        lut.clut = ClutTable::identity(3, 2, 2);

        let bytes = (&lut as &dyn Tag).to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"mft2");
        // header 52 + 3*2*2 input + 8*3*2 clut + 3*2*2 output
        assert_eq!(bytes.len(), 52 + 12 + 48 + 12);

        let mut parsed = LutTag::new(LutPrecision::Eight);
        parsed.read(&bytes).unwrap();
        assert_eq!(parsed.precision, LutPrecision::Sixteen);
        assert_eq!(parsed, lut);
    }

    #[test]
    fn test_lut8_identity_eval() {
        let mut lut = LutTag::new(LutPrecision::Eight);
        lut.input_tables = vec![LutCurve::identity(256); 3];
        lut.output_tables = vec![LutCurve::identity(256); 3];
        lut.clut = ClutTable::identity(3, 2, 1);

        let bytes = (&lut as &dyn Tag).to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"mft1");
        assert_eq!(bytes.len(), 48 + 3 * 256 + 8 * 3 + 3 * 256);

        let mut parsed = LutTag::new(LutPrecision::Eight);
        parsed.read(&bytes).unwrap();
        let mut out = [0.0f32; 3];
        parsed.eval(ColorSpace::Rgb, &[0.2, 0.5, 0.8], &mut out, Interpolation::Tetrahedral);
        for (o, e) in out.iter().zip([0.2, 0.5, 0.8]) {
            assert!((o - e).abs() < 0.01, "{:?}", out);
        }
    }

    #[test]
    fn test_lut_matrix_only_for_xyz_input() {
        let mut lut = LutTag::new(LutPrecision::Sixteen);
        lut.input_tables = vec![LutCurve::identity(2); 3];
        lut.output_tables = vec![LutCurve::identity(2); 3];
        lut.clut = ClutTable::identity(3, 2, 2);
        // swap the first two channels
        lut.matrix = [0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0];

        let input = [0.25f32, 0.75, 0.5];
        let mut out = [0.0f32; 3];
        lut.eval(ColorSpace::Xyz, &input, &mut out, Interpolation::Linear);
        for (o, e) in out.iter().zip([0.75, 0.25, 0.5]) {
            assert!((o - e).abs() < 1e-4, "{:?}", out);
        }

        for space in [ColorSpace::Rgb, ColorSpace::Lab] {
            lut.eval(space, &input, &mut out, Interpolation::Linear);
            for (o, e) in out.iter().zip(input) {
                assert!((o - e).abs() < 1e-4, "{:?} {:?}", space, out);
            }
        }
    }

    #[test]
    fn test_lut16_rejects_huge_grid() {
        let mut data = b"mft2\0\0\0\0".to_vec();
        data.extend_from_slice(&[15, 15, 255, 0]);
        data.extend_from_slice(&[0; 36]);
        data.extend_from_slice(&[0, 2, 0, 2]);
        data.extend_from_slice(&[0; 64]);
        let mut lut = LutTag::new(LutPrecision::Sixteen);
        assert!(lut.read(&data).is_err());
    }

    #[test]
    fn test_lutab_roundtrip_offsets() {
        let mut lut = identity_ab(LutDirection::AToB, 3);
        lut.m_curves = Some(vec![Curve::Sampled(CurveTag::Gamma(1.0)); 3]);
        lut.matrix = Some([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);

        let bytes = (&lut as &dyn Tag).to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"mAB ");
        // B curves start right after the 32-byte header, relative to the tag start
        assert_eq!(u32::from_be_bytes(bytes[12..16].try_into().unwrap()), 32);

        let mut parsed = LutAbTag::new(LutDirection::BToA, 1, 1);
        parsed.read(&bytes).unwrap();
        assert_eq!(parsed.direction, LutDirection::AToB);
        assert_eq!(parsed.b_curves, lut.b_curves);
        assert_eq!(parsed.m_curves, lut.m_curves);
        assert_eq!(parsed.matrix, lut.matrix);
        assert_eq!((&parsed as &dyn Tag).to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_lutab_identity_eval() {
        for direction in [LutDirection::AToB, LutDirection::BToA] {
            let lut = identity_ab(direction, 3);
            for v in [0.0f32, 0.5, 1.0] {
                let mut out = [0.0f32; 3];
                lut.eval(&[v, v, v], &mut out, Interpolation::Linear);
                for o in out {
                    assert!((o - v).abs() < 1e-4, "{:?} {} -> {:?}", direction, v, out);
                }
            }
        }
    }

    #[test]
    fn test_lutab_nan_does_not_panic() {
        let lut = identity_ab(LutDirection::AToB, 4);
        let mut out = [0.0f32; 4];
        lut.eval(
            &[f32::NAN, f32::INFINITY, -0.1, 1.1],
            &mut out,
            Interpolation::Tetrahedral,
        );
        assert!(out.iter().all(|v| v.is_nan()), "{:?}", out);

        lut.eval(&[-0.1, 1.1, f32::INFINITY, 0.5], &mut out, Interpolation::Tetrahedral);
        assert_eq!(&out[..3], &[0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_lutab_offset_out_of_bounds() {
        let lut = identity_ab(LutDirection::AToB, 3);
        let mut bytes = (&lut as &dyn Tag).to_bytes().unwrap();
        bytes[12..16].copy_from_slice(&0xFFFF_FF00u32.to_be_bytes());
        let mut parsed = LutAbTag::new(LutDirection::AToB, 1, 1);
        assert!(parsed.read(&bytes).is_err());
    }

    #[test]
    fn test_clut_identity_shape() {
        let clut = ClutTable::identity(3, 17, 2);
        assert_eq!(clut.data.len(), 17 * 17 * 17 * 3);
        assert!(clut.is_consistent());
    }
}
