//! Matrix element ('matf')
//!
//! Q outputs from P inputs: out[i] = sum_j m[i*P + j] * in[j] + offset[i].

use std::any::Any;

use super::{ApplyContext, Element, read_element_header, write_element_header};
use crate::error::EvaluationFault;
use crate::icc::error::{ParseError, WriteError};
use crate::icc::tags::check_count;
use crate::icc::types::{TagSignature, TypeSignature};
use crate::icc::validate::{Check, Severity, ValidationReport};
use crate::io::{BeWrite, ByteReader};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatrixElement {
    pub inputs: usize,
    pub outputs: usize,
    /// Row-major, `outputs` rows of `inputs` columns
    pub matrix: Vec<f32>,
    pub offsets: Vec<f32>,
}

impl MatrixElement {
    pub fn new(inputs: usize, outputs: usize, matrix: Vec<f32>, offsets: Vec<f32>) -> Self {
        Self {
            inputs,
            outputs,
            matrix,
            offsets,
        }
    }

    pub fn identity(channels: usize) -> Self {
        let mut matrix = vec![0.0; channels * channels];
        for i in 0..channels {
            matrix[i * channels + i] = 1.0;
        }
        Self::new(channels, channels, matrix, vec![0.0; channels])
    }
}

impl Element for MatrixElement {
    fn type_sig(&self) -> TypeSignature {
        TypeSignature::MATRIX
    }

    fn input_channels(&self) -> usize {
        self.inputs
    }

    fn output_channels(&self) -> usize {
        self.outputs
    }

    fn read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = ByteReader::new(data);
        let (inputs, outputs) = read_element_header(&mut r, TypeSignature::MATRIX)?;
        let count = inputs * outputs;
        check_count(count + outputs, 4, r.remaining())?;
        self.matrix = r.array_of(count, 4, |r| r.f32())?;
        self.offsets = r.array_of(outputs, 4, |r| r.f32())?;
        self.inputs = inputs;
        self.outputs = outputs;
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        if self.matrix.len() != self.inputs * self.outputs || self.offsets.len() != self.outputs {
            return Err(WriteError::tag(
                TypeSignature::MATRIX.0,
                "matrix size does not match channel counts",
            ));
        }
        write_element_header(out, TypeSignature::MATRIX, self.inputs, self.outputs)?;
        for &v in self.matrix.iter().chain(&self.offsets) {
            out.put_f32(v);
        }
        Ok(())
    }

    fn describe(&self, verbosity: u32) -> String {
        let mut s = format!("Matrix, {} -> {} channels\n", self.inputs, self.outputs);
        if verbosity > 25 {
            for (row, offset) in self.matrix.chunks(self.inputs.max(1)).zip(&self.offsets) {
                let cells: Vec<String> = row.iter().map(|v| format!("{:10.6}", v)).collect();
                s.push_str(&format!("  {}  + {:10.6}\n", cells.join(" "), offset));
            }
        }
        s
    }

    fn validate(&self, tag: TagSignature, report: &mut ValidationReport) {
        if self.matrix.iter().chain(&self.offsets).any(|v| !v.is_finite()) {
            report.tag_content(
                Check::TagContents,
                tag,
                Severity::Warning,
                "matrix holds non-finite values",
            );
        }
    }

    fn apply(
        &self,
        _ctx: &mut ApplyContext,
        dst: &mut [f32],
        src: &[f32],
    ) -> Result<(), EvaluationFault> {
        let p = self.inputs;
        for (i, d) in dst.iter_mut().take(self.outputs).enumerate() {
            let row = self.matrix.get(i * p..(i + 1) * p).unwrap_or_default();
            let sum: f32 = row.iter().zip(src).map(|(m, x)| m * x).sum();
            *d = sum + self.offsets.get(i).copied().unwrap_or(0.0);
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

    #[test]
    fn test_matrix_apply() {
        let m = MatrixElement::new(3, 1, vec![0.25, 0.5, 0.25], vec![0.1]);
        let mut out = [0.0f32];
        m.apply(&mut ApplyContext::default(), &mut out, &[1.0, 1.0, 1.0])
            .unwrap();
        assert!((out[0] - 1.1).abs() < 1e-6);
    }

    #[test]
    fn test_matrix_roundtrip() {
        let m = MatrixElement::identity(3);
        let mut bytes = Vec::new();
        m.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 12 + 4 * 12);
        let mut parsed = MatrixElement::default();
        parsed.read(&bytes).unwrap();
        assert_eq!(parsed, m);
    }

    #[test]
    fn test_matrix_truncated() {
        let bytes = b"matf\0\0\0\0\0\x03\0\x03\0\0\0\0";
        let mut m = MatrixElement::default();
        assert!(m.read(bytes).is_err());
    }
}
