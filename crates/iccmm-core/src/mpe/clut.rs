//! Float CLUT element ('clut')

use std::any::Any;

use super::{ApplyContext, Element, read_element_header, write_element_header};
use crate::error::EvaluationFault;
use crate::icc::error::{ParseError, WriteError};
use crate::icc::tags::ClutTable;
use crate::icc::types::{TagSignature, TypeSignature};
use crate::icc::validate::{Check, Severity, ValidationReport};
use crate::io::ByteReader;

/// Grid dimensions a CLUT element can describe
const MAX_CLUT_INPUTS: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct ClutElement {
    pub table: ClutTable,
}

impl Default for ClutElement {
    fn default() -> Self {
        Self {
            table: ClutTable::new(Vec::new(), 0, Vec::new(), 4),
        }
    }
}

impl ClutElement {
    pub fn new(table: ClutTable) -> Self {
        Self {
            table: ClutTable {
                precision: 4,
                ..table
            },
        }
    }
}

impl Element for ClutElement {
    fn type_sig(&self) -> TypeSignature {
        TypeSignature::CLUT
    }

    fn input_channels(&self) -> usize {
        self.table.inputs()
    }

    fn output_channels(&self) -> usize {
        self.table.outputs
    }

    fn read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = ByteReader::new(data);
        let (inputs, outputs) = read_element_header(&mut r, TypeSignature::CLUT)?;
        if inputs == 0 || inputs > MAX_CLUT_INPUTS || outputs == 0 {
            return Err(ParseError::CorruptedData(format!(
                "CLUT element maps {} channels to {}",
                inputs, outputs
            )));
        }
        let dims = r.bytes(16)?;
        let grid = dims[..inputs].to_vec();
        let count = ClutTable::checked_len(&grid, outputs, 4, r.remaining())?;
        let data = ClutTable::read_samples(&mut r, count, 4)?;
        self.table = ClutTable::new(grid, outputs, data, 4);
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        if !self.table.is_consistent() || self.table.inputs() > MAX_CLUT_INPUTS {
            return Err(WriteError::tag(
                TypeSignature::CLUT.0,
                "CLUT size does not match its grid",
            ));
        }
        write_element_header(
            out,
            TypeSignature::CLUT,
            self.table.inputs(),
            self.table.outputs,
        )?;
        let mut dims = [0u8; 16];
        for (d, &g) in dims.iter_mut().zip(&self.table.grid) {
            *d = g;
        }
        out.extend_from_slice(&dims);
        self.table.write_samples(out)
    }

    fn describe(&self, _verbosity: u32) -> String {
        format!(
            "CLUT, {} -> {} channels, grid {:?}\n",
            self.table.inputs(),
            self.table.outputs,
            self.table.grid
        )
    }

    fn validate(&self, tag: TagSignature, report: &mut ValidationReport) {
        if self.table.grid.iter().any(|&g| g < 2) {
            report.tag_content(
                Check::TagContents,
                tag,
                Severity::Warning,
                "CLUT element has fewer than 2 grid points in some dimension",
            );
        }
    }

    fn apply(
        &self,
        ctx: &mut ApplyContext,
        dst: &mut [f32],
        src: &[f32],
    ) -> Result<(), EvaluationFault> {
        self.table.interpolate(src, dst, ctx.interpolation);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn Element> {
        Box::new(self.clone())
    }
}
