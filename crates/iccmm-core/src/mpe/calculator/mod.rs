//! Calculator element ('calc')
//!
//! Layout: the 12-byte element header, a u32 sub-element count, then a
//! position table holding the main function followed by each
//! sub-element. The main function is a 'func' block of 8-byte
//! operations. Positions are relative to the start of the element.

mod eval;
pub mod ops;

use std::any::Any;
use std::fmt::Write as _;
use std::sync::Arc;

pub use ops::Op;

use super::{
    read_element_header, read_positions, write_element_header, write_positioned, ApplyContext,
    Element, ElementRegistry,
};
use crate::error::EvaluationFault;
use crate::icc::error::{ParseError, WriteError};
use crate::icc::tags::check_count;
use crate::icc::types::{TagSignature, TypeSignature};
use crate::icc::validate::{Check, Severity, ValidationReport};
use crate::io::{BeWrite, ByteReader};

#[derive(Debug, Clone)]
pub struct CalculatorElement {
    registry: Arc<ElementRegistry>,
    nesting: usize,
    inputs: usize,
    outputs: usize,
    program: Vec<Op>,
    subs: Vec<Box<dyn Element>>,
    temps: usize,
}

impl CalculatorElement {
    /// Empty calculator; sub-elements are read through `registry`
    pub fn new(registry: Arc<ElementRegistry>) -> Self {
        Self {
            registry,
            nesting: 0,
            inputs: 0,
            outputs: 0,
            program: Vec::new(),
            subs: Vec::new(),
            temps: 0,
        }
    }

    pub fn with_program(
        registry: Arc<ElementRegistry>,
        inputs: usize,
        outputs: usize,
        program: Vec<Op>,
        subs: Vec<Box<dyn Element>>,
    ) -> Self {
        let temps = eval::temp_count(&program);
        Self {
            registry,
            nesting: 0,
            inputs,
            outputs,
            program,
            subs,
            temps,
        }
    }

    pub fn program(&self) -> &[Op] {
        &self.program
    }

    pub fn sub_elements(&self) -> &[Box<dyn Element>] {
        &self.subs
    }

    fn read_function(data: &[u8]) -> Result<Vec<Op>, ParseError> {
        let mut r = ByteReader::new(data);
        let sig = r.u32()?;
        if sig != TypeSignature::FUNCTION.0 {
            return Err(ParseError::TypeMismatch {
                expected: TypeSignature::FUNCTION.0,
                actual: sig,
            });
        }
        r.skip(4)?;
        let count = r.u32()? as usize;
        check_count(count, 8, r.remaining())?;
        Ok(r.array_of(count, 8, |r| Ok(Op::new(r.u32()?, r.u32()?)))?)
    }

    fn write_function(&self) -> Result<Vec<u8>, WriteError> {
        let count = u32::try_from(self.program.len())
            .map_err(|_| WriteError::tag(TypeSignature::CALCULATOR.0, "program too long"))?;
        let mut out = Vec::with_capacity(12 + self.program.len() * 8);
        out.put_u32(TypeSignature::FUNCTION.0);
        out.put_u32(0);
        out.put_u32(count);
        for op in &self.program {
            out.put_u32(op.sig);
            out.put_u32(op.data);
        }
        Ok(out)
    }

    fn listing(&self, indent: usize, s: &mut String) {
        let mut ends: Vec<usize> = Vec::new();
        for (pc, op) in self.program.iter().enumerate() {
            ends.retain(|&end| end > pc);
            let _ = writeln!(s, "{:indent$}{:5}: {}", "", pc, op, indent = indent + ends.len() * 2);
            if op.sig == ops::IF || op.sig == ops::SEL {
                if let Some(end) = block_end(&self.program, pc) {
                    ends.push(end);
                }
            }
        }
    }
}

/// End of the construct whose header is at `pc`, for indenting listings
fn block_end(program: &[Op], pc: usize) -> Option<usize> {
    let mut next = pc + 1;
    let mut total = program[pc].data as usize * usize::from(program[pc].sig == ops::IF);
    while let Some(op) = program.get(next) {
        if !matches!(op.sig, ops::ELSE | ops::CASE | ops::DFLT) {
            break;
        }
        total = total.saturating_add(op.data as usize);
        next += 1;
    }
    next.checked_add(total)
}

impl Element for CalculatorElement {
    fn type_sig(&self) -> TypeSignature {
        TypeSignature::CALCULATOR
    }

    fn input_channels(&self) -> usize {
        self.inputs
    }

    fn output_channels(&self) -> usize {
        self.outputs
    }

    fn read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = ByteReader::new(data);
        let (inputs, outputs) = read_element_header(&mut r, TypeSignature::CALCULATOR)?;
        let sub_count = r.u32()? as usize;
        check_count(sub_count.saturating_add(1), 8, r.remaining())?;
        let regions = read_positions(&mut r, data, sub_count + 1)?;

        let program = Self::read_function(regions[0])?;
        let subs = regions[1..]
            .iter()
            .map(|region| self.registry.read_nested(region, self.nesting + 1))
            .collect::<Result<Vec<_>, _>>()?;

        self.inputs = inputs;
        self.outputs = outputs;
        self.temps = eval::temp_count(&program);
        self.program = program;
        self.subs = subs;
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        let base = out.len();
        write_element_header(out, TypeSignature::CALCULATOR, self.inputs, self.outputs)?;
        let sub_count = u32::try_from(self.subs.len())
            .map_err(|_| WriteError::tag(TypeSignature::CALCULATOR.0, "too many sub-elements"))?;
        out.put_u32(sub_count);
        let table_at = out.len();
        out.put_zeros((self.subs.len() + 1) * 8);

        let mut parts = Vec::with_capacity(self.subs.len() + 1);
        parts.push(self.write_function()?);
        for sub in &self.subs {
            let mut bytes = Vec::new();
            sub.write(&mut bytes)?;
            parts.push(bytes);
        }
        write_positioned(out, base, table_at, &parts)
    }

    fn describe(&self, verbosity: u32) -> String {
        let mut s = format!(
            "Calculator, {} -> {} channels, {} operations, {} sub-elements\n",
            self.inputs,
            self.outputs,
            self.program.len(),
            self.subs.len()
        );
        if verbosity > 25 {
            for (i, sub) in self.subs.iter().enumerate() {
                let _ = write!(s, "  sub-element {}: {}", i, sub.describe(verbosity));
            }
            if let Ok(shape) = eval::check(&self.program, &self.subs, self.inputs, self.outputs) {
                let _ = writeln!(s, "  stack depth up to {}", shape.max_stack);
            }
            self.listing(2, &mut s);
        }
        s
    }

    fn validate(&self, tag: TagSignature, report: &mut ValidationReport) {
        match eval::check(&self.program, &self.subs, self.inputs, self.outputs) {
            Ok(shape) => {
                if shape.min_final > 0 {
                    report.tag_content(
                        Check::TagContents,
                        tag,
                        Severity::Warning,
                        format!("calculator leaves {} values on the stack", shape.min_final),
                    );
                }
            }
            Err(fault) => report.tag_content(
                Check::TagContents,
                tag,
                Severity::NonCompliant,
                format!("calculator operation {}: {}", fault.pc, fault.message),
            ),
        }
        if !self.program.iter().any(|op| op.sig == ops::OUT) && self.outputs > 0 {
            report.tag_content(
                Check::TagContents,
                tag,
                Severity::Warning,
                "calculator never writes its outputs",
            );
        }
        for sub in &self.subs {
            sub.validate(tag, report);
        }
    }

    fn apply(
        &self,
        ctx: &mut ApplyContext,
        dst: &mut [f32],
        src: &[f32],
    ) -> Result<(), EvaluationFault> {
        let n = self.inputs.min(src.len());
        let m = self.outputs.min(dst.len());
        eval::execute(&self.program, &self.subs, self.temps, ctx, &mut dst[..m], &src[..n])
    }

    fn set_nesting(&mut self, depth: usize) {
        self.nesting = depth;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn Element> {
        Box::new(self.clone())
    }
}
