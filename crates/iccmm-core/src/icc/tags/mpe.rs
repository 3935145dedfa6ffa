//! multiProcessElementType ('mpet')
//!
//! Header, u16 input and output channel counts, an element count, then a
//! position table with one (offset, size) pair per element. Offsets are
//! relative to the start of the tag.

use std::any::Any;
use std::sync::Arc;

use super::{check_count, read_type_header, write_type_header, Tag, TagContext};
use crate::error::EvaluationFault;
use crate::icc::error::{ParseError, WriteError};
use crate::icc::types::TypeSignature;
use crate::icc::validate::{Check, Severity, ValidationReport};
use crate::io::{BeWrite, ByteReader};
use crate::mpe::{apply_chain, read_positions, write_positioned, ApplyContext, Element, ElementRegistry};

#[derive(Debug, Clone)]
pub struct MultiProcessElementTag {
    registry: Arc<ElementRegistry>,
    pub input_channels: usize,
    pub output_channels: usize,
    pub elements: Vec<Box<dyn Element>>,
}

impl MultiProcessElementTag {
    pub fn new(registry: Arc<ElementRegistry>) -> Self {
        Self {
            registry,
            input_channels: 0,
            output_channels: 0,
            elements: Vec::new(),
        }
    }

    /// Build a chain whose channel counts come from its first and last
    /// elements
    pub fn from_elements(registry: Arc<ElementRegistry>, elements: Vec<Box<dyn Element>>) -> Self {
        let input_channels = elements.first().map_or(0, |e| e.input_channels());
        let output_channels = elements.last().map_or(0, |e| e.output_channels());
        Self {
            registry,
            input_channels,
            output_channels,
            elements,
        }
    }

    /// First element whose input does not match the previous output,
    /// as (index, expected, actual)
    pub fn chain_mismatch(&self) -> Option<(usize, usize, usize)> {
        let mut channels = self.input_channels;
        for (i, element) in self.elements.iter().enumerate() {
            if element.input_channels() != channels {
                return Some((i, channels, element.input_channels()));
            }
            channels = element.output_channels();
        }
        if channels != self.output_channels {
            return Some((self.elements.len(), self.output_channels, channels));
        }
        None
    }

    /// Evaluate one color through every element
    pub fn apply(
        &self,
        ctx: &mut ApplyContext,
        dst: &mut [f32],
        src: &[f32],
    ) -> Result<(), EvaluationFault> {
        let n = self.input_channels.min(src.len());
        apply_chain(&self.elements, ctx, dst, &src[..n])
    }
}

impl Tag for MultiProcessElementTag {
    fn type_sig(&self) -> TypeSignature {
        TypeSignature::MPET
    }

    fn read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = ByteReader::new(data);
        read_type_header(&mut r, TypeSignature::MPET)?;
        let inputs = r.u16()? as usize;
        let outputs = r.u16()? as usize;
        let count = r.u32()? as usize;
        if count == 0 {
            return Err(ParseError::CorruptedData("empty element chain".into()));
        }
        check_count(count, 8, r.remaining())?;
        let regions = read_positions(&mut r, data, count)?;
        let elements = regions
            .into_iter()
            .map(|region| self.registry.read_element(region))
            .collect::<Result<Vec<_>, _>>()?;

        self.input_channels = inputs;
        self.output_channels = outputs;
        self.elements = elements;
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        let narrow = |n: usize| {
            u16::try_from(n).map_err(|_| WriteError::tag(TypeSignature::MPET.0, "too many channels"))
        };
        let base = out.len();
        write_type_header(out, TypeSignature::MPET);
        out.put_u16(narrow(self.input_channels)?);
        out.put_u16(narrow(self.output_channels)?);
        out.put_u32(self.elements.len() as u32);
        let table_at = out.len();
        out.put_zeros(self.elements.len() * 8);

        let parts = self
            .elements
            .iter()
            .map(|e| {
                let mut bytes = Vec::new();
                e.write(&mut bytes)?;
                Ok(bytes)
            })
            .collect::<Result<Vec<_>, WriteError>>()?;
        write_positioned(out, base, table_at, &parts)
    }

    fn describe(&self, verbosity: u32) -> String {
        let mut s = format!(
            "Multi-process element chain, {} -> {} channels, {} elements\n",
            self.input_channels,
            self.output_channels,
            self.elements.len()
        );
        for (i, element) in self.elements.iter().enumerate() {
            s.push_str(&format!(
                "[{}] {}: {}",
                i,
                self.registry.type_name(element.type_sig()),
                element.describe(verbosity)
            ));
        }
        s
    }

    fn validate(&self, ctx: &TagContext<'_>, report: &mut ValidationReport) {
        if let Some((index, expected, actual)) = self.chain_mismatch() {
            report.tag_content(
                Check::TagContents,
                ctx.signature,
                Severity::NonCompliant,
                format!(
                    "element {} sees {} channels where {} are expected",
                    index, actual, expected
                ),
            );
        }
        if let Some((device_in, device_out)) = ctx.expected_channels() {
            if (device_in, device_out) != (self.input_channels, self.output_channels) {
                report.tag_content(
                    Check::TagContents,
                    ctx.signature,
                    Severity::NonCompliant,
                    format!(
                        "chain maps {} -> {} channels, profile spaces need {} -> {}",
                        self.input_channels, self.output_channels, device_in, device_out
                    ),
                );
            }
        }
        for element in &self.elements {
            element.validate(ctx.signature, report);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn Tag> {
        Box::new(self.clone())
    }
}
