//! Multi-process elements
//!
//! An MPE chain is an ordered list of float stages, each consuming N
//! channels and producing M. Element types:
//! - cvst: a set of segmented curves, one per channel
//! - matf: matrix plus offset
//! - clut: float CLUT
//! - calc: calculator program with optional sub-elements
//!
//! Elements are created by type signature through an [`ElementRegistry`].
//! Unknown types become an [`OpaqueElement`] that keeps its bytes.
//!
//! Offsets inside an element are relative to the element's first byte.
//!
//! See ICC.1:2022 Section 11 and ICC.2 Section 11.

pub mod calculator;
mod clut;
mod curves;
mod matrix;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub use calculator::CalculatorElement;
pub use clut::ClutElement;
pub use curves::{CurveSegment, CurveSetElement, SegmentedCurve};
pub use matrix::MatrixElement;

use crate::error::EvaluationFault;
use crate::icc::error::{ParseError, WriteError};
use crate::icc::types::{TagSignature, TypeSignature};
use crate::icc::validate::{Check, Severity, ValidationReport};
use crate::io::{BeWrite, ByteReader};
use crate::math::interpolation::Interpolation;

/// Operations allowed per apply across all calculators in a chain
pub const DEFAULT_INSTRUCTION_BUDGET: usize = 65_536;

/// Deepest allowed calculator-in-calculator nesting
pub const MAX_NESTING_DEPTH: usize = 16;

/// Per-apply evaluation state shared by every element in a chain
#[derive(Debug, Clone)]
pub struct ApplyContext {
    pub interpolation: Interpolation,
    pub budget: usize,
    pub max_depth: usize,
    /// Operations executed so far in this apply
    pub executed: usize,
    /// Current calculator nesting
    pub depth: usize,
}

impl ApplyContext {
    pub fn new(interpolation: Interpolation) -> Self {
        Self {
            interpolation,
            budget: DEFAULT_INSTRUCTION_BUDGET,
            max_depth: MAX_NESTING_DEPTH,
            executed: 0,
            depth: 0,
        }
    }

    pub fn with_limits(mut self, budget: usize, max_depth: usize) -> Self {
        self.budget = budget;
        self.max_depth = max_depth;
        self
    }

    /// Clear the counters before the next pixel
    pub fn reset(&mut self) {
        self.executed = 0;
        self.depth = 0;
    }
}

impl Default for ApplyContext {
    fn default() -> Self {
        Self::new(Interpolation::default())
    }
}

/// A processing element
pub trait Element: fmt::Debug + Send + Sync {
    fn type_sig(&self) -> TypeSignature;

    fn input_channels(&self) -> usize;

    fn output_channels(&self) -> usize;

    /// Parse from the element's bytes, starting at its type signature
    fn read(&mut self, data: &[u8]) -> Result<(), ParseError>;

    /// Append the element's bytes, starting at its type signature
    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError>;

    fn describe(&self, verbosity: u32) -> String;

    /// Report problems under the signature of the containing tag
    fn validate(&self, _tag: TagSignature, _report: &mut ValidationReport) {}

    /// Evaluate one color. `src` holds at least `input_channels` values
    /// and `dst` at least `output_channels`.
    fn apply(
        &self,
        ctx: &mut ApplyContext,
        dst: &mut [f32],
        src: &[f32],
    ) -> Result<(), EvaluationFault>;

    /// Depth at which this element sits inside nested calculators
    fn set_nesting(&mut self, _depth: usize) {}

    fn as_any(&self) -> &dyn Any;

    fn clone_box(&self) -> Box<dyn Element>;
}

impl Clone for Box<dyn Element> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl dyn Element + '_ {
    pub fn downcast_ref<T: Element + 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Read the 12-byte element header, returning (inputs, outputs)
pub(crate) fn read_element_header(
    r: &mut ByteReader<'_>,
    expected: TypeSignature,
) -> Result<(usize, usize), ParseError> {
    let sig = r.u32()?;
    if sig != expected.0 {
        return Err(ParseError::TypeMismatch {
            expected: expected.0,
            actual: sig,
        });
    }
    r.skip(4)?;
    let inputs = r.u16()? as usize;
    let outputs = r.u16()? as usize;
    Ok((inputs, outputs))
}

pub(crate) fn write_element_header(
    out: &mut Vec<u8>,
    sig: TypeSignature,
    inputs: usize,
    outputs: usize,
) -> Result<(), WriteError> {
    let narrow = |n: usize| u16::try_from(n).map_err(|_| WriteError::tag(sig.0, "too many channels"));
    out.put_u32(sig.0);
    out.put_u32(0);
    out.put_u16(narrow(inputs)?);
    out.put_u16(narrow(outputs)?);
    Ok(())
}

/// Read a table of (offset, size) pairs and slice each region out of
/// `data`. Offsets are relative to the start of `data`.
pub(crate) fn read_positions<'a>(
    r: &mut ByteReader<'_>,
    data: &'a [u8],
    count: usize,
) -> Result<Vec<&'a [u8]>, ParseError> {
    let positions = r.array_of(count, 8, |r| Ok((r.u32()?, r.u32()?)))?;
    positions
        .into_iter()
        .map(|(offset, size)| {
            let end = (offset as u64) + (size as u64);
            if end > data.len() as u64 {
                return Err(ParseError::TagOutOfBounds {
                    tag: 0,
                    offset,
                    size,
                    limit: data.len() as u64,
                });
            }
            Ok(&data[offset as usize..end as usize])
        })
        .collect()
}

/// Write `parts` after a position table of `parts.len()` entries that
/// starts at `table_at`. Offsets are relative to `base`; shared parts are
/// not deduplicated.
pub(crate) fn write_positioned(
    out: &mut Vec<u8>,
    base: usize,
    table_at: usize,
    parts: &[Vec<u8>],
) -> Result<(), WriteError> {
    for (i, part) in parts.iter().enumerate() {
        while (out.len() - base) % 4 != 0 {
            out.push(0);
        }
        let offset = u32::try_from(out.len() - base).map_err(|_| WriteError::TooLarge(out.len()))?;
        let size = u32::try_from(part.len()).map_err(|_| WriteError::TooLarge(part.len()))?;
        out.extend_from_slice(part);
        let at = table_at + i * 8;
        out[at..at + 4].copy_from_slice(&offset.to_be_bytes());
        out[at + 4..at + 8].copy_from_slice(&size.to_be_bytes());
    }
    Ok(())
}

/// Creates elements for the type signatures it knows
pub trait ElementFactory: Send + Sync {
    fn create(&self, sig: TypeSignature, registry: &Arc<ElementRegistry>) -> Option<Box<dyn Element>>;

    fn type_name(&self, sig: TypeSignature) -> Option<&'static str>;
}

/// The element types defined by ICC.1 and ICC.2
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardElementFactory;

impl ElementFactory for StandardElementFactory {
    fn create(&self, sig: TypeSignature, registry: &Arc<ElementRegistry>) -> Option<Box<dyn Element>> {
        let element: Box<dyn Element> = match sig {
            TypeSignature::CURVE_SET => Box::new(CurveSetElement::default()),
            TypeSignature::MATRIX => Box::new(MatrixElement::default()),
            TypeSignature::CLUT => Box::new(ClutElement::default()),
            TypeSignature::CALCULATOR => Box::new(CalculatorElement::new(Arc::clone(registry))),
            _ => return None,
        };
        Some(element)
    }

    fn type_name(&self, sig: TypeSignature) -> Option<&'static str> {
        Some(match sig {
            TypeSignature::CURVE_SET => "Curve Set Element",
            TypeSignature::MATRIX => "Matrix Element",
            TypeSignature::CLUT => "CLUT Element",
            TypeSignature::CALCULATOR => "Calculator Element",
            _ => return None,
        })
    }
}

/// Ordered list of element factories, searched newest first
pub struct ElementRegistry {
    factories: Vec<Box<dyn ElementFactory>>,
}

impl fmt::Debug for ElementRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementRegistry")
            .field("factories", &self.factories.len())
            .finish()
    }
}

impl Default for ElementRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementRegistry {
    /// Registry with the standard element types
    pub fn new() -> Self {
        Self {
            factories: vec![Box::new(StandardElementFactory)],
        }
    }

    /// Registry that knows no types; everything reads as opaque
    pub fn empty() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Add a factory that takes precedence over those already present
    pub fn push(&mut self, factory: Box<dyn ElementFactory>) {
        self.factories.push(factory);
    }

    pub fn create(self: &Arc<Self>, sig: TypeSignature) -> Box<dyn Element> {
        self.factories
            .iter()
            .rev()
            .find_map(|f| f.create(sig, self))
            .unwrap_or_else(|| Box::new(OpaqueElement::new(sig)))
    }

    pub fn type_name(&self, sig: TypeSignature) -> &'static str {
        self.factories
            .iter()
            .rev()
            .find_map(|f| f.type_name(sig))
            .unwrap_or("Unknown Element")
    }

    /// Create and parse the element whose bytes are `data`
    pub fn read_element(self: &Arc<Self>, data: &[u8]) -> Result<Box<dyn Element>, ParseError> {
        self.read_nested(data, 0)
    }

    /// As [`read_element`](Self::read_element) for an element inside
    /// calculators nested `depth` deep
    pub(crate) fn read_nested(
        self: &Arc<Self>,
        data: &[u8],
        depth: usize,
    ) -> Result<Box<dyn Element>, ParseError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(ParseError::CorruptedData(format!(
                "elements nested deeper than {}",
                MAX_NESTING_DEPTH
            )));
        }
        let sig = TypeSignature(ByteReader::new(data).u32()?);
        let mut element = self.create(sig);
        element.set_nesting(depth);
        element.read(data)?;
        Ok(element)
    }
}

/// Element of a type no factory knows, kept byte for byte
#[derive(Debug, Clone, PartialEq)]
pub struct OpaqueElement {
    type_sig: TypeSignature,
    inputs: usize,
    outputs: usize,
    /// Bytes after the 12-byte header
    pub data: Vec<u8>,
}

impl OpaqueElement {
    pub fn new(type_sig: TypeSignature) -> Self {
        Self {
            type_sig,
            inputs: 0,
            outputs: 0,
            data: Vec::new(),
        }
    }
}

impl Element for OpaqueElement {
    fn type_sig(&self) -> TypeSignature {
        self.type_sig
    }

    fn input_channels(&self) -> usize {
        self.inputs
    }

    fn output_channels(&self) -> usize {
        self.outputs
    }

    fn read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = ByteReader::new(data);
        self.type_sig = TypeSignature(r.u32()?);
        r.skip(4)?;
        self.inputs = r.u16()? as usize;
        self.outputs = r.u16()? as usize;
        self.data = data[12..].to_vec();
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), WriteError> {
        write_element_header(out, self.type_sig, self.inputs, self.outputs)?;
        out.extend_from_slice(&self.data);
        Ok(())
    }

    fn describe(&self, _verbosity: u32) -> String {
        format!(
            "Unknown element '{}', {} -> {} channels, {} bytes\n",
            self.type_sig,
            self.inputs,
            self.outputs,
            self.data.len() + 12
        )
    }

    fn validate(&self, tag: TagSignature, report: &mut ValidationReport) {
        report.tag_content(
            Check::TagContents,
            tag,
            Severity::Warning,
            format!("unrecognised element type '{}'", self.type_sig),
        );
    }

    fn apply(
        &self,
        _ctx: &mut ApplyContext,
        dst: &mut [f32],
        src: &[f32],
    ) -> Result<(), EvaluationFault> {
        let n = self.outputs.min(dst.len());
        if self.inputs == self.outputs {
            for (d, &s) in dst[..n].iter_mut().zip(src) {
                *d = s;
            }
        } else {
            dst[..n].fill(f32::NAN);
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

/// Run `src` through a chain of elements into `dst`, alternating between
/// two scratch buffers
pub fn apply_chain(
    elements: &[Box<dyn Element>],
    ctx: &mut ApplyContext,
    dst: &mut [f32],
    src: &[f32],
) -> Result<(), EvaluationFault> {
    let width = elements
        .iter()
        .map(|e| e.input_channels().max(e.output_channels()))
        .max()
        .unwrap_or(0)
        .max(src.len());
    let mut storage = [vec![0.0f32; width], vec![0.0f32; width]];
    let mut phase = 0;
    let n = src.len().min(width);
    storage[0][..n].copy_from_slice(&src[..n]);

    for element in elements {
        let (a, b) = storage.split_at_mut(1);
        let (input, output) = if phase == 0 {
            (&a[0], &mut b[0])
        } else {
            (&b[0], &mut a[0])
        };
        element.apply(ctx, output, input)?;
        phase ^= 1;
    }

    let last = elements.last().map_or(src.len(), |e| e.output_channels());
    for (d, &s) in dst.iter_mut().zip(&storage[phase][..last.min(width)]) {
        *d = s;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_passthrough() {
        let mut bytes = b"zzzz\0\0\0\0\0\x02\0\x02".to_vec();
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        let registry = Arc::new(ElementRegistry::new());
        let element = registry.read_element(&bytes).unwrap();
        assert_eq!(element.type_sig(), TypeSignature::from_bytes(*b"zzzz"));
        assert_eq!(element.input_channels(), 2);

        let mut out = [0.0f32; 2];
        element
            .apply(&mut ApplyContext::default(), &mut out, &[0.25, 0.75])
            .unwrap();
        assert_eq!(out, [0.25, 0.75]);

        let mut written = Vec::new();
        element.write(&mut written).unwrap();
        assert_eq!(written, bytes);
    }

    #[test]
    fn test_opaque_channel_change_is_nan() {
        let bytes = b"zzzz\0\0\0\0\0\x01\0\x02";
        let registry = Arc::new(ElementRegistry::empty());
        let element = registry.read_element(bytes).unwrap();
        let mut out = [0.0f32; 2];
        element
            .apply(&mut ApplyContext::default(), &mut out, &[0.5])
            .unwrap();
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_registry_newest_first() {
        struct Override;
        impl ElementFactory for Override {
            fn create(&self, sig: TypeSignature, _: &Arc<ElementRegistry>) -> Option<Box<dyn Element>> {
                (sig == TypeSignature::MATRIX).then(|| Box::new(OpaqueElement::new(sig)) as Box<dyn Element>)
            }
            fn type_name(&self, sig: TypeSignature) -> Option<&'static str> {
                (sig == TypeSignature::MATRIX).then_some("Override")
            }
        }

        let mut registry = ElementRegistry::new();
        registry.push(Box::new(Override));
        let registry = Arc::new(registry);
        assert_eq!(registry.type_name(TypeSignature::MATRIX), "Override");
        assert!(registry
            .create(TypeSignature::MATRIX)
            .downcast_ref::<OpaqueElement>()
            .is_some());
        assert_eq!(registry.type_name(TypeSignature::CLUT), "CLUT Element");
    }

    #[test]
    fn test_positions_out_of_bounds() {
        let table = [0u8, 0, 0, 8, 0xFF, 0xFF, 0xFF, 0xFF];
        let mut r = ByteReader::new(&table);
        assert!(read_positions(&mut r, &table, 1).is_err());
    }
}
