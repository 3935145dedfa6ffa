//! Error types for iccmm

use thiserror::Error;

use crate::icc::error::{ParseError, WriteError};
use crate::icc::header::ColorSpace;
use crate::icc::types::TagSignature;
use crate::io::IoError;

/// Result type for iccmm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in iccmm operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Byte source or sink failed
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Failed to parse ICC profile
    #[error("Profile parse error: {0}")]
    Parse(#[from] ParseError),

    /// Failed to serialize ICC profile
    #[error("Profile write error: {0}")]
    Write(#[from] WriteError),

    /// Transform chain construction failed
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Calculator program faulted
    #[error("Evaluation fault: {0}")]
    Evaluation(#[from] EvaluationFault),

    /// Textual form could not be produced or read
    #[error("Textual form error: {0}")]
    Textual(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Textual(e.to_string())
    }
}

/// Failures while building or finalizing a transform chain
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum TransformError {
    /// Adjacent transforms do not share a color space
    #[error("incompatible color space chaining: {from:?} -> {to:?}")]
    BadSpaceLink { from: ColorSpace, to: ColorSpace },

    /// Profile has no tag usable for the requested direction and intent
    #[error("no usable transform in profile for {0}")]
    NoTransform(String),

    /// Channel count outside 1..=16
    #[error("unsupported channel count {0}")]
    UnsupportedChannels(usize),

    /// A transform's tag disagrees with the channel count of its space,
    /// or adjacent transforms disagree with each other
    #[error("transform {index} expects {expected} channels, found {actual}")]
    ChannelMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    /// Sample buffer too short or not a whole number of samples
    #[error("buffer of {actual} values does not fit {expected}")]
    BufferSize { expected: usize, actual: usize },

    /// Apply called before begin
    #[error("transform chain has not been begun")]
    NotBegun,

    /// Add or begin called after begin
    #[error("transform chain already begun")]
    AlreadyBegun,

    /// Begin called on a chain with no transforms
    #[error("transform chain is empty")]
    EmptyChain,

    /// A tag the selected transform depends on is absent or unreadable
    #[error("required tag {0} missing or unreadable")]
    MissingTag(TagSignature),

    /// Profile could not be attached
    #[error("profile error: {0}")]
    Profile(#[from] ParseError),
}

/// Calculator and element evaluation faults
///
/// Raised inside `apply` and turned into NaN outputs there; they never
/// escape a transform.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum EvaluationFault {
    /// Operation needed more operands than the stack holds
    #[error("stack underflow at op {pc}: need {needed}, have {depth}")]
    StackUnderflow {
        pc: usize,
        needed: usize,
        depth: usize,
    },

    /// Stack grew past its cap
    #[error("stack overflow at op {pc}")]
    StackOverflow { pc: usize },

    /// Program ran more operations than allowed per apply
    #[error("instruction budget of {0} exhausted")]
    InstructionBudget(usize),

    /// Operand references a channel, temporary or block out of range
    #[error("bad operand at op {pc}")]
    BadOperand { pc: usize },

    /// Call to a sub-element that does not exist or does not fit
    #[error("bad sub-element {index} at op {pc}")]
    BadSubElement { pc: usize, index: usize },

    /// Nested calculator calls went too deep
    #[error("calculator nesting deeper than {0}")]
    NestingDepth(usize),
}
