//! ICC Profile Error Types

use std::fmt;

use crate::io::IoError;

/// Errors that can occur when attaching a profile or parsing a tag
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// Profile data is too small to hold a header
    TooSmall { expected: usize, actual: usize },
    /// Invalid profile file signature (should be 'acsp')
    InvalidMagic(u32),
    /// Tag count cannot possibly fit in the byte source
    AbsurdTagCount { count: u32, available: u64 },
    /// Tag table runs past the end of the byte source
    TagTableTruncated { count: u32, available: u64 },
    /// offset + size overflows 32 bits
    OffsetOverflow { tag: u32, offset: u32, size: u32 },
    /// Tag region lies outside the declared or actual data
    TagOutOfBounds { tag: u32, offset: u32, size: u32, limit: u64 },
    /// No directory entry for the signature
    TagNotFound(u32),
    /// Payload type differs from what the tag object expects
    TypeMismatch { expected: u32, actual: u32 },
    /// Payload ended before its declared structure
    Truncated { wanted: usize, available: usize },
    /// Structurally invalid payload
    CorruptedData(String),
    /// Underlying byte source failed
    Io(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooSmall { expected, actual } => {
                write!(
                    f,
                    "Profile too small: expected {} bytes, got {}",
                    expected, actual
                )
            }
            Self::InvalidMagic(sig) => {
                write!(
                    f,
                    "Invalid profile signature: 0x{:08X} (expected 'acsp')",
                    sig
                )
            }
            Self::AbsurdTagCount { count, available } => {
                write!(
                    f,
                    "Tag count {} cannot fit in {} bytes of profile data",
                    count, available
                )
            }
            Self::TagTableTruncated { count, available } => {
                write!(
                    f,
                    "Tag table of {} entries runs past end of data ({} bytes)",
                    count, available
                )
            }
            Self::OffsetOverflow { tag, offset, size } => {
                write!(
                    f,
                    "Tag '{}' offset {} + size {} overflows",
                    sig_str(*tag),
                    offset,
                    size
                )
            }
            Self::TagOutOfBounds {
                tag,
                offset,
                size,
                limit,
            } => {
                write!(
                    f,
                    "Tag '{}' out of bounds: offset {} + size {} > {}",
                    sig_str(*tag),
                    offset,
                    size,
                    limit
                )
            }
            Self::TagNotFound(tag) => write!(f, "Tag not found: '{}'", sig_str(*tag)),
            Self::TypeMismatch { expected, actual } => {
                write!(
                    f,
                    "Type mismatch: expected '{}', found '{}'",
                    sig_str(*expected),
                    sig_str(*actual)
                )
            }
            Self::Truncated { wanted, available } => {
                write!(
                    f,
                    "Truncated data: needed {} bytes, {} available",
                    wanted, available
                )
            }
            Self::CorruptedData(msg) => write!(f, "Corrupted data: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<IoError> for ParseError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::UnexpectedEof { wanted, available } => Self::Truncated { wanted, available },
            other => Self::Io(other.to_string()),
        }
    }
}

/// Errors that can occur when serializing a profile or tag
#[derive(Debug)]
#[non_exhaustive]
pub enum WriteError {
    /// Byte sink failed
    Io(IoError),
    /// Layout does not fit in 32-bit offsets
    TooLarge(usize),
    /// A tag's contents cannot be encoded
    Tag { tag: u32, reason: String },
}

impl WriteError {
    pub fn tag(tag: u32, reason: impl Into<String>) -> Self {
        Self::Tag {
            tag,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "Write failed: {}", err),
            Self::TooLarge(len) => write!(f, "Profile of {} bytes exceeds 32-bit layout", len),
            Self::Tag { tag, reason } => {
                write!(f, "Cannot encode '{}': {}", sig_str(*tag), reason)
            }
        }
    }
}

impl std::error::Error for WriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<IoError> for WriteError {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

/// Render a signature as four characters, escaping non-printable bytes
pub(crate) fn sig_str(sig: u32) -> String {
    sig.to_be_bytes()
        .iter()
        .map(|&b| {
            if (0x20..0x7F).contains(&b) {
                (b as char).to_string()
            } else {
                format!("\\x{:02X}", b)
            }
        })
        .collect()
}
