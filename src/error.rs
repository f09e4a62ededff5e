//! Error types for the firmware analyzer.
//!
//! Every error here is fatal to an analysis run: the tracer aborts before
//! any report is rendered. `ClassificationConflict` and
//! `UnsupportedEncoding` are kept apart so callers can tell a real
//! overlap in the image from a decoder coverage gap.

use crate::types::CellKind;
use thiserror::Error;

/// Primary error type for the analyzer.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// IO error while reading the firmware file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The firmware image cannot be used (empty, unreadable).
    #[error("Malformed input: {message}")]
    MalformedInput { message: String },

    /// Address lookup beyond the loaded image.
    #[error("Address 0x{address:06X} is out of range (image ends at 0x{limit:06X})")]
    OutOfRange { address: u32, limit: u32 },

    /// Address that does not fall on a 16-bit word boundary.
    #[error("Address 0x{address:06X} is not halfword aligned")]
    Misaligned { address: u32 },

    /// A cell would be reclassified with a different kind.
    #[error("Classification conflict at 0x{address:06X}: already {existing}, requested {requested}")]
    ClassificationConflict {
        address: u32,
        existing: CellKind,
        requested: CellKind,
    },

    /// A recognized 32-bit encoding the decoder cannot handle yet.
    #[error("Unsupported two-word encoding 0x{opcode:04X} at 0x{address:06X}")]
    UnsupportedEncoding { address: u32, opcode: u16 },

    /// The decoder emitted a reference the tracer has no rule for.
    #[error("Unexpected {kind} reference to 0x{address:06X}")]
    UnexpectedReference { address: u32, kind: CellKind },
}

/// Result type alias for analyzer operations.
pub type Result<T> = std::result::Result<T, AnalyzerError>;
