//! Core types for the firmware analyzer.
//!
//! This module defines the classification kinds, the per-address cell
//! model, decode results and the analysis options.

use serde::Serialize;
use std::fmt;

/// Classification label of a memory location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    /// Not reached by any analysis yet.
    #[default]
    Unknown,
    /// Part of the exception/interrupt vector table.
    VectorTable,
    /// Executable code.
    Instruction,
    /// Data referenced by code (literal pools).
    RawData,
}

impl CellKind {
    /// Label used in reports.
    pub fn label(self) -> &'static str {
        match self {
            CellKind::Unknown => "Unknown",
            CellKind::VectorTable => "VectorTable",
            CellKind::Instruction => "Instruction",
            CellKind::RawData => "RawData",
        }
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An address the decoder wants classified, and what it should become.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImpliedReference {
    /// Target address in the image
    pub address: u32,
    /// Kind the target is expected to hold
    pub kind: CellKind,
}

impl ImpliedReference {
    /// Reference to code.
    pub fn instruction(address: u32) -> Self {
        Self {
            address,
            kind: CellKind::Instruction,
        }
    }

    /// Reference to data.
    pub fn raw_data(address: u32) -> Self {
        Self {
            address,
            kind: CellKind::RawData,
        }
    }
}

/// Result of decoding one instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
    /// Mnemonic or family name
    pub description: String,
    /// Operands in assembly order
    pub operands: Vec<String>,
    /// Addresses this instruction makes reachable, in visiting order
    pub references: Vec<ImpliedReference>,
}

impl Instruction {
    /// Create an instruction with no operands or references.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            operands: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Add an operand.
    pub fn with_operand(mut self, operand: impl Into<String>) -> Self {
        self.operands.push(operand.into());
        self
    }

    /// Add an implied reference.
    pub fn with_reference(mut self, reference: ImpliedReference) -> Self {
        self.references.push(reference);
        self
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description)?;
        if !self.operands.is_empty() {
            write!(f, " {}", self.operands.join(", "))?;
        }
        Ok(())
    }
}

/// One 16-bit location of the firmware image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// Byte offset into the image, always even
    pub address: u32,
    /// Little-endian word read at `address`
    pub raw: u16,
    /// Current classification
    pub kind: CellKind,
    /// Provenance text, append-only
    pub annotation: String,
    /// Decode result for instruction cells
    pub decoded: Option<Instruction>,
    pub(crate) merged_with: Option<u32>,
    pub(crate) absorbed_by: Option<u32>,
}

impl Cell {
    /// Create an unclassified cell.
    pub fn new(address: u32, raw: u16) -> Self {
        Self {
            address,
            raw,
            kind: CellKind::Unknown,
            annotation: String::new(),
            decoded: None,
            merged_with: None,
            absorbed_by: None,
        }
    }

    /// Address of the absorbed high half, if this cell was combined.
    pub fn merge_link(&self) -> Option<u32> {
        self.merged_with
    }

    /// Whether this cell is the high half of another cell's combine.
    pub fn is_absorbed(&self) -> bool {
        self.absorbed_by.is_some()
    }

    /// Whether this cell took part in a combine either way.
    pub fn is_merged(&self) -> bool {
        self.merged_with.is_some() || self.absorbed_by.is_some()
    }
}

/// Number of logical locations per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindSummary {
    /// Unclassified locations
    pub unknown: usize,
    /// Vector table entries
    pub vector_table: usize,
    /// Instructions
    pub instruction: usize,
    /// Literal data
    pub raw_data: usize,
}

impl KindSummary {
    /// Count one location of `kind`.
    pub fn record(&mut self, kind: CellKind) {
        match kind {
            CellKind::Unknown => self.unknown += 1,
            CellKind::VectorTable => self.vector_table += 1,
            CellKind::Instruction => self.instruction += 1,
            CellKind::RawData => self.raw_data += 1,
        }
    }

    /// Total number of logical locations.
    pub fn total(&self) -> usize {
        self.unknown + self.vector_table + self.instruction + self.raw_data
    }
}

impl fmt::Display for KindSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} vector table, {} instruction, {} raw data, {} unknown",
            self.vector_table, self.instruction, self.raw_data, self.unknown
        )
    }
}

/// Options for an analysis run.
#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    /// Follow vector targets into code and data
    pub trace_code: bool,
    /// Clear the Thumb state bit (bit 0) of vector targets before tracing
    pub clear_thumb_bit: bool,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyzerOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            trace_code: true,
            clear_thumb_bit: true,
        }
    }

    /// Classify the vector table and nothing else.
    pub fn vectors_only() -> Self {
        Self {
            trace_code: false,
            ..Self::new()
        }
    }
}
