//! Report formatters for a classified image.
//!
//! Reports list every logical location in ascending address order; the high
//! half of a combined pair has no line of its own.

use crate::memory::MemoryImage;
use crate::types::{Cell, CellKind, Instruction, KindSummary};

/// Width of the right-justified kind column.
const KIND_WIDTH: usize = 12;

/// Trait for rendering a classified image.
pub trait ReportFormatter {
    /// Format one logical location.
    fn format_location(&self, image: &MemoryImage, cell: &Cell) -> String;

    /// Format the complete report.
    ///
    /// Default implementation concatenates all location outputs.
    fn format_report(&self, image: &MemoryImage) -> String {
        image
            .locations()
            .map(|cell| self.format_location(image, cell))
            .collect()
    }
}

fn high_half(image: &MemoryImage, cell: &Cell) -> Option<u16> {
    cell.merge_link()
        .and_then(|high| image.lookup(high).ok())
        .map(|high| high.raw)
}

/// Column-aligned text report, one line per location.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormatter;

impl TextFormatter {
    /// Create a new text formatter.
    pub fn new() -> Self {
        Self
    }
}

impl ReportFormatter for TextFormatter {
    fn format_location(&self, image: &MemoryImage, cell: &Cell) -> String {
        let high = match high_half(image, cell) {
            Some(word) => format!(" {:04x}", word),
            None => " ".repeat(5),
        };
        let decoded = cell
            .decoded
            .as_ref()
            .map(|instr| format!("{}; ", instr))
            .unwrap_or_default();

        format!(
            "{:06x}: {} {:04x}{:>width$}\t{}{}\n",
            cell.address,
            high,
            cell.raw,
            cell.kind.label(),
            decoded,
            cell.annotation,
            width = KIND_WIDTH,
        )
    }
}

/// JSON report formatter.
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    /// Pretty-print JSON
    pub pretty: bool,
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl JsonFormatter {
    /// Create a new JSON formatter with pretty printing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compact JSON formatter.
    pub fn compact() -> Self {
        Self { pretty: false }
    }

    fn to_json<T: serde::Serialize>(&self, value: &T) -> String {
        if self.pretty {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
        } else {
            serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
        }
    }
}

#[derive(serde::Serialize)]
struct LocationJson<'a> {
    address: u32,
    high: Option<u16>,
    low: u16,
    kind: CellKind,
    instruction: Option<&'a Instruction>,
    annotation: &'a str,
}

impl<'a> LocationJson<'a> {
    fn new(image: &MemoryImage, cell: &'a Cell) -> Self {
        Self {
            address: cell.address,
            high: high_half(image, cell),
            low: cell.raw,
            kind: cell.kind,
            instruction: cell.decoded.as_ref(),
            annotation: &cell.annotation,
        }
    }
}

impl ReportFormatter for JsonFormatter {
    fn format_location(&self, image: &MemoryImage, cell: &Cell) -> String {
        self.to_json(&LocationJson::new(image, cell))
    }

    fn format_report(&self, image: &MemoryImage) -> String {
        #[derive(serde::Serialize)]
        struct JsonOutput<'a> {
            summary: KindSummary,
            locations: Vec<LocationJson<'a>>,
        }

        let output = JsonOutput {
            summary: image.summary(),
            locations: image
                .locations()
                .map(|cell| LocationJson::new(image, cell))
                .collect(),
        };
        self.to_json(&output)
    }
}
