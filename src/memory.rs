//! Address-indexed classification table.
//!
//! The [`MemoryImage`] owns one [`Cell`] per loaded word. All mutation goes
//! through it so that the monotonic kind rule and the combine links are
//! checked in one place:
//!
//! - a cell moves from `Unknown` to one concrete kind, once;
//! - setting the kind a cell already holds is a no-op;
//! - a combined pair shares its kind, and the high half is hidden from
//!   standalone iteration.

use crate::error::{AnalyzerError, Result};
use crate::loader::Word;
use crate::types::{Cell, CellKind, Instruction, KindSummary};

/// Classification state for a whole firmware image.
#[derive(Debug, Clone)]
pub struct MemoryImage {
    cells: Vec<Cell>,
}

impl MemoryImage {
    /// Build an unclassified image from loaded words.
    pub fn from_words(words: &[Word]) -> Self {
        Self {
            cells: words.iter().map(|w| Cell::new(w.address, w.value)).collect(),
        }
    }

    /// Build an unclassified image directly from raw bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let words = crate::loader::load_words(data)?;
        Ok(Self::from_words(&words))
    }

    /// Number of 16-bit words in the image.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the image holds no words.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// One past the last valid byte address.
    pub fn limit(&self) -> u32 {
        self.cells.last().map_or(0, |c| c.address + 2)
    }

    fn index(&self, address: u32) -> Result<usize> {
        if address % 2 != 0 {
            return Err(AnalyzerError::Misaligned { address });
        }
        let index = (address / 2) as usize;
        if index >= self.cells.len() {
            return Err(AnalyzerError::OutOfRange {
                address,
                limit: self.limit(),
            });
        }
        Ok(index)
    }

    /// Cell at `address`.
    pub fn lookup(&self, address: u32) -> Result<&Cell> {
        let index = self.index(address)?;
        Ok(&self.cells[index])
    }

    fn lookup_mut(&mut self, address: u32) -> Result<&mut Cell> {
        let index = self.index(address)?;
        Ok(&mut self.cells[index])
    }

    /// Merge the cells at `low` and `low + 2` into one 32-bit location.
    ///
    /// Both halves must still be unclassified and unmerged.
    pub fn combine(&mut self, low: u32) -> Result<()> {
        let lo = self.index(low)?;
        let high = low.checked_add(2).ok_or(AnalyzerError::OutOfRange {
            address: low,
            limit: self.limit(),
        })?;
        let hi = self.index(high)?;

        for (address, idx) in [(low, lo), (high, hi)] {
            let cell = &self.cells[idx];
            if cell.kind != CellKind::Unknown || cell.is_merged() {
                return Err(AnalyzerError::ClassificationConflict {
                    address,
                    existing: cell.kind,
                    requested: CellKind::Unknown,
                });
            }
        }

        self.cells[lo].merged_with = Some(high);
        self.cells[hi].absorbed_by = Some(low);
        Ok(())
    }

    /// Classify the cell at `address`, cascading to an absorbed high half.
    pub fn set_kind(&mut self, address: u32, kind: CellKind) -> Result<()> {
        let cell = self.lookup(address)?;
        if cell.kind == kind {
            return Ok(());
        }
        if cell.kind != CellKind::Unknown {
            return Err(AnalyzerError::ClassificationConflict {
                address,
                existing: cell.kind,
                requested: kind,
            });
        }

        let linked = cell.merged_with;
        if let Some(high) = linked {
            let absorbed = self.lookup(high)?;
            if absorbed.kind != CellKind::Unknown && absorbed.kind != kind {
                return Err(AnalyzerError::ClassificationConflict {
                    address: high,
                    existing: absorbed.kind,
                    requested: kind,
                });
            }
            self.lookup_mut(high)?.kind = kind;
        }
        self.lookup_mut(address)?.kind = kind;
        Ok(())
    }

    /// Append provenance text to the cell at `address`.
    pub fn append_annotation(&mut self, address: u32, text: &str) -> Result<()> {
        self.lookup_mut(address)?.annotation.push_str(text);
        Ok(())
    }

    /// Store the decode result of an instruction cell.
    pub fn attach_instruction(&mut self, address: u32, instruction: Instruction) -> Result<()> {
        self.lookup_mut(address)?.decoded = Some(instruction);
        Ok(())
    }

    /// Logical value at `address`: both halves if combined, else the word.
    pub fn value32(&self, address: u32) -> Result<u32> {
        let cell = self.lookup(address)?;
        match cell.merged_with {
            Some(high) => Ok((u32::from(self.lookup(high)?.raw) << 16) | u32::from(cell.raw)),
            None => Ok(u32::from(cell.raw)),
        }
    }

    /// All cells in ascending address order, absorbed halves included.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    /// Logical locations in ascending order; absorbed halves are skipped.
    pub fn locations(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|c| !c.is_absorbed())
    }

    /// Count logical locations per kind.
    pub fn summary(&self) -> KindSummary {
        let mut summary = KindSummary::default();
        for cell in self.locations() {
            summary.record(cell.kind);
        }
        summary
    }
}
