//! Reachability tracer.
//!
//! Starting from the vector table handlers, the [`Classifier`] follows the
//! references reported by the decoder and classifies every cell it reaches
//! as code or data. Work is kept on an explicit stack instead of the call
//! stack. A cell that already holds the requested kind only gains the new
//! comment, which is what stops the walk on shared or cyclic flow.

use crate::decoder;
use crate::error::{AnalyzerError, Result};
use crate::memory::MemoryImage;
use crate::types::{AnalyzerOptions, CellKind, ImpliedReference};
use crate::vectors::Vector;
use tracing::{debug, trace};

/// A pending classification.
#[derive(Debug, Clone, PartialEq, Eq)]
struct WorkItem {
    address: u32,
    kind: CellKind,
    comment: String,
    /// Cell that asked for this one; receives the comment of a null target.
    origin: Option<u32>,
}

/// Worklist tracer over a [`MemoryImage`].
#[derive(Debug)]
pub struct Classifier<'a> {
    image: &'a mut MemoryImage,
    worklist: Vec<WorkItem>,
}

impl<'a> Classifier<'a> {
    /// Create a tracer over `image`.
    pub fn new(image: &'a mut MemoryImage) -> Self {
        Self {
            image,
            worklist: Vec::new(),
        }
    }

    /// Trace every handler of the vector table, in table order.
    pub fn trace_vectors(&mut self, vectors: &[Vector], options: &AnalyzerOptions) -> Result<()> {
        for vector in vectors.iter().filter(|v| v.entry.slot.is_handler()) {
            let target = if options.clear_thumb_bit {
                vector.target & !1
            } else {
                vector.target
            };
            self.worklist.push(WorkItem {
                address: target,
                kind: CellKind::Instruction,
                comment: format!("Called by {}; ", vector.entry.slot),
                origin: Some(vector.entry.offset),
            });
            self.drain()?;
        }
        Ok(())
    }

    /// Classify `address` as code and everything reachable from it.
    ///
    /// A null address is treated as an unused vector and left alone. With
    /// no originating cell to carry it, the comment is only logged.
    pub fn mark_instruction(&mut self, address: u32, comment: &str) -> Result<()> {
        self.worklist.push(WorkItem {
            address,
            kind: CellKind::Instruction,
            comment: comment.to_string(),
            origin: None,
        });
        self.drain()
    }

    /// Classify `address` as a 32-bit data word.
    pub fn mark_raw_data(&mut self, address: u32, comment: &str) -> Result<()> {
        self.worklist.push(WorkItem {
            address,
            kind: CellKind::RawData,
            comment: comment.to_string(),
            origin: None,
        });
        self.drain()
    }

    fn drain(&mut self) -> Result<()> {
        while let Some(item) = self.worklist.pop() {
            if let Err(err) = self.visit(item) {
                self.worklist.clear();
                return Err(err);
            }
        }
        Ok(())
    }

    fn visit(&mut self, item: WorkItem) -> Result<()> {
        match item.kind {
            CellKind::Instruction => self.visit_instruction(item),
            CellKind::RawData => self.visit_raw_data(item),
            kind => Err(AnalyzerError::UnexpectedReference {
                address: item.address,
                kind,
            }),
        }
    }

    fn visit_instruction(&mut self, item: WorkItem) -> Result<()> {
        let address = item.address;
        if address == 0 {
            return match item.origin {
                Some(origin) => {
                    trace!(origin, "null target");
                    self.image.append_annotation(origin, &item.comment)
                }
                None => {
                    debug!(comment = %item.comment, "null target without origin");
                    Ok(())
                }
            };
        }

        let cell = self.image.lookup(address)?;
        let (kind, opcode) = (cell.kind, cell.raw);
        match kind {
            CellKind::Unknown => {}
            CellKind::Instruction => {
                trace!(address, "already code");
                return self.image.append_annotation(address, &item.comment);
            }
            existing => {
                return Err(AnalyzerError::ClassificationConflict {
                    address,
                    existing,
                    requested: CellKind::Instruction,
                });
            }
        }

        if decoder::is_two_word_encoding(opcode) {
            return Err(AnalyzerError::UnsupportedEncoding { address, opcode });
        }

        let decoded = decoder::decode(address, opcode);
        self.image.set_kind(address, CellKind::Instruction)?;
        self.image.append_annotation(address, &item.comment)?;

        let references = match decoded {
            Some(instruction) => {
                debug!(address, opcode, %instruction, "instruction");
                let references = instruction.references.clone();
                self.image.attach_instruction(address, instruction)?;
                references
            }
            None => {
                debug!(address, opcode, "instruction (undecoded)");
                Vec::new()
            }
        };

        // Reversed so that the first reference is popped first.
        for reference in references.into_iter().rev() {
            self.worklist.push(Self::follow(address, reference));
        }
        Ok(())
    }

    fn visit_raw_data(&mut self, item: WorkItem) -> Result<()> {
        let address = item.address;
        match self.image.lookup(address)?.kind {
            CellKind::Unknown => {}
            CellKind::RawData => {
                trace!(address, "already data");
                return self.image.append_annotation(address, &item.comment);
            }
            existing => {
                return Err(AnalyzerError::ClassificationConflict {
                    address,
                    existing,
                    requested: CellKind::RawData,
                });
            }
        }

        // Literal pool entries are always taken as full words.
        self.image.combine(address)?;
        self.image.set_kind(address, CellKind::RawData)?;
        self.image.append_annotation(address, &item.comment)?;
        let value = self.image.value32(address)?;
        debug!(address, value, "raw data");
        Ok(())
    }

    fn follow(from: u32, reference: ImpliedReference) -> WorkItem {
        let comment = match reference.kind {
            CellKind::RawData => format!("Loaded by 0x{:06x}; ", from),
            _ => format!("Follows 0x{:06x}; ", from),
        };
        WorkItem {
            address: reference.address,
            kind: reference.kind,
            comment,
            origin: Some(from),
        }
    }
}

/// Trace all handlers in `vectors` through `image`.
pub fn classify(image: &mut MemoryImage, vectors: &[Vector], options: &AnalyzerOptions) -> Result<()> {
    Classifier::new(image).trace_vectors(vectors, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectors;

    fn image(words: &[u16]) -> MemoryImage {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        MemoryImage::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn test_idempotent_instruction() {
        let mut img = image(&[0x4770, 0x4770]);
        let mut tracer = Classifier::new(&mut img);
        tracer.mark_instruction(2, "first; ").unwrap();
        tracer.mark_instruction(2, "second; ").unwrap();

        let cell = img.lookup(2).unwrap();
        assert_eq!(cell.kind, CellKind::Instruction);
        assert_eq!(cell.annotation, "first; second; ");
        assert_eq!(cell.decoded.as_ref().unwrap().description, "Branch and Exchange");
    }

    #[test]
    fn test_fall_through_chain() {
        // LDR R0, [PC, #4]; STR R0, [R1]; BX LR; literal
        let mut img = image(&[0x0000, 0x4801, 0x6008, 0x4770, 0xBEEF, 0xDEAD]);
        Classifier::new(&mut img).mark_instruction(2, "entry; ").unwrap();

        assert_eq!(img.lookup(2).unwrap().kind, CellKind::Instruction);
        assert_eq!(img.lookup(4).unwrap().kind, CellKind::Instruction);
        assert_eq!(img.lookup(6).unwrap().kind, CellKind::Instruction);
        assert_eq!(img.lookup(4).unwrap().annotation, "Follows 0x000002; ");

        let literal = img.lookup(8).unwrap();
        assert_eq!(literal.kind, CellKind::RawData);
        assert_eq!(literal.annotation, "Loaded by 0x000002; ");
        assert_eq!(img.value32(8).unwrap(), 0xDEAD_BEEF);
        assert!(img.lookup(0x0A).unwrap().is_absorbed());
    }

    #[test]
    fn test_undecoded_opcode_is_still_code() {
        let mut img = image(&[0x0000, 0xBF00, 0x4770]);
        Classifier::new(&mut img).mark_instruction(2, "x; ").unwrap();
        let cell = img.lookup(2).unwrap();
        assert_eq!(cell.kind, CellKind::Instruction);
        assert!(cell.decoded.is_none());
        // No decode, no fall-through.
        assert_eq!(img.lookup(4).unwrap().kind, CellKind::Unknown);
    }

    #[test]
    fn test_conflicts() {
        let mut img = image(&[0x0000, 0x4770, 0x1234, 0x5678]);
        let mut tracer = Classifier::new(&mut img);
        tracer.mark_raw_data(4, "data; ").unwrap();
        tracer.mark_raw_data(4, "again; ").unwrap();
        assert!(matches!(
            tracer.mark_instruction(4, "anything"),
            Err(AnalyzerError::ClassificationConflict {
                address: 4,
                existing: CellKind::RawData,
                requested: CellKind::Instruction,
            })
        ));
        // The absorbed high half mirrors the data kind.
        assert!(matches!(
            tracer.mark_instruction(6, ""),
            Err(AnalyzerError::ClassificationConflict { address: 6, .. })
        ));
        tracer.mark_instruction(2, "code; ").unwrap();
        assert!(matches!(
            tracer.mark_raw_data(2, "code; "),
            Err(AnalyzerError::ClassificationConflict {
                existing: CellKind::Instruction,
                requested: CellKind::RawData,
                ..
            })
        ));
        assert_eq!(img.lookup(4).unwrap().annotation, "data; again; ");
    }

    #[test]
    fn test_literal_overlapping_code() {
        // LDR R0, [PC, #0] at 2 points at 4..8, but 4 falls through as code.
        let mut img = image(&[0x0000, 0x4800, 0x4770, 0x0000, 0x0000]);
        let err = Classifier::new(&mut img).mark_instruction(2, "").unwrap_err();
        assert!(matches!(err, AnalyzerError::ClassificationConflict { address: 4, .. }));
    }

    #[test]
    fn test_two_word_encoding_fails_loud() {
        let mut img = image(&[0x0000, 0xF000, 0xF800]);
        let err = Classifier::new(&mut img).mark_instruction(2, "").unwrap_err();
        assert!(matches!(
            err,
            AnalyzerError::UnsupportedEncoding { address: 2, opcode: 0xF000 }
        ));
        assert_eq!(img.lookup(2).unwrap().kind, CellKind::Unknown);
    }

    #[test]
    fn test_out_of_range_reference() {
        // LDR R0, [PC, #1020] far past the end of the image
        let mut img = image(&[0x0000, 0x48FF]);
        let err = Classifier::new(&mut img).mark_instruction(2, "").unwrap_err();
        assert!(matches!(err, AnalyzerError::OutOfRange { .. }));
    }

    #[test]
    fn test_cyclic_vectors_terminate() {
        let mut data = vec![0u8; 0xC0];
        // Reset and NMI share a handler, IRQ0 has the Thumb bit set.
        data[0x04..0x08].copy_from_slice(&0xC0u32.to_le_bytes());
        data[0x08..0x0C].copy_from_slice(&0xC0u32.to_le_bytes());
        data[0x40..0x44].copy_from_slice(&0xC3u32.to_le_bytes());
        data.extend_from_slice(&0x6008u16.to_le_bytes()); // 0xC0 STR
        data.extend_from_slice(&0x4770u16.to_le_bytes()); // 0xC2 BX LR
        let mut img = MemoryImage::from_bytes(&data).unwrap();

        let vectors = vectors::analyze(&mut img).unwrap();
        classify(&mut img, &vectors, &AnalyzerOptions::new()).unwrap();

        assert_eq!(
            img.lookup(0xC0).unwrap().annotation,
            "Called by Reset; Called by NMI; "
        );
        assert_eq!(
            img.lookup(0xC2).unwrap().annotation,
            "Follows 0x0000c0; Called by IRQ0; "
        );
        // Null vectors keep their comment on the table entry itself.
        assert_eq!(img.lookup(0x0C).unwrap().annotation, "HardFault; Called by HardFault; ");
    }

    #[test]
    fn test_null_target_without_origin() {
        let mut img = image(&[0x4770, 0x4770]);
        Classifier::new(&mut img).mark_instruction(0, "unused; ").unwrap();
        assert!(img.cells().all(|c| c.kind == CellKind::Unknown && c.annotation.is_empty()));
    }

    #[test]
    fn test_unexpected_reference_kind() {
        let mut img = image(&[0x4770, 0x4770]);
        let mut tracer = Classifier::new(&mut img);
        tracer.worklist.push(WorkItem {
            address: 2,
            kind: CellKind::Instruction,
            comment: String::new(),
            origin: None,
        });
        tracer.worklist.push(WorkItem {
            address: 0,
            kind: CellKind::VectorTable,
            comment: String::new(),
            origin: None,
        });
        let err = tracer.drain().unwrap_err();
        assert!(matches!(
            err,
            AnalyzerError::UnexpectedReference { address: 0, kind: CellKind::VectorTable }
        ));
        assert!(tracer.worklist.is_empty());
        assert_eq!(img.lookup(2).unwrap().kind, CellKind::Unknown);
    }

    #[test]
    fn test_register_move_does_not_fall_through() {
        // LDR R0, [PC, #0]; MOV R0, R1; literal right after the move
        let mut img = image(&[0x0000, 0x0000, 0x4800, 0x4608, 0x1234, 0x5678]);
        Classifier::new(&mut img).mark_instruction(4, "entry; ").unwrap();

        assert_eq!(img.lookup(6).unwrap().kind, CellKind::Instruction);
        assert_eq!(img.lookup(6).unwrap().decoded.as_ref().unwrap().description, "Move Registers");
        assert_eq!(img.lookup(8).unwrap().kind, CellKind::RawData);
        assert_eq!(img.value32(8).unwrap(), 0x5678_1234);
    }

    #[test]
    fn test_literal_base_rounds_down_at_odd_halfword() {
        // LDR R0, [PC, #4] at 6 loads from Align(10, 4) + 4 = 12.
        let mut img = image(&[0x0000, 0x0000, 0x0000, 0x4801, 0x4770, 0x0000, 0xBEEF, 0xDEAD]);
        Classifier::new(&mut img).mark_instruction(6, "").unwrap();

        assert_eq!(img.lookup(12).unwrap().kind, CellKind::RawData);
        assert_eq!(img.value32(12).unwrap(), 0xDEAD_BEEF);
        assert_eq!(img.lookup(10).unwrap().kind, CellKind::Unknown);
    }

    #[test]
    fn test_thumb_bit_kept_when_disabled() {
        let mut data = vec![0u8; 0xC0];
        data[0x04..0x08].copy_from_slice(&0xC1u32.to_le_bytes());
        data.extend_from_slice(&0x4770u16.to_le_bytes());
        let mut img = MemoryImage::from_bytes(&data).unwrap();

        let vectors = vectors::analyze(&mut img).unwrap();
        let options = AnalyzerOptions {
            clear_thumb_bit: false,
            ..AnalyzerOptions::new()
        };
        let err = classify(&mut img, &vectors, &options).unwrap_err();
        assert!(matches!(err, AnalyzerError::Misaligned { address: 0xC1 }));
    }
}
