//! Thumb instruction decoding.
//!
//! Decoding is table driven: each [`DecodeRule`] pairs a bit mask and the
//! expected bits with a handler. The first matching rule wins, so adding an
//! opcode family means adding a row. Opcodes that match nothing decode to
//! `None`; the tracer still marks them as code.

use crate::types::{ImpliedReference, Instruction};

/// Family masks and expected bits.
pub mod patterns {
    pub const SPECIAL_DATA_MASK: u16 = 0xFC00;
    pub const SPECIAL_DATA: u16 = 0x4400; // ADD/CMP/MOV high registers, BX, BLX
    pub const LDR_LITERAL_MASK: u16 = 0xF800;
    pub const LDR_LITERAL: u16 = 0x4800; // LDR Rt, [PC, #imm8 << 2]
    pub const LOAD_STORE_REG_MASK: u16 = 0xF000;
    pub const LOAD_STORE_REG: u16 = 0x5000; // register offset forms
    pub const LOAD_STORE_IMM_MASK: u16 = 0xE000;
    pub const LOAD_STORE_WORD_BYTE_IMM: u16 = 0x6000; // STR/LDR/STRB/LDRB imm5
    pub const LOAD_STORE_HALF_SP: u16 = 0x8000; // STRH/LDRH imm5, SP-relative
    pub const TWO_WORD_MASK: u16 = 0xF800;
    pub const TWO_WORD_PREFIXES: [u16; 3] = [0xF100, 0xF000, 0xE100];
}

/// Family descriptions as they appear in reports.
pub mod names {
    pub const ADD_REGISTERS: &str = "Add Registers";
    pub const COMPARE_REGISTERS: &str = "Compare Registers";
    pub const MOVE_REGISTERS: &str = "Move Registers";
    pub const BRANCH_EXCHANGE: &str = "Branch and Exchange";
    pub const BRANCH_LINK_EXCHANGE: &str = "Branch with Link and Exchange";
    pub const UNPREDICTABLE: &str = "Unpredictable";
    pub const LOAD_LITERAL: &str = "Load Register (literal)";
    pub const LOAD_STORE_SINGLE: &str = "Load/Store Single Data Item";
}

/// One row of the decode table.
#[derive(Debug, Clone, Copy)]
pub struct DecodeRule {
    /// Bits that take part in the match
    pub mask: u16,
    /// Value of the masked bits
    pub bits: u16,
    /// Builds the instruction from its address and opcode
    pub handler: fn(u32, u16) -> Instruction,
}

impl DecodeRule {
    /// Whether `opcode` belongs to this rule's family.
    pub fn matches(&self, opcode: u16) -> bool {
        opcode & self.mask == self.bits
    }
}

/// Decode table, checked in order.
pub const RULES: &[DecodeRule] = &[
    DecodeRule {
        mask: patterns::SPECIAL_DATA_MASK,
        bits: patterns::SPECIAL_DATA,
        handler: decode_special_data,
    },
    DecodeRule {
        mask: patterns::LDR_LITERAL_MASK,
        bits: patterns::LDR_LITERAL,
        handler: decode_load_literal,
    },
    DecodeRule {
        mask: patterns::LOAD_STORE_REG_MASK,
        bits: patterns::LOAD_STORE_REG,
        handler: decode_load_store_single,
    },
    DecodeRule {
        mask: patterns::LOAD_STORE_IMM_MASK,
        bits: patterns::LOAD_STORE_WORD_BYTE_IMM,
        handler: decode_load_store_single,
    },
    DecodeRule {
        mask: patterns::LOAD_STORE_IMM_MASK,
        bits: patterns::LOAD_STORE_HALF_SP,
        handler: decode_load_store_single,
    },
];

/// Decode the 16-bit `opcode` located at `address`.
pub fn decode(address: u32, opcode: u16) -> Option<Instruction> {
    RULES
        .iter()
        .find(|rule| rule.matches(opcode))
        .map(|rule| (rule.handler)(address, opcode))
}

/// Whether `opcode` is the first half of a 32-bit encoding.
///
/// Such opcodes need the following word to decode, which is not supported.
pub fn is_two_word_encoding(opcode: u16) -> bool {
    patterns::TWO_WORD_PREFIXES.contains(&(opcode & patterns::TWO_WORD_MASK))
}

/// Register name in assembler syntax.
pub fn register_name(reg: u16) -> String {
    match reg {
        13 => "SP".to_string(),
        14 => "LR".to_string(),
        15 => "PC".to_string(),
        r => format!("R{}", r),
    }
}

/// Address of the next halfword, the fall-through of a 16-bit instruction.
fn next(address: u32) -> u32 {
    address.wrapping_add(2)
}

// Special data processing and branch/exchange: opcode in bits 9:6.
// Operands only; this family implies no references.
fn decode_special_data(_address: u32, opcode: u16) -> Instruction {
    let op = (opcode >> 6) & 0xF;
    let rm = (opcode >> 3) & 0xF;
    // Rdn/Rn/Rd: high bit in bit 7, low three bits in 2:0.
    let rd = ((opcode >> 4) & 0x8) | (opcode & 0x7);

    let (description, operands) = match op {
        0b0000..=0b0011 => (names::ADD_REGISTERS, Some((rd, rm))),
        0b0100 => (names::UNPREDICTABLE, None),
        0b0101..=0b0111 => (names::COMPARE_REGISTERS, Some((rd, rm))),
        0b1000..=0b1011 => (names::MOVE_REGISTERS, Some((rd, rm))),
        0b1100 | 0b1101 => (names::BRANCH_EXCHANGE, None),
        _ => (names::BRANCH_LINK_EXCHANGE, None),
    };

    let mut instr = Instruction::new(description);
    match operands {
        Some((rd, rm)) => {
            instr = instr
                .with_operand(register_name(rd))
                .with_operand(register_name(rm));
        }
        None if description != names::UNPREDICTABLE => {
            instr = instr.with_operand(register_name(rm));
        }
        None => {}
    }
    instr
}

/// LDR (literal): the target is `Align(address + 4, 4) + imm8 * 4`.
///
/// The base is the word-aligned PC. For an instruction at a word-aligned
/// address this is `address + 4 + imm`; at an address of the form `4k + 2`
/// the base rounds down by two, so `0x4803` at `0xC6` loads from `0xD4`
/// rather than `0xD6`.
fn decode_load_literal(address: u32, opcode: u16) -> Instruction {
    let rt = (opcode >> 8) & 0x7;
    let offset = u32::from(opcode & 0xFF) << 2;
    let target = (address.wrapping_add(4) & !3).wrapping_add(offset);

    Instruction::new(names::LOAD_LITERAL)
        .with_operand(register_name(rt))
        .with_operand(format!("[PC, #{}]", offset))
        .with_reference(ImpliedReference::raw_data(target))
        .with_reference(ImpliedReference::instruction(next(address)))
}

// Register and immediate offset loads/stores; operands are not decoded.
fn decode_load_store_single(address: u32, _opcode: u16) -> Instruction {
    Instruction::new(names::LOAD_STORE_SINGLE)
        .with_reference(ImpliedReference::instruction(next(address)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CellKind;

    #[test]
    fn test_load_literal() {
        let instr = decode(0xC4, 0x4803).unwrap();
        assert_eq!(instr.description, "Load Register (literal)");
        assert_eq!(instr.operands, vec!["R0", "[PC, #12]"]);
        assert_eq!(
            instr.references,
            vec![
                ImpliedReference { address: 0xD4, kind: CellKind::RawData },
                ImpliedReference { address: 0xC6, kind: CellKind::Instruction },
            ]
        );
    }

    #[test]
    fn test_load_literal_register_and_alignment() {
        // LDR R5, [PC, #1020] at a halfword-aligned address; the base is
        // 0x104, not address + 4 = 0x106.
        let instr = decode(0x102, 0x4DFF).unwrap();
        assert_eq!(instr.operands[0], "R5");
        assert_eq!(instr.references[0].address, 0x104 + 0x3FC);

        let instr = decode(0xC6, 0x4803).unwrap();
        assert_eq!(
            instr.references,
            vec![
                ImpliedReference::raw_data(0xD4),
                ImpliedReference::instruction(0xC8),
            ]
        );
    }

    #[test]
    fn test_special_data_families() {
        let cases = [
            (0x4408, names::ADD_REGISTERS),       // ADD R0, R1
            (0x4500, names::UNPREDICTABLE),
            (0x4548, names::COMPARE_REGISTERS),   // CMP R0, R9
            (0x4588, names::COMPARE_REGISTERS),   // CMP R8, R1
            (0x4608, names::MOVE_REGISTERS),      // MOV R0, R1
            (0x4770, names::BRANCH_EXCHANGE),     // BX LR
            (0x4780, names::BRANCH_LINK_EXCHANGE), // BLX R0
        ];
        for (opcode, expected) in cases {
            let instr = decode(0x200, opcode).unwrap();
            assert_eq!(instr.description, expected, "opcode {:04X}", opcode);
        }
    }

    #[test]
    fn test_special_data_has_no_references() {
        for opcode in [0x4408, 0x4500, 0x4548, 0x4608, 0x468F, 0x4770, 0x4780] {
            let instr = decode(0x200, opcode).unwrap();
            assert!(instr.references.is_empty(), "opcode {:04X}", opcode);
        }
    }

    #[test]
    fn test_special_data_operands() {
        assert_eq!(decode(0x200, 0x4770).unwrap().operands, vec!["LR"]);
        assert_eq!(decode(0x200, 0x4780).unwrap().operands, vec!["R0"]);
        assert_eq!(decode(0x200, 0x468F).unwrap().operands, vec!["PC", "R1"]);
        assert_eq!(decode(0x200, 0x4408).unwrap().operands, vec!["R0", "R1"]);
        assert!(decode(0x200, 0x4500).unwrap().operands.is_empty());
    }

    #[test]
    fn test_load_store_single() {
        for opcode in [0x5000, 0x5FFF, 0x6000, 0x7FFF, 0x8000, 0x9FFF] {
            let instr = decode(0x300, opcode).unwrap();
            assert_eq!(instr.description, names::LOAD_STORE_SINGLE);
            assert_eq!(instr.references, vec![ImpliedReference::instruction(0x302)]);
        }
    }

    #[test]
    fn test_no_decode() {
        assert!(decode(0, 0x0000).is_none());
        assert!(decode(0, 0xBF00).is_none());
        assert!(decode(0, 0x4000).is_none());
    }

    #[test]
    fn test_two_word_encoding() {
        assert!(is_two_word_encoding(0xF000));
        assert!(is_two_word_encoding(0xF7FF));
        assert!(!is_two_word_encoding(0xF800));
        assert!(!is_two_word_encoding(0x4803));
        assert!(!is_two_word_encoding(0xE000));
    }
}
