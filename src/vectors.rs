//! Cortex-M exception and interrupt vector table.
//!
//! The table occupies the first 0xC0 bytes of the image: 16 system entries
//! followed by 32 external interrupts, each a 32-bit little-endian word.

use crate::error::Result;
use crate::memory::MemoryImage;
use crate::types::CellKind;
use std::fmt;
use tracing::debug;

/// Number of external interrupt entries.
pub const IRQ_COUNT: u8 = 32;

/// Byte offset of IRQ0.
pub const IRQ_BASE: u32 = 0x40;

/// Size of the whole table in bytes.
pub const TABLE_SIZE: u32 = IRQ_BASE + 4 * IRQ_COUNT as u32;

/// Role of a vector table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorSlot {
    InitialSp,
    Reset,
    Nmi,
    HardFault,
    Reserved,
    SvCall,
    PendSv,
    SysTick,
    Irq(u8),
}

impl VectorSlot {
    /// Whether the slot holds a handler address that should be traced.
    pub fn is_handler(self) -> bool {
        !matches!(self, VectorSlot::InitialSp | VectorSlot::Reserved)
    }
}

impl fmt::Display for VectorSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorSlot::InitialSp => write!(f, "Initial SP"),
            VectorSlot::Reset => write!(f, "Reset"),
            VectorSlot::Nmi => write!(f, "NMI"),
            VectorSlot::HardFault => write!(f, "HardFault"),
            VectorSlot::Reserved => write!(f, "Reserved"),
            VectorSlot::SvCall => write!(f, "SVCall"),
            VectorSlot::PendSv => write!(f, "PendSV"),
            VectorSlot::SysTick => write!(f, "SysTick"),
            VectorSlot::Irq(n) => write!(f, "IRQ{}", n),
        }
    }
}

/// One entry of the fixed table layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorTableEntry {
    /// Byte offset from the start of the image
    pub offset: u32,
    /// What the slot is used for
    pub slot: VectorSlot,
}

/// System exception slots, offsets 0x00 to 0x3C.
const SYSTEM_SLOTS: [VectorSlot; 16] = [
    VectorSlot::InitialSp,
    VectorSlot::Reset,
    VectorSlot::Nmi,
    VectorSlot::HardFault,
    VectorSlot::Reserved,
    VectorSlot::Reserved,
    VectorSlot::Reserved,
    VectorSlot::Reserved,
    VectorSlot::Reserved,
    VectorSlot::Reserved,
    VectorSlot::Reserved,
    VectorSlot::SvCall,
    VectorSlot::Reserved,
    VectorSlot::Reserved,
    VectorSlot::PendSv,
    VectorSlot::SysTick,
];

/// The full table layout in address order.
pub fn layout() -> Vec<VectorTableEntry> {
    let system = SYSTEM_SLOTS.iter().copied();
    let irqs = (0..IRQ_COUNT).map(VectorSlot::Irq);
    (0u32..)
        .step_by(4)
        .zip(system.chain(irqs))
        .map(|(offset, slot)| VectorTableEntry { offset, slot })
        .collect()
}

/// A classified vector and the address it points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vector {
    /// Table entry
    pub entry: VectorTableEntry,
    /// Combined 32-bit value of the entry
    pub target: u32,
}

/// Classify the vector table and read every entry's value.
///
/// This must run before any other classification; a conflict or an image
/// shorter than the table aborts the analysis.
pub fn analyze(image: &mut MemoryImage) -> Result<Vec<Vector>> {
    let entries = layout();
    let mut vectors = Vec::with_capacity(entries.len());

    for entry in entries {
        image.combine(entry.offset)?;
        image.set_kind(entry.offset, CellKind::VectorTable)?;
        image.append_annotation(entry.offset, &format!("{}; ", entry.slot))?;

        let target = image.value32(entry.offset)?;
        debug!(offset = entry.offset, slot = %entry.slot, target, "vector");
        vectors.push(Vector { entry, target });
    }

    Ok(vectors)
}
