//! Firmware image loading.
//!
//! Turns a raw byte stream into little-endian 16-bit words. An odd
//! trailing byte is kept as a final word with a zero high byte.

use crate::error::{AnalyzerError, Result};
use byteorder::{ByteOrder, LittleEndian};

/// One 16-bit word of the image and its byte address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Word {
    /// Byte offset, always even
    pub address: u32,
    /// Little-endian value
    pub value: u16,
}

/// Split `data` into 16-bit words.
pub fn load_words(data: &[u8]) -> Result<Vec<Word>> {
    if data.is_empty() {
        return Err(AnalyzerError::MalformedInput {
            message: "firmware image is empty".to_string(),
        });
    }
    if u32::try_from(data.len() + 1).is_err() {
        return Err(AnalyzerError::MalformedInput {
            message: format!("firmware image of {} bytes exceeds the 32-bit address space", data.len()),
        });
    }

    let chunks = data.chunks_exact(2);
    let tail = chunks.remainder();
    let mut words: Vec<u16> = chunks.map(LittleEndian::read_u16).collect();
    if let [low] = tail {
        words.push(u16::from(*low));
    }

    Ok((0u32..)
        .step_by(2)
        .zip(words)
        .map(|(address, value)| Word { address, value })
        .collect())
}
