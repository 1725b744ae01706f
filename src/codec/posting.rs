//! The packed `(word-id, deletion-mask)` arrays stored under FastSS
//! neighborhood keys, and the 4-byte little-endian arrays holding the
//! allocator state.
//!
//! The mask occupies the top 8 bits of each entry, the id the low 24.

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::CorruptionError;
use crate::WordId;

const MASK_SHIFT: u32 = 24;

/// The largest id the packing can represent.
pub const MAX_WORD_ID: WordId = (1 << MASK_SHIFT) - 1;

pub fn pack_entry(id: WordId, mask: u32) -> u32 {
    debug_assert!(id <= MAX_WORD_ID);
    debug_assert!(mask <= 0xff);
    id | (mask << MASK_SHIFT)
}

pub fn unpack_entry(entry: u32) -> (WordId, u32) {
    (entry & MAX_WORD_ID, entry >> MASK_SHIFT)
}

pub fn word_id(entry: u32) -> WordId {
    entry & MAX_WORD_ID
}

pub fn read_u32s(mut bytes: &[u8]) -> Result<Vec<u32>, CorruptionError> {
    if bytes.len() % 4 != 0 {
        return Err(CorruptionError::PostingListSize);
    }
    let mut values = Vec::with_capacity(bytes.len() / 4);
    while let Ok(value) = bytes.read_u32::<LittleEndian>() {
        values.push(value);
    }
    Ok(values)
}

pub fn write_u32s(values: &[u32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    values.iter().map(|v| v.to_le_bytes()).for_each(|b| bytes.extend_from_slice(&b));
    bytes
}
