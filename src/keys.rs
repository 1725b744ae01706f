//! Construction of the keys of the spelling table.
//!
//! Everything lives in a single database; the leading signature bytes keep
//! the subspaces apart. Fragment and word-id keys embed the 4-byte
//! little-endian group id so distinct prefix groups never share entries.

use crate::{PrefixGroup, WordId};

/// Next group id to allocate.
pub const GROUPMAX: &[u8] = b"GROUPMAX";
/// FastSS allocator high-water mark.
pub const INDEXMAX: &[u8] = b"INDEXMAX";
/// FastSS free word-id list, most recently freed last.
pub const INDEXSTACK: &[u8] = b"INDEXSTACK";

const WORD: u8 = b'W';
const WORDS: &[u8] = b"WS";
const WORD_ID: &[u8] = b"WI";
const NEIGHBORHOOD: u8 = b'I';
const SPELLING: u8 = b'S';

pub fn write_group(buf: &mut Vec<u8>, group: PrefixGroup) {
    buf.extend_from_slice(&group.to_le_bytes());
}

/// `S‖<prefix>` → the group id enabled for this application prefix.
pub fn group_key(prefix: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + prefix.len());
    key.push(SPELLING);
    key.extend_from_slice(prefix.as_bytes());
    key
}

/// `W‖<grp4LE>‖<word>` → word frequency.
pub fn word_frequency_key(group: PrefixGroup, word: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(5 + word.len());
    key.push(WORD);
    write_group(&mut key, group);
    key.extend_from_slice(word.as_bytes());
    key
}

/// The cursor prefix under which all the word frequencies of a group live.
pub fn word_frequency_prefix(group: PrefixGroup) -> Vec<u8> {
    let mut key = Vec::with_capacity(5);
    key.push(WORD);
    write_group(&mut key, group);
    key
}

/// `WS‖<grp4LE>‖<min-hash>‖<max-hash>` → unordered word-pair frequency.
///
/// The hashes are ordered before packing so that `(a, b)` and `(b, a)`
/// share one entry. FxHash is stable across processes, which the key
/// encoding relies on.
pub fn words_frequency_key(group: PrefixGroup, first: &str, second: &str) -> Vec<u8> {
    let first_hash = fxhash::hash32(first.as_bytes());
    let second_hash = fxhash::hash32(second.as_bytes());
    let (low, high) = if first_hash <= second_hash {
        (first_hash, second_hash)
    } else {
        (second_hash, first_hash)
    };
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(WORDS);
    write_group(&mut key, group);
    crate::codec::varint::encode_into(&mut key, u64::from(low));
    crate::codec::varint::encode_into(&mut key, u64::from(high));
    key
}

/// `<grp4LE>‖<word>` → the FastSS word id (the PrefixedWord key).
pub fn word_id_key(group: PrefixGroup, word: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + word.len());
    write_group(&mut key, group);
    key.extend_from_slice(word.as_bytes());
    key
}

/// `WI‖<id4LE>` → the UTF-8 word owning this FastSS id.
pub fn id_word_key(id: WordId) -> Vec<u8> {
    let mut key = Vec::with_capacity(6);
    key.extend_from_slice(WORD_ID);
    key.extend_from_slice(&id.to_le_bytes());
    key
}

/// `I‖<grp4LE>‖<variant-prefix>` → a FastSS posting list.
pub fn neighborhood_key(group: PrefixGroup, variant_prefix: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(5 + variant_prefix.len());
    key.push(NEIGHBORHOOD);
    write_group(&mut key, group);
    key.extend_from_slice(variant_prefix.as_bytes());
    key
}

/// `<pos>‖<grp4LE>‖<fragment>` → a trigram posting list.
pub fn fragment_key(position: u8, group: PrefixGroup, fragment: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(5 + fragment.len());
    key.push(position);
    write_group(&mut key, group);
    key.extend_from_slice(fragment.as_bytes());
    key
}
