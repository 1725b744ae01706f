//! The prefix-compressed word lists stored under trigram fragment keys.
//!
//! Words are stored in ascending byte order. The first record is
//! `{len:u8, bytes, wdf:varint}`; every following record reuses the common
//! prefix with the previous word: `{reuse:u8, rest_len:u8, rest_bytes,
//! wdf:varint}`. When the wdf is small enough, the reuse byte and the wdf
//! are packed together as `(wdf+1)·(prev_len+1)+reuse` in a single byte;
//! a leading byte that is greater than the previous word length announces
//! that packed form.

use crate::codec::varint;
use crate::error::CorruptionError;

fn common_prefix_length(left: &[u8], right: &[u8]) -> usize {
    left.iter().zip(right).take_while(|(l, r)| l == r).count()
}

/// Encodes an ascending list of `(word, wdf)` records.
pub fn encode(words: &[(String, u32)]) -> Vec<u8> {
    let mut tag = Vec::new();
    let mut iter = words.iter();

    let Some((first, wdf)) = iter.next() else { return tag };
    debug_assert!(first.len() <= u8::MAX as usize);
    tag.push(first.len() as u8);
    tag.extend_from_slice(first.as_bytes());
    varint::encode_into(&mut tag, u64::from(*wdf));

    let mut prev = first.as_str();
    for (word, wdf) in iter {
        debug_assert!(prev < word.as_str(), "word list must be sorted and unique");
        let reuse = common_prefix_length(prev.as_bytes(), word.as_bytes());
        let rest = &word.as_bytes()[reuse..];
        debug_assert!(rest.len() <= u8::MAX as usize);

        // Packing the wdf into the reuse byte only works while the
        // decoder can still split them apart, hence the < 256 bound.
        let packed = match *wdf {
            wdf if wdf < 127 => (wdf as usize + 1) * (prev.len() + 1) + reuse,
            _ => usize::MAX,
        };
        if packed < 256 {
            tag.push(packed as u8);
            tag.push(rest.len() as u8);
            tag.extend_from_slice(rest);
        } else {
            tag.push(reuse as u8);
            tag.push(rest.len() as u8);
            tag.extend_from_slice(rest);
            varint::encode_into(&mut tag, u64::from(*wdf));
        }

        prev = word;
    }

    tag
}

/// Decodes a whole list back into `(word, wdf)` records.
pub fn decode(mut bytes: &[u8]) -> Result<Vec<(String, u32)>, CorruptionError> {
    let mut words = Vec::new();
    if bytes.is_empty() {
        return Ok(words);
    }

    let len = bytes[0] as usize;
    bytes = &bytes[1..];
    if bytes.len() < len {
        return Err(CorruptionError::TruncatedWordList);
    }
    let mut prev = bytes[..len].to_vec();
    bytes = &bytes[len..];
    let (wdf, rest) = varint::decode(bytes).ok_or(CorruptionError::TruncatedWordList)?;
    bytes = rest;
    words.push((into_word(&prev)?, clamp_wdf(wdf)?));

    while !bytes.is_empty() {
        let head = bytes[0] as usize;
        bytes = &bytes[1..];

        let (reuse, packed_wdf) = if head <= prev.len() {
            (head, None)
        } else {
            let reuse = head % (prev.len() + 1);
            let wdf = (head / (prev.len() + 1)) as u64 - 1;
            (reuse, Some(wdf))
        };

        let [rest_len, tail @ ..] = bytes else {
            return Err(CorruptionError::TruncatedWordList);
        };
        let rest_len = *rest_len as usize;
        if tail.len() < rest_len {
            return Err(CorruptionError::TruncatedWordList);
        }

        prev.truncate(reuse);
        prev.extend_from_slice(&tail[..rest_len]);
        bytes = &tail[rest_len..];

        let wdf = match packed_wdf {
            Some(wdf) => wdf,
            None => {
                let (wdf, rest) =
                    varint::decode(bytes).ok_or(CorruptionError::TruncatedWordList)?;
                bytes = rest;
                wdf
            }
        };

        words.push((into_word(&prev)?, clamp_wdf(wdf)?));
    }

    Ok(words)
}

fn into_word(bytes: &[u8]) -> Result<String, CorruptionError> {
    std::str::from_utf8(bytes).map(str::to_owned).map_err(|_| CorruptionError::BadWordEncoding)
}

fn clamp_wdf(wdf: u64) -> Result<u32, CorruptionError> {
    u32::try_from(wdf).map_err(|_| CorruptionError::BadVarint { entry: "word list wdf" })
}
