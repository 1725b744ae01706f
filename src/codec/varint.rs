//! LEB128 unsigned varints, used for every persisted counter.

use crate::error::CorruptionError;

pub fn encode_into(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

/// Decodes a varint from the head of `bytes`, returning the value and the
/// remaining bytes.
pub fn decode(bytes: &[u8]) -> Option<(u64, &[u8])> {
    let mut value = 0u64;
    for (i, &byte) in bytes.iter().enumerate() {
        if i == 10 {
            return None;
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, &bytes[i + 1..]));
        }
    }
    None
}

/// Decodes a varint that must span the whole of `bytes` and fit in a `u32`.
pub fn decode_u32(bytes: &[u8], entry: &'static str) -> Result<u32, CorruptionError> {
    match decode(bytes) {
        Some((value, rest)) if rest.is_empty() => {
            u32::try_from(value).map_err(|_| CorruptionError::BadVarint { entry })
        }
        _ => Err(CorruptionError::BadVarint { entry }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        for value in [0u64, 1, 127, 128, 300, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            encode_into(&mut buf, value);
            let (decoded, rest) = decode(&buf).unwrap();
            assert_eq!(decoded, value);
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn single_byte_boundary() {
        let mut buf = Vec::new();
        encode_into(&mut buf, 127);
        assert_eq!(buf, [127]);

        buf.clear();
        encode_into(&mut buf, 128);
        assert_eq!(buf, [0x80, 0x01]);
    }

    #[test]
    fn trailing_bytes_are_returned() {
        let (value, rest) = decode(&[0x05, 0xff, 0xff]).unwrap();
        assert_eq!(value, 5);
        assert_eq!(rest, &[0xff, 0xff]);
    }

    #[test]
    fn truncated_input() {
        assert!(decode(&[]).is_none());
        assert!(decode(&[0x80]).is_none());
        assert!(decode_u32(&[0x05, 0x00], "test").is_err());
    }
}
