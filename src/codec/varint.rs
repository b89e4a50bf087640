//! Varint length-prefix framing shared by the binary hub protocol codec.
//!
//! Ported from the original's `binary_message_formatter` /
//! `binary_message_parser`: 7 bits of length per byte, little-endian, the
//! high bit set to signal continuation, at most 5 bytes (covering lengths up
//! to 2^31 - 1).

use crate::error::ProtocolError;

const MAX_LENGTH: usize = i32::MAX as usize;

/// Appends the length prefix for `len` bytes onto `out`.
pub fn write_length_prefix(len: usize, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    if len > MAX_LENGTH {
        return Err(ProtocolError::MessageOver2Gb);
    }
    let mut n = len as u64;
    loop {
        let mut byte = (n & 0x7f) as u8;
        n >>= 7;
        if n > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if n == 0 {
            break;
        }
    }
    Ok(())
}

/// Attempts to parse a length prefix from the front of `buf`.
///
/// Returns `Ok(None)` if `buf` does not yet contain a complete prefix and
/// more bytes are needed before any decision can be made (mirrors the
/// original's "prefix incomplete, not enough bytes yet" `false` case).
/// Returns `Err(PartialMessage)` if the prefix is complete but the declared
/// body length exceeds the remaining bytes in `buf`.
pub fn try_parse_message(buf: &[u8]) -> Result<Option<(usize, usize)>, ProtocolError> {
    let mut length: u64 = 0;
    let mut num_bytes = 0usize;
    loop {
        if num_bytes >= buf.len() {
            // Not enough bytes to even finish reading the prefix.
            return Ok(None);
        }
        let byte = buf[num_bytes];
        length |= ((byte & 0x7f) as u64) << (num_bytes * 7);
        num_bytes += 1;

        if byte & 0x80 == 0 {
            break;
        }
        if num_bytes == 5 && byte > 0x07 {
            return Err(ProtocolError::MessageOver2Gb);
        }
        if num_bytes >= 5 {
            return Err(ProtocolError::MessageOver2Gb);
        }
    }

    let length = length as usize;
    if length > MAX_LENGTH {
        return Err(ProtocolError::MessageOver2Gb);
    }
    if buf.len() - num_bytes < length {
        return Err(ProtocolError::PartialMessage);
    }

    Ok(Some((num_bytes, length)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_various_lengths() {
        for &len in &[0usize, 1, 63, 64, 127, 128, 16384, 2_097_151, 268_435_455] {
            let mut prefix = Vec::new();
            write_length_prefix(len, &mut prefix).unwrap();
            let mut buf = prefix.clone();
            buf.extend(std::iter::repeat(0xAAu8).take(len));
            let (prefix_len, body_len) = try_parse_message(&buf).unwrap().unwrap();
            assert_eq!(prefix_len, prefix.len());
            assert_eq!(body_len, len);
        }
    }

    #[test]
    fn incomplete_prefix_returns_none() {
        // A continuation byte with nothing after it: not enough to decide.
        assert_eq!(try_parse_message(&[0x80]).unwrap(), None);
        assert_eq!(try_parse_message(&[]).unwrap(), None);
    }

    #[test]
    fn short_body_is_partial_message_error() {
        let mut prefix = Vec::new();
        write_length_prefix(10, &mut prefix).unwrap();
        prefix.extend(std::iter::repeat(0u8).take(3));
        assert!(matches!(
            try_parse_message(&prefix),
            Err(ProtocolError::PartialMessage)
        ));
    }

    #[test]
    fn sixth_continuation_byte_is_over_2gb_error() {
        let buf = [0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert!(matches!(
            try_parse_message(&buf),
            Err(ProtocolError::MessageOver2Gb)
        ));
    }
}
