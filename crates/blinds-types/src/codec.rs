//! Wire encoding of position values.
//!
//! A position travels as an unsigned 32-bit little-endian integer at
//! offset 0 of the characteristic value.

use crate::error::{ParseError, ParseResult};

/// Size of an encoded position.
pub const POSITION_LEN: usize = 4;

/// Encode a position for a characteristic write.
pub fn encode_position(value: u32) -> [u8; POSITION_LEN] {
    value.to_le_bytes()
}

/// Decode a position from a characteristic value.
///
/// Absent, empty and truncated values are errors; the caller treats them as
/// a sign that the device went away. Bytes past the first four are ignored.
pub fn decode_position(value: Option<&[u8]>) -> ParseResult<u32> {
    let bytes = value.ok_or(ParseError::MissingValue)?;
    if bytes.is_empty() {
        return Err(ParseError::MissingValue);
    }
    let head: [u8; POSITION_LEN] = bytes
        .get(..POSITION_LEN)
        .and_then(|head| head.try_into().ok())
        .ok_or(ParseError::InsufficientBytes {
            expected: POSITION_LEN,
            actual: bytes.len(),
        })?;
    Ok(u32::from_le_bytes(head))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_is_little_endian() {
        assert_eq!(encode_position(50), [50, 0, 0, 0]);
        assert_eq!(encode_position(0x0102_0304), [0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_decode_absent_and_empty() {
        assert_eq!(decode_position(None), Err(ParseError::MissingValue));
        assert_eq!(decode_position(Some(&[])), Err(ParseError::MissingValue));
    }

    #[test]
    fn test_decode_truncated() {
        assert_eq!(
            decode_position(Some(&[1, 2])),
            Err(ParseError::InsufficientBytes {
                expected: 4,
                actual: 2
            })
        );
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        assert_eq!(decode_position(Some(&[42, 0, 0, 0, 0xFF, 0xFF])), Ok(42));
    }

    proptest! {
        #[test]
        fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..16)) {
            let result = decode_position(Some(&bytes));
            prop_assert_eq!(result.is_ok(), bytes.len() >= POSITION_LEN);
        }
    }
}
