//! Integer codecs shared by every on-disk grammar
//!
//! Two unrelated variable-length formats coexist on disk:
//! - compact-size, the wire encoding used inside blocks, transactions and undo records
//! - the base-128 "varint" used by the block index and the undo journal
//!
//! plus the amount compression applied to spent outputs.

use crate::error::{ParseError, Result};

/// DecodeCompactSize: 𝔹* → ℕ × ℕ
///
/// For first byte b:
/// 1. b < 253: value = b, 1 byte consumed
/// 2. b = 253 / 254 / 255: value = next 2 / 4 / 8 bytes little-endian
pub fn decode_compact_size(bytes: &[u8]) -> Result<(u64, usize)> {
    let first = *bytes
        .first()
        .ok_or_else(|| ParseError::Truncated("empty compact-size".to_string()))?;

    let width = match first {
        0..=252 => return Ok((first as u64, 1)),
        253 => 2,
        254 => 4,
        255 => 8,
    };

    if bytes.len() < 1 + width {
        return Err(ParseError::Truncated(format!(
            "compact-size needs {} bytes, {} available",
            1 + width,
            bytes.len()
        )));
    }

    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(&bytes[1..1 + width]);
    Ok((u64::from_le_bytes(buf), 1 + width))
}

/// Encode a value in compact-size form
pub fn encode_compact_size(value: u64) -> Vec<u8> {
    match value {
        0..=252 => vec![value as u8],
        253..=0xffff => {
            let mut out = vec![253];
            out.extend_from_slice(&(value as u16).to_le_bytes());
            out
        }
        0x10000..=0xffff_ffff => {
            let mut out = vec![254];
            out.extend_from_slice(&(value as u32).to_le_bytes());
            out
        }
        _ => {
            let mut out = vec![255];
            out.extend_from_slice(&value.to_le_bytes());
            out
        }
    }
}

/// DecodeVarInt: 𝔹* → ℕ × ℕ
///
/// Base-128 with the continuation flag in the high bit:
/// 1. n = (n << 7) | (b & 0x7f)
/// 2. If b & 0x80 = 0: return n
/// 3. Else n = n + 1 and continue
pub fn decode_varint(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut n: u64 = 0;

    for (pos, &byte) in bytes.iter().enumerate() {
        if n > (u64::MAX >> 7) {
            return Err(ParseError::VarIntOverflow(format!(
                "varint exceeds 64 bits after {} bytes",
                pos
            )));
        }
        n = (n << 7) | (byte & 0x7f) as u64;
        if byte & 0x80 == 0 {
            return Ok((n, pos + 1));
        }
        n = n
            .checked_add(1)
            .ok_or_else(|| ParseError::VarIntOverflow("varint exceeds 64 bits".to_string()))?;
    }

    Err(ParseError::Truncated(format!(
        "varint not terminated within {} bytes",
        bytes.len()
    )))
}

/// Encode a value in the base-128 index varint form
pub fn encode_varint(mut value: u64) -> Vec<u8> {
    let mut tmp = Vec::with_capacity(10);
    let mut first = true;

    loop {
        let flag = if first { 0x00 } else { 0x80 };
        tmp.push((value & 0x7f) as u8 | flag);
        if value <= 0x7f {
            break;
        }
        value = (value >> 7) - 1;
        first = false;
    }

    tmp.reverse();
    tmp
}

/// CompressAmount: ℕ → ℕ
///
/// 1. n = 0: return 0
/// 2. Strip up to 9 trailing decimal zeros, counting them as e
/// 3. e < 9: d = n mod 10, n = n / 10, return 1 + (9n + d - 1)·10 + e
/// 4. e = 9: return 1 + (n - 1)·10 + 9
///
/// The result is widened to `u128`: for amounts near 2^63 the compressed form exceeds 64 bits.
pub fn compress_amount(amount: u64) -> u128 {
    if amount == 0 {
        return 0;
    }

    let mut n = amount as u128;
    let mut e = 0u128;
    while n % 10 == 0 && e < 9 {
        n /= 10;
        e += 1;
    }

    if e < 9 {
        let d = n % 10;
        n /= 10;
        1 + (n * 9 + d - 1) * 10 + e
    } else {
        1 + (n - 1) * 10 + 9
    }
}

/// DecompressAmount: ℕ → ℕ
///
/// Inverse of `compress_amount`. Returns `None` when the decoded amount does not fit 64 bits.
pub fn decompress_amount(compressed: u128) -> Option<u64> {
    if compressed == 0 {
        return Some(0);
    }

    let mut x = compressed - 1;
    let e = (x % 10) as u32;
    x /= 10;

    let n = if e < 9 {
        let last = x % 9 + 1;
        x /= 9;
        x.checked_mul(10)?.checked_add(last)?
    } else {
        x + 1
    };

    let value = n.checked_mul(10u128.checked_pow(e)?)?;
    u64::try_from(value).ok()
}

/// Forward-only cursor over a borrowed byte buffer
///
/// Every read is bounds-checked; a short read fails with the error kind of the grammar the
/// reader was created for (`fail`), so callers never observe partially decoded values.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    fail: fn(String) -> ParseError,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8], fail: fn(String) -> ParseError) -> Self {
        Self { data, pos: 0, fail }
    }

    pub fn with_offset(data: &'a [u8], pos: usize, fail: fn(String) -> ParseError) -> Self {
        Self { data, pos, fail }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Error of this reader's grammar
    pub fn error(&self, msg: impl Into<String>) -> ParseError {
        (self.fail)(msg.into())
    }

    /// Look at the next `len` bytes without consuming them
    pub fn peek(&self, len: usize) -> Option<&'a [u8]> {
        self.data.get(self.pos..self.pos.checked_add(len)?)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let slice = self.peek(len).ok_or_else(|| {
            self.error(format!(
                "need {} bytes at offset {}, {} available",
                len,
                self.pos,
                self.remaining()
            ))
        })?;
        self.pos += len;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_compact_size(&mut self) -> Result<u64> {
        let (value, used) = decode_compact_size(&self.data[self.pos.min(self.data.len())..])
            .map_err(|e| self.error(e.to_string()))?;
        self.pos += used;
        Ok(value)
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        let (value, used) = decode_varint(&self.data[self.pos.min(self.data.len())..])
            .map_err(|e| self.error(e.to_string()))?;
        self.pos += used;
        Ok(value)
    }

    /// Read a compact-size length followed by that many bytes
    pub fn read_var_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_compact_size()?;
        let len = usize::try_from(len).map_err(|_| self.error(format!("length {} too large", len)))?;
        self.read_bytes(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_size_single_byte() {
        assert_eq!(decode_compact_size(&[0x42]).unwrap(), (0x42, 1));
        assert_eq!(decode_compact_size(&[252]).unwrap(), (252, 1));
    }

    #[test]
    fn test_compact_size_wide_forms() {
        assert_eq!(decode_compact_size(&[0xfd, 0x34, 0x12]).unwrap(), (0x1234, 3));
        assert_eq!(
            decode_compact_size(&[0xfe, 0x78, 0x56, 0x34, 0x12]).unwrap(),
            (0x12345678, 5)
        );
        assert_eq!(
            decode_compact_size(&[0xff, 1, 0, 0, 0, 0, 0, 0, 0]).unwrap(),
            (1, 9)
        );
    }

    #[test]
    fn test_compact_size_truncated() {
        assert!(matches!(decode_compact_size(&[]), Err(ParseError::Truncated(_))));
        assert!(matches!(decode_compact_size(&[0xfd, 0x01]), Err(ParseError::Truncated(_))));
    }

    #[test]
    fn test_encode_compact_size_boundaries() {
        assert_eq!(encode_compact_size(252), vec![252]);
        assert_eq!(encode_compact_size(253), vec![253, 253, 0]);
        assert_eq!(encode_compact_size(0x10000), vec![254, 0, 0, 1, 0]);
        assert_eq!(encode_compact_size(1 << 32).len(), 9);
    }

    #[test]
    fn test_varint_known_encodings() {
        assert_eq!(decode_varint(&[0x00]).unwrap(), (0, 1));
        assert_eq!(decode_varint(&[0x7f]).unwrap(), (127, 1));
        assert_eq!(decode_varint(&[0x80, 0x00]).unwrap(), (128, 2));
        assert_eq!(decode_varint(&[0x80, 0x7f]).unwrap(), (255, 2));
        assert_eq!(decode_varint(&[0xff, 0x00]).unwrap(), (16384, 2));
        assert_eq!(decode_varint(&[0x8e, 0xfe, 0xfe, 0xff, 0x00]).unwrap(), (1 << 32, 5));
    }

    #[test]
    fn test_varint_ignores_trailing_bytes() {
        assert_eq!(decode_varint(&[0x90, 0x71, 0xff]).unwrap(), (2289, 2));
    }

    #[test]
    fn test_varint_truncated() {
        assert!(matches!(decode_varint(&[]), Err(ParseError::Truncated(_))));
        assert!(matches!(decode_varint(&[0x80, 0x80]), Err(ParseError::Truncated(_))));
    }

    #[test]
    fn test_varint_overflow() {
        let bytes = [0xff; 12];
        assert!(matches!(decode_varint(&bytes), Err(ParseError::VarIntOverflow(_))));
    }

    #[test]
    fn test_encode_varint_matches_decoder() {
        assert_eq!(encode_varint(0), vec![0x00]);
        assert_eq!(encode_varint(128), vec![0x80, 0x00]);
        assert_eq!(encode_varint(16384), vec![0xff, 0x00]);
        assert_eq!(encode_varint(u64::MAX).len(), 10);
        let encoded = encode_varint(u64::MAX);
        assert_eq!(decode_varint(&encoded).unwrap(), (u64::MAX, 10));
    }

    #[test]
    fn test_compress_amount_reference_values() {
        assert_eq!(compress_amount(0), 0);
        assert_eq!(compress_amount(1), 1);
        assert_eq!(compress_amount(100_000_000), 9);
        assert_eq!(compress_amount(5_000_000_000), 50);
        assert_eq!(compress_amount(12_345), 111_101);
    }

    #[test]
    fn test_decompress_amount_reference_values() {
        assert_eq!(decompress_amount(0), Some(0));
        assert_eq!(decompress_amount(9), Some(100_000_000));
        assert_eq!(decompress_amount(50), Some(5_000_000_000));
        assert_eq!(decompress_amount(111_101), Some(12_345));
    }

    #[test]
    fn test_decompress_amount_overflow() {
        assert_eq!(decompress_amount(u128::MAX), None);
    }

    #[test]
    fn test_amount_round_trip_large_values() {
        for n in [u64::MAX / 2, (1u64 << 63) - 1, 21_000_000 * 100_000_000] {
            assert_eq!(decompress_amount(compress_amount(n)), Some(n));
        }
    }

    #[test]
    fn test_reader_maps_errors_to_grammar() {
        let data = [0x01, 0x02];
        let mut reader = Reader::new(&data, ParseError::MalformedTransaction);
        assert_eq!(reader.read_u8().unwrap(), 1);
        assert!(matches!(reader.read_u32_le(), Err(ParseError::MalformedTransaction(_))));
        assert_eq!(reader.position(), 1);
    }

    #[test]
    fn test_reader_var_bytes() {
        let data = [0x02, 0xaa, 0xbb, 0xcc];
        let mut reader = Reader::new(&data, ParseError::MalformedBlock);
        assert_eq!(reader.read_var_bytes().unwrap(), &[0xaa, 0xbb]);
        assert_eq!(reader.remaining(), 1);

        let short = [0x05, 0xaa];
        let mut reader = Reader::new(&short, ParseError::MalformedBlock);
        assert!(matches!(reader.read_var_bytes(), Err(ParseError::MalformedBlock(_))));
    }
}
