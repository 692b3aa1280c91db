//! Header block codec seam, plus a minimal literal-only implementation.
//!
//! The compression codec proper is an external collaborator: the stream core
//! treats it as a bytes-to-header-list / header-list-to-bytes black box
//! behind [`HeaderCodec`]. The bundled [`LiteralCodec`] speaks the QPACK
//! literal subset (RFC 9204, literal field lines only, zero required insert
//! count and base, no Huffman) — enough to exercise the framed encoding and
//! for deployments that never negotiate a dynamic table.

use crate::error::StreamError;
use crate::header::HeaderField;

/// Bytes-to-header-list and header-list-to-bytes black box.
pub trait HeaderCodec {
    /// Decode one complete header block into fields.
    fn decode(&mut self, block: &[u8]) -> Result<Vec<HeaderField>, StreamError>;

    /// Encode fields into one header block.
    fn encode(&mut self, fields: &[HeaderField]) -> Vec<u8>;
}

// ── Prefix integer codec (RFC 9204 Section 4.1.1) ───────────────────
//
// Not the transport varint: an N-bit prefix holds the value if it fits,
// otherwise the prefix saturates and the remainder follows in 7-bit chunks.

fn encode_prefix_int(buf: &mut Vec<u8>, value: u64, prefix_bits: u8, pattern: u8) {
    let max = (1u64 << prefix_bits) - 1;
    if value < max {
        buf.push(pattern | value as u8);
    } else {
        buf.push(pattern | max as u8);
        let mut remaining = value - max;
        while remaining >= 128 {
            buf.push(0x80 | (remaining & 0x7f) as u8);
            remaining >>= 7;
        }
        buf.push(remaining as u8);
    }
}

fn decode_prefix_int(buf: &[u8], prefix_bits: u8) -> Option<(u64, usize)> {
    let max = (1u64 << prefix_bits) - 1;
    let value = u64::from(*buf.first()?) & max;
    if value < max {
        return Some((value, 1));
    }
    let mut value = max;
    let mut shift = 0u32;
    for (i, &b) in buf[1..].iter().enumerate() {
        value += u64::from(b & 0x7f) << shift;
        shift += 7;
        if b & 0x80 == 0 {
            return Some((value, i + 2));
        }
        if shift > 56 {
            return None; // overflow protection
        }
    }
    None // incomplete
}

// ── Literal-only codec ──────────────────────────────────────────────

/// Literal field line with literal name (RFC 9204 Section 4.5.6):
/// `001 N H` pattern, 3-bit name length prefix.
const LITERAL_PATTERN: u8 = 0x20;
const LITERAL_MASK: u8 = 0xe0;
const LITERAL_NAME_HUFFMAN: u8 = 0x08;
const VALUE_HUFFMAN: u8 = 0x80;

/// Literal-only header block codec.
#[derive(Debug, Default)]
pub struct LiteralCodec;

impl HeaderCodec for LiteralCodec {
    fn decode(&mut self, block: &[u8]) -> Result<Vec<HeaderField>, StreamError> {
        // Block prefix: required insert count (8-bit prefix int) and base
        // (sign + 7-bit prefix int). This codec only accepts zero for both.
        let (ric, n) = decode_prefix_int(block, 8).ok_or(StreamError::HeaderDecode)?;
        let mut rest = &block[n..];
        let (base, n) = decode_prefix_int(rest, 7).ok_or(StreamError::HeaderDecode)?;
        if ric != 0 || base != 0 {
            return Err(StreamError::HeaderDecode);
        }
        rest = &rest[n..];

        let mut fields = Vec::new();
        while !rest.is_empty() {
            let first = rest[0];
            if first & LITERAL_MASK != LITERAL_PATTERN || first & LITERAL_NAME_HUFFMAN != 0 {
                return Err(StreamError::HeaderDecode);
            }
            let (name_len, n) = decode_prefix_int(rest, 3).ok_or(StreamError::HeaderDecode)?;
            rest = &rest[n..];
            if rest.len() < name_len as usize {
                return Err(StreamError::HeaderDecode);
            }
            let name = rest[..name_len as usize].to_vec();
            rest = &rest[name_len as usize..];

            if rest.first().is_some_and(|b| b & VALUE_HUFFMAN != 0) {
                return Err(StreamError::HeaderDecode);
            }
            let (value_len, n) = decode_prefix_int(rest, 7).ok_or(StreamError::HeaderDecode)?;
            rest = &rest[n..];
            if rest.len() < value_len as usize {
                return Err(StreamError::HeaderDecode);
            }
            let value = rest[..value_len as usize].to_vec();
            rest = &rest[value_len as usize..];

            fields.push(HeaderField { name, value });
        }
        Ok(fields)
    }

    fn encode(&mut self, fields: &[HeaderField]) -> Vec<u8> {
        let mut out = vec![0x00, 0x00]; // required insert count 0, base 0
        for f in fields {
            encode_prefix_int(&mut out, f.name.len() as u64, 3, LITERAL_PATTERN);
            out.extend_from_slice(&f.name);
            encode_prefix_int(&mut out, f.value.len() as u64, 7, 0x00);
            out.extend_from_slice(&f.value);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_int_round_trip() {
        for (value, bits) in [(0u64, 3u8), (6, 3), (7, 3), (8, 3), (300, 3), (126, 7), (127, 7), (1337, 7)] {
            let mut buf = Vec::new();
            encode_prefix_int(&mut buf, value, bits, 0x00);
            assert_eq!(decode_prefix_int(&buf, bits), Some((value, buf.len())));
        }
    }

    #[test]
    fn block_round_trip() {
        let fields = vec![
            HeaderField::new(":method", "POST"),
            HeaderField::new(":path", "/"),
            HeaderField::new("cookie", "a=b"),
            HeaderField::new("cookie", "c=d"),
        ];
        let mut codec = LiteralCodec;
        let block = codec.encode(&fields);
        assert_eq!(codec.decode(&block).unwrap(), fields);
    }

    #[test]
    fn long_names_and_values() {
        // Longer than either length prefix holds directly.
        let fields = vec![HeaderField::new(vec![b'n'; 100], vec![b'v'; 20_000])];
        let mut codec = LiteralCodec;
        let block = codec.encode(&fields);
        assert_eq!(codec.decode(&block).unwrap(), fields);
    }

    #[test]
    fn dynamic_table_references_rejected() {
        // Nonzero required insert count.
        let block = [0x01, 0x00, 0x22, b'h', b'i', 0x00];
        assert_eq!(
            LiteralCodec.decode(&block),
            Err(StreamError::HeaderDecode)
        );
    }

    #[test]
    fn truncated_block_rejected() {
        let mut codec = LiteralCodec;
        let block = codec.encode(&[HeaderField::new("key", "value")]);
        assert_eq!(
            codec.decode(&block[..block.len() - 1]),
            Err(StreamError::HeaderDecode)
        );
    }

    #[test]
    fn empty_block_is_empty_list() {
        assert_eq!(LiteralCodec.decode(&[0x00, 0x00]).unwrap(), Vec::new());
    }
}
