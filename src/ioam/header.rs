//! Fixed 32-byte IOAM trace header
//!
//! Layout (big-endian):
//!
//! ```text
//! offset  0..2   namespace_id
//! offset  2      node_len        (units of 4 bytes, excludes opaque state)
//! offset  3      flags
//! offset  4      remaining_len   (units of 4 bytes, consumed before nodes)
//! offset  5..8   trace_type      (24-bit bitmask)
//! offset  8..16  trace_id_high
//! offset 16..24  trace_id_low
//! offset 24..32  span_id
//! ```
//!
//! trace_id_high/trace_id_low are the two halves of one 128-bit trace
//! identifier, most-significant half first.

use super::{DecodeError, TraceType};

/// Wire size of the trace header.
pub const TRACE_HEADER_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceHeader {
    pub namespace_id: u16,
    pub node_len: u8,
    pub flags: u8,
    pub remaining_len: u8,
    pub trace_type: TraceType,
    pub trace_id_high: u64,
    pub trace_id_low: u64,
    pub span_id: u64,
}

impl TraceHeader {
    /// The full 128-bit trace identifier, high half first.
    pub fn trace_id(&self) -> u128 {
        (self.trace_id_high as u128) << 64 | self.trace_id_low as u128
    }
}

/// Parses the trace header and returns it together with the byte offset at
/// which the node list begins (`32 + remaining_len * 4`).
pub fn parse_trace_header(buf: &[u8]) -> Result<(TraceHeader, usize), DecodeError> {
    if buf.len() < TRACE_HEADER_LEN {
        return Err(DecodeError::TruncatedHeader {
            need: TRACE_HEADER_LEN,
            have: buf.len(),
        });
    }

    let namespace_id = u16::from_be_bytes([buf[0], buf[1]]);
    let node_len = buf[2];
    let flags = buf[3];
    let remaining_len = buf[4];
    let trace_type = TraceType::new(u32::from_be_bytes([0, buf[5], buf[6], buf[7]]));
    let trace_id_high = u64::from_be_bytes(buf[8..16].try_into().unwrap());
    let trace_id_low = u64::from_be_bytes(buf[16..24].try_into().unwrap());
    let span_id = u64::from_be_bytes(buf[24..32].try_into().unwrap());

    let header = TraceHeader {
        namespace_id,
        node_len,
        flags,
        remaining_len,
        trace_type,
        trace_id_high,
        trace_id_low,
        span_id,
    };

    Ok((header, TRACE_HEADER_LEN + remaining_len as usize * 4))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_header(h: &TraceHeader) -> [u8; TRACE_HEADER_LEN] {
        let mut buf = [0u8; TRACE_HEADER_LEN];
        buf[0..2].copy_from_slice(&h.namespace_id.to_be_bytes());
        buf[2] = h.node_len;
        buf[3] = h.flags;
        buf[4] = h.remaining_len;
        let tt = h.trace_type.raw().to_be_bytes();
        buf[5..8].copy_from_slice(&tt[1..4]);
        buf[8..16].copy_from_slice(&h.trace_id_high.to_be_bytes());
        buf[16..24].copy_from_slice(&h.trace_id_low.to_be_bytes());
        buf[24..32].copy_from_slice(&h.span_id.to_be_bytes());
        buf
    }

    #[test]
    fn header_round_trip() {
        let header = TraceHeader {
            namespace_id: 0xBEEF,
            node_len: 10,
            flags: 0x0A,
            remaining_len: 3,
            trace_type: TraceType::new(0x00AB_CDEF),
            trace_id_high: 0x0123_4567_89AB_CDEF,
            trace_id_low: 0xFEDC_BA98_7654_3210,
            span_id: 0x1122_3344_5566_7788,
        };

        let buf = encode_header(&header);
        let (decoded, offset) = parse_trace_header(&buf).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(offset, 32 + 3 * 4);
    }

    #[test]
    fn trace_id_recomposes_high_bits_first() {
        let header = TraceHeader {
            namespace_id: 1,
            node_len: 0,
            flags: 0,
            remaining_len: 0,
            trace_type: TraceType::new(0),
            trace_id_high: 1,
            trace_id_low: 2,
            span_id: 0,
        };
        assert_eq!(header.trace_id(), (1u128 << 64) | 2);
    }

    #[test]
    fn short_buffer_is_truncated_header() {
        let buf = [0u8; 31];
        let err = parse_trace_header(&buf).unwrap_err();
        assert_eq!(err, DecodeError::TruncatedHeader { need: 32, have: 31 });
    }

    #[test]
    fn empty_buffer_is_truncated_header() {
        let err = parse_trace_header(&[]).unwrap_err();
        assert_eq!(err, DecodeError::TruncatedHeader { need: 32, have: 0 });
    }
}
