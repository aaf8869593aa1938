//! IOAM pre-allocated trace wire format (RFC 9197)
//!
//! The kernel writes one trace option into the IPv6 hop-by-hop extension
//! header of every packet it instruments: a 32-byte trace header followed by
//! a list of per-hop node records. Which fields each record carries is
//! declared once, for the whole trace, by a 24-bit trace-type bitmask in the
//! header.
//!
//! - `header` - fixed trace header parsing
//! - `node` - per-hop record decoding driven by the trace-type bitmask
//!
//! All decoding here is pure: bounded slices in, values + consumed byte
//! counts out, no I/O.

pub mod header;
pub mod node;

pub use header::{parse_trace_header, TraceHeader, TRACE_HEADER_LEN};
pub use node::{decode_node, IoamNode, OpaqueState};

use std::fmt;

/// EtherType for IPv6 frames.
pub const ETH_P_IPV6: u16 = 0x86DD;

/// Hop-by-hop TLV option type carrying IOAM data.
pub const IPV6_TLV_IOAM: u8 = 49;

/// IOAM option sub-type for the pre-allocated trace.
pub const IOAM_PREALLOC_TRACE: u8 = 0;

// Trace-type bits, numbered as in RFC 9197 ("bit 0" is the most significant
// bit of the 24-bit mask). Each bit independently gates one field group.
pub const BIT0_HOP_LIMIT_NODE_ID: u32 = 1 << 23;
pub const BIT1_INGRESS_EGRESS_ID: u32 = 1 << 22;
pub const BIT2_TIMESTAMP_SECS: u32 = 1 << 21;
pub const BIT3_TIMESTAMP_FRAC: u32 = 1 << 20;
pub const BIT4_TRANSIT_DELAY: u32 = 1 << 19;
pub const BIT5_NAMESPACE_DATA: u32 = 1 << 18;
pub const BIT6_QUEUE_DEPTH: u32 = 1 << 17;
pub const BIT7_CSUM_COMP: u32 = 1 << 16;
pub const BIT8_HOP_LIMIT_NODE_ID_WIDE: u32 = 1 << 15;
pub const BIT9_INGRESS_EGRESS_ID_WIDE: u32 = 1 << 14;
pub const BIT10_NAMESPACE_DATA_WIDE: u32 = 1 << 13;
pub const BIT11_BUFFER_OCCUPANCY: u32 = 1 << 12;
pub const BIT22_OPAQUE_STATE: u32 = 1 << 1;

/// The 24-bit IOAM trace-type bitmask.
///
/// Derived once per trace from the header; every field-presence question
/// during node decoding goes through this type rather than re-reading raw
/// header bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceType(u32);

impl TraceType {
    pub fn new(raw: u32) -> Self {
        TraceType(raw & 0x00FF_FFFF)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    /// Byte width of one node record for this bitmask, excluding the
    /// opaque-state extension (which is not counted in `node_len`).
    pub fn node_wire_len(&self) -> usize {
        let mut len = 0;
        for &(bit, width) in FIELD_WIDTHS {
            if self.contains(bit) {
                len += width;
            }
        }
        len
    }
}

// Fixed decode order with per-group widths. The opaque-state group is
// handled separately because its width is self-describing.
const FIELD_WIDTHS: &[(u32, usize)] = &[
    (BIT0_HOP_LIMIT_NODE_ID, 4),
    (BIT1_INGRESS_EGRESS_ID, 4),
    (BIT2_TIMESTAMP_SECS, 4),
    (BIT3_TIMESTAMP_FRAC, 4),
    (BIT4_TRANSIT_DELAY, 4),
    (BIT5_NAMESPACE_DATA, 4),
    (BIT6_QUEUE_DEPTH, 4),
    (BIT7_CSUM_COMP, 4),
    (BIT8_HOP_LIMIT_NODE_ID_WIDE, 8),
    (BIT9_INGRESS_EGRESS_ID_WIDE, 8),
    (BIT10_NAMESPACE_DATA_WIDE, 8),
    (BIT11_BUFFER_OCCUPANCY, 4),
];

/// Errors raised while decoding a trace option. All of them condemn a single
/// packet only; the capture loop logs and keeps going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer than 32 bytes available for the trace header.
    TruncatedHeader { need: usize, have: usize },
    /// A node record ends before the fields its bitmask declares.
    TruncatedNode { need: usize, have: usize },
    /// The header's node_len declares fewer bytes than the bitmask's fields
    /// occupy, so no record could hold them.
    NodeLenMismatch { declared: usize, expected: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::TruncatedHeader { need, have } => {
                write!(f, "truncated trace header: need {} bytes, have {}", need, have)
            }
            DecodeError::TruncatedNode { need, have } => {
                write!(f, "truncated node record: need {} bytes, have {}", need, have)
            }
            DecodeError::NodeLenMismatch { declared, expected } => {
                write!(
                    f,
                    "node_len declares {} bytes but trace type fields need {}",
                    declared, expected
                )
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// One fully decoded trace: header fields plus the hop records in the order
/// they appear on the wire (path order as written by the kernel).
///
/// Built once per captured packet, handed by value to exactly one sink,
/// never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoamTrace {
    pub header: TraceHeader,
    pub nodes: Vec<IoamNode>,
}

impl IoamTrace {
    pub fn trace_type(&self) -> TraceType {
        self.header.trace_type
    }
}

/// Decodes a complete trace option buffer: header, then node records until
/// the buffer is exhausted.
///
/// Each record occupies exactly `node_len * 4` bytes on the wire regardless
/// of how many of them the bitmask's fields fill; the remainder is padding.
/// Only the opaque-state extension adds bytes beyond that.
pub fn parse_trace(buf: &[u8]) -> Result<IoamTrace, DecodeError> {
    let (header, mut offset) = parse_trace_header(buf)?;

    let declared = header.node_len as usize * 4;
    let expected = header.trace_type.node_wire_len();
    if declared < expected {
        return Err(DecodeError::NodeLenMismatch { declared, expected });
    }

    let mut nodes = Vec::new();
    while offset < buf.len() {
        let (node, consumed) = decode_node(&buf[offset..], declared, header.trace_type)?;
        if consumed == 0 {
            // A zero node_len with no data-bearing groups cannot describe
            // the trailing bytes; stop rather than spin.
            break;
        }
        offset += consumed;
        nodes.push(node);
    }

    Ok(IoamTrace { header, nodes })
}

impl fmt::Display for IoamTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "namespace {} trace {:016x}{:016x} span {:016x} type {:06x} ({} nodes)",
            self.header.namespace_id,
            self.header.trace_id_high,
            self.header.trace_id_low,
            self.header.span_id,
            self.header.trace_type.raw(),
            self.nodes.len()
        )?;
        for (i, node) in self.nodes.iter().enumerate() {
            writeln!(f, "  node {}: {}", i + 1, node)?;
        }
        Ok(())
    }
}
