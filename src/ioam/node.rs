//! Per-hop node record decoding
//!
//! A node record is a sparse struct: the trace-type bitmask declares which
//! field groups are present, and present groups appear back to back in one
//! fixed order. Decoding is a single ordered walk over the groups, each
//! tested against its own bit constant exactly once, reading through a
//! bounds-checked cursor.

use std::fmt;

use super::{
    DecodeError, TraceType, BIT0_HOP_LIMIT_NODE_ID, BIT10_NAMESPACE_DATA_WIDE,
    BIT11_BUFFER_OCCUPANCY, BIT1_INGRESS_EGRESS_ID, BIT22_OPAQUE_STATE, BIT2_TIMESTAMP_SECS,
    BIT3_TIMESTAMP_FRAC, BIT4_TRANSIT_DELAY, BIT5_NAMESPACE_DATA, BIT6_QUEUE_DEPTH,
    BIT7_CSUM_COMP, BIT8_HOP_LIMIT_NODE_ID_WIDE, BIT9_INGRESS_EGRESS_ID_WIDE,
};

/// Schema-tagged variable-length extension attached to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueState {
    /// 24-bit schema identifier.
    pub schema_id: u32,
    /// Payload, always a multiple of 4 bytes. Empty when the wire length
    /// byte was zero.
    pub data: Vec<u8>,
}

/// One decoded hop record. `None` fields were absent from the bitmask.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IoamNode {
    pub hop_limit: Option<u8>,
    /// 24-bit node id (short form).
    pub node_id: Option<u32>,
    pub ingress_id: Option<u16>,
    pub egress_id: Option<u16>,
    pub timestamp_secs: Option<u32>,
    pub timestamp_frac: Option<u32>,
    pub transit_delay: Option<u32>,
    pub namespace_data: Option<[u8; 4]>,
    pub queue_depth: Option<u32>,
    pub csum_comp: Option<u32>,
    /// 56-bit node id (wide form).
    pub node_id_wide: Option<u64>,
    pub ingress_id_wide: Option<u32>,
    pub egress_id_wide: Option<u32>,
    pub namespace_data_wide: Option<[u8; 8]>,
    pub buffer_occupancy: Option<u32>,
    pub opaque_state: Option<OpaqueState>,
}

/// Bounds-checked cursor over a node record.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.pos + n > self.buf.len() {
            return Err(DecodeError::TruncatedNode {
                need: self.pos + n,
                have: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes(b.try_into().unwrap()))
    }
}

/// Decodes one node record, returning it with the number of bytes consumed:
/// exactly `node_len` bytes plus the opaque-state extension when present.
///
/// The declared fields sit at the front of the record; any record bytes
/// past them are pre-allocated padding and are skipped, not decoded. The
/// opaque-state extension begins after the full `node_len` bytes.
///
/// The walk below is the canonical field order; each group is gated by its
/// own bit and evaluated exactly once.
pub fn decode_node(
    buf: &[u8],
    node_len: usize,
    trace_type: TraceType,
) -> Result<(IoamNode, usize), DecodeError> {
    if buf.len() < node_len {
        return Err(DecodeError::TruncatedNode {
            need: node_len,
            have: buf.len(),
        });
    }

    let mut r = Reader::new(&buf[..node_len]);
    let mut node = IoamNode::default();

    if trace_type.contains(BIT0_HOP_LIMIT_NODE_ID) {
        let raw = r.read_u32()?;
        node.hop_limit = Some((raw >> 24) as u8);
        node.node_id = Some(raw & 0x00FF_FFFF);
    }

    if trace_type.contains(BIT1_INGRESS_EGRESS_ID) {
        node.ingress_id = Some(r.read_u16()?);
        node.egress_id = Some(r.read_u16()?);
    }

    if trace_type.contains(BIT2_TIMESTAMP_SECS) {
        node.timestamp_secs = Some(r.read_u32()?);
    }

    if trace_type.contains(BIT3_TIMESTAMP_FRAC) {
        node.timestamp_frac = Some(r.read_u32()?);
    }

    if trace_type.contains(BIT4_TRANSIT_DELAY) {
        node.transit_delay = Some(r.read_u32()?);
    }

    if trace_type.contains(BIT5_NAMESPACE_DATA) {
        let b = r.take(4)?;
        node.namespace_data = Some(b.try_into().unwrap());
    }

    if trace_type.contains(BIT6_QUEUE_DEPTH) {
        node.queue_depth = Some(r.read_u32()?);
    }

    if trace_type.contains(BIT7_CSUM_COMP) {
        node.csum_comp = Some(r.read_u32()?);
    }

    if trace_type.contains(BIT8_HOP_LIMIT_NODE_ID_WIDE) {
        let raw = r.read_u64()?;
        node.hop_limit = Some((raw >> 56) as u8);
        node.node_id_wide = Some(raw & 0x00FF_FFFF_FFFF_FFFF);
    }

    if trace_type.contains(BIT9_INGRESS_EGRESS_ID_WIDE) {
        node.ingress_id_wide = Some(r.read_u32()?);
        node.egress_id_wide = Some(r.read_u32()?);
    }

    if trace_type.contains(BIT10_NAMESPACE_DATA_WIDE) {
        let b = r.take(8)?;
        node.namespace_data_wide = Some(b.try_into().unwrap());
    }

    if trace_type.contains(BIT11_BUFFER_OCCUPANCY) {
        node.buffer_occupancy = Some(r.read_u32()?);
    }

    let mut consumed = node_len;

    if trace_type.contains(BIT22_OPAQUE_STATE) {
        // The length byte is the high byte of the same 32-bit word as the
        // 24-bit schema id. Length counts 4-byte units of payload.
        let mut r = Reader::new(&buf[node_len..]);
        let word = r.read_u32()?;
        let len = (word >> 24) as usize;
        let schema_id = word & 0x00FF_FFFF;
        let data = r.take(len * 4)?.to_vec();
        node.opaque_state = Some(OpaqueState { schema_id, data });
        consumed += r.pos;
    }

    Ok((node, consumed))
}

impl fmt::Display for IoamNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Some(hl), Some(id)) = (self.hop_limit, self.node_id) {
            write!(f, "HopLimit={}; Id={}; ", hl, id)?;
        }
        if let (Some(i), Some(e)) = (self.ingress_id, self.egress_id) {
            write!(f, "IngressId={}; EgressId={}; ", i, e)?;
        }
        if let Some(v) = self.timestamp_secs {
            write!(f, "TimestampSecs={}; ", v)?;
        }
        if let Some(v) = self.timestamp_frac {
            write!(f, "TimestampFrac={}; ", v)?;
        }
        if let Some(v) = self.transit_delay {
            write!(f, "TransitDelay={}; ", v)?;
        }
        if let Some(d) = &self.namespace_data {
            write!(f, "NamespaceData=0x{}; ", hex::encode(d))?;
        }
        if let Some(v) = self.queue_depth {
            write!(f, "QueueDepth={}; ", v)?;
        }
        if let Some(v) = self.csum_comp {
            write!(f, "CsumComp={}; ", v)?;
        }
        if let (Some(hl), Some(id)) = (self.hop_limit, self.node_id_wide) {
            write!(f, "HopLimit={}; IdWide={}; ", hl, id)?;
        }
        if let (Some(i), Some(e)) = (self.ingress_id_wide, self.egress_id_wide) {
            write!(f, "IngressIdWide={}; EgressIdWide={}; ", i, e)?;
        }
        if let Some(d) = &self.namespace_data_wide {
            write!(f, "NamespaceDataWide=0x{}; ", hex::encode(d))?;
        }
        if let Some(v) = self.buffer_occupancy {
            write!(f, "BufferOccupancy={}; ", v)?;
        }
        if let Some(oss) = &self.opaque_state {
            write!(
                f,
                "OpaqueStateSchemaId={}; OpaqueStateData=0x{}; ",
                oss.schema_id,
                hex::encode(&oss.data)
            )?;
        }
        Ok(())
    }
}
