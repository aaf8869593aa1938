//! gRPC surface between the capture agent and the collector
//!
//! The wire schema mirrors the decoded trace: flat per-node fields whose
//! presence is declared by the trace's left-aligned bitmask (`bit_field` is
//! the 24-bit trace type shifted into the top of a u32, so trace-type bit 0
//! lands on message bit 31).

use crate::ioam::{IoamNode, IoamTrace};

// Include the generated proto code

pub mod ioam_api {
    tonic::include_proto!("ioam.api");
}

/// Number of bits the 24-bit trace type is shifted left by inside
/// `IOAMTrace.bit_field`.
pub const BIT_FIELD_SHIFT: u32 = 8;

impl From<&IoamNode> for ioam_api::IoamNode {
    fn from(node: &IoamNode) -> Self {
        ioam_api::IoamNode {
            hop_limit: node.hop_limit.unwrap_or(0) as u32,
            id: node.node_id.unwrap_or(0) as u64,
            ingress_id: node.ingress_id.unwrap_or(0) as u32,
            egress_id: node.egress_id.unwrap_or(0) as u32,
            timestamp_secs: node.timestamp_secs.unwrap_or(0),
            timestamp_frac: node.timestamp_frac.unwrap_or(0),
            transit_delay: node.transit_delay.unwrap_or(0),
            namespace_data: node
                .namespace_data
                .map(|d| d.to_vec())
                .unwrap_or_default(),
            queue_depth: node.queue_depth.unwrap_or(0),
            csum_comp: node.csum_comp.unwrap_or(0),
            id_wide: node.node_id_wide.unwrap_or(0),
            ingress_id_wide: node.ingress_id_wide.unwrap_or(0),
            egress_id_wide: node.egress_id_wide.unwrap_or(0),
            namespace_data_wide: node
                .namespace_data_wide
                .map(|d| d.to_vec())
                .unwrap_or_default(),
            buffer_occupancy: node.buffer_occupancy.unwrap_or(0),
            oss: node.opaque_state.as_ref().map(|oss| ioam_api::OpaqueStateSnapshot {
                schema_id: oss.schema_id,
                data: oss.data.clone(),
            }),
        }
    }
}

impl From<&IoamTrace> for ioam_api::IoamTrace {
    fn from(trace: &IoamTrace) -> Self {
        ioam_api::IoamTrace {
            bit_field: trace.header.trace_type.raw() << BIT_FIELD_SHIFT,
            namespace_id: trace.header.namespace_id as u32,
            trace_id_high: trace.header.trace_id_high,
            trace_id_low: trace.header.trace_id_low,
            span_id: trace.header.span_id,
            nodes: trace.nodes.iter().map(Into::into).collect(),
        }
    }
}
