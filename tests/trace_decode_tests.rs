//! End-to-end decode tests: raw IPv6 packet bytes through option
//! extraction, trace parsing, gRPC conversion, and attribute rendering.

use cltrace::capture::packet::find_trace_option;
use cltrace::collector::render_node;
use cltrace::grpc::ioam_api;
use cltrace::ioam::{
    self, parse_trace, DecodeError, TraceType, BIT0_HOP_LIMIT_NODE_ID, BIT22_OPAQUE_STATE,
};

/// Encodes a trace header with the given fields.
fn encode_header(
    namespace_id: u16,
    node_len: u8,
    remaining_len: u8,
    trace_type: u32,
    trace_id_high: u64,
    trace_id_low: u64,
    span_id: u64,
) -> Vec<u8> {
    let mut buf = vec![0u8; 32];
    buf[0..2].copy_from_slice(&namespace_id.to_be_bytes());
    buf[2] = node_len;
    buf[4] = remaining_len;
    let tt = trace_type.to_be_bytes();
    buf[5..8].copy_from_slice(&tt[1..4]);
    buf[8..16].copy_from_slice(&trace_id_high.to_be_bytes());
    buf[16..24].copy_from_slice(&trace_id_low.to_be_bytes());
    buf[24..32].copy_from_slice(&span_id.to_be_bytes());
    buf
}

/// Wraps a trace buffer into a full IPv6 packet with a hop-by-hop IOAM TLV.
fn wrap_in_packet(trace: &[u8]) -> Vec<u8> {
    let opt_body_len = 2 + trace.len();
    let padded = (2 + 2 + opt_body_len).div_ceil(8) * 8;

    let mut packet = vec![0u8; 40];
    packet[0] = 0x60;
    packet[6] = 0; // hop-by-hop

    let mut hbh = Vec::with_capacity(padded);
    hbh.push(59);
    hbh.push((padded / 8 - 1) as u8);
    hbh.push(49); // IOAM TLV
    hbh.push(opt_body_len as u8);
    hbh.push(0); // reserved
    hbh.push(0); // pre-allocated trace
    hbh.extend_from_slice(trace);
    hbh.resize(padded, 0);
    packet.extend_from_slice(&hbh);
    packet
}

#[test]
fn single_hop_scenario_end_to_end() {
    // namespace 1, node_len 4 units: one 16-byte record whose declared
    // fields (the short hop-limit group) fill only the first 4 bytes.
    // hopLimit=10, id=5, traceId=42, spanId=7.
    let mut trace_buf = encode_header(0x0001, 4, 0, BIT0_HOP_LIMIT_NODE_ID, 0, 42, 7);
    trace_buf.extend_from_slice(&[0x0A, 0x00, 0x00, 0x05]);
    trace_buf.extend_from_slice(&[0u8; 12]);

    let packet = wrap_in_packet(&trace_buf);
    let option = find_trace_option(&packet).expect("packet carries the trace option");
    assert_eq!(option, &trace_buf[..]);

    let trace = parse_trace(option).expect("trace decodes");
    assert_eq!(trace.header.namespace_id, 1);
    assert_eq!(trace.header.trace_id_high, 0);
    assert_eq!(trace.header.trace_id_low, 42);
    assert_eq!(trace.header.span_id, 7);
    assert_eq!(trace.nodes.len(), 1);
    assert_eq!(trace.nodes[0].hop_limit, Some(10));
    assert_eq!(trace.nodes[0].node_id, Some(5));

    // Over the RPC boundary and into the collector's attribute rendering.
    let msg = ioam_api::IoamTrace::from(&trace);
    let key = format!("ioam_namespace{}_node{}", msg.namespace_id, 1);
    assert_eq!(key, "ioam_namespace1_node1");
    assert_eq!(render_node(&msg.nodes[0], msg.bit_field), "HopLimit=10; Id=5; ");
}

#[test]
fn record_padding_is_not_decoded_as_extra_nodes() {
    // Two 16-byte records, each with 12 bytes of padding after the 4-byte
    // hop-limit group. The padding must be stepped over, not misread as
    // further records.
    let mut trace_buf = encode_header(1, 4, 0, BIT0_HOP_LIMIT_NODE_ID, 0, 1, 1);
    trace_buf.extend_from_slice(&[0x0A, 0x00, 0x00, 0x05]);
    trace_buf.extend_from_slice(&[0xEE; 12]);
    trace_buf.extend_from_slice(&[0x09, 0x00, 0x00, 0x06]);
    trace_buf.extend_from_slice(&[0xEE; 12]);

    let trace = parse_trace(&trace_buf).unwrap();
    assert_eq!(trace.nodes.len(), 2);
    assert_eq!(trace.nodes[0].hop_limit, Some(10));
    assert_eq!(trace.nodes[0].node_id, Some(5));
    assert_eq!(trace.nodes[1].hop_limit, Some(9));
    assert_eq!(trace.nodes[1].node_id, Some(6));
}

#[test]
fn multi_node_traces_keep_wire_order() {
    let mut trace_buf = encode_header(2, 1, 0, BIT0_HOP_LIMIT_NODE_ID, 1, 2, 3);
    for hop in [64u8, 63, 62] {
        trace_buf.extend_from_slice(&[hop, 0x00, 0x00, hop]);
    }

    let trace = parse_trace(&trace_buf).unwrap();
    assert_eq!(trace.nodes.len(), 3);
    let hops: Vec<_> = trace.nodes.iter().map(|n| n.hop_limit.unwrap()).collect();
    assert_eq!(hops, vec![64, 63, 62]);
}

#[test]
fn remaining_len_skips_unwritten_space() {
    // remaining_len=2 means 8 bytes of pre-allocated, still-empty node
    // space sit between the header and the first written record.
    let mut trace_buf = encode_header(1, 1, 2, BIT0_HOP_LIMIT_NODE_ID, 0, 1, 1);
    trace_buf.extend_from_slice(&[0u8; 8]);
    trace_buf.extend_from_slice(&[0x05, 0x00, 0x00, 0x09]);

    let trace = parse_trace(&trace_buf).unwrap();
    assert_eq!(trace.nodes.len(), 1);
    assert_eq!(trace.nodes[0].hop_limit, Some(5));
    assert_eq!(trace.nodes[0].node_id, Some(9));
}

#[test]
fn opaque_extension_bytes_are_not_counted_in_node_len() {
    let tt = BIT0_HOP_LIMIT_NODE_ID | BIT22_OPAQUE_STATE;
    // node_len covers only the hop-limit group (1 unit).
    let mut trace_buf = encode_header(1, 1, 0, tt, 0, 1, 1);
    trace_buf.extend_from_slice(&[0x0A, 0x00, 0x00, 0x05]);
    trace_buf.extend_from_slice(&[0x01, 0x00, 0x00, 0x2A]); // len 1, schema 42
    trace_buf.extend_from_slice(&[9, 9, 9, 9]);

    let trace = parse_trace(&trace_buf).unwrap();
    assert_eq!(trace.nodes.len(), 1);
    let oss = trace.nodes[0].opaque_state.as_ref().unwrap();
    assert_eq!(oss.schema_id, 42);
    assert_eq!(oss.data, vec![9, 9, 9, 9]);
}

#[test]
fn truncated_trailing_node_is_rejected() {
    let mut trace_buf = encode_header(1, 1, 0, BIT0_HOP_LIMIT_NODE_ID, 0, 1, 1);
    trace_buf.extend_from_slice(&[0x0A, 0x00, 0x00, 0x05]);
    trace_buf.extend_from_slice(&[0x0B, 0x00]); // second node cut short

    let err = parse_trace(&trace_buf).unwrap_err();
    assert!(matches!(err, DecodeError::TruncatedNode { .. }));
}

#[test]
fn node_wire_len_matches_decoded_consumption() {
    let tt = TraceType::new(
        BIT0_HOP_LIMIT_NODE_ID | ioam::BIT2_TIMESTAMP_SECS | ioam::BIT9_INGRESS_EGRESS_ID_WIDE,
    );
    let buf = vec![0u8; tt.node_wire_len()];
    let (_, consumed) = ioam::decode_node(&buf, buf.len(), tt).unwrap();
    assert_eq!(consumed, tt.node_wire_len());
}

#[test]
fn zero_node_trace_converts_cleanly() {
    let trace_buf = encode_header(3, 1, 0, BIT0_HOP_LIMIT_NODE_ID, 0, 0, 0);
    let trace = parse_trace(&trace_buf).unwrap();
    assert!(trace.nodes.is_empty());

    let msg = ioam_api::IoamTrace::from(&trace);
    assert!(msg.nodes.is_empty());
    assert_eq!(msg.namespace_id, 3);
}
