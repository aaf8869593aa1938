//! Collector side of the reporting RPC
//!
//! Each reported trace becomes one OpenTelemetry span: the span context is
//! rebuilt from the 128-bit trace identifier (high half first) and the
//! 64-bit span identifier carried in the trace header, and every hop record
//! becomes one string attribute on the span. Content never fails the RPC;
//! a trace with zero nodes simply yields a span with no per-node
//! attributes.

use opentelemetry::trace::{
    Span, SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState, Tracer,
};
use opentelemetry::{global, Context, KeyValue};
use tonic::{Request, Response, Status};

use crate::grpc::ioam_api;
use crate::grpc::ioam_api::ioam_service_server::IoamService;

// Bit positions inside IOAMTrace.bit_field (trace type << 8): trace-type
// bit 0 is message bit 31.
const FIELD_HOP_LIMIT_NODE_ID: u32 = 1 << 31;
const FIELD_INGRESS_EGRESS_ID: u32 = 1 << 30;
const FIELD_TIMESTAMP_SECS: u32 = 1 << 29;
const FIELD_TIMESTAMP_FRAC: u32 = 1 << 28;
const FIELD_TRANSIT_DELAY: u32 = 1 << 27;
const FIELD_NAMESPACE_DATA: u32 = 1 << 26;
const FIELD_QUEUE_DEPTH: u32 = 1 << 25;
const FIELD_CSUM_COMP: u32 = 1 << 24;
const FIELD_HOP_LIMIT_NODE_ID_WIDE: u32 = 1 << 23;
const FIELD_INGRESS_EGRESS_ID_WIDE: u32 = 1 << 22;
const FIELD_NAMESPACE_DATA_WIDE: u32 = 1 << 21;
const FIELD_BUFFER_OCCUPANCY: u32 = 1 << 20;
const FIELD_OPAQUE_STATE: u32 = 1 << 9;

/// gRPC service turning reported traces into spans.
#[derive(Default)]
pub struct IoamCollector {}

impl IoamCollector {
    pub fn new() -> Self {
        IoamCollector {}
    }
}

#[tonic::async_trait]
impl IoamService for IoamCollector {
    async fn report(
        &self,
        request: Request<ioam_api::IoamTrace>,
    ) -> Result<Response<ioam_api::Empty>, Status> {
        let trace = request.into_inner();
        ingest_trace(&trace);
        Ok(Response::new(ioam_api::Empty {}))
    }
}

/// Rebuilds the span context and emits one span with one attribute per hop.
pub fn ingest_trace(trace: &ioam_api::IoamTrace) {
    let span_cx = remote_span_context(trace);
    let cx = Context::new().with_remote_span_context(span_cx);

    let tracer = global::tracer("ioam-tracer");
    let mut span = tracer.start_with_context("ioam-span", &cx);

    for (i, node) in trace.nodes.iter().enumerate() {
        let key = format!("ioam_namespace{}_node{}", trace.namespace_id, i + 1);
        let value = render_node(node, trace.bit_field);
        span.set_attribute(KeyValue::new(key, value));
    }

    span.end();

    tracing::debug!(
        namespace = trace.namespace_id,
        nodes = trace.nodes.len(),
        "ingested trace"
    );
}

/// Packs the wire identifiers into a sampled remote span context,
/// most-significant half of the trace id first.
fn remote_span_context(trace: &ioam_api::IoamTrace) -> SpanContext {
    let mut trace_id = [0u8; 16];
    trace_id[..8].copy_from_slice(&trace.trace_id_high.to_be_bytes());
    trace_id[8..].copy_from_slice(&trace.trace_id_low.to_be_bytes());

    let span_id = trace.span_id.to_be_bytes();

    SpanContext::new(
        TraceId::from_bytes(trace_id),
        SpanId::from_bytes(span_id),
        TraceFlags::SAMPLED,
        true,
        TraceState::default(),
    )
}

/// Renders one hop record as `"<Field>=<value>; "` pairs in the fixed field
/// order. Byte-array fields are lowercase hex with a `0x` prefix, everything
/// else decimal.
pub fn render_node(node: &ioam_api::IoamNode, bit_field: u32) -> String {
    let mut out = String::new();

    if bit_field & FIELD_HOP_LIMIT_NODE_ID != 0 {
        out.push_str(&format!("HopLimit={}; Id={}; ", node.hop_limit, node.id));
    }
    if bit_field & FIELD_INGRESS_EGRESS_ID != 0 {
        out.push_str(&format!(
            "IngressId={}; EgressId={}; ",
            node.ingress_id, node.egress_id
        ));
    }
    if bit_field & FIELD_TIMESTAMP_SECS != 0 {
        out.push_str(&format!("TimestampSecs={}; ", node.timestamp_secs));
    }
    if bit_field & FIELD_TIMESTAMP_FRAC != 0 {
        out.push_str(&format!("TimestampFrac={}; ", node.timestamp_frac));
    }
    if bit_field & FIELD_TRANSIT_DELAY != 0 {
        out.push_str(&format!("TransitDelay={}; ", node.transit_delay));
    }
    if bit_field & FIELD_NAMESPACE_DATA != 0 {
        out.push_str(&format!(
            "NamespaceData=0x{}; ",
            hex::encode(&node.namespace_data)
        ));
    }
    if bit_field & FIELD_QUEUE_DEPTH != 0 {
        out.push_str(&format!("QueueDepth={}; ", node.queue_depth));
    }
    if bit_field & FIELD_CSUM_COMP != 0 {
        out.push_str(&format!("CsumComp={}; ", node.csum_comp));
    }
    if bit_field & FIELD_HOP_LIMIT_NODE_ID_WIDE != 0 {
        out.push_str(&format!(
            "HopLimit={}; IdWide={}; ",
            node.hop_limit, node.id_wide
        ));
    }
    if bit_field & FIELD_INGRESS_EGRESS_ID_WIDE != 0 {
        out.push_str(&format!(
            "IngressIdWide={}; EgressIdWide={}; ",
            node.ingress_id_wide, node.egress_id_wide
        ));
    }
    if bit_field & FIELD_NAMESPACE_DATA_WIDE != 0 {
        out.push_str(&format!(
            "NamespaceDataWide=0x{}; ",
            hex::encode(&node.namespace_data_wide)
        ));
    }
    if bit_field & FIELD_BUFFER_OCCUPANCY != 0 {
        out.push_str(&format!("BufferOccupancy={}; ", node.buffer_occupancy));
    }
    if bit_field & FIELD_OPAQUE_STATE != 0 {
        let (schema_id, data) = node
            .oss
            .as_ref()
            .map(|oss| (oss.schema_id, oss.data.as_slice()))
            .unwrap_or((0, &[]));
        out.push_str(&format!(
            "OpaqueStateSchemaId={}; OpaqueStateData=0x{}; ",
            schema_id,
            hex::encode(data)
        ));
    }

    out
}
