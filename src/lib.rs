//! cltrace - IOAM trace capture, collection, and kernel control
//!
//! The kernel's IOAM feature embeds per-hop telemetry into the IPv6
//! hop-by-hop header of instrumented packets. This crate decodes those
//! traces and turns them into distributed-tracing spans.
//!
//! # Modules
//!
//! - `ioam` - IOAM trace option wire format (header + node records)
//! - `capture` - raw packet capture and trace dispatch (the agent data path)
//! - `collector` - gRPC ingest turning reported traces into OTel spans
//! - `clt` - generic-netlink client toggling the kernel tracing feature
//! - `grpc` - generated reporting API and conversions
//! - `tracing` - logging and OpenTelemetry initialization
//!
//! # Quick Start
//!
//! ```ignore
//! use cltrace::capture::{CaptureLoop, TraceSink};
//!
//! let mut capture = CaptureLoop::bind("eth0")?;
//! capture.run(&mut TraceSink::Console)?;
//! ```

pub mod capture;
pub mod clt;
pub mod collector;
pub mod grpc;
pub mod ioam;
pub mod tracing;

// Re-export the types most callers touch.
pub use ioam::{parse_trace, DecodeError, IoamNode, IoamTrace, TraceHeader, TraceType};
