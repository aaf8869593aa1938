//! Raw IPv6 capture and trace dispatch
//!
//! A packet socket bound to one interface receives every IPv6 frame; each
//! iteration blocks on the socket, extracts the IOAM trace option, decodes
//! it, and hands the result to the configured sink. Decode and forward
//! failures condemn only the packet that caused them; receive failures are
//! fatal because the capture path cannot continue without the socket.
//!
//! Uses raw libc packet-socket calls; `nix` resolves the interface name to
//! an index.

pub mod packet;

use std::fmt;
use std::io;
use std::os::fd::RawFd;

use tonic::transport::Channel;

use crate::grpc::ioam_api;
use crate::grpc::ioam_api::ioam_service_client::IoamServiceClient;
use crate::ioam::{parse_trace, IoamTrace, ETH_P_IPV6};

/// Receive buffer size, comfortably above any hop-by-hop header the kernel
/// will emit.
const RECV_BUF_LEN: usize = 2048;

/// Errors from the capture data path.
#[derive(Debug)]
pub enum CaptureError {
    /// Opening or binding the packet socket failed.
    SocketOpen(io::Error),
    /// A blocking receive failed; the loop cannot continue.
    SocketRead(io::Error),
    /// Dialing the collector for the forwarding sink failed.
    CollectorConnect(tonic::transport::Error),
    /// Building the runtime backing the forwarding sink failed.
    Runtime(io::Error),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::SocketOpen(e) => write!(f, "failed to open capture socket: {}", e),
            CaptureError::SocketRead(e) => write!(f, "failed to read packet: {}", e),
            CaptureError::CollectorConnect(e) => {
                write!(f, "failed to connect to collector: {}", e)
            }
            CaptureError::Runtime(e) => write!(f, "failed to build forwarding runtime: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaptureError::SocketOpen(e)
            | CaptureError::SocketRead(e)
            | CaptureError::Runtime(e) => Some(e),
            CaptureError::CollectorConnect(e) => Some(e),
        }
    }
}

/// Destination for decoded traces.
pub enum TraceSink {
    /// Print each trace to stdout.
    Console,
    /// Forward each trace to a collector over gRPC, synchronously.
    Collector(ReportClient),
}

impl TraceSink {
    /// Delivers one trace. Forward failures are logged and swallowed: the
    /// trace is dropped and capture continues (telemetry is best-effort,
    /// no retry, no buffering).
    pub fn deliver(&mut self, trace: &IoamTrace) {
        match self {
            TraceSink::Console => print!("{}", trace),
            TraceSink::Collector(client) => {
                if let Err(e) = client.report(trace) {
                    tracing::warn!(error = %e, "failed to report trace to collector");
                }
            }
        }
    }
}

/// Blocking gRPC reporter. Owns a single-threaded runtime so the capture
/// loop stays synchronous: a slow collector stalls intake rather than
/// queueing unbounded data.
pub struct ReportClient {
    rt: tokio::runtime::Runtime,
    client: IoamServiceClient<Channel>,
}

impl ReportClient {
    pub fn connect(addr: &str) -> Result<Self, CaptureError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(CaptureError::Runtime)?;
        let endpoint = format!("http://{}", addr);
        let client = rt
            .block_on(IoamServiceClient::connect(endpoint))
            .map_err(CaptureError::CollectorConnect)?;
        Ok(ReportClient { rt, client })
    }

    fn report(&mut self, trace: &IoamTrace) -> Result<(), tonic::Status> {
        let msg = ioam_api::IoamTrace::from(trace);
        self.rt.block_on(self.client.report(msg))?;
        Ok(())
    }
}

/// The capture loop: one packet socket bound to one interface.
pub struct CaptureLoop {
    fd: RawFd,
}

impl CaptureLoop {
    /// Opens an `AF_PACKET` datagram socket for IPv6 frames and binds it to
    /// `interface`.
    pub fn bind(interface: &str) -> Result<Self, CaptureError> {
        let ifindex = nix::net::if_::if_nametoindex(interface)
            .map_err(|e| CaptureError::SocketOpen(io::Error::from_raw_os_error(e as i32)))?;

        // Packet sockets take the protocol in network byte order.
        let proto = ETH_P_IPV6.to_be() as libc::c_int;
        let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_DGRAM, proto) };
        if fd < 0 {
            return Err(CaptureError::SocketOpen(io::Error::last_os_error()));
        }

        let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = ETH_P_IPV6.to_be();
        addr.sll_ifindex = ifindex as libc::c_int;

        let ret = unsafe {
            libc::bind(
                fd,
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(CaptureError::SocketOpen(err));
        }

        tracing::info!(interface, ifindex, "capture socket bound");
        Ok(CaptureLoop { fd })
    }

    /// Runs forever, delivering each decodable trace to `sink`. Returns only
    /// on a fatal receive error.
    pub fn run(&mut self, sink: &mut TraceSink) -> Result<(), CaptureError> {
        let mut buf = [0u8; RECV_BUF_LEN];
        loop {
            let n = self.recv(&mut buf)?;
            self.dispatch(&buf[..n], sink);
        }
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize, CaptureError> {
        let n = unsafe {
            libc::recv(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
        };
        if n < 0 {
            return Err(CaptureError::SocketRead(io::Error::last_os_error()));
        }
        Ok(n as usize)
    }

    /// Decodes one received packet and hands the trace to the sink. Packets
    /// without a trace option or with malformed trace data are logged at
    /// debug/warn and skipped.
    fn dispatch(&self, packet: &[u8], sink: &mut TraceSink) {
        let Some(trace_buf) = packet::find_trace_option(packet) else {
            tracing::debug!(len = packet.len(), "packet carries no IOAM trace option");
            return;
        };

        match parse_trace(trace_buf) {
            Ok(trace) => {
                tracing::debug!(
                    namespace = trace.header.namespace_id,
                    nodes = trace.nodes.len(),
                    "decoded trace"
                );
                sink.deliver(&trace);
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse packet");
            }
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}
