//! ioam-collector: gRPC server that turns reported IOAM traces into
//! OpenTelemetry spans.
//!
//! Listen address is the first argument (default `[::]:7123`); the OTLP
//! endpoint comes from `OTLP_ENDPOINT` when set.

use tonic::transport::Server;

use cltrace::collector::IoamCollector;
use cltrace::grpc::ioam_api::ioam_service_server::IoamServiceServer;

const DEFAULT_LISTEN_ADDR: &str = "[::]:7123";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let otlp_endpoint = std::env::var("OTLP_ENDPOINT").ok();
    cltrace::tracing::init_tracing("ioam-collector", otlp_endpoint.as_deref())?;

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
        .parse()?;

    tracing::info!(%addr, "IOAM collector listening");

    let result = Server::builder()
        .add_service(IoamServiceServer::new(IoamCollector::new()))
        .serve(addr)
        .await;

    cltrace::tracing::shutdown_tracing();
    result?;
    Ok(())
}
