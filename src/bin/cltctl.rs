//! cltctl: enable or disable the kernel CLT tracing feature.
//!
//! ```text
//! cltctl enable <span_id> <trace_id>
//! cltctl disable
//! ```
//!
//! Identifiers are decimal, or hex with a `0x` prefix.

use std::process::exit;

use cltrace::clt::CltClient;

fn usage() -> ! {
    eprintln!("usage: cltctl enable <span_id> <trace_id>");
    eprintln!("       cltctl disable");
    exit(2);
}

fn parse_u64(s: &str) -> Option<u64> {
    if let Some(hex) = s.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

fn main() {
    cltrace::tracing::init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut client = match CltClient::open() {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "failed to open CLT client");
            exit(1);
        }
    };

    let result = match args.first().map(String::as_str) {
        Some("enable") => {
            let (Some(span_id), Some(trace_id)) = (
                args.get(1).and_then(|s| parse_u64(s)),
                args.get(2).and_then(|s| parse_u64(s)),
            ) else {
                usage();
            };
            client.enable_trace(span_id, trace_id).map(|()| {
                tracing::info!(span_id, trace_id, "trace enabled");
            })
        }
        Some("disable") => client.disable_trace().map(|()| {
            tracing::info!("trace disabled");
        }),
        _ => usage(),
    };

    client.close();

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        exit(1);
    }
}
