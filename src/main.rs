//! ioam-agent: capture IOAM traces on one interface and print or forward them.

use std::process::exit;

use cltrace::capture::{CaptureLoop, ReportClient, TraceSink};

struct Args {
    interface: String,
    console: bool,
    collector: Option<String>,
}

fn usage() -> ! {
    eprintln!("usage: ioam-agent -i <interface> [-o] [-c <collector address>]");
    eprintln!("  -i <interface>  interface to listen on (required)");
    eprintln!("  -o              output traces to stdout");
    eprintln!("  -c <address>    IOAM collector address (required unless -o)");
    exit(2);
}

fn parse_args() -> Args {
    let mut interface = None;
    let mut console = false;
    let mut collector = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-i" => interface = args.next(),
            "-o" => console = true,
            "-c" => collector = args.next(),
            _ => usage(),
        }
    }

    let Some(interface) = interface else {
        eprintln!("interface not specified");
        usage();
    };
    if !console && collector.is_none() {
        eprintln!("IOAM collector address not specified");
        usage();
    }

    Args {
        interface,
        console,
        collector,
    }
}

fn main() {
    cltrace::tracing::init_logging();
    let args = parse_args();

    let mut sink = if args.console {
        TraceSink::Console
    } else {
        // parse_args guarantees the address when -o is absent.
        let addr = args.collector.as_deref().unwrap();
        match ReportClient::connect(addr) {
            Ok(client) => TraceSink::Collector(client),
            Err(e) => {
                tracing::error!(error = %e, addr, "failed to connect to IOAM collector");
                exit(1);
            }
        }
    };

    let mut capture = match CaptureLoop::bind(&args.interface) {
        Ok(capture) => capture,
        Err(e) => {
            tracing::error!(error = %e, interface = args.interface, "failed to open socket");
            exit(1);
        }
    };

    // Runs until the socket fails; per-packet errors never reach here.
    if let Err(e) = capture.run(&mut sink) {
        tracing::error!(error = %e, "capture loop terminated");
        exit(1);
    }
}
