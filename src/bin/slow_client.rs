//! Slow-consumer harness: request a resource and drain it at a trickle to
//! push the server under test into backpressure.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::{error, info};

use cgi_harness::client::{get_request, SlowConsumer};

#[derive(Parser, Debug)]
#[command(name = "slow-client", about = "Read an HTTP response deliberately slowly")]
struct Args {
    /// Server to connect to.
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: String,

    /// Request path.
    #[arg(long, default_value = "/large.bin")]
    path: String,

    /// Bytes read per chunk.
    #[arg(long, default_value_t = 1024)]
    chunk_size: usize,

    /// Pause between chunk reads, in milliseconds.
    #[arg(long, default_value_t = 50)]
    delay_ms: u64,

    /// Fail unless exactly this many bytes (headers included) arrive.
    #[arg(long)]
    expect_len: Option<usize>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let consumer = SlowConsumer::new(args.chunk_size, Duration::from_millis(args.delay_ms));
    let request = get_request(&args.path, &args.addr);

    let report = match consumer.drain(args.addr.as_str(), &request) {
        Ok(r) => r,
        Err(e) => {
            error!("[SlowClient] connection failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "[SlowClient] received {} bytes in {:?} (clean close: {})",
        report.total_bytes, report.elapsed, report.clean_close
    );

    if !report.clean_close {
        error!("[SlowClient] server did not close the connection cleanly");
        return ExitCode::FAILURE;
    }
    if let Some(expected) = args.expect_len {
        if report.total_bytes != expected {
            error!(
                "[SlowClient] expected {} bytes, received {}",
                expected, report.total_bytes
            );
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}
