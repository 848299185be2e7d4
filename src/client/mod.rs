//! Slow-consumer test client.
//!
//! Connects, sends one request, then deliberately drains the response in
//! small chunks with a pause between reads, so the server under test has to
//! sit on a full send buffer and come back to its event loop instead of
//! blocking or dropping the connection. Sequential and single-threaded on
//! purpose: the concurrency being exercised is the server's, not ours.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use log::{debug, info};

/// What the drain observed.
#[derive(Debug)]
pub struct DrainReport {
    /// Every byte received, headers included.
    pub total_bytes: usize,
    pub elapsed: Duration,
    /// Peer closed with a normal EOF rather than an error.
    pub clean_close: bool,
}

/// How long a single read may sit with no data before the server under
/// test is declared wedged. Generous: the point is to read slowly, not to
/// tolerate a producer that stopped producing.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SlowConsumer {
    pub chunk_size: usize,
    pub read_delay: Duration,
    /// Per-read ceiling; a stall past this fails the drain.
    pub stall_timeout: Duration,
}

impl SlowConsumer {
    pub fn new(chunk_size: usize, read_delay: Duration) -> Self {
        Self {
            chunk_size,
            read_delay,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
        }
    }

    /// Send `request` to `addr` and drain the response at the configured
    /// trickle until the server closes the connection.
    pub fn drain<A: ToSocketAddrs>(&self, addr: A, request: &[u8]) -> io::Result<DrainReport> {
        let mut stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(self.stall_timeout))?;
        stream.write_all(request)?;
        info!("[SlowClient] request sent, reading {} bytes per {:?}", self.chunk_size, self.read_delay);

        let started = Instant::now();
        let mut buf = vec![0u8; self.chunk_size.max(1)];
        let mut total_bytes = 0usize;
        let clean_close;

        loop {
            match stream.read(&mut buf) {
                Ok(0) => {
                    clean_close = true;
                    break;
                }
                Ok(n) => {
                    total_bytes += n;
                    debug!("[SlowClient] {} bytes so far", total_bytes);
                    // The whole point: give the server's send buffer time
                    // to fill up behind us.
                    std::thread::sleep(self.read_delay);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // Read-timeout surfaces as WouldBlock or TimedOut depending
                // on the platform; both mean the server stopped producing.
                Err(ref e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    info!(
                        "[SlowClient] server stalled for {:?} after {} bytes",
                        self.stall_timeout, total_bytes
                    );
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no data for {:?} after {} bytes", self.stall_timeout, total_bytes),
                    ));
                }
                Err(e) => {
                    info!("[SlowClient] read failed after {} bytes: {}", total_bytes, e);
                    return Err(e);
                }
            }
        }

        let report = DrainReport {
            total_bytes,
            elapsed: started.elapsed(),
            clean_close,
        };
        info!(
            "[SlowClient] done: {} bytes in {:?}",
            report.total_bytes, report.elapsed
        );
        Ok(report)
    }
}

/// Minimal well-formed GET request for the harness binary.
pub fn get_request(path: &str, host: &str) -> Vec<u8> {
    format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, host
    )
    .into_bytes()
}
