//! CGI fixture program for gateway testing.
//!
//! Runs as the invoked script: reads the standard CGI variables, decodes
//! QUERY_STRING, and produces whatever response shape the query asks for.
//!
//! Supported parameters:
//!   sleep=N        sleep N seconds before responding (timeout workload)
//!   code=NNN       emit `Status: NNN <phrase>`
//!   redirect=/url  emit a Location header and a body linking to the target
//!   dump=env       body is NAME=value lines for the standard variables
//!   pidfile=PATH   record our pid before doing anything else, so a test
//!                  can verify the process was killed on timeout
//!
//! A POST with CONTENT_LENGTH echoes exactly that many stdin bytes back as
//! the body, binary safe.

use std::io::{self, Read, Write};
use std::time::Duration;

use cgi_harness::cgi::reason_phrase;
use cgi_harness::query;

const DUMPED_VARS: &[&str] = &[
    "REQUEST_METHOD",
    "QUERY_STRING",
    "CONTENT_TYPE",
    "CONTENT_LENGTH",
    "SCRIPT_NAME",
    "SCRIPT_FILENAME",
    "PATH_INFO",
    "SERVER_PROTOCOL",
    "SERVER_NAME",
    "SERVER_PORT",
    "GATEWAY_INTERFACE",
    "HTTP_HOST",
    "HTTP_USER_AGENT",
];

fn main() -> io::Result<()> {
    let raw_query = std::env::var("QUERY_STRING").unwrap_or_default();
    let params = query::parse(&raw_query);

    if let Some(path) = query::first(&params, "pidfile") {
        std::fs::write(path, std::process::id().to_string())?;
    }

    if let Some(secs) = query::first(&params, "sleep").and_then(|v| v.parse::<f64>().ok()) {
        std::thread::sleep(Duration::from_secs_f64(secs));
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();

    let code = query::first(&params, "code").and_then(|v| v.parse::<u16>().ok());
    let redirect = query::first(&params, "redirect");

    if let Some(code) = code {
        write!(out, "Status: {} {}\r\n", code, reason_phrase(code))?;
    }
    if let Some(url) = redirect {
        write!(out, "Location: {}\r\n", url)?;
    }

    let method = std::env::var("REQUEST_METHOD").unwrap_or_default();
    let content_length = std::env::var("CONTENT_LENGTH")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    if method == "POST" && content_length > 0 {
        // Echo mode: exactly CONTENT_LENGTH bytes, untouched.
        let mut body = vec![0u8; content_length];
        io::stdin().read_exact(&mut body)?;
        write!(out, "Content-Type: application/octet-stream\r\n\r\n")?;
        out.write_all(&body)?;
        return Ok(());
    }

    if query::first(&params, "dump") == Some("env") {
        write!(out, "Content-Type: text/plain\r\n\r\n")?;
        for var in DUMPED_VARS {
            let value = std::env::var(var).unwrap_or_else(|_| "<not set>".to_string());
            writeln!(out, "{}={}", var, value)?;
        }
        return Ok(());
    }

    write!(out, "Content-Type: text/html\r\n\r\n")?;
    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, "<html><body>")?;
    match (code, redirect) {
        (_, Some(url)) => {
            writeln!(out, "<p>Moved: <a href=\"{}\">{}</a></p>", url, url)?;
        }
        (Some(code), None) => {
            writeln!(out, "<h1>{} {}</h1>", code, reason_phrase(code))?;
        }
        (None, None) => {
            writeln!(out, "<h1>cgi-probe alive</h1>")?;
        }
    }
    writeln!(out, "</body></html>")?;
    Ok(())
}
