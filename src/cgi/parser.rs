//! Framing of raw CGI output into status, headers and body.
//!
//! The script writes a header block (one `Name: value` per line, LF or CRLF
//! terminated), exactly one blank line, then raw body bytes. A `Status`
//! header sets the HTTP status code; everything else passes through in
//! order.

use log::debug;

use crate::cgi::ParseError;

/// One fully framed CGI response.
#[derive(Debug, PartialEq, Eq)]
pub struct ParsedResponse {
    pub status_code: u16,
    pub status_phrase: String,
    /// Headers in the order the script emitted them, `Status` excluded.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Whether a `Status` header was actually present.
    explicit: bool,
}

impl ParsedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `true` when the script set the status itself rather than falling
    /// back to the 200 default.
    pub fn explicit_status(&self) -> bool {
        self.explicit
    }

    /// The conventional redirect default: a `Location` header with no
    /// explicit `Status` usually means 302. The parser never applies this
    /// on its own; callers that want the convention opt in here.
    pub fn implied_redirect(&self) -> Option<u16> {
        if !self.explicit && self.header("Location").is_some() {
            Some(302)
        } else {
            None
        }
    }
}

/// Split raw child output into a [`ParsedResponse`].
pub fn parse(raw: &[u8]) -> Result<ParsedResponse, ParseError> {
    let (header_block, body) = split_at_blank_line(raw).ok_or(ParseError::MissingDelimiter)?;

    let mut status_code = 200u16;
    let mut status_phrase = reason_phrase(200).to_string();
    let mut explicit = false;
    let mut headers: Vec<(String, String)> = Vec::new();

    // Header block is text by contract; undecodable bytes are replaced
    // rather than rejected, matching what the body-safe split guarantees.
    let header_text = String::from_utf8_lossy(header_block);
    for line in header_text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            // Recoverable script sloppiness: skip the line, but leave a
            // trace for whoever debugs the script.
            debug!("[CGI] ignoring header line without colon: {:?}", line);
            continue;
        };
        let name = name.trim();
        let value = value.trim();

        if name.eq_ignore_ascii_case("status") {
            let (code, phrase) = parse_status_value(value)?;
            status_code = code;
            status_phrase = phrase;
            explicit = true;
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    Ok(ParsedResponse {
        status_code,
        status_phrase,
        headers,
        body: body.to_vec(),
        explicit,
    })
}

/// `"404 Not Found"` -> `(404, "Not Found")`. Missing phrase falls back to
/// the reason-phrase table; a missing or non-numeric code is an error.
fn parse_status_value(value: &str) -> Result<(u16, String), ParseError> {
    let mut parts = value.splitn(2, ' ');
    let code_str = parts.next().unwrap_or("");
    let code: u16 = code_str
        .parse()
        .map_err(|_| ParseError::BadStatusHeader(value.to_string()))?;

    let phrase = match parts.next().map(str::trim) {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => reason_phrase(code).to_string(),
    };
    Ok((code, phrase))
}

/// Find the first blank line, accepting LF and CRLF endings (mixed is
/// fine), and split the stream there. Returns `None` if the stream closed
/// before any blank line.
fn split_at_blank_line(raw: &[u8]) -> Option<(&[u8], &[u8])> {
    let mut line_start = 0usize;
    let mut i = 0usize;
    while i < raw.len() {
        if raw[i] == b'\n' {
            let mut line = &raw[line_start..i];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            if line.is_empty() {
                return Some((&raw[..line_start], &raw[i + 1..]));
            }
            line_start = i + 1;
        }
        i += 1;
    }
    None
}

/// Canonical reason phrases; anything unlisted reports "Unknown" while the
/// numeric code still passes through untouched.
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgi::ParseError;

    #[test]
    fn default_status_is_200_ok() {
        let resp = parse(b"Content-Type: text/html\r\n\r\n<h1>hi</h1>").unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.status_phrase, "OK");
        assert!(!resp.explicit_status());
        assert_eq!(resp.header("Content-Type"), Some("text/html"));
        assert_eq!(resp.body, b"<h1>hi</h1>");
    }

    #[test]
    fn status_header_passes_through() {
        let resp = parse(b"Status: 404 Not Found\r\nContent-Type: text/plain\r\n\r\ngone").unwrap();
        assert_eq!(resp.status_code, 404);
        assert_eq!(resp.status_phrase, "Not Found");
        assert!(resp.explicit_status());
        // Status itself is not forwarded as an ordinary header.
        assert!(resp.header("Status").is_none());
    }

    #[test]
    fn unknown_code_keeps_code_with_unknown_phrase() {
        let resp = parse(b"Status: 799\n\nbody").unwrap();
        assert_eq!(resp.status_code, 799);
        assert_eq!(resp.status_phrase, "Unknown");
    }

    #[test]
    fn missing_phrase_uses_table() {
        let resp = parse(b"Status: 302\nLocation: /next\n\n").unwrap();
        assert_eq!(resp.status_code, 302);
        assert_eq!(resp.status_phrase, "Found");
    }

    #[test]
    fn bad_status_code_is_rejected() {
        assert_eq!(
            parse(b"Status: abc Whatever\n\n"),
            Err(ParseError::BadStatusHeader("abc Whatever".to_string()))
        );
        assert_eq!(
            parse(b"Status:\n\n"),
            Err(ParseError::BadStatusHeader(String::new()))
        );
    }

    #[test]
    fn missing_delimiter_is_rejected() {
        assert_eq!(
            parse(b"This is not valid CGI output\n"),
            Err(ParseError::MissingDelimiter)
        );
        assert_eq!(parse(b""), Err(ParseError::MissingDelimiter));
    }

    #[test]
    fn bare_lf_and_mixed_endings_accepted() {
        let resp = parse(b"Content-Type: text/plain\nX-One: 1\r\n\nbody\n").unwrap();
        assert_eq!(resp.header("X-One"), Some("1"));
        assert_eq!(resp.body, b"body\n");
    }

    #[test]
    fn body_bytes_are_verbatim() {
        let mut raw = b"Content-Type: application/octet-stream\r\n\r\n".to_vec();
        let body: Vec<u8> = vec![0x00, 0xFF, b'\r', b'\n', b'\r', b'\n', 0x7F];
        raw.extend_from_slice(&body);
        let resp = parse(&raw).unwrap();
        assert_eq!(resp.body, body);
    }

    #[test]
    fn colonless_header_line_is_skipped() {
        let resp = parse(b"Content-Type: text/plain\r\nnot a header\r\nX-After: 1\r\n\r\nbody").unwrap();
        assert_eq!(resp.header("Content-Type"), Some("text/plain"));
        assert_eq!(resp.header("X-After"), Some("1"));
        assert_eq!(resp.headers.len(), 2);
        assert_eq!(resp.body, b"body");
    }

    #[test]
    fn header_order_preserved() {
        let resp = parse(b"B: 2\r\nA: 1\r\nB: 3\r\n\r\n").unwrap();
        let names: Vec<&str> = resp.headers.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["B", "A", "B"]);
    }

    #[test]
    fn location_without_status_implies_redirect_only_on_request() {
        let resp = parse(b"Location: /new-location\r\n\r\n").unwrap();
        // The parser itself stays neutral.
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.implied_redirect(), Some(302));

        let explicit = parse(b"Status: 303 See Other\r\nLocation: /x\r\n\r\n").unwrap();
        assert_eq!(explicit.implied_redirect(), None);
    }
}
