use std::collections::HashMap;
use std::net::IpAddr;

/// Everything the gateway needs to know about one inbound request.
///
/// Built by the calling server, owned by the invocation for its whole
/// lifetime. Header names are stored lowercased, the same normalization the
/// server applies when it parses the request.
pub struct RequestContext {
    pub method: String,
    /// URL path of the script itself, e.g. `/cgi-bin/app.py`.
    pub script_name: String,
    /// Extra path after the script name, e.g. `/users/123`. Empty if none.
    pub path_info: String,
    /// Raw (still percent-encoded) query string, without the `?`.
    pub query_string: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub protocol: String,
    pub server_name: String,
    pub server_port: u16,
    pub remote_addr: Option<IpAddr>,
}

impl RequestContext {
    pub fn new(method: &str, script_name: &str) -> Self {
        Self {
            method: method.to_string(),
            script_name: script_name.to_string(),
            path_info: String::new(),
            query_string: String::new(),
            headers: HashMap::new(),
            body: Vec::new(),
            protocol: "HTTP/1.1".to_string(),
            server_name: "localhost".to_string(),
            server_port: 80,
            remote_addr: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Full request URI, reassembled for the REQUEST_URI variable.
    pub fn request_uri(&self) -> String {
        let mut uri = format!("{}{}", self.script_name, self.path_info);
        if !self.query_string.is_empty() {
            uri.push('?');
            uri.push_str(&self.query_string);
        }
        uri
    }

    /// Number of body bytes the child should receive: the declared
    /// Content-Length when present, else what we actually buffered.
    pub fn content_length(&self) -> usize {
        self.header("content-length")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(self.body.len())
            .min(self.body.len())
    }
}
