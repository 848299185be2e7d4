//! CGI/1.1 meta-variable construction (RFC 3875).
//!
//! The environment is the only channel besides stdin through which the
//! server talks to the script, so it is derived deterministically from the
//! request context and never touched again after the child is spawned.

use std::collections::HashMap;

use crate::cgi::invoke::CgiScript;
use crate::cgi::request::RequestContext;

pub const GATEWAY_INTERFACE: &str = "CGI/1.1";
pub const SERVER_SOFTWARE: &str = "cgi-harness/0.1";

/// Build the complete variable set for one invocation.
pub fn build_env(ctx: &RequestContext, script: &CgiScript) -> HashMap<String, String> {
    let mut env = HashMap::new();

    env.insert("REQUEST_METHOD".to_string(), ctx.method.clone());
    env.insert("QUERY_STRING".to_string(), ctx.query_string.clone());

    // CONTENT_TYPE / CONTENT_LENGTH carry no HTTP_ prefix and are only set
    // when the request actually has them.
    if let Some(ct) = ctx.header("content-type") {
        env.insert("CONTENT_TYPE".to_string(), ct.to_string());
    }
    if let Some(cl) = ctx.header("content-length") {
        env.insert("CONTENT_LENGTH".to_string(), cl.trim().to_string());
    } else if !ctx.body.is_empty() {
        env.insert("CONTENT_LENGTH".to_string(), ctx.body.len().to_string());
    }

    env.insert("SCRIPT_NAME".to_string(), ctx.script_name.clone());
    env.insert(
        "SCRIPT_FILENAME".to_string(),
        script.path.to_string_lossy().to_string(),
    );
    env.insert("PATH_INFO".to_string(), ctx.path_info.clone());

    env.insert("SERVER_PROTOCOL".to_string(), ctx.protocol.clone());
    env.insert("SERVER_NAME".to_string(), ctx.server_name.clone());
    env.insert("SERVER_PORT".to_string(), ctx.server_port.to_string());
    env.insert("GATEWAY_INTERFACE".to_string(), GATEWAY_INTERFACE.to_string());
    env.insert("SERVER_SOFTWARE".to_string(), SERVER_SOFTWARE.to_string());
    env.insert("REQUEST_URI".to_string(), ctx.request_uri());

    let remote = ctx
        .remote_addr
        .map(|a| a.to_string())
        .unwrap_or_else(|| "127.0.0.1".to_string());
    env.insert("REMOTE_ADDR".to_string(), remote);

    // php-cgi refuses to run without this.
    env.insert("REDIRECT_STATUS".to_string(), "200".to_string());

    for (name, value) in &ctx.headers {
        // Already exposed above without the HTTP_ prefix.
        if name == "content-type" || name == "content-length" {
            continue;
        }
        env.insert(http_var_name(name), value.clone());
    }

    env
}

/// `X-Custom-Header` -> `HTTP_X_CUSTOM_HEADER`.
pub fn http_var_name(header: &str) -> String {
    let mut name = String::with_capacity(5 + header.len());
    name.push_str("HTTP_");
    for c in header.chars() {
        match c {
            '-' => name.push('_'),
            _ => name.push(c.to_ascii_uppercase()),
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn script() -> CgiScript {
        CgiScript {
            path: PathBuf::from("/srv/www/cgi-bin/app.py"),
            interpreter: Some(PathBuf::from("/usr/bin/python3")),
        }
    }

    #[test]
    fn header_name_conversion() {
        assert_eq!(http_var_name("x-custom-token"), "HTTP_X_CUSTOM_TOKEN");
        assert_eq!(http_var_name("Host"), "HTTP_HOST");
        assert_eq!(http_var_name("accept-language"), "HTTP_ACCEPT_LANGUAGE");
    }

    #[test]
    fn required_variables_present() {
        let mut ctx = RequestContext::new("GET", "/cgi-bin/app.py");
        ctx.query_string = "name=World".to_string();
        ctx.path_info = "/users/123".to_string();
        ctx.server_port = 8080;

        let env = build_env(&ctx, &script());

        assert_eq!(env["REQUEST_METHOD"], "GET");
        assert_eq!(env["QUERY_STRING"], "name=World");
        assert_eq!(env["SCRIPT_NAME"], "/cgi-bin/app.py");
        assert_eq!(env["SCRIPT_FILENAME"], "/srv/www/cgi-bin/app.py");
        assert_eq!(env["PATH_INFO"], "/users/123");
        assert_eq!(env["SERVER_PROTOCOL"], "HTTP/1.1");
        assert_eq!(env["SERVER_NAME"], "localhost");
        assert_eq!(env["SERVER_PORT"], "8080");
        assert_eq!(env["GATEWAY_INTERFACE"], "CGI/1.1");
        assert_eq!(env["REQUEST_URI"], "/cgi-bin/app.py/users/123?name=World");
        assert_eq!(env["REDIRECT_STATUS"], "200");
        // No body, no Content-Length header: the variable stays unset.
        assert!(!env.contains_key("CONTENT_LENGTH"));
        assert!(!env.contains_key("CONTENT_TYPE"));
    }

    #[test]
    fn content_headers_not_prefixed() {
        let mut ctx = RequestContext::new("POST", "/cgi-bin/app.py");
        ctx.headers.insert("content-type".to_string(), "text/plain".to_string());
        ctx.headers.insert("content-length".to_string(), "11".to_string());
        ctx.headers.insert("x-trace-id".to_string(), "abc123".to_string());
        ctx.body = b"hello world".to_vec();

        let env = build_env(&ctx, &script());

        assert_eq!(env["CONTENT_TYPE"], "text/plain");
        assert_eq!(env["CONTENT_LENGTH"], "11");
        assert_eq!(env["HTTP_X_TRACE_ID"], "abc123");
        assert!(!env.contains_key("HTTP_CONTENT_TYPE"));
        assert!(!env.contains_key("HTTP_CONTENT_LENGTH"));
    }

    #[test]
    fn content_length_derived_from_body() {
        let mut ctx = RequestContext::new("POST", "/cgi-bin/app.py");
        ctx.body = b"hello".to_vec();

        let env = build_env(&ctx, &script());
        assert_eq!(env["CONTENT_LENGTH"], "5");
    }
}
