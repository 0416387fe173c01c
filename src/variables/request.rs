//! Request line, headers, cookies and connection data.

use super::Collection;
use crate::body::urlencoded::parse_pairs;
use crate::engine::config::CookieFormat;

/// Request data extracted before the body arrives.
#[derive(Debug, Clone, Default)]
pub struct RequestData {
    /// HTTP method.
    pub method: String,
    /// Request URI (path and query) with any scheme/authority removed.
    pub uri: String,
    /// URI exactly as received.
    pub uri_raw: String,
    /// Path without the query string.
    pub path: String,
    /// Query string without the `?`.
    pub query_string: String,
    /// HTTP protocol.
    pub protocol: String,
    /// Request headers, names as received.
    pub headers: Collection,
    /// Query string arguments.
    pub args_get: Collection,
    /// Cookies.
    pub cookies: Collection,
    /// Client address.
    pub client_ip: String,
    /// Client port.
    pub client_port: u16,
    /// Server address.
    pub server_ip: String,
    /// Server port.
    pub server_port: u16,
}

impl RequestData {
    /// Create empty request data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request line and parse the query string with `separator`.
    pub fn set_request_line(&mut self, uri: &str, method: &str, protocol: &str, separator: char) {
        self.method = method.to_string();
        self.protocol = protocol.to_string();
        self.uri_raw = uri.to_string();
        self.uri = strip_authority(uri).to_string();

        match self.uri.split_once('?') {
            Some((path, query)) => {
                self.path = path.to_string();
                self.query_string = query.to_string();
            }
            None => {
                self.path = self.uri.clone();
                self.query_string.clear();
            }
        }
        self.args_get = parse_pairs(&self.query_string, separator);
    }

    /// Add a request header; `Cookie` headers also fill the cookie collection.
    pub fn add_header(&mut self, name: &str, value: &str, cookies: CookieFormat) {
        if name.eq_ignore_ascii_case("cookie") {
            parse_cookies(value, cookies, &mut self.cookies);
        }
        self.headers.add(name, value);
    }

    /// First value of a header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// `METHOD URI PROTOCOL`
    pub fn request_line(&self) -> String {
        format!("{} {} {}", self.method, self.uri_raw, self.protocol)
    }

    /// Last path segment.
    pub fn basename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }

    /// Declared Content-Length, if present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")
            .and_then(|v| v.trim().parse().ok())
    }

    /// Host header without the port, used as SERVER_NAME.
    pub fn server_name(&self) -> &str {
        let host = self.header("host").unwrap_or("");
        if host.starts_with('[') {
            return host.split(']').next().map_or(host, |h| &h[1..]);
        }
        host.split(':').next().unwrap_or(host)
    }
}

fn strip_authority(uri: &str) -> &str {
    let rest = match uri.find("://") {
        Some(pos) if uri[..pos].bytes().all(|b| b.is_ascii_alphabetic()) => &uri[pos + 3..],
        _ => return uri,
    };
    match rest.find('/') {
        Some(slash) => &rest[slash..],
        None => "/",
    }
}

/// Parse a Cookie header into `into`.
///
/// Version 0 splits on `;`. Version 1 also splits on `,`, strips quotes
/// from values and skips `$Version`-style attributes.
pub fn parse_cookies(header: &str, format: CookieFormat, into: &mut Collection) {
    let separators: &[char] = match format {
        CookieFormat::V0 => &[';'],
        CookieFormat::V1 => &[';', ','],
    };

    for part in header.split(separators) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, value) = part.split_once('=').unwrap_or((part, ""));
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let value = value.trim();
        match format {
            CookieFormat::V0 => into.add(name, value),
            CookieFormat::V1 => {
                if name.starts_with('$') {
                    continue;
                }
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                into.add(name, value);
            }
        }
    }
}
