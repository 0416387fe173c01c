//! Response status line and headers.

use super::Collection;

/// Response data for variable resolution.
#[derive(Debug, Clone, Default)]
pub struct ResponseData {
    /// HTTP status code (0 until known).
    pub status: u16,
    /// Response protocol.
    pub protocol: String,
    /// Response headers, names as received.
    pub headers: Collection,
}

impl ResponseData {
    /// Create empty response data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status line.
    pub fn set_status(&mut self, status: u16, protocol: &str) {
        self.status = status;
        self.protocol = protocol.to_string();
    }

    /// Add a response header.
    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.add(name, value);
    }

    /// Content-Type, without parameters.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get("content-type")
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
    }

    /// Declared Content-Length.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get("content-length")
            .and_then(|v| v.trim().parse().ok())
    }

    /// `PROTOCOL STATUS`
    pub fn status_line(&self) -> String {
        format!("{} {}", self.protocol, self.status)
    }
}
