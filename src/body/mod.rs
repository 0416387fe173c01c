//! Body Processor.
//!
//! Request and response bodies are accumulated in a [`BodyBuffer`] that
//! enforces the configured ceilings and moves to a temp file once the
//! in-memory threshold is crossed. At phase 2 the buffered request body is
//! handed to one of the structured processors. Processors never fail: they
//! report problems through [`ProcessedBody::error`] and the multipart
//! anomaly flags.

mod buffer;
mod json;
mod multipart;
pub mod urlencoded;

pub use buffer::BodyBuffer;
pub use multipart::{MultipartData, MultipartFlags, UploadedFile};

use crate::variables::Collection;
use std::fmt;

/// Structured request body processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyProcessorKind {
    /// `application/x-www-form-urlencoded`
    UrlEncoded,
    /// `multipart/form-data`
    Multipart,
    /// `application/json`
    Json,
}

impl BodyProcessorKind {
    /// Parse a processor name as used by `ctl:requestBodyProcessor`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "URLENCODED" => Some(Self::UrlEncoded),
            "MULTIPART" => Some(Self::Multipart),
            "JSON" => Some(Self::Json),
            _ => None,
        }
    }

    /// Name exposed through REQBODY_PROCESSOR.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UrlEncoded => "URLENCODED",
            Self::Multipart => "MULTIPART",
            Self::Json => "JSON",
        }
    }

    /// Pick a processor from a Content-Type header value.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "application/x-www-form-urlencoded" => Some(Self::UrlEncoded),
            "multipart/form-data" => Some(Self::Multipart),
            "application/json" => Some(Self::Json),
            m if m.ends_with("+json") => Some(Self::Json),
            _ => None,
        }
    }
}

impl fmt::Display for BodyProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running a body processor.
#[derive(Debug, Clone, Default)]
pub struct ProcessedBody {
    /// Processor that ran, if any.
    pub processor: Option<BodyProcessorKind>,
    /// Processor failure message.
    pub error: Option<String>,
    /// Arguments extracted into ARGS_POST.
    pub args: Collection,
    /// Body text (lossy UTF-8) for REQUEST_BODY.
    pub text: String,
    /// Multipart parts, files and anomaly flags.
    pub multipart: Option<MultipartData>,
}

impl ProcessedBody {
    /// Combined size of uploaded files.
    pub fn files_size(&self) -> u64 {
        self.multipart
            .as_ref()
            .map_or(0, |m| m.files.iter().map(|f| f.size).sum())
    }
}

/// Run the selected processor over a fully buffered body.
///
/// Without a processor the body is exposed only as text.
pub fn process_request_body(
    kind: Option<BodyProcessorKind>,
    content_type: &str,
    body: &[u8],
    separator: char,
    file_limit: usize,
) -> ProcessedBody {
    let mut processed = ProcessedBody {
        processor: kind,
        ..ProcessedBody::default()
    };

    match kind {
        Some(BodyProcessorKind::UrlEncoded) => {
            processed.text = String::from_utf8_lossy(body).into_owned();
            processed.args = urlencoded::parse_pairs(&processed.text, separator);
        }
        Some(BodyProcessorKind::Json) => {
            processed.text = String::from_utf8_lossy(body).into_owned();
            match json::flatten(body) {
                Ok(args) => processed.args = args,
                Err(message) => processed.error = Some(message),
            }
        }
        Some(BodyProcessorKind::Multipart) => {
            let (data, error) = multipart::parse(content_type, body, file_limit);
            processed.args = data.args.clone();
            processed.error = error;
            processed.multipart = Some(data);
        }
        None => {
            processed.text = String::from_utf8_lossy(body).into_owned();
        }
    }

    if let Some(err) = &processed.error {
        tracing::debug!(processor = ?kind, error = %err, "request body processor error");
    }
    processed
}
