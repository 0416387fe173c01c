//! The audit record and its two serializations.

use super::{AuditLogFormat, AuditPart, AuditParts};
use crate::engine::config::RuleEngineMode;
use crate::engine::{Disposition, Intervention, MatchedRule, Phase};
use crate::variables::VariableStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::time::Duration;

/// Producer string written into part H.
const PRODUCER: &str = concat!("zentinel-waf/", env!("CARGO_PKG_VERSION"));

/// Part A.
#[derive(Debug, Clone, Serialize)]
pub struct HeaderSection {
    /// When the record was produced.
    pub timestamp: DateTime<Utc>,
    /// Transaction id.
    pub unique_id: String,
    /// Client address.
    pub client_ip: String,
    /// Client port.
    pub client_port: u16,
    /// Server address.
    pub server_ip: String,
    /// Server port.
    pub server_port: u16,
}

/// Part B.
#[derive(Debug, Clone, Serialize)]
pub struct RequestSection {
    /// `METHOD uri PROTOCOL`
    pub request_line: String,
    /// Headers in arrival order.
    pub headers: Vec<(String, String)>,
}

/// Part F.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseSection {
    /// `PROTOCOL status`
    pub status_line: String,
    /// Headers in arrival order.
    pub headers: Vec<(String, String)>,
}

/// Part H.
#[derive(Debug, Clone, Serialize)]
pub struct TrailerSection {
    /// One line per logged rule match.
    pub messages: Vec<String>,
    /// Final disposition.
    pub disposition: String,
    /// The intervention, formatted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intervention: Option<String>,
    /// Phase of the intervention.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    /// Rule engine mode.
    pub engine_mode: &'static str,
    /// Microseconds since the transaction started.
    pub stopwatch_us: u64,
    /// Whether a regex ceiling was hit.
    pub limits_exceeded: bool,
    /// Producer.
    pub producer: &'static str,
}

/// One uploaded file (part J).
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    /// Form field.
    pub field: String,
    /// Client file name.
    pub filename: String,
    /// Size in bytes.
    pub size: u64,
}

/// A write-once audit record holding only the configured parts.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// A
    pub transaction: HeaderSection,
    /// B
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestSection>,
    /// C
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    /// E
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    /// F
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseSection>,
    /// H
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trailer: Option<TrailerSection>,
    /// I
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduced_request_body: Option<String>,
    /// J
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileEntry>>,
    /// K
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rules: Option<Vec<MatchedRule>>,
}

/// Transaction state an audit record is built from.
pub struct AuditInput<'a> {
    /// Variables (request, response, processed body).
    pub store: &'a VariableStore,
    /// Rules that matched.
    pub matched: &'a [MatchedRule],
    /// Terminal decision, if any.
    pub intervention: Option<&'a Intervention>,
    /// Final disposition.
    pub disposition: &'a Disposition,
    /// Buffered request body.
    pub request_body: Option<&'a str>,
    /// Inspected response body.
    pub response_body: Option<&'a str>,
    /// Effective rule engine mode.
    pub engine_mode: RuleEngineMode,
    /// Time since the transaction started.
    pub elapsed: Duration,
}

fn pairs(collection: &crate::variables::Collection) -> Vec<(String, String)> {
    collection
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl AuditRecord {
    /// Build a record with exactly the sections selected by `parts`.
    pub fn build(parts: &AuditParts, input: &AuditInput<'_>) -> Self {
        let request = input.store.request();
        let response = input.store.response();
        let body = input.store.request_body();
        let want = |part| parts.contains(part);

        let transaction = HeaderSection {
            timestamp: Utc::now(),
            unique_id: input.store.unique_id().to_string(),
            client_ip: request.client_ip.clone(),
            client_port: request.client_port,
            server_ip: request.server_ip.clone(),
            server_port: request.server_port,
        };

        let reduced = || match body.and_then(|b| b.multipart.as_ref()) {
            Some(multipart) => multipart
                .args
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&"),
            None => input.request_body.unwrap_or_default().to_string(),
        };

        let files = || {
            body.and_then(|b| b.multipart.as_ref())
                .map(|m| {
                    m.files
                        .iter()
                        .map(|f| FileEntry {
                            field: f.field.clone(),
                            filename: f.filename.clone(),
                            size: f.size,
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        };

        let trailer = || TrailerSection {
            messages: input
                .matched
                .iter()
                .filter(|m| m.log)
                .map(MatchedRule::format_log)
                .collect(),
            disposition: input.disposition.to_string(),
            intervention: input.intervention.map(Intervention::format_log),
            phase: input.intervention.map(|i| i.phase),
            engine_mode: input.engine_mode.as_str(),
            stopwatch_us: u64::try_from(input.elapsed.as_micros()).unwrap_or(u64::MAX),
            limits_exceeded: input.store.limits_exceeded(),
            producer: PRODUCER,
        };

        Self {
            transaction,
            request: want(AuditPart::RequestHeaders).then(|| RequestSection {
                request_line: request.request_line(),
                headers: pairs(&request.headers),
            }),
            request_body: want(AuditPart::RequestBody)
                .then(|| input.request_body.unwrap_or_default().to_string()),
            response_body: want(AuditPart::ResponseBody)
                .then(|| input.response_body.unwrap_or_default().to_string()),
            response: want(AuditPart::ResponseHeaders).then(|| ResponseSection {
                status_line: response.status_line(),
                headers: pairs(&response.headers),
            }),
            trailer: want(AuditPart::Trailer).then(trailer),
            reduced_request_body: want(AuditPart::ReducedRequestBody).then(reduced),
            files: want(AuditPart::Files).then(files),
            matched_rules: want(AuditPart::MatchedRules).then(|| input.matched.to_vec()),
        }
    }

    /// Codes of the sections present, in record order.
    pub fn part_codes(&self) -> String {
        let mut codes = String::from("A");
        for (code, present) in [
            ('B', self.request.is_some()),
            ('C', self.request_body.is_some()),
            ('E', self.response_body.is_some()),
            ('F', self.response.is_some()),
            ('H', self.trailer.is_some()),
            ('I', self.reduced_request_body.is_some()),
            ('J', self.files.is_some()),
            ('K', self.matched_rules.is_some()),
        ] {
            if present {
                codes.push(code);
            }
        }
        codes.push('Z');
        codes
    }

    /// Serialize in the configured format.
    pub fn render(&self, format: AuditLogFormat) -> String {
        match format {
            AuditLogFormat::Native => self.to_native(),
            AuditLogFormat::Json => self.to_json(),
        }
    }

    /// One-line JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(target: "zentinel_waf::audit", error = %e, "audit record serialization failed");
            String::from("{}")
        })
    }

    /// Boundary-delimited sections.
    pub fn to_native(&self) -> String {
        let boundary: String = self
            .transaction
            .unique_id
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(8)
            .collect();
        let mut out = String::new();
        let section = |out: &mut String, code: char| {
            let _ = writeln!(out, "--{}-{}--", boundary, code);
        };

        let t = &self.transaction;
        section(&mut out, 'A');
        let _ = writeln!(
            out,
            "[{}] {} {} {} {} {}",
            t.timestamp.format("%d/%b/%Y:%H:%M:%S %z"),
            t.unique_id,
            t.client_ip,
            t.client_port,
            t.server_ip,
            t.server_port
        );

        if let Some(req) = &self.request {
            section(&mut out, 'B');
            let _ = writeln!(out, "{}", req.request_line);
            for (k, v) in &req.headers {
                let _ = writeln!(out, "{}: {}", k, v);
            }
        }
        if let Some(body) = &self.request_body {
            section(&mut out, 'C');
            let _ = writeln!(out, "{}", body);
        }
        if let Some(body) = &self.response_body {
            section(&mut out, 'E');
            let _ = writeln!(out, "{}", body);
        }
        if let Some(resp) = &self.response {
            section(&mut out, 'F');
            let _ = writeln!(out, "{}", resp.status_line);
            for (k, v) in &resp.headers {
                let _ = writeln!(out, "{}: {}", k, v);
            }
        }
        if let Some(trailer) = &self.trailer {
            section(&mut out, 'H');
            for msg in &trailer.messages {
                let _ = writeln!(out, "Message: {}", msg);
            }
            if let Some(intervention) = &trailer.intervention {
                let _ = writeln!(out, "Action: Intercepted {}", intervention);
            }
            let _ = writeln!(out, "Disposition: {}", trailer.disposition);
            let _ = writeln!(out, "Engine-Mode: {}", trailer.engine_mode);
            let _ = writeln!(out, "Stopwatch: {}", trailer.stopwatch_us);
            if trailer.limits_exceeded {
                let _ = writeln!(out, "Limits-Exceeded: regex");
            }
            let _ = writeln!(out, "Producer: {}", trailer.producer);
        }
        if let Some(body) = &self.reduced_request_body {
            section(&mut out, 'I');
            let _ = writeln!(out, "{}", body);
        }
        if let Some(files) = &self.files {
            section(&mut out, 'J');
            for f in files {
                let _ = writeln!(out, "{} {} {}", f.field, f.filename, f.size);
            }
        }
        if let Some(rules) = &self.matched_rules {
            section(&mut out, 'K');
            for rule in rules {
                let _ = writeln!(out, "{}", rule.format_log());
            }
        }
        section(&mut out, 'Z');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> VariableStore {
        let mut store = VariableStore::new("0f8e6a2c-1d3b-4c5e-9f70-8a1b2c3d4e5f");
        let req = store.request_mut();
        req.set_request_line("/login?u=a", "POST", "HTTP/1.1", '&');
        req.client_ip = "10.0.0.1".into();
        req.headers.add("Host", "example.com");
        store.response_mut().set_status(500, "HTTP/1.1");
        store
    }

    fn build(parts: &str, store: &VariableStore) -> AuditRecord {
        let disposition = Disposition::Pass;
        let input = AuditInput {
            store,
            matched: &[],
            intervention: None,
            disposition: &disposition,
            request_body: Some("u=a"),
            response_body: None,
            engine_mode: RuleEngineMode::On,
            elapsed: Duration::from_micros(1500),
        };
        AuditRecord::build(&AuditParts::parse(parts).unwrap(), &input)
    }

    #[test]
    fn test_only_configured_parts() {
        let store = store();
        let record = build("ABFHZ", &store);
        assert_eq!(record.part_codes(), "ABFHZ");
        assert!(record.request_body.is_none());

        let json: serde_json::Value = serde_json::from_str(&record.to_json()).unwrap();
        assert!(json.get("request").is_some());
        assert!(json.get("request_body").is_none());
        assert_eq!(json["trailer"]["stopwatch_us"], 1500);
    }

    #[test]
    fn test_native_sections() {
        let store = store();
        let native = build("ABCZ", &store).to_native();
        let markers: Vec<&str> = native.lines().filter(|l| l.starts_with("--0f8e6a2c-")).collect();
        assert_eq!(
            markers,
            vec!["--0f8e6a2c-A--", "--0f8e6a2c-B--", "--0f8e6a2c-C--", "--0f8e6a2c-Z--"]
        );
        assert!(native.contains("POST /login?u=a HTTP/1.1"));
        assert!(native.contains("Host: example.com"));
    }
}
