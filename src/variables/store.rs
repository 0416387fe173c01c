//! The per-transaction Variable Store.
//!
//! Values are extracted lazily from the request/response data the first time
//! a selector asks for them and kept in a memo for the rest of the
//! transaction. Any mutation of the underlying data clears the memo.
//! Variables whose value can change between two reads (TX, MATCHED_*,
//! time) are never memoized.

use super::{Collection, RequestData, ResponseData, Value};
use crate::body::ProcessedBody;
use crate::engine::Phase;
use crate::error::{Error, Result};
use crate::parser::{parse_single_variable, VariableName, VariableSpec};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Resolved `(name, value)` pairs for one selector.
pub type Resolved = Arc<Vec<(String, String)>>;

/// Variables of one transaction.
#[derive(Debug)]
pub struct VariableStore {
    pub(super) request: RequestData,
    pub(super) response: ResponseData,
    pub(super) tx: Collection,
    pub(super) request_body: Option<ProcessedBody>,
    pub(super) request_body_length: u64,
    pub(super) inbound_data_error: bool,
    pub(super) response_body: Option<String>,
    pub(super) outbound_data_error: bool,
    pub(super) matched_var: Option<(String, String)>,
    pub(super) matched_vars: Vec<(String, String)>,
    pub(super) limits_exceeded: bool,
    pub(super) highest_severity: Option<u8>,
    pub(super) unique_id: String,
    pub(super) started: Instant,
    phase: Phase,
    memo: HashMap<String, Resolved>,
}

impl VariableStore {
    /// Create an empty store for the transaction `unique_id`.
    pub fn new(unique_id: impl Into<String>) -> Self {
        Self {
            request: RequestData::new(),
            response: ResponseData::new(),
            tx: Collection::new(),
            request_body: None,
            request_body_length: 0,
            inbound_data_error: false,
            response_body: None,
            outbound_data_error: false,
            matched_var: None,
            matched_vars: Vec::new(),
            limits_exceeded: false,
            highest_severity: None,
            unique_id: unique_id.into(),
            started: Instant::now(),
            phase: Phase::RequestHeaders,
            memo: HashMap::new(),
        }
    }

    /// Write a variable. Only `TX.key` / `TX:key` is writable.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        let (collection, key) = split_name(name);
        match VariableName::parse(collection) {
            Some(VariableName::Tx) if !key.is_empty() => {
                self.tx.set(key.to_ascii_lowercase(), value);
                Ok(())
            }
            Some(_) => Err(Error::ReadOnlyVariable {
                name: name.to_string(),
            }),
            None => Err(Error::UnknownVariable {
                name: collection.to_string(),
            }),
        }
    }

    /// Read a variable by selector (`REQUEST_METHOD`, `ARGS:id`, `&ARGS`, `TX.score`).
    ///
    /// Unknown names and variables not yet valid in the current phase are
    /// undefined.
    pub fn get(&self, name: &str) -> Option<Value> {
        let spec = parse_selector(name)?;
        let entries = self.lookup(&spec);

        if spec.count_mode {
            return entries.first().and_then(|(_, v)| v.parse().ok()).map(Value::Int);
        }
        if !self.is_available(spec.name) {
            return None;
        }
        if spec.name.is_collection() {
            return match &spec.selection {
                Some(crate::parser::Selection::Key(_)) => {
                    entries.into_iter().next().map(|(_, v)| Value::Str(v))
                }
                _ => Some(Value::Collection(entries)),
            };
        }

        let (_, value) = entries.into_iter().next()?;
        if is_integer(spec.name) {
            if let Ok(n) = value.parse::<i64>() {
                return Some(Value::Int(n));
            }
        }
        Some(Value::Str(value))
    }

    /// Ordered `(name, value)` members selected by `prefix`
    /// (`ARGS`, `REQUEST_HEADERS:x-*`, `TX:/^score/`).
    pub fn get_collection(&self, prefix: &str) -> Vec<(String, String)> {
        match parse_selector(prefix) {
            Some(spec) => self.lookup(&spec),
            None => Vec::new(),
        }
    }

    /// Resolve a rule selector, memoizing stable variables.
    pub fn resolve(&mut self, spec: &VariableSpec) -> Resolved {
        if !self.is_available(spec.name) {
            return Arc::new(Vec::new());
        }
        if spec.name.is_volatile() {
            return Arc::new(self.lookup(spec));
        }

        let key = memo_key(spec);
        if let Some(hit) = self.memo.get(&key) {
            return Arc::clone(hit);
        }
        let resolved = Arc::new(self.lookup(spec));
        self.memo.insert(key, Arc::clone(&resolved));
        resolved
    }

    /// Resolve without touching the memo.
    pub fn lookup(&self, spec: &VariableSpec) -> Vec<(String, String)> {
        if !self.is_available(spec.name) {
            return Vec::new();
        }

        let mut entries = self.extract(spec.name, spec.selection.as_ref());
        if !spec.exclusions.is_empty() {
            entries.retain(|(name, _)| {
                let key = name.split_once(':').map_or("", |(_, k)| k);
                !spec
                    .exclusions
                    .iter()
                    .any(|e| e.selection.as_ref().map_or(true, |s| s.matches(key)))
            });
        }

        if spec.count_mode {
            return vec![(spec.to_string(), entries.len().to_string())];
        }
        entries
    }

    /// Whether `name` carries data in the current phase.
    pub fn is_available(&self, name: VariableName) -> bool {
        name.available_from() <= self.phase
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Advance to `phase`.
    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Drop every memoized value.
    pub fn invalidate(&mut self) {
        self.memo.clear();
    }

    /// Number of memoized selectors.
    pub fn memo_len(&self) -> usize {
        self.memo.len()
    }

    /// Request data.
    pub fn request(&self) -> &RequestData {
        &self.request
    }

    /// Mutable request data; clears the memo.
    pub fn request_mut(&mut self) -> &mut RequestData {
        self.invalidate();
        &mut self.request
    }

    /// Response data.
    pub fn response(&self) -> &ResponseData {
        &self.response
    }

    /// Mutable response data; clears the memo.
    pub fn response_mut(&mut self) -> &mut ResponseData {
        self.invalidate();
        &mut self.response
    }

    /// The TX collection.
    pub fn tx(&self) -> &Collection {
        &self.tx
    }

    /// Mutable TX collection.
    pub fn tx_mut(&mut self) -> &mut Collection {
        &mut self.tx
    }

    /// Transaction unique id.
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Store the outcome of request body processing.
    pub fn set_request_body(&mut self, body: ProcessedBody, length: u64) {
        self.request_body = Some(body);
        self.request_body_length = length;
        self.invalidate();
    }

    /// Processed request body, if any.
    pub fn request_body(&self) -> Option<&ProcessedBody> {
        self.request_body.as_ref()
    }

    /// Flag a request body limit breach.
    pub fn set_inbound_data_error(&mut self) {
        self.inbound_data_error = true;
        self.invalidate();
    }

    /// Store the inspected response body.
    pub fn set_response_body(&mut self, text: String) {
        self.response_body = Some(text);
        self.invalidate();
    }

    /// Flag a response body limit breach.
    pub fn set_outbound_data_error(&mut self) {
        self.outbound_data_error = true;
        self.invalidate();
    }

    /// Forget the previous rule's matched values.
    pub fn begin_rule(&mut self) {
        self.matched_vars.clear();
    }

    /// Record a matched variable for MATCHED_VAR(S).
    pub fn record_match(&mut self, name: &str, value: &str) {
        self.matched_var = Some((name.to_string(), value.to_string()));
        self.matched_vars.push((name.to_string(), value.to_string()));
    }

    /// Last matched `(name, value)`.
    pub fn matched_var(&self) -> Option<(&str, &str)> {
        self.matched_var
            .as_ref()
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Store regex captures in TX:0..9, clearing stale groups.
    pub fn set_captures(&mut self, captures: &[String]) {
        for i in 0..10 {
            let key = i.to_string();
            match captures.get(i) {
                Some(c) => self.tx.set(key, c.as_str()),
                None => {
                    self.tx.remove(&key);
                }
            }
        }
    }

    /// Raise MSC_PCRE_LIMITS_EXCEEDED and TX:MSC_PCRE_LIMITS_EXCEEDED.
    pub fn flag_limits_exceeded(&mut self) {
        self.limits_exceeded = true;
        self.tx.set("msc_pcre_limits_exceeded", "1");
    }

    /// Whether a regex ceiling was hit.
    pub fn limits_exceeded(&self) -> bool {
        self.limits_exceeded
    }

    /// Track the most severe (lowest) rule severity.
    pub fn note_severity(&mut self, severity: u8) {
        self.highest_severity = Some(self.highest_severity.map_or(severity, |s| s.min(severity)));
    }
}

fn split_name(name: &str) -> (&str, &str) {
    match name.find(['.', ':']) {
        Some(pos) => (&name[..pos], &name[pos + 1..]),
        None => (name, ""),
    }
}

/// Parse a selector, accepting `COLLECTION.key` as well as `COLLECTION:key`.
pub(crate) fn parse_selector(name: &str) -> Option<VariableSpec> {
    let name = name.trim();
    let normalized = match (name.find('.'), name.find(':')) {
        (Some(dot), None) => format!("{}:{}", &name[..dot], &name[dot + 1..]),
        (Some(dot), Some(colon)) if dot < colon => {
            format!("{}:{}", &name[..dot], &name[dot + 1..])
        }
        _ => name.to_string(),
    };
    parse_single_variable(&normalized).ok()
}

fn memo_key(spec: &VariableSpec) -> String {
    let mut key = spec.to_string();
    for e in &spec.exclusions {
        key.push('!');
        key.push_str(e.name.as_str());
        if let Some(sel) = &e.selection {
            key.push(':');
            key.push_str(&sel.to_string());
        }
    }
    key
}

fn is_integer(name: VariableName) -> bool {
    use VariableName::*;
    matches!(
        name,
        ArgsCombinedSize
            | RequestBodyLength
            | ReqbodyError
            | ReqbodyProcessorError
            | InboundDataError
            | OutboundDataError
            | FilesCombinedSize
            | MultipartStrictError
            | MultipartUnmatchedBoundary
            | MultipartBoundaryQuoted
            | MultipartBoundaryWhitespace
            | MultipartDataBefore
            | MultipartDataAfter
            | MultipartHeaderFolding
            | MultipartLfLine
            | MultipartCrlfLfLines
            | MultipartMissingSemicolon
            | MultipartInvalidQuoting
            | MultipartInvalidPart
            | MultipartInvalidHeaderFolding
            | MultipartFileLimitExceeded
            | ResponseStatus
            | ResponseContentLength
            | RemotePort
            | ServerPort
            | TimeEpoch
            | Duration
            | HighestSeverity
            | MscPcreLimitsExceeded
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::CookieFormat;
    use crate::parser::parse_variables;

    fn store() -> VariableStore {
        let mut s = VariableStore::new("tx-1");
        s.request_mut()
            .set_request_line("/login?user=admin&pass=x", "POST", "HTTP/1.1", '&');
        s.request_mut()
            .add_header("Content-Type", "application/x-www-form-urlencoded", CookieFormat::V0);
        s
    }

    #[test]
    fn test_get_scalar_and_keyed() {
        let s = store();
        assert_eq!(s.get("REQUEST_METHOD"), Some(Value::from("POST")));
        assert_eq!(s.get("ARGS:user"), Some(Value::from("admin")));
        assert_eq!(s.get("args_get.USER"), Some(Value::from("admin")));
        assert_eq!(s.get("&ARGS"), Some(Value::Int(2)));
        assert_eq!(s.get("ARGS:missing"), None);
        assert_eq!(s.get("NOT_A_VARIABLE"), None);
    }

    #[test]
    fn test_get_collection_is_ordered() {
        let s = store();
        assert_eq!(
            s.get_collection("ARGS"),
            vec![
                ("ARGS:user".to_string(), "admin".to_string()),
                ("ARGS:pass".to_string(), "x".to_string()),
            ]
        );
        assert_eq!(s.get_collection("ARGS:us*").len(), 1);
    }

    #[test]
    fn test_later_phase_variables_are_undefined() {
        let mut s = store();
        s.response_mut().set_status(500, "HTTP/1.1");
        assert_eq!(s.get("RESPONSE_STATUS"), None);
        assert_eq!(s.get("&RESPONSE_HEADERS"), None);

        s.set_phase(Phase::ResponseHeaders);
        assert_eq!(s.get("RESPONSE_STATUS"), Some(Value::Int(500)));
    }

    #[test]
    fn test_set_only_tx() {
        let mut s = store();
        s.set("TX.Score", "5").unwrap();
        assert_eq!(s.get("TX:score"), Some(Value::from("5")));
        assert!(matches!(
            s.set("REQUEST_METHOD", "GET"),
            Err(Error::ReadOnlyVariable { .. })
        ));
        assert!(matches!(s.set("BOGUS.x", "1"), Err(Error::UnknownVariable { .. })));
    }

    #[test]
    fn test_resolve_is_memoized_and_idempotent() {
        let mut s = store();
        let spec = &parse_variables("ARGS").unwrap()[0];
        let first = s.resolve(spec);
        let second = s.resolve(spec);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(s.memo_len(), 1);

        s.request_mut().args_get.add("extra", "1");
        assert_eq!(s.memo_len(), 0);
        assert_eq!(s.resolve(spec).len(), 3);
    }

    #[test]
    fn test_tx_is_never_memoized() {
        let mut s = store();
        let spec = &parse_variables("TX").unwrap()[0];
        assert!(s.resolve(spec).is_empty());
        s.set("tx.a", "1").unwrap();
        assert_eq!(s.resolve(spec).len(), 1);
        assert_eq!(s.memo_len(), 0);
    }

    #[test]
    fn test_exclusions() {
        let mut s = store();
        let specs = parse_variables("ARGS|!ARGS:pass").unwrap();
        let resolved = s.resolve(&specs[0]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].0, "ARGS:user");
    }

    #[test]
    fn test_captures_and_limit_flag() {
        let mut s = store();
        s.set_captures(&["ab".to_string(), "a".to_string()]);
        assert_eq!(s.get("TX:1"), Some(Value::from("a")));
        s.set_captures(&["x".to_string()]);
        assert_eq!(s.get("TX:1"), None);

        assert_eq!(s.get("MSC_PCRE_LIMITS_EXCEEDED"), Some(Value::Int(0)));
        s.flag_limits_exceeded();
        assert_eq!(s.get("MSC_PCRE_LIMITS_EXCEEDED"), Some(Value::Int(1)));
        assert_eq!(s.get("TX:MSC_PCRE_LIMITS_EXCEEDED"), Some(Value::from("1")));
    }
}
