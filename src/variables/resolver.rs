//! Extraction of raw values for each variable name.

use super::{Collection, VariableStore};
use crate::body::MultipartFlags;
use crate::parser::{Selection, VariableName};
use chrono::{Datelike, Local, Timelike};

fn scalar(name: VariableName, value: impl Into<String>) -> Vec<(String, String)> {
    vec![(name.as_str().to_string(), value.into())]
}

fn flag(name: VariableName, set: bool) -> Vec<(String, String)> {
    scalar(name, if set { "1" } else { "0" })
}

fn members(
    name: VariableName,
    collection: &Collection,
    selection: Option<&Selection>,
) -> Vec<(String, String)> {
    collection
        .select(selection)
        .map(|(k, v)| (format!("{}:{}", name.as_str(), k), v.to_string()))
        .collect()
}

fn names(
    name: VariableName,
    collection: &Collection,
    selection: Option<&Selection>,
) -> Vec<(String, String)> {
    collection
        .select(selection)
        .map(|(k, _)| (format!("{}:{}", name.as_str(), k), k.to_string()))
        .collect()
}

impl VariableStore {
    fn args_post(&self) -> Option<&Collection> {
        self.request_body.as_ref().map(|b| &b.args)
    }

    fn multipart_flag(&self, name: VariableName, pick: fn(&MultipartFlags) -> bool) -> Vec<(String, String)> {
        match self.request_body.as_ref().and_then(|b| b.multipart.as_ref()) {
            Some(m) => flag(name, pick(&m.flags)),
            None => Vec::new(),
        }
    }

    /// Values of `name` narrowed by `selection`, in collection order.
    ///
    /// An empty result means the variable is undefined.
    pub(super) fn extract(
        &self,
        name: VariableName,
        selection: Option<&Selection>,
    ) -> Vec<(String, String)> {
        use VariableName::*;

        let req = &self.request;
        let res = &self.response;
        let body = self.request_body.as_ref();
        let multipart = body.and_then(|b| b.multipart.as_ref());
        let empty = Collection::new();

        match name {
            Args => {
                let mut out = members(Args, &req.args_get, selection);
                out.extend(members(Args, self.args_post().unwrap_or(&empty), selection));
                out
            }
            ArgsGet => members(ArgsGet, &req.args_get, selection),
            ArgsPost => members(ArgsPost, self.args_post().unwrap_or(&empty), selection),
            ArgsNames => {
                let mut out = names(ArgsNames, &req.args_get, selection);
                out.extend(names(ArgsNames, self.args_post().unwrap_or(&empty), selection));
                out
            }
            ArgsGetNames => names(ArgsGetNames, &req.args_get, selection),
            ArgsPostNames => names(ArgsPostNames, self.args_post().unwrap_or(&empty), selection),
            ArgsCombinedSize => {
                let size = req.args_get.combined_size()
                    + self.args_post().map_or(0, Collection::combined_size);
                scalar(name, size.to_string())
            }

            QueryString => scalar(name, req.query_string.as_str()),
            RequestUri => scalar(name, req.uri.as_str()),
            RequestUriRaw => scalar(name, req.uri_raw.as_str()),
            RequestFilename => scalar(name, req.path.as_str()),
            RequestBasename => scalar(name, req.basename()),
            RequestLine => scalar(name, req.request_line()),
            RequestMethod => scalar(name, req.method.as_str()),
            RequestProtocol => scalar(name, req.protocol.as_str()),
            RequestHeaders => members(name, &req.headers, selection),
            RequestHeadersNames => names(name, &req.headers, selection),
            RequestCookies => members(name, &req.cookies, selection),
            RequestCookiesNames => names(name, &req.cookies, selection),

            RequestBody => match body {
                Some(b) if b.multipart.is_none() => scalar(name, b.text.as_str()),
                _ => Vec::new(),
            },
            RequestBodyLength => scalar(name, self.request_body_length.to_string()),
            ReqbodyProcessor => match body.and_then(|b| b.processor) {
                Some(kind) => scalar(name, kind.as_str()),
                None => Vec::new(),
            },
            ReqbodyError | ReqbodyProcessorError => match body {
                Some(b) => flag(name, b.error.is_some()),
                None => Vec::new(),
            },
            ReqbodyErrorMsg | ReqbodyProcessorErrorMsg => match body {
                Some(b) => scalar(name, b.error.clone().unwrap_or_default()),
                None => Vec::new(),
            },
            InboundDataError => flag(name, self.inbound_data_error),

            Files => match multipart {
                Some(m) => m
                    .files
                    .iter()
                    .filter(|f| selection.map_or(true, |s| s.matches(&f.field)))
                    .map(|f| (format!("FILES:{}", f.field), f.filename.clone()))
                    .collect(),
                None => Vec::new(),
            },
            FilesNames => match multipart {
                Some(m) => m
                    .files
                    .iter()
                    .filter(|f| selection.map_or(true, |s| s.matches(&f.field)))
                    .map(|f| (format!("FILES_NAMES:{}", f.field), f.field.clone()))
                    .collect(),
                None => Vec::new(),
            },
            FilesSizes => match multipart {
                Some(m) => m
                    .files
                    .iter()
                    .filter(|f| selection.map_or(true, |s| s.matches(&f.field)))
                    .map(|f| (format!("FILES_SIZES:{}", f.field), f.size.to_string()))
                    .collect(),
                None => Vec::new(),
            },
            FilesCombinedSize => match multipart {
                Some(m) => scalar(name, m.files.iter().map(|f| f.size).sum::<u64>().to_string()),
                None => Vec::new(),
            },
            MultipartName => match multipart {
                Some(m) => members(name, &m.names, selection),
                None => Vec::new(),
            },
            MultipartFilename => match multipart {
                Some(m) => members(name, &m.filenames, selection),
                None => Vec::new(),
            },
            MultipartStrictError => match multipart {
                Some(m) => flag(name, m.flags.any() || body.map_or(false, |b| b.error.is_some())),
                None => Vec::new(),
            },
            MultipartUnmatchedBoundary => self.multipart_flag(name, |f| f.unmatched_boundary),
            MultipartBoundaryQuoted => self.multipart_flag(name, |f| f.boundary_quoted),
            MultipartBoundaryWhitespace => self.multipart_flag(name, |f| f.boundary_whitespace),
            MultipartDataBefore => self.multipart_flag(name, |f| f.data_before),
            MultipartDataAfter => self.multipart_flag(name, |f| f.data_after),
            MultipartHeaderFolding => self.multipart_flag(name, |f| f.header_folding),
            MultipartLfLine => self.multipart_flag(name, |f| f.lf_line),
            MultipartCrlfLfLines => self.multipart_flag(name, |f| f.crlf_lf_lines),
            MultipartMissingSemicolon => self.multipart_flag(name, |f| f.missing_semicolon),
            MultipartInvalidQuoting => self.multipart_flag(name, |f| f.invalid_quoting),
            MultipartInvalidPart => self.multipart_flag(name, |f| f.invalid_part),
            MultipartInvalidHeaderFolding => {
                self.multipart_flag(name, |f| f.invalid_header_folding)
            }
            MultipartFileLimitExceeded => self.multipart_flag(name, |f| f.file_limit_exceeded),

            ResponseStatus if res.status != 0 => scalar(name, res.status.to_string()),
            ResponseStatus => Vec::new(),
            ResponseProtocol => scalar(name, res.protocol.as_str()),
            ResponseHeaders => members(name, &res.headers, selection),
            ResponseHeadersNames => names(name, &res.headers, selection),
            ResponseBody => match &self.response_body {
                Some(text) => scalar(name, text.as_str()),
                None => Vec::new(),
            },
            ResponseContentType => match res.content_type() {
                Some(ct) => scalar(name, ct),
                None => Vec::new(),
            },
            ResponseContentLength => match res.content_length() {
                Some(n) => scalar(name, n.to_string()),
                None => Vec::new(),
            },
            OutboundDataError => flag(name, self.outbound_data_error),
            StatusLine => scalar(name, res.status_line()),

            RemoteAddr => scalar(name, req.client_ip.as_str()),
            RemotePort => scalar(name, req.client_port.to_string()),
            ServerAddr => scalar(name, req.server_ip.as_str()),
            ServerPort => scalar(name, req.server_port.to_string()),
            ServerName => scalar(name, req.server_name()),

            Tx => members(name, &self.tx, selection),
            Env => {
                let env: Collection = std::env::vars().collect();
                members(name, &env, selection)
            }

            MatchedVar => match &self.matched_var {
                Some((_, value)) => scalar(name, value.as_str()),
                None => Vec::new(),
            },
            MatchedVarName => match &self.matched_var {
                Some((var, _)) => scalar(name, var.as_str()),
                None => Vec::new(),
            },
            MatchedVars => self
                .matched_vars
                .iter()
                .filter(|(k, _)| selection.map_or(true, |s| s.matches(k)))
                .map(|(k, v)| (format!("MATCHED_VARS:{}", k), v.clone()))
                .collect(),
            MatchedVarsNames => self
                .matched_vars
                .iter()
                .filter(|(k, _)| selection.map_or(true, |s| s.matches(k)))
                .map(|(k, _)| (format!("MATCHED_VARS_NAMES:{}", k), k.clone()))
                .collect(),

            UniqueId => scalar(name, self.unique_id.as_str()),
            Time => scalar(name, Local::now().format("%H:%M:%S").to_string()),
            TimeEpoch => scalar(name, Local::now().timestamp().to_string()),
            TimeYear => scalar(name, Local::now().year().to_string()),
            TimeMon => scalar(name, Local::now().month0().to_string()),
            TimeDay => scalar(name, Local::now().day().to_string()),
            TimeHour => scalar(name, Local::now().hour().to_string()),
            TimeMin => scalar(name, Local::now().minute().to_string()),
            TimeSec => scalar(name, Local::now().second().to_string()),
            TimeWday => {
                scalar(name, Local::now().weekday().num_days_from_sunday().to_string())
            }
            Duration => scalar(name, self.started.elapsed().as_micros().to_string()),
            HighestSeverity => {
                scalar(name, self.highest_severity.map_or(255, u16::from).to_string())
            }
            MscPcreLimitsExceeded => flag(name, self.limits_exceeded),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::body::{process_request_body, BodyProcessorKind};
    use crate::engine::config::CookieFormat;
    use crate::engine::Phase;
    use crate::variables::{Value, VariableStore};

    #[test]
    fn test_headers_and_names() {
        let mut s = VariableStore::new("t");
        s.request_mut().add_header("X-Forwarded-For", "1.2.3.4", CookieFormat::V0);
        s.request_mut().add_header("Cookie", "a=1; b=2", CookieFormat::V0);
        assert_eq!(s.get("REQUEST_HEADERS:x-forwarded-for"), Some(Value::from("1.2.3.4")));
        assert_eq!(
            s.get_collection("REQUEST_HEADERS_NAMES"),
            vec![
                ("REQUEST_HEADERS_NAMES:X-Forwarded-For".to_string(), "X-Forwarded-For".to_string()),
                ("REQUEST_HEADERS_NAMES:Cookie".to_string(), "Cookie".to_string()),
            ]
        );
        assert_eq!(s.get("&REQUEST_COOKIES"), Some(Value::Int(2)));
    }

    #[test]
    fn test_post_args_merge_into_args() {
        let mut s = VariableStore::new("t");
        s.request_mut().set_request_line("/?a=1", "POST", "HTTP/1.1", '&');
        let body = process_request_body(
            Some(BodyProcessorKind::UrlEncoded),
            "application/x-www-form-urlencoded",
            b"b=2&c=3",
            '&',
            10,
        );
        s.set_request_body(body, 7);
        s.set_phase(Phase::RequestBody);

        assert_eq!(s.get("&ARGS"), Some(Value::Int(3)));
        assert_eq!(s.get("ARGS_POST:c"), Some(Value::from("3")));
        assert_eq!(s.get("REQBODY_PROCESSOR"), Some(Value::from("URLENCODED")));
        assert_eq!(s.get("REQBODY_ERROR"), Some(Value::Int(0)));
        assert_eq!(s.get("REQUEST_BODY"), Some(Value::from("b=2&c=3")));
        assert_eq!(s.get("ARGS_COMBINED_SIZE"), Some(Value::Int(6)));
        assert_eq!(s.get("MULTIPART_STRICT_ERROR"), None);
    }

    #[test]
    fn test_highest_severity() {
        let mut s = VariableStore::new("t");
        assert_eq!(s.get("HIGHEST_SEVERITY"), Some(Value::Int(255)));
        s.note_severity(4);
        s.note_severity(2);
        s.note_severity(5);
        assert_eq!(s.get("HIGHEST_SEVERITY"), Some(Value::Int(2)));
    }
}
