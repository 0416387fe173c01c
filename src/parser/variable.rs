//! Variable selector parsing for SecRule.
//!
//! Selectors are `|`-separated. Each one is a variable name with an optional
//! `&` (count) prefix, `!` (exclusion) prefix and `:key` / `:/regex/` /
//! `:prefix*` selection.

use crate::engine::Phase;
use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;

/// A variable specification in a SecRule.
#[derive(Debug, Clone)]
pub struct VariableSpec {
    /// The variable name.
    pub name: VariableName,
    /// Optional selection (e.g., ARGS:foo or ARGS:/^user/).
    pub selection: Option<Selection>,
    /// Count mode (& prefix).
    pub count_mode: bool,
    /// Exclusions (e.g., !ARGS:foo) applying to this selector.
    pub exclusions: Vec<Exclusion>,
}

/// An excluded member of a collection.
#[derive(Debug, Clone)]
pub struct Exclusion {
    /// Collection the exclusion applies to.
    pub name: VariableName,
    /// Which keys are excluded. `None` excludes the whole collection.
    pub selection: Option<Selection>,
}

/// Selection mode for collection variables.
#[derive(Debug, Clone)]
pub enum Selection {
    /// Static key selection (ARGS:foo), compared case-insensitively.
    Key(String),
    /// Regex key selection (ARGS:/^user/), always case-insensitive.
    Regex(Regex),
    /// Wildcard prefix selection (ARGS:user*).
    Prefix(String),
}

impl Selection {
    /// Whether a collection key is selected.
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Selection::Key(k) => k.eq_ignore_ascii_case(key),
            Selection::Regex(re) => re.is_match(key),
            Selection::Prefix(p) => {
                key.len() >= p.len() && key.as_bytes()[..p.len()].eq_ignore_ascii_case(p.as_bytes())
            }
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Key(k) => write!(f, "{}", k),
            // Stored with a leading (?i) that the user did not write.
            Selection::Regex(re) => write!(f, "/{}/", re.as_str().trim_start_matches("(?i)")),
            Selection::Prefix(p) => write!(f, "{}*", p),
        }
    }
}

impl fmt::Display for VariableSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count_mode {
            write!(f, "&")?;
        }
        write!(f, "{}", self.name.as_str())?;
        if let Some(sel) = &self.selection {
            write!(f, ":{}", sel)?;
        }
        Ok(())
    }
}

macro_rules! variable_names {
    ($($(#[$doc:meta])* $variant:ident => $text:literal,)*) => {
        /// Variable names understood by the engine.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum VariableName {
            $($(#[$doc])* $variant,)*
        }

        impl VariableName {
            /// Parse a variable name (case-insensitive).
            pub fn parse(s: &str) -> Option<Self> {
                let upper = s.to_ascii_uppercase();
                match upper.as_str() {
                    $($text => Some(Self::$variant),)*
                    _ => None,
                }
            }

            /// Canonical upper-case name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)*
                }
            }
        }
    };
}

variable_names! {
    /// All arguments (query string and body).
    Args => "ARGS",
    /// Query string arguments.
    ArgsGet => "ARGS_GET",
    /// Body arguments.
    ArgsPost => "ARGS_POST",
    /// All argument names.
    ArgsNames => "ARGS_NAMES",
    /// Query string argument names.
    ArgsGetNames => "ARGS_GET_NAMES",
    /// Body argument names.
    ArgsPostNames => "ARGS_POST_NAMES",
    /// Combined size of argument names and values.
    ArgsCombinedSize => "ARGS_COMBINED_SIZE",
    /// Raw query string.
    QueryString => "QUERY_STRING",
    /// Request URI (path and query).
    RequestUri => "REQUEST_URI",
    /// Request URI as received.
    RequestUriRaw => "REQUEST_URI_RAW",
    /// Request path.
    RequestFilename => "REQUEST_FILENAME",
    /// Last path segment.
    RequestBasename => "REQUEST_BASENAME",
    /// Full request line.
    RequestLine => "REQUEST_LINE",
    /// HTTP method.
    RequestMethod => "REQUEST_METHOD",
    /// HTTP protocol.
    RequestProtocol => "REQUEST_PROTOCOL",
    /// Request headers.
    RequestHeaders => "REQUEST_HEADERS",
    /// Request header names.
    RequestHeadersNames => "REQUEST_HEADERS_NAMES",
    /// Request cookies.
    RequestCookies => "REQUEST_COOKIES",
    /// Request cookie names.
    RequestCookiesNames => "REQUEST_COOKIES_NAMES",
    /// Buffered request body.
    RequestBody => "REQUEST_BODY",
    /// Request body length in bytes.
    RequestBodyLength => "REQUEST_BODY_LENGTH",
    /// Name of the body processor in use.
    ReqbodyProcessor => "REQBODY_PROCESSOR",
    /// 1 when the body processor failed.
    ReqbodyError => "REQBODY_ERROR",
    /// Body processor failure message.
    ReqbodyErrorMsg => "REQBODY_ERROR_MSG",
    /// Alias of REQBODY_ERROR.
    ReqbodyProcessorError => "REQBODY_PROCESSOR_ERROR",
    /// Alias of REQBODY_ERROR_MSG.
    ReqbodyProcessorErrorMsg => "REQBODY_PROCESSOR_ERROR_MSG",
    /// 1 when the request body exceeded its limit.
    InboundDataError => "INBOUND_DATA_ERROR",
    /// Uploaded file names as sent by the client.
    Files => "FILES",
    /// Form field names of file parts.
    FilesNames => "FILES_NAMES",
    /// Uploaded file sizes.
    FilesSizes => "FILES_SIZES",
    /// Combined size of uploaded files.
    FilesCombinedSize => "FILES_COMBINED_SIZE",
    /// Form field names of all multipart parts.
    MultipartName => "MULTIPART_NAME",
    /// File names of all multipart parts.
    MultipartFilename => "MULTIPART_FILENAME",
    /// OR of every multipart anomaly flag.
    MultipartStrictError => "MULTIPART_STRICT_ERROR",
    /// A boundary-like line did not match the boundary.
    MultipartUnmatchedBoundary => "MULTIPART_UNMATCHED_BOUNDARY",
    /// The boundary parameter was quoted.
    MultipartBoundaryQuoted => "MULTIPART_BOUNDARY_QUOTED",
    /// The boundary parameter contained whitespace.
    MultipartBoundaryWhitespace => "MULTIPART_BOUNDARY_WHITESPACE",
    /// Data before the first boundary.
    MultipartDataBefore => "MULTIPART_DATA_BEFORE",
    /// Data after the final boundary.
    MultipartDataAfter => "MULTIPART_DATA_AFTER",
    /// A part header was folded.
    MultipartHeaderFolding => "MULTIPART_HEADER_FOLDING",
    /// Lines terminated by a bare LF.
    MultipartLfLine => "MULTIPART_LF_LINE",
    /// Mixed CRLF and LF line endings.
    MultipartCrlfLfLines => "MULTIPART_CRLF_LF_LINES",
    /// Content-Disposition parameters lacked a semicolon.
    MultipartMissingSemicolon => "MULTIPART_MISSING_SEMICOLON",
    /// Invalid quoting in Content-Disposition.
    MultipartInvalidQuoting => "MULTIPART_INVALID_QUOTING",
    /// A part was malformed.
    MultipartInvalidPart => "MULTIPART_INVALID_PART",
    /// Folding with invalid continuation.
    MultipartInvalidHeaderFolding => "MULTIPART_INVALID_HEADER_FOLDING",
    /// More files than SecUploadFileLimit.
    MultipartFileLimitExceeded => "MULTIPART_FILE_LIMIT_EXCEEDED",
    /// Response status code.
    ResponseStatus => "RESPONSE_STATUS",
    /// Response protocol.
    ResponseProtocol => "RESPONSE_PROTOCOL",
    /// Response headers.
    ResponseHeaders => "RESPONSE_HEADERS",
    /// Response header names.
    ResponseHeadersNames => "RESPONSE_HEADERS_NAMES",
    /// Buffered response body.
    ResponseBody => "RESPONSE_BODY",
    /// Response Content-Type.
    ResponseContentType => "RESPONSE_CONTENT_TYPE",
    /// Response Content-Length.
    ResponseContentLength => "RESPONSE_CONTENT_LENGTH",
    /// 1 when the response body exceeded its limit.
    OutboundDataError => "OUTBOUND_DATA_ERROR",
    /// Response status line.
    StatusLine => "STATUS_LINE",
    /// Client address.
    RemoteAddr => "REMOTE_ADDR",
    /// Client port.
    RemotePort => "REMOTE_PORT",
    /// Server address.
    ServerAddr => "SERVER_ADDR",
    /// Server port.
    ServerPort => "SERVER_PORT",
    /// Server name (Host header).
    ServerName => "SERVER_NAME",
    /// Transaction collection (writable).
    Tx => "TX",
    /// Process environment.
    Env => "ENV",
    /// Value of the last match.
    MatchedVar => "MATCHED_VAR",
    /// Name of the last matched variable.
    MatchedVarName => "MATCHED_VAR_NAME",
    /// Values matched by the current rule.
    MatchedVars => "MATCHED_VARS",
    /// Names matched by the current rule.
    MatchedVarsNames => "MATCHED_VARS_NAMES",
    /// Transaction unique id.
    UniqueId => "UNIQUE_ID",
    /// Current time (HH:MM:SS).
    Time => "TIME",
    /// Seconds since the epoch.
    TimeEpoch => "TIME_EPOCH",
    /// Four-digit year.
    TimeYear => "TIME_YEAR",
    /// Month (0-11).
    TimeMon => "TIME_MON",
    /// Day of month.
    TimeDay => "TIME_DAY",
    /// Hour.
    TimeHour => "TIME_HOUR",
    /// Minute.
    TimeMin => "TIME_MIN",
    /// Second.
    TimeSec => "TIME_SEC",
    /// Day of week (0 = Sunday).
    TimeWday => "TIME_WDAY",
    /// Microseconds since the transaction started.
    Duration => "DURATION",
    /// Highest severity seen so far (lower is more severe).
    HighestSeverity => "HIGHEST_SEVERITY",
    /// 1 when a regex hit the match or recursion ceiling.
    MscPcreLimitsExceeded => "MSC_PCRE_LIMITS_EXCEEDED",
}

impl VariableName {
    /// First phase in which this variable carries data.
    pub fn available_from(&self) -> Phase {
        use VariableName::*;
        match self {
            ArgsPost | ArgsPostNames | RequestBody | RequestBodyLength | ReqbodyProcessor
            | ReqbodyError | ReqbodyErrorMsg | ReqbodyProcessorError
            | ReqbodyProcessorErrorMsg | InboundDataError | Files | FilesNames | FilesSizes
            | FilesCombinedSize | MultipartName | MultipartFilename | MultipartStrictError
            | MultipartUnmatchedBoundary | MultipartBoundaryQuoted
            | MultipartBoundaryWhitespace | MultipartDataBefore | MultipartDataAfter
            | MultipartHeaderFolding | MultipartLfLine | MultipartCrlfLfLines
            | MultipartMissingSemicolon | MultipartInvalidQuoting | MultipartInvalidPart
            | MultipartInvalidHeaderFolding | MultipartFileLimitExceeded => Phase::RequestBody,
            ResponseStatus | ResponseProtocol | ResponseHeaders | ResponseHeadersNames
            | ResponseContentType | ResponseContentLength | StatusLine => Phase::ResponseHeaders,
            ResponseBody | OutboundDataError => Phase::ResponseBody,
            _ => Phase::RequestHeaders,
        }
    }

    /// Whether the variable is a keyed collection.
    pub fn is_collection(&self) -> bool {
        use VariableName::*;
        matches!(
            self,
            Args | ArgsGet
                | ArgsPost
                | ArgsNames
                | ArgsGetNames
                | ArgsPostNames
                | RequestHeaders
                | RequestHeadersNames
                | RequestCookies
                | RequestCookiesNames
                | ResponseHeaders
                | ResponseHeadersNames
                | Files
                | FilesNames
                | FilesSizes
                | MultipartName
                | MultipartFilename
                | Tx
                | Env
                | MatchedVars
                | MatchedVarsNames
        )
    }

    /// Whether the value can change between two reads in the same phase.
    ///
    /// Volatile variables bypass the per-transaction memo.
    pub fn is_volatile(&self) -> bool {
        use VariableName::*;
        matches!(
            self,
            Tx | MatchedVar
                | MatchedVarName
                | MatchedVars
                | MatchedVarsNames
                | MscPcreLimitsExceeded
                | HighestSeverity
                | Duration
                | Time
                | TimeEpoch
                | TimeYear
                | TimeMon
                | TimeDay
                | TimeHour
                | TimeMin
                | TimeSec
                | TimeWday
        )
    }
}

/// Parse a `|`-separated selector list.
///
/// Exclusions (`!VAR:key`) apply to every selector in the list.
pub fn parse_variables(input: &str) -> Result<Vec<VariableSpec>> {
    let mut variables = Vec::new();
    let mut exclusions = Vec::new();

    for part in split_selectors(input) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some(excluded) = part.strip_prefix('!') {
            let spec = parse_single_variable(excluded)?;
            exclusions.push(Exclusion {
                name: spec.name,
                selection: spec.selection,
            });
            continue;
        }

        variables.push(parse_single_variable(part)?);
    }

    if variables.is_empty() {
        return Err(Error::parse(
            format!("no variables in selector '{}'", input),
            String::new(),
        ));
    }

    for var in &mut variables {
        var.exclusions = exclusions
            .iter()
            .filter(|e| e.name == var.name)
            .cloned()
            .collect();
    }

    Ok(variables)
}

/// Parse a single selector such as `ARGS:id`, `&TX:score` or `REQUEST_HEADERS:/^x-/`.
pub fn parse_single_variable(input: &str) -> Result<VariableSpec> {
    let input = input.trim();

    let (count_mode, input) = match input.strip_prefix('&') {
        Some(rest) => (true, rest),
        None => (false, input),
    };

    let (name_str, selection) = match input.split_once(':') {
        Some((name, sel)) => (name, Some(parse_selection(sel)?)),
        None => (input, None),
    };

    let name = VariableName::parse(name_str).ok_or_else(|| Error::UnknownVariable {
        name: name_str.to_string(),
    })?;

    Ok(VariableSpec {
        name,
        selection,
        count_mode,
        exclusions: Vec::new(),
    })
}

fn parse_selection(sel: &str) -> Result<Selection> {
    let sel = sel.trim_matches('\'');
    if sel.len() >= 2 && sel.starts_with('/') && sel.ends_with('/') {
        let pattern = &sel[1..sel.len() - 1];
        let re = Regex::new(&format!("(?i){}", pattern)).map_err(|e| Error::RegexCompile {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        return Ok(Selection::Regex(re));
    }
    if let Some(prefix) = sel.strip_suffix('*') {
        return Ok(Selection::Prefix(prefix.to_string()));
    }
    Ok(Selection::Key(sel.to_string()))
}

/// Split on `|` except inside `:/regex/` selections.
fn split_selectors(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_regex = false;
    let mut prev = '\0';
    let mut escaped = false;

    for (i, c) in input.char_indices() {
        if in_regex {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '/' {
                in_regex = false;
            }
        } else if c == '/' && prev == ':' {
            in_regex = true;
        } else if c == '|' {
            parts.push(&input[start..i]);
            start = i + 1;
        }
        prev = c;
    }
    parts.push(&input[start..]);
    parts
}
