//! Engine-wide configuration assembled from `Sec*` directives.

use crate::audit::{AuditConfig, AuditParts};
use crate::error::{Error, Result};
use crate::guard::MatchLimits;
use crate::parser::ConfigDirective;
use std::path::PathBuf;

/// Rule engine operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleEngineMode {
    /// Rules are evaluated and dispositions enforced.
    #[default]
    On,
    /// Rules are evaluated and recorded; the disposition stays `Pass`.
    DetectionOnly,
    /// No evaluation.
    Off,
}

impl RuleEngineMode {
    /// Parse `On`, `Off` or `DetectionOnly`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "on" => Some(Self::On),
            "off" => Some(Self::Off),
            "detectiononly" => Some(Self::DetectionOnly),
            _ => None,
        }
    }

    /// Directive spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "On",
            Self::DetectionOnly => "DetectionOnly",
            Self::Off => "Off",
        }
    }
}

/// What to do when a body exceeds its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyLimitAction {
    /// Deny the transaction.
    Reject,
    /// Inspect the part that fits and continue.
    ProcessPartial,
}

impl BodyLimitAction {
    /// Parse `Reject` or `ProcessPartial`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Some(Self::Reject),
            "processpartial" => Some(Self::ProcessPartial),
            _ => None,
        }
    }
}

/// Cookie header syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CookieFormat {
    /// Netscape cookies, `;` separated.
    #[default]
    V0,
    /// RFC 2109 cookies with quoted values and `$` attributes.
    V1,
}

/// Process-wide ceilings, read-only after initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// SecRequestBodyLimit
    pub request_body: u64,
    /// SecRequestBodyNoFilesLimit
    pub request_body_no_files: u64,
    /// SecRequestBodyInMemoryLimit
    pub request_body_in_memory: u64,
    /// SecResponseBodyLimit
    pub response_body: u64,
    /// SecUploadFileLimit
    pub upload_files: usize,
    /// SecPcreMatchLimit / SecPcreMatchLimitRecursion
    pub regex: MatchLimits,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            request_body: 13_107_200,
            request_body_no_files: 131_072,
            request_body_in_memory: 131_072,
            response_body: 524_288,
            upload_files: 100,
            regex: MatchLimits::default(),
        }
    }
}

/// The immutable engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// SecRuleEngine
    pub rule_engine: RuleEngineMode,
    /// SecRequestBodyAccess
    pub request_body_access: bool,
    /// SecRequestBodyLimitAction
    pub request_body_limit_action: BodyLimitAction,
    /// SecResponseBodyAccess
    pub response_body_access: bool,
    /// SecResponseBodyLimitAction
    pub response_body_limit_action: BodyLimitAction,
    /// SecResponseBodyMimeType, lower-cased.
    pub response_body_mime_types: Vec<String>,
    /// SecArgumentSeparator
    pub argument_separator: char,
    /// SecCookieFormat
    pub cookie_format: CookieFormat,
    /// SecTmpDir
    pub tmp_dir: Option<PathBuf>,
    /// SecDataDir
    pub data_dir: Option<PathBuf>,
    /// SecDebugLog
    pub debug_log: Option<PathBuf>,
    /// SecDebugLogLevel
    pub debug_log_level: u8,
    /// Audit Logger settings.
    pub audit: AuditConfig,
    /// Ceilings.
    pub limits: Limits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rule_engine: RuleEngineMode::On,
            request_body_access: false,
            request_body_limit_action: BodyLimitAction::Reject,
            response_body_access: false,
            response_body_limit_action: BodyLimitAction::ProcessPartial,
            response_body_mime_types: vec!["text/plain".to_string(), "text/html".to_string()],
            argument_separator: '&',
            cookie_format: CookieFormat::V0,
            tmp_dir: None,
            data_dir: None,
            debug_log: None,
            debug_log_level: 0,
            audit: AuditConfig::default(),
            limits: Limits::default(),
        }
    }
}

impl EngineConfig {
    /// Apply one setting directive.
    pub fn apply(&mut self, directive: &ConfigDirective) -> Result<()> {
        match directive {
            ConfigDirective::RuleEngine(mode) => self.rule_engine = *mode,
            ConfigDirective::RequestBodyAccess(on) => self.request_body_access = *on,
            ConfigDirective::RequestBodyLimit(n) => self.limits.request_body = *n,
            ConfigDirective::RequestBodyNoFilesLimit(n) => self.limits.request_body_no_files = *n,
            ConfigDirective::RequestBodyInMemoryLimit(n) => {
                self.limits.request_body_in_memory = *n
            }
            ConfigDirective::RequestBodyLimitAction(a) => self.request_body_limit_action = *a,
            ConfigDirective::ResponseBodyAccess(on) => self.response_body_access = *on,
            ConfigDirective::ResponseBodyLimit(n) => self.limits.response_body = *n,
            ConfigDirective::ResponseBodyLimitAction(a) => self.response_body_limit_action = *a,
            ConfigDirective::ResponseBodyMimeType(types) => {
                self.response_body_mime_types = types.clone()
            }
            ConfigDirective::ArgumentSeparator(sep) => {
                let mut chars = sep.chars();
                self.argument_separator = match (chars.next(), chars.next()) {
                    (Some(c), None) => c,
                    _ => {
                        return Err(Error::config(format!(
                            "SecArgumentSeparator must be a single character, got '{}'",
                            sep
                        )))
                    }
                };
            }
            ConfigDirective::CookieFormat(v) => {
                self.cookie_format = match v {
                    0 => CookieFormat::V0,
                    1 => CookieFormat::V1,
                    other => {
                        return Err(Error::config(format!(
                            "SecCookieFormat must be 0 or 1, got {}",
                            other
                        )))
                    }
                };
            }
            ConfigDirective::TmpDir(p) => self.tmp_dir = Some(p.clone()),
            ConfigDirective::DataDir(p) => self.data_dir = Some(p.clone()),
            ConfigDirective::UploadFileLimit(n) => {
                self.limits.upload_files = usize::try_from(*n).unwrap_or(usize::MAX)
            }
            ConfigDirective::DebugLog(p) => self.debug_log = Some(p.clone()),
            ConfigDirective::DebugLogLevel(level) => {
                if *level > 9 {
                    return Err(Error::config(format!(
                        "SecDebugLogLevel must be between 0 and 9, got {}",
                        level
                    )));
                }
                self.debug_log_level = *level;
            }
            ConfigDirective::AuditEngine(mode) => self.audit.engine = *mode,
            ConfigDirective::AuditLogRelevantStatus(pattern) => {
                let regex = fancy_regex::Regex::new(pattern).map_err(|e| Error::RegexCompile {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
                self.audit.relevant_status = Some(regex);
            }
            ConfigDirective::AuditLogParts(codes) => self.audit.parts = AuditParts::parse(codes)?,
            ConfigDirective::AuditLogType(t) => self.audit.log_type = *t,
            ConfigDirective::AuditLog(p) => self.audit.log_path = Some(p.clone()),
            ConfigDirective::AuditLogStorageDir(p) => self.audit.storage_dir = Some(p.clone()),
            ConfigDirective::AuditLogFormat(f) => self.audit.format = *f,
            ConfigDirective::PcreMatchLimit(n) => {
                self.limits.regex.match_limit = usize::try_from(*n).unwrap_or(usize::MAX)
            }
            ConfigDirective::PcreMatchLimitRecursion(n) => {
                self.limits.regex.recursion_limit = usize::try_from(*n).unwrap_or(usize::MAX)
            }
        }
        Ok(())
    }

    /// Check cross-field consistency once every directive is applied.
    pub fn validate(&self) -> Result<()> {
        let limits = &self.limits;
        for (name, value) in [
            ("SecRequestBodyLimit", limits.request_body),
            ("SecRequestBodyNoFilesLimit", limits.request_body_no_files),
            ("SecRequestBodyInMemoryLimit", limits.request_body_in_memory),
            ("SecResponseBodyLimit", limits.response_body),
            ("SecPcreMatchLimit", limits.regex.match_limit as u64),
            ("SecPcreMatchLimitRecursion", limits.regex.recursion_limit as u64),
        ] {
            if value == 0 {
                return Err(Error::config(format!("{} must be greater than zero", name)));
            }
        }

        if limits.request_body_no_files > limits.request_body {
            return Err(Error::config(format!(
                "SecRequestBodyNoFilesLimit ({}) exceeds SecRequestBodyLimit ({})",
                limits.request_body_no_files, limits.request_body
            )));
        }

        self.audit.validate()
    }

    /// Whether a response with `content_type` is inspected at phase 4.
    pub fn inspects_response_type(&self, content_type: &str) -> bool {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        self.response_body_mime_types.iter().any(|t| *t == mime)
    }
}
