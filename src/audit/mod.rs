//! Audit Logger.
//!
//! At the end of a transaction the logger decides whether a record is due,
//! builds it with the configured parts and hands it to the configured sink.
//! Sink failures never reach the transaction: they are counted and reported
//! on the `zentinel_waf::audit` tracing target.

mod parts;
mod record;
mod sink;

pub use parts::{AuditPart, AuditParts};
pub use record::{
    AuditInput, AuditRecord, FileEntry, HeaderSection, RequestSection, ResponseSection,
    TrailerSection,
};
pub use sink::{AuditSink, ConcurrentSink, SerialSink};

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// SecAuditEngine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditEngineMode {
    /// Never log.
    #[default]
    Off,
    /// Log every transaction.
    On,
    /// Log transactions with a relevant status or an `auditlog` match.
    RelevantOnly,
}

impl AuditEngineMode {
    /// Parse `On`, `Off` or `RelevantOnly`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "on" => Some(Self::On),
            "off" => Some(Self::Off),
            "relevantonly" => Some(Self::RelevantOnly),
            _ => None,
        }
    }
}

/// SecAuditLogType
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditLogType {
    /// Shared append log.
    #[default]
    Serial,
    /// File per transaction.
    Concurrent,
}

impl AuditLogType {
    /// Parse `Serial` or `Concurrent`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "serial" => Some(Self::Serial),
            "concurrent" => Some(Self::Concurrent),
            _ => None,
        }
    }
}

/// SecAuditLogFormat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditLogFormat {
    /// Boundary-delimited sections.
    #[default]
    Native,
    /// One JSON object per record.
    Json,
}

impl AuditLogFormat {
    /// Parse `Native` or `JSON`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Some(Self::Native),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Audit settings.
#[derive(Debug, Clone, Default)]
pub struct AuditConfig {
    /// SecAuditEngine
    pub engine: AuditEngineMode,
    /// SecAuditLogRelevantStatus
    pub relevant_status: Option<fancy_regex::Regex>,
    /// SecAuditLogParts
    pub parts: AuditParts,
    /// SecAuditLogType
    pub log_type: AuditLogType,
    /// SecAuditLog
    pub log_path: Option<PathBuf>,
    /// SecAuditLogStorageDir
    pub storage_dir: Option<PathBuf>,
    /// SecAuditLogFormat
    pub format: AuditLogFormat,
}

impl AuditConfig {
    /// Reject settings that cannot work together.
    pub fn validate(&self) -> Result<()> {
        if self.log_type == AuditLogType::Concurrent && self.storage_dir.is_none() {
            return Err(Error::config(
                "SecAuditLogType Concurrent requires SecAuditLogStorageDir",
            ));
        }
        Ok(())
    }
}

/// Decides on and writes audit records. Shared by every transaction.
pub struct AuditLogger {
    config: AuditConfig,
    sink: Option<Box<dyn AuditSink>>,
    errors: AtomicU64,
}

impl AuditLogger {
    /// Build the sink selected by `config`.
    pub fn new(config: AuditConfig) -> Self {
        let sink: Option<Box<dyn AuditSink>> = match config.log_type {
            AuditLogType::Serial => config
                .log_path
                .clone()
                .map(|p| Box::new(SerialSink::new(p)) as Box<dyn AuditSink>),
            AuditLogType::Concurrent => config.storage_dir.clone().map(|dir| {
                Box::new(ConcurrentSink::new(dir, config.log_path.clone())) as Box<dyn AuditSink>
            }),
        };
        Self::with_sink(config, sink)
    }

    /// Use a custom sink.
    pub fn with_sink(config: AuditConfig, sink: Option<Box<dyn AuditSink>>) -> Self {
        Self {
            config,
            sink,
            errors: AtomicU64::new(0),
        }
    }

    /// Audit settings.
    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Whether a transaction ending with `status` is recorded.
    ///
    /// `relevant` is set when a rule marked `auditlog` matched.
    pub fn should_log(&self, mode: AuditEngineMode, status: u16, relevant: bool) -> bool {
        match mode {
            AuditEngineMode::Off => false,
            AuditEngineMode::On => true,
            AuditEngineMode::RelevantOnly => relevant || self.status_is_relevant(status),
        }
    }

    fn status_is_relevant(&self, status: u16) -> bool {
        let Some(pattern) = &self.config.relevant_status else {
            return false;
        };
        pattern.is_match(&status.to_string()).unwrap_or_else(|e| {
            tracing::warn!(target: "zentinel_waf::audit", error = %e, "relevant status match failed");
            false
        })
    }

    /// Render and persist `record`. Failures are counted, never returned.
    pub fn write(&self, record: &AuditRecord) {
        let Some(sink) = &self.sink else {
            tracing::debug!(
                target: "zentinel_waf::audit",
                tx_id = %record.transaction.unique_id,
                "no audit log destination configured"
            );
            return;
        };

        let rendered = record.render(self.config.format);
        if let Err(e) = sink.write(record, &rendered) {
            let total = self.errors.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::error!(
                target: "zentinel_waf::audit",
                tx_id = %record.transaction.unique_id,
                error = %e,
                failures = total,
                "failed to write audit record"
            );
        }
    }

    /// Number of records that could not be written.
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("engine", &self.config.engine)
            .field("parts", &self.config.parts.to_string())
            .field("has_sink", &self.sink.is_some())
            .field("errors", &self.error_count())
            .finish()
    }
}
