//! Directive types for the configuration language.

use super::{Action, FlowAction, MetadataAction, OperatorSpec, VariableSpec};
use crate::audit::{AuditEngineMode, AuditLogFormat, AuditLogType};
use crate::engine::config::{BodyLimitAction, RuleEngineMode};
use crate::engine::Phase;
use crate::error::SourceLocation;
use std::path::PathBuf;

/// A parsed directive.
#[derive(Debug, Clone)]
pub enum Directive {
    /// SecRule - the main rule type.
    SecRule(SecRule),
    /// SecAction - unconditional rule.
    SecAction(SecAction),
    /// SecMarker - named position for skipAfter.
    SecMarker(SecMarker),
    /// SecDefaultAction - per-phase action template.
    SecDefaultAction(SecDefaultAction),
    /// SecRuleRemoveById - remove rules by id or id range.
    SecRuleRemoveById(Vec<RuleIdRange>),
    /// Engine setting.
    Config(ConfigDirective),
    /// Include - already expanded in place; kept for dumps.
    Include(PathBuf),
    /// Unknown directive (logged and skipped).
    Unknown(String),
}

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigDirective {
    /// SecRuleEngine
    RuleEngine(RuleEngineMode),
    /// SecRequestBodyAccess
    RequestBodyAccess(bool),
    /// SecRequestBodyLimit
    RequestBodyLimit(u64),
    /// SecRequestBodyNoFilesLimit
    RequestBodyNoFilesLimit(u64),
    /// SecRequestBodyInMemoryLimit
    RequestBodyInMemoryLimit(u64),
    /// SecRequestBodyLimitAction
    RequestBodyLimitAction(BodyLimitAction),
    /// SecResponseBodyAccess
    ResponseBodyAccess(bool),
    /// SecResponseBodyLimit
    ResponseBodyLimit(u64),
    /// SecResponseBodyLimitAction
    ResponseBodyLimitAction(BodyLimitAction),
    /// SecResponseBodyMimeType
    ResponseBodyMimeType(Vec<String>),
    /// SecArgumentSeparator
    ArgumentSeparator(String),
    /// SecCookieFormat
    CookieFormat(u8),
    /// SecTmpDir
    TmpDir(PathBuf),
    /// SecDataDir
    DataDir(PathBuf),
    /// SecUploadFileLimit
    UploadFileLimit(u64),
    /// SecDebugLog
    DebugLog(PathBuf),
    /// SecDebugLogLevel
    DebugLogLevel(u8),
    /// SecAuditEngine
    AuditEngine(AuditEngineMode),
    /// SecAuditLogRelevantStatus
    AuditLogRelevantStatus(String),
    /// SecAuditLogParts
    AuditLogParts(String),
    /// SecAuditLogType
    AuditLogType(AuditLogType),
    /// SecAuditLog
    AuditLog(PathBuf),
    /// SecAuditLogStorageDir
    AuditLogStorageDir(PathBuf),
    /// SecAuditLogFormat
    AuditLogFormat(AuditLogFormat),
    /// SecPcreMatchLimit
    PcreMatchLimit(u64),
    /// SecPcreMatchLimitRecursion
    PcreMatchLimitRecursion(u64),
}

/// A SecRule directive.
#[derive(Debug, Clone)]
pub struct SecRule {
    /// Variables to inspect.
    pub variables: Vec<VariableSpec>,
    /// Operator to apply.
    pub operator: OperatorSpec,
    /// Actions to execute on match.
    pub actions: Vec<Action>,
    /// Source location for error reporting.
    pub location: SourceLocation,
}

/// A SecAction directive.
#[derive(Debug, Clone)]
pub struct SecAction {
    /// Actions to execute.
    pub actions: Vec<Action>,
    /// Source location for error reporting.
    pub location: SourceLocation,
}

/// A SecMarker directive.
#[derive(Debug, Clone)]
pub struct SecMarker {
    /// Marker name.
    pub name: String,
}

/// A SecDefaultAction directive.
#[derive(Debug, Clone)]
pub struct SecDefaultAction {
    /// Phase the template applies to.
    pub phase: Phase,
    /// Template actions (phase action included).
    pub actions: Vec<Action>,
    /// Source location for error reporting.
    pub location: SourceLocation,
}

/// Inclusive id range for SecRuleRemoveById.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleIdRange {
    /// First id.
    pub start: u64,
    /// Last id.
    pub end: u64,
}

impl RuleIdRange {
    /// Whether `id` is in the range.
    pub fn contains(&self, id: u64) -> bool {
        (self.start..=self.end).contains(&id)
    }
}

/// Rule id lookup shared by SecRule and SecAction.
fn find_id(actions: &[Action]) -> Option<u64> {
    actions.iter().find_map(|a| match a {
        Action::Metadata(MetadataAction::Id(id)) => Some(*id),
        _ => None,
    })
}

fn find_phase(actions: &[Action]) -> Option<Phase> {
    actions.iter().find_map(|a| match a {
        Action::Metadata(MetadataAction::Phase(p)) => Some(*p),
        _ => None,
    })
}

impl SecRule {
    /// Check if this rule has the chain action.
    pub fn is_chained(&self) -> bool {
        self.actions
            .iter()
            .any(|a| matches!(a, Action::Flow(FlowAction::Chain)))
    }

    /// Get the rule ID if present.
    pub fn id(&self) -> Option<u64> {
        find_id(&self.actions)
    }

    /// Explicit phase, if declared.
    pub fn phase(&self) -> Option<Phase> {
        find_phase(&self.actions)
    }
}

impl SecAction {
    /// Get the rule ID if present.
    pub fn id(&self) -> Option<u64> {
        find_id(&self.actions)
    }

    /// Explicit phase, if declared.
    pub fn phase(&self) -> Option<Phase> {
        find_phase(&self.actions)
    }

    /// Check if this action list has the chain action.
    pub fn is_chained(&self) -> bool {
        self.actions
            .iter()
            .any(|a| matches!(a, Action::Flow(FlowAction::Chain)))
    }
}
