//! Match records produced by rule evaluation.

use super::intervention::Disposition;
use super::phase::Phase;
use crate::actions::Severity;
use serde::Serialize;

/// A rule that matched during the transaction. Immutable once recorded.
#[derive(Debug, Clone, Serialize)]
pub struct MatchedRule {
    /// Rule id.
    pub id: u64,
    /// Phase the rule ran in.
    pub phase: Phase,
    /// Name of the variable that matched (`ARGS:id`).
    pub var_name: String,
    /// Value that matched, after transformations.
    pub var_value: String,
    /// Rendered `msg`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Rendered `logdata`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logdata: Option<String>,
    /// Severity, 0 (emergency) to 7 (debug).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<u8>,
    /// Tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Rule revision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// Rule version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ver: Option<String>,
    /// Maturity level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maturity: Option<u8>,
    /// Accuracy level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<u8>,
    /// Whether the match is written to the debug/error log.
    pub log: bool,
    /// Whether the match makes the transaction relevant for auditing.
    pub audit_log: bool,
}

impl MatchedRule {
    /// One-line summary in the `[key "value"]` style.
    pub fn format_log(&self) -> String {
        let mut parts = vec![format!("[id \"{}\"]", self.id)];

        if let Some(ref msg) = self.message {
            parts.push(format!("[msg \"{}\"]", msg));
        }
        if let Some(ref data) = self.logdata {
            parts.push(format!("[data \"{}\"]", data));
        }
        if let Some(sev) = self.severity {
            parts.push(format!("[severity \"{}\"]", Severity::from(sev).name()));
        }
        for tag in &self.tags {
            parts.push(format!("[tag \"{}\"]", tag));
        }
        if let Some(ref rev) = self.rev {
            parts.push(format!("[rev \"{}\"]", rev));
        }
        if let Some(ref ver) = self.ver {
            parts.push(format!("[ver \"{}\"]", ver));
        }
        parts.push(format!("[var \"{}\"]", self.var_name));

        parts.join(" ")
    }
}

/// What a rule tells the phase loop to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// Go on with the next rule.
    Continue,
    /// Skip the next `n` rules.
    Skip(u32),
    /// Continue after the named marker.
    SkipAfter(String),
    /// Stop evaluating this phase with the given disposition.
    StopPhase(Disposition),
}
