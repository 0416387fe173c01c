//! `ctl:` actions. They change settings for the current transaction only.

use crate::audit::AuditEngineMode;
use crate::body::BodyProcessorKind;
use crate::engine::config::RuleEngineMode;
use crate::parser::ControlAction;

/// Per-transaction overrides of engine settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxOverrides {
    /// ctl:ruleEngine
    pub rule_engine: Option<RuleEngineMode>,
    /// ctl:auditEngine
    pub audit_engine: Option<AuditEngineMode>,
    /// ctl:requestBodyAccess
    pub request_body_access: Option<bool>,
    /// ctl:requestBodyProcessor
    pub request_body_processor: Option<BodyProcessorKind>,
    /// ctl:ruleRemoveById
    pub removed_rules: Vec<u64>,
}

impl TxOverrides {
    /// Apply one ctl action.
    pub fn apply(&mut self, ctl: &ControlAction) {
        tracing::debug!(?ctl, "applying ctl action");
        match ctl {
            ControlAction::RuleEngine(mode) => self.rule_engine = Some(*mode),
            ControlAction::AuditEngine(mode) => self.audit_engine = Some(*mode),
            ControlAction::RequestBodyAccess(on) => self.request_body_access = Some(*on),
            ControlAction::RequestBodyProcessor(kind) => {
                self.request_body_processor = Some(*kind)
            }
            ControlAction::RuleRemoveById(id) => {
                if !self.removed_rules.contains(id) {
                    self.removed_rules.push(*id);
                }
            }
        }
    }

    /// Whether rule `id` was removed for this transaction.
    pub fn is_removed(&self, id: Option<u64>) -> bool {
        id.is_some_and(|id| self.removed_rules.contains(&id))
    }
}
