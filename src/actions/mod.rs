//! Rule actions.
//!
//! A rule's action list is sorted once at load time into a [`RuleActions`]
//! value. Phase defaults from `SecDefaultAction` are merged in with
//! [`RuleActions::inherit`]. At match time the engine runs the data actions
//! of every matching link and the disruptive action of the chain head.

mod control;
mod data;
mod disruptive;
mod flow;
mod metadata;

pub use control::TxOverrides;
pub use data::apply_setvar;
pub use disruptive::{resolve, BlockTarget, DEFAULT_DENY_STATUS, DEFAULT_REDIRECT_STATUS};
pub use flow::Flow;
pub use metadata::{RuleMetadata, Severity};

use crate::parser::{
    Action, ControlAction, DataAction, DisruptiveAction, LoggingAction, SetVarSpec,
};

/// The actions of one rule, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleActions {
    /// id, msg, severity and friends.
    pub meta: RuleMetadata,
    /// deny, block, pass, allow, redirect or drop. Last one wins.
    pub disruptive: Option<DisruptiveAction>,
    /// status:n
    pub status: Option<u16>,
    /// chain, skip, skipAfter.
    pub flow: Flow,
    /// setvar actions in declaration order.
    pub setvars: Vec<SetVarSpec>,
    /// capture
    pub capture: bool,
    /// ctl actions in declaration order.
    pub controls: Vec<ControlAction>,
    /// log / nolog
    pub log: Option<bool>,
    /// auditlog / noauditlog
    pub audit_log: Option<bool>,
    /// t: names in declaration order.
    pub transformations: Vec<String>,
}

impl RuleActions {
    /// Group a parsed action list.
    pub fn from_actions(actions: &[Action]) -> Self {
        let mut out = Self::default();
        for action in actions {
            match action {
                Action::Disruptive(d) => out.disruptive = Some(d.clone()),
                Action::Flow(f) => out.flow.apply(f),
                Action::Metadata(m) => {
                    if let crate::parser::MetadataAction::Status(s) = m {
                        out.status = Some(*s);
                    } else {
                        out.meta.apply(m);
                    }
                }
                Action::Data(DataAction::SetVar(spec)) => out.setvars.push(spec.clone()),
                Action::Data(DataAction::Capture) => out.capture = true,
                Action::Logging(l) => match l {
                    LoggingAction::Log => out.log = Some(true),
                    LoggingAction::NoLog => out.log = Some(false),
                    LoggingAction::AuditLog => out.audit_log = Some(true),
                    LoggingAction::NoAuditLog => out.audit_log = Some(false),
                },
                Action::Control(c) => out.controls.push(c.clone()),
                Action::Transformation(t) => out.transformations.push(t.clone()),
            }
        }
        out
    }

    /// Fill in what the rule leaves unset from its phase defaults.
    ///
    /// The default disruptive action and status only apply when the rule
    /// names no disruptive action of its own. Default transformations run
    /// before the rule's own, so `t:none` discards them.
    pub fn inherit(&mut self, defaults: &RuleActions) {
        if self.disruptive.is_none() {
            self.disruptive = defaults.disruptive.clone();
            self.status = self.status.or(defaults.status);
        }
        self.log = self.log.or(defaults.log);
        self.audit_log = self.audit_log.or(defaults.audit_log);
        if !defaults.transformations.is_empty() {
            let mut names = defaults.transformations.clone();
            names.append(&mut self.transformations);
            self.transformations = names;
        }
        if self.meta.severity.is_none() {
            self.meta.severity = defaults.meta.severity;
        }
        if self.meta.tags.is_empty() {
            self.meta.tags = defaults.meta.tags.clone();
        }
    }

    /// Whether matches are written to the debug log.
    pub fn logs(&self) -> bool {
        self.log.unwrap_or(true)
    }

    /// Whether matches make the transaction relevant for auditing.
    pub fn audit_logs(&self) -> bool {
        self.audit_log.unwrap_or(true)
    }

    /// What `block` resolves to when these are phase defaults.
    pub fn block_target(&self) -> Option<BlockTarget> {
        self.disruptive.clone().map(|action| BlockTarget {
            action,
            status: self.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_actions;

    fn actions(text: &str) -> RuleActions {
        RuleActions::from_actions(&parse_actions(text).unwrap())
    }

    #[test]
    fn test_grouping() {
        let a = actions(
            "id:10,phase:2,deny,status:406,msg:'x',tag:a,tag:b,t:lowercase,\
             setvar:tx.a=1,setvar:tx.b=+2,capture,nolog,chain",
        );
        assert_eq!(a.meta.id, Some(10));
        assert_eq!(a.disruptive, Some(DisruptiveAction::Deny));
        assert_eq!(a.status, Some(406));
        assert_eq!(a.meta.tags, vec!["a", "b"]);
        assert_eq!(a.setvars.len(), 2);
        assert!(a.capture);
        assert!(a.flow.chain);
        assert!(!a.logs());
        assert!(a.audit_logs());
        assert_eq!(a.transformations, vec!["lowercase"]);
    }

    #[test]
    fn test_inherit_only_without_disruptive() {
        let defaults = actions("phase:2,log,noauditlog,deny,status:403,t:lowercase");

        let mut plain = actions("id:1,t:none,t:trim");
        plain.inherit(&defaults);
        assert_eq!(plain.disruptive, Some(DisruptiveAction::Deny));
        assert_eq!(plain.status, Some(403));
        assert!(!plain.audit_logs());
        assert_eq!(plain.transformations, vec!["lowercase", "none", "trim"]);

        let mut passing = actions("id:2,pass,auditlog");
        passing.inherit(&defaults);
        assert_eq!(passing.disruptive, Some(DisruptiveAction::Pass));
        assert_eq!(passing.status, None);
        assert!(passing.audit_logs());
    }

    #[test]
    fn test_block_target() {
        let defaults = actions("phase:1,log,deny,status:429");
        assert_eq!(
            defaults.block_target(),
            Some(BlockTarget {
                action: DisruptiveAction::Deny,
                status: Some(429)
            })
        );
    }
}
