//! Flow control actions (chain, skip, skipAfter).

use crate::engine::RuleOutcome;
use crate::parser::FlowAction;

/// Flow actions of one rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flow {
    /// The next rule is a chain link.
    pub chain: bool,
    /// skip:n
    pub skip: Option<u32>,
    /// skipAfter:marker
    pub skip_after: Option<String>,
}

impl Flow {
    pub(super) fn apply(&mut self, action: &FlowAction) {
        match action {
            FlowAction::Chain => self.chain = true,
            FlowAction::Skip(n) => self.skip = Some(*n),
            FlowAction::SkipAfter(marker) => self.skip_after = Some(marker.clone()),
        }
    }

    /// Outcome of a matched, non-disruptive rule.
    pub fn outcome(&self) -> RuleOutcome {
        match (&self.skip_after, self.skip) {
            (Some(marker), _) => RuleOutcome::SkipAfter(marker.clone()),
            (None, Some(n)) => RuleOutcome::Skip(n),
            (None, None) => RuleOutcome::Continue,
        }
    }
}
