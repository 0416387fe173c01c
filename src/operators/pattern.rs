//! Regex operator (@rx).
//!
//! Patterns are compiled eagerly when the ruleset is built; every match runs
//! under the [`LimitGuard`].

use super::OperatorResult;
use crate::error::{Error, Result};
use crate::guard::{GuardedRegex, LimitGuard, MatchLimits};

/// Regex operator.
#[derive(Debug, Clone)]
pub struct RegexOperator {
    regex: GuardedRegex,
}

impl RegexOperator {
    /// Compile the pattern.
    pub fn new(pattern: &str, limits: &MatchLimits) -> Result<Self> {
        if pattern.is_empty() {
            return Err(Error::RegexCompile {
                pattern: String::new(),
                message: "empty pattern".to_string(),
            });
        }
        Ok(Self {
            regex: GuardedRegex::new(pattern, limits)?,
        })
    }

    /// The source pattern.
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Match `input`; groups 0..9 are returned as captures.
    pub fn execute(&self, input: &str, guard: &LimitGuard) -> OperatorResult {
        match guard.captures(&self.regex, input) {
            Ok(Some(captures)) => OperatorResult {
                matched: true,
                matched_value: captures.first().cloned(),
                captures,
                ..OperatorResult::default()
            },
            Ok(None) => OperatorResult::no_match(),
            Err(limit) => OperatorResult::exhausted(limit),
        }
    }
}
