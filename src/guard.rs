//! Limit Guard around regex matching.
//!
//! Two ceilings apply to every regex evaluation:
//!
//! - the **match limit** bounds backtracking steps inside one match call. It is
//!   enforced by the regex VM itself (`backtrack_limit`), so the counter starts
//!   from zero on every top-level call.
//! - the **recursion limit** bounds the group nesting depth of a pattern the VM
//!   runs. Nesting is fixed at compile time, so it never depends on the input.
//!
//! Only patterns using lookaround, backreferences, atomic groups or possessive
//! quantifiers run on the backtracking VM. Everything else is delegated to the
//! linear-time `regex` engine, which cannot backtrack: neither ceiling applies
//! and such a pattern never reports a breach, however long the input.
//!
//! Exceeding either aborts that one match, which degrades to a non-match. The
//! caller records the breach on the transaction.

use crate::error::{Error, Result};
use fancy_regex::{Regex, RegexBuilder};
use std::fmt;

/// Default for SecPcreMatchLimit.
pub const DEFAULT_MATCH_LIMIT: usize = 1500;

/// Default for SecPcreMatchLimitRecursion.
pub const DEFAULT_RECURSION_LIMIT: usize = 1500;

/// Process-wide regex ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchLimits {
    /// Backtracking steps allowed per match call.
    pub match_limit: usize,
    /// Estimated stack depth allowed per match call.
    pub recursion_limit: usize,
}

impl Default for MatchLimits {
    fn default() -> Self {
        Self {
            match_limit: DEFAULT_MATCH_LIMIT,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

/// Which ceiling a match ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitExceeded {
    /// Too many backtracking steps.
    CallLimit,
    /// Too deep.
    RecursionLimit,
}

impl fmt::Display for LimitExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitExceeded::CallLimit => write!(f, "match limit exceeded"),
            LimitExceeded::RecursionLimit => write!(f, "recursion limit exceeded"),
        }
    }
}

/// A compiled regex plus the shape information the guard needs.
#[derive(Clone)]
pub struct GuardedRegex {
    regex: Regex,
    nesting: usize,
    backtracking: bool,
}

impl GuardedRegex {
    /// Compile `pattern` with the configured backtracking ceiling.
    pub fn new(pattern: &str, limits: &MatchLimits) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .backtrack_limit(limits.match_limit)
            .build()
            .map_err(|e| Error::RegexCompile {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
        let (nesting, backtracking) = analyze(pattern);
        Ok(Self {
            regex,
            nesting,
            backtracking,
        })
    }

    /// The source pattern.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Whether matching runs on the backtracking VM.
    pub fn is_backtracking(&self) -> bool {
        self.backtracking
    }

    /// Stack depth charged against the recursion limit. Zero for patterns
    /// the linear engine runs.
    pub fn depth(&self) -> usize {
        if self.backtracking {
            self.nesting
        } else {
            0
        }
    }
}

impl fmt::Debug for GuardedRegex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedRegex")
            .field("pattern", &self.regex.as_str())
            .field("nesting", &self.nesting)
            .field("backtracking", &self.backtracking)
            .finish()
    }
}

/// Outcome of a guarded match.
pub type GuardResult<T> = std::result::Result<T, LimitExceeded>;

/// Runs regex matches under the configured ceilings.
#[derive(Debug, Clone, Copy, Default)]
pub struct LimitGuard {
    limits: MatchLimits,
}

impl LimitGuard {
    /// Create a guard for the given limits.
    pub fn new(limits: MatchLimits) -> Self {
        Self { limits }
    }

    /// The active limits.
    pub fn limits(&self) -> &MatchLimits {
        &self.limits
    }

    /// Test whether `regex` matches `input`.
    pub fn is_match(&self, regex: &GuardedRegex, input: &str) -> GuardResult<bool> {
        self.check_depth(regex)?;
        regex.regex.is_match(input).map_err(|e| exhausted(regex, e))
    }

    /// Match and return up to ten capture groups (group 0 is the whole match).
    ///
    /// Groups that did not participate are returned as empty strings.
    pub fn captures(&self, regex: &GuardedRegex, input: &str) -> GuardResult<Option<Vec<String>>> {
        self.check_depth(regex)?;
        let caps = regex
            .regex
            .captures(input)
            .map_err(|e| exhausted(regex, e))?;
        Ok(caps.map(|caps| {
            (0..caps.len().min(10))
                .map(|i| caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect()
        }))
    }

    fn check_depth(&self, regex: &GuardedRegex) -> GuardResult<()> {
        let depth = regex.depth();
        if depth > self.limits.recursion_limit {
            tracing::debug!(
                pattern = regex.as_str(),
                depth,
                limit = self.limits.recursion_limit,
                "regex recursion limit exceeded"
            );
            return Err(LimitExceeded::RecursionLimit);
        }
        Ok(())
    }
}

fn exhausted(regex: &GuardedRegex, err: fancy_regex::Error) -> LimitExceeded {
    match err {
        fancy_regex::Error::RuntimeError(fancy_regex::RuntimeError::BacktrackLimitExceeded) => {
            tracing::debug!(pattern = regex.as_str(), "regex match limit exceeded");
            LimitExceeded::CallLimit
        }
        other => {
            tracing::debug!(pattern = regex.as_str(), error = %other, "regex runtime error");
            LimitExceeded::RecursionLimit
        }
    }
}

/// Group nesting depth and whether the pattern needs the backtracking VM.
fn analyze(pattern: &str) -> (usize, bool) {
    let chars: Vec<char> = pattern.chars().collect();
    let mut depth = 0usize;
    let mut max_depth = 0usize;
    let mut backtracking = false;
    let mut in_class = false;
    let mut i = 0;

    while i < chars.len() {
        let next = chars.get(i + 1).copied();
        match chars[i] {
            '\\' => {
                if !in_class && matches!(next, Some('1'..='9' | 'k')) {
                    backtracking = true;
                }
                i += 1;
            }
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '(' if !in_class => {
                depth += 1;
                max_depth = max_depth.max(depth);
                if next == Some('?') {
                    let kind = chars.get(i + 2).copied();
                    let after = chars.get(i + 3).copied();
                    backtracking |= matches!(kind, Some('=' | '!' | '>'))
                        || (kind == Some('<') && matches!(after, Some('=' | '!')));
                }
            }
            ')' if !in_class => depth = depth.saturating_sub(1),
            '*' | '+' | '?' | '}' if !in_class => {
                if next == Some('+') {
                    backtracking = true;
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }

    (max_depth, backtracking)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze() {
        assert_eq!(analyze("abc"), (0, false));
        assert_eq!(analyze("(a(b))"), (2, false));
        assert_eq!(analyze("(a|b)*c"), (1, false));
        assert_eq!(analyze(r"\((x)"), (1, false));
        assert_eq!(analyze("[(]+(x)"), (1, false));
        assert_eq!(analyze("(?<name>x)"), (1, false));
        assert_eq!(analyze("a(?=b)"), (1, true));
        assert_eq!(analyze("(?<!a)b"), (1, true));
        assert_eq!(analyze("(?>ab)"), (1, true));
        assert_eq!(analyze(r"(a)\1"), (1, true));
        assert_eq!(analyze("[\\1]"), (0, false));
        assert_eq!(analyze("a++b"), (0, true));
        assert_eq!(analyze("a+?b"), (0, false));
    }

    #[test]
    fn test_plain_match() {
        let guard = LimitGuard::default();
        let re = GuardedRegex::new("^/admin", &MatchLimits::default()).unwrap();
        assert_eq!(guard.is_match(&re, "/admin/users"), Ok(true));
        assert_eq!(guard.is_match(&re, "/public"), Ok(false));
    }

    #[test]
    fn test_captures_are_padded() {
        let guard = LimitGuard::default();
        let re = GuardedRegex::new("(a)(x)?(b)", &MatchLimits::default()).unwrap();
        let caps = guard.captures(&re, "zab").unwrap().unwrap();
        assert_eq!(caps, vec!["ab", "a", "", "b"]);
    }

    #[test]
    fn test_catastrophic_pattern_hits_call_limit() {
        let limits = MatchLimits {
            match_limit: 1000,
            recursion_limit: 100_000,
        };
        let guard = LimitGuard::new(limits);
        let re = GuardedRegex::new("(?i)(a|b|ab)*(?=c)", &limits).unwrap();
        let input = "ab".repeat(30);
        assert_eq!(guard.is_match(&re, &input), Err(LimitExceeded::CallLimit));
    }

    #[test]
    fn test_long_input_on_linear_pattern_still_matches() {
        let limits = MatchLimits::default();
        let guard = LimitGuard::new(limits);
        let re = GuardedRegex::new("(union)+", &limits).unwrap();
        assert!(!re.is_backtracking());

        let input = format!("{}union select", "x".repeat(4000));
        assert_eq!(guard.is_match(&re, &input), Ok(true));
        let caps = guard.captures(&re, &input).unwrap().unwrap();
        assert_eq!(caps, vec!["union", "union"]);
    }

    #[test]
    fn test_linear_pattern_ignores_match_limit() {
        let limits = MatchLimits {
            match_limit: 10,
            recursion_limit: 1,
        };
        let guard = LimitGuard::new(limits);
        let re = GuardedRegex::new("(a+)+b", &limits).unwrap();
        let input = "a".repeat(5000);
        assert_eq!(guard.is_match(&re, &input), Ok(false));
    }

    #[test]
    fn test_deep_lookaround_hits_recursion_limit() {
        let limits = MatchLimits {
            match_limit: 1_000_000,
            recursion_limit: 2,
        };
        let guard = LimitGuard::new(limits);
        let shallow = GuardedRegex::new("a(?=b)", &limits).unwrap();
        assert_eq!(guard.is_match(&shallow, "ab"), Ok(true));

        let deep = GuardedRegex::new("(?=(a(b)))", &limits).unwrap();
        assert_eq!(deep.depth(), 3);
        assert_eq!(
            guard.is_match(&deep, "ab"),
            Err(LimitExceeded::RecursionLimit)
        );
    }

    #[test]
    fn test_invalid_pattern() {
        let err = GuardedRegex::new("(unclosed", &MatchLimits::default()).unwrap_err();
        assert!(matches!(err, Error::RegexCompile { .. }));
    }
}
