//! Numeric and string comparison operators.
//!
//! Arguments containing `%{...}` are expanded per evaluation.

use super::{MacroExpander, OperatorResult};

fn has_macro(arg: &str) -> bool {
    arg.contains("%{")
}

/// Integer comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericCmp {
    /// `@eq`
    Eq,
    /// `@ne`
    Ne,
    /// `@gt`
    Gt,
    /// `@ge`
    Ge,
    /// `@lt`
    Lt,
    /// `@le`
    Le,
}

impl NumericCmp {
    fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            NumericCmp::Eq => lhs == rhs,
            NumericCmp::Ne => lhs != rhs,
            NumericCmp::Gt => lhs > rhs,
            NumericCmp::Ge => lhs >= rhs,
            NumericCmp::Lt => lhs < rhs,
            NumericCmp::Le => lhs <= rhs,
        }
    }
}

/// Right-hand side of a numeric comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumericOperand {
    /// Parsed at compile time.
    Literal(i64),
    /// Expanded and parsed per evaluation.
    Macro(String),
    /// Not an integer; the operator never matches.
    Malformed(String),
}

/// Parse a decimal i64, allowing surrounding whitespace and a leading `+`.
pub(crate) fn parse_i64(s: &str) -> Option<i64> {
    let s = s.trim();
    s.strip_prefix('+').unwrap_or(s).parse().ok()
}

/// Numeric comparison operator.
#[derive(Debug, Clone)]
pub struct NumericOperator {
    cmp: NumericCmp,
    operand: NumericOperand,
}

impl NumericOperator {
    /// Build from the raw argument.
    pub fn new(cmp: NumericCmp, arg: &str) -> Self {
        let operand = if has_macro(arg) {
            NumericOperand::Macro(arg.to_string())
        } else {
            match parse_i64(arg) {
                Some(n) => NumericOperand::Literal(n),
                None => {
                    tracing::warn!(argument = arg, "numeric operator argument is not an integer");
                    NumericOperand::Malformed(arg.to_string())
                }
            }
        };
        Self { cmp, operand }
    }

    /// The operand.
    pub fn operand(&self) -> &NumericOperand {
        &self.operand
    }

    /// Compare `input` against the operand.
    pub fn execute(&self, input: &str, macros: &dyn MacroExpander) -> OperatorResult {
        let rhs = match &self.operand {
            NumericOperand::Literal(n) => Some(*n),
            NumericOperand::Macro(template) => parse_i64(&macros.expand(template)),
            NumericOperand::Malformed(_) => None,
        };

        match (parse_i64(input), rhs) {
            (Some(lhs), Some(rhs)) if self.cmp.holds(lhs, rhs) => OperatorResult::matched(input),
            (Some(_), Some(_)) => OperatorResult::no_match(),
            _ => OperatorResult::indeterminate(),
        }
    }
}

/// String comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringCmp {
    /// `@streq`
    Equals,
    /// `@contains`
    Contains,
    /// `@containsWord`
    ContainsWord,
    /// `@beginsWith`
    BeginsWith,
    /// `@endsWith`
    EndsWith,
}

/// Case-sensitive string comparison operator.
#[derive(Debug, Clone)]
pub struct StringOperator {
    cmp: StringCmp,
    argument: String,
    dynamic: bool,
}

impl StringOperator {
    /// Build from the raw argument.
    pub fn new(cmp: StringCmp, arg: &str) -> Self {
        Self {
            cmp,
            argument: arg.to_string(),
            dynamic: has_macro(arg),
        }
    }

    /// Compare `input` against the (expanded) argument.
    pub fn execute(&self, input: &str, macros: &dyn MacroExpander) -> OperatorResult {
        let needle = if self.dynamic {
            macros.expand(&self.argument)
        } else {
            std::borrow::Cow::Borrowed(self.argument.as_str())
        };
        let needle = needle.as_ref();

        let hit = match self.cmp {
            StringCmp::Equals => input == needle,
            StringCmp::Contains => input.contains(needle),
            StringCmp::ContainsWord => contains_word(input, needle),
            StringCmp::BeginsWith => input.starts_with(needle),
            StringCmp::EndsWith => input.ends_with(needle),
        };

        match (hit, self.cmp) {
            (false, _) => OperatorResult::no_match(),
            (true, StringCmp::Equals) => OperatorResult::matched(input),
            (true, _) => OperatorResult::matched(needle),
        }
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Whether `needle` occurs in `haystack` delimited by non-word characters.
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    let bytes = haystack.as_bytes();
    haystack.match_indices(needle).any(|(start, m)| {
        let end = start + m.len();
        let before_ok = start == 0 || !is_word_byte(bytes[start - 1]);
        let after_ok = end == bytes.len() || !is_word_byte(bytes[end]);
        before_ok && after_ok
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::NoMacros;
    use std::borrow::Cow;

    struct Fixed(&'static str);

    impl MacroExpander for Fixed {
        fn expand<'a>(&self, _template: &'a str) -> Cow<'a, str> {
            Cow::Borrowed(self.0)
        }
    }

    #[test]
    fn test_numeric_comparisons() {
        let cases = [
            (NumericCmp::Eq, "5", "5", true),
            (NumericCmp::Ne, "5", "4", true),
            (NumericCmp::Gt, "5", "6", true),
            (NumericCmp::Ge, "5", "5", true),
            (NumericCmp::Lt, "5", "4", true),
            (NumericCmp::Le, "5", "6", false),
            (NumericCmp::Eq, "-3", " -3 ", true),
        ];
        for (cmp, arg, input, expected) in cases {
            let op = NumericOperator::new(cmp, arg);
            assert_eq!(op.execute(input, &NoMacros).matched, expected, "{:?} {} {}", cmp, arg, input);
        }
    }

    #[test]
    fn test_numeric_exact_width() {
        let op = NumericOperator::new(NumericCmp::Eq, "9223372036854775807");
        assert!(op.execute("9223372036854775807", &NoMacros).matched);
        assert!(!op.execute("9223372036854775806", &NoMacros).matched);
        assert!(op.execute("9223372036854775808", &NoMacros).indeterminate);
    }

    #[test]
    fn test_malformed_pattern() {
        let op = NumericOperator::new(NumericCmp::Gt, "ten");
        assert!(matches!(op.operand(), NumericOperand::Malformed(_)));
        assert!(op.execute("11", &NoMacros).indeterminate);
    }

    #[test]
    fn test_numeric_macro_operand() {
        let op = NumericOperator::new(NumericCmp::Ge, "%{tx.threshold}");
        assert!(op.execute("5", &Fixed("5")).matched);
        assert!(!op.execute("4", &Fixed("5")).matched);
        assert!(op.execute("4", &Fixed("")).indeterminate);
    }

    #[test]
    fn test_string_comparisons() {
        let contains = StringOperator::new(StringCmp::Contains, "/admin");
        let r = contains.execute("/x/admin/y", &NoMacros);
        assert!(r.matched);
        assert_eq!(r.matched_value.as_deref(), Some("/admin"));
        assert!(!contains.execute("/ADMIN", &NoMacros).matched);

        assert!(StringOperator::new(StringCmp::Equals, "GET").execute("GET", &NoMacros).matched);
        assert!(StringOperator::new(StringCmp::BeginsWith, "/api").execute("/api/v1", &NoMacros).matched);
        assert!(StringOperator::new(StringCmp::EndsWith, ".php").execute("a.php", &NoMacros).matched);
    }

    #[test]
    fn test_contains_word() {
        let op = StringOperator::new(StringCmp::ContainsWord, "select");
        assert!(op.execute("1 select 2", &NoMacros).matched);
        assert!(op.execute("select", &NoMacros).matched);
        assert!(!op.execute("selection", &NoMacros).matched);
        assert!(op.execute("selection select", &NoMacros).matched);
    }

    #[test]
    fn test_string_macro_operand() {
        let op = StringOperator::new(StringCmp::Equals, "%{REQUEST_HEADERS.host}");
        assert!(op.execute("example.com", &Fixed("example.com")).matched);
    }
}
