//! Operators.
//!
//! An operator is compiled once from its [`OperatorSpec`] into one of five
//! kinds and dispatched by variant at evaluation time:
//!
//! | kind | operators |
//! |---|---|
//! | numeric | `@eq @ne @gt @ge @lt @le` |
//! | string | `@streq @contains @containsWord @beginsWith @endsWith` |
//! | regex | `@rx` |
//! | list | `@pm @pmFromFile @within` |
//! | custom | `@validate*`, `@ipMatch*`, `@unconditionalMatch`, `@noMatch`, registry operators |

mod comparison;
mod custom;
mod list;
mod network;
mod pattern;
mod validation;

pub use comparison::{NumericCmp, NumericOperand, NumericOperator, StringCmp, StringOperator};
pub use custom::{CustomFn, CustomOperator};
pub use list::ListOperator;
pub use network::ip_match;
pub use pattern::RegexOperator;
pub use validation::{validate_byte_range, validate_url_encoding, validate_utf8_encoding};

use crate::error::{Error, Result};
use crate::guard::{LimitExceeded, LimitGuard, MatchLimits};
use crate::parser::{OperatorName, OperatorSpec};
use crate::registry::Registry;
use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// Expands `%{...}` macros in operator arguments at evaluation time.
pub trait MacroExpander {
    /// Expand every macro in `template`.
    fn expand<'a>(&self, template: &'a str) -> Cow<'a, str>;
}

/// Expander that leaves templates untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMacros;

impl MacroExpander for NoMacros {
    fn expand<'a>(&self, template: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(template)
    }
}

/// Per-evaluation services available to operators.
pub struct EvalContext<'a> {
    /// Regex ceilings.
    pub guard: &'a LimitGuard,
    /// Macro expansion for dynamic arguments.
    pub macros: &'a dyn MacroExpander,
}

/// Result of operator execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorResult {
    /// Whether the operator matched.
    pub matched: bool,
    /// Regex groups 0..9 (group 0 is the whole match).
    pub captures: Vec<String>,
    /// The matched value.
    pub matched_value: Option<String>,
    /// Set when the regex ceiling aborted the match.
    pub limit_exceeded: Option<LimitExceeded>,
    /// Set when the comparison could not be evaluated (e.g. malformed number).
    pub indeterminate: bool,
}

impl OperatorResult {
    /// Create a result indicating no match.
    pub fn no_match() -> Self {
        Self::default()
    }

    /// Create a result indicating a match.
    pub fn matched(value: impl Into<String>) -> Self {
        Self {
            matched: true,
            matched_value: Some(value.into()),
            ..Self::default()
        }
    }

    /// A result that must not match, negated or not.
    pub fn indeterminate() -> Self {
        Self {
            indeterminate: true,
            ..Self::default()
        }
    }

    /// A match aborted by the Limit Guard.
    pub fn exhausted(limit: LimitExceeded) -> Self {
        Self {
            limit_exceeded: Some(limit),
            indeterminate: true,
            ..Self::default()
        }
    }
}

/// The operator kinds.
#[derive(Debug, Clone)]
pub enum Operator {
    /// Integer comparison.
    Numeric(NumericOperator),
    /// String comparison.
    String(StringOperator),
    /// Regex match under the Limit Guard.
    Regex(RegexOperator),
    /// Phrase or list membership.
    List(ListOperator),
    /// Function operator.
    Custom(CustomOperator),
}

impl Operator {
    fn execute(&self, input: &str, ctx: &EvalContext<'_>) -> OperatorResult {
        match self {
            Operator::Numeric(op) => op.execute(input, ctx.macros),
            Operator::String(op) => op.execute(input, ctx.macros),
            Operator::Regex(op) => op.execute(input, ctx.guard),
            Operator::List(op) => op.execute(input, ctx.macros),
            Operator::Custom(op) => op.execute(input),
        }
    }
}

/// Everything operator compilation needs besides the spec.
pub struct CompileContext<'a> {
    /// Source of custom operators.
    pub registry: &'a Registry,
    /// Ceilings baked into compiled regexes.
    pub limits: MatchLimits,
    /// Directory relative data files are resolved against.
    pub base_dir: Option<&'a Path>,
}

impl CompileContext<'_> {
    /// Resolve a data file path.
    pub fn resolve(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        match self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// A compiled operator with its negation flag.
#[derive(Debug, Clone)]
pub struct CompiledOperator {
    name: String,
    negated: bool,
    argument: String,
    kind: Operator,
}

impl CompiledOperator {
    /// Compile an operator specification.
    pub fn compile(spec: &OperatorSpec, ctx: &CompileContext<'_>) -> Result<Self> {
        let arg = spec.argument.as_str();
        let kind = match spec.builtin {
            Some(OperatorName::Rx) => Operator::Regex(RegexOperator::new(arg, &ctx.limits)?),
            Some(OperatorName::Pm) => Operator::List(ListOperator::phrases(arg)?),
            Some(OperatorName::PmFromFile) => Operator::List(ListOperator::phrase_files(arg, ctx)?),
            Some(OperatorName::Within) => Operator::List(ListOperator::within(arg)),
            Some(OperatorName::StrEq) => Operator::String(StringOperator::new(StringCmp::Equals, arg)),
            Some(OperatorName::Contains) => {
                Operator::String(StringOperator::new(StringCmp::Contains, arg))
            }
            Some(OperatorName::ContainsWord) => {
                Operator::String(StringOperator::new(StringCmp::ContainsWord, arg))
            }
            Some(OperatorName::BeginsWith) => {
                Operator::String(StringOperator::new(StringCmp::BeginsWith, arg))
            }
            Some(OperatorName::EndsWith) => {
                Operator::String(StringOperator::new(StringCmp::EndsWith, arg))
            }
            Some(OperatorName::Eq) => Operator::Numeric(NumericOperator::new(NumericCmp::Eq, arg)),
            Some(OperatorName::Ne) => Operator::Numeric(NumericOperator::new(NumericCmp::Ne, arg)),
            Some(OperatorName::Gt) => Operator::Numeric(NumericOperator::new(NumericCmp::Gt, arg)),
            Some(OperatorName::Ge) => Operator::Numeric(NumericOperator::new(NumericCmp::Ge, arg)),
            Some(OperatorName::Lt) => Operator::Numeric(NumericOperator::new(NumericCmp::Lt, arg)),
            Some(OperatorName::Le) => Operator::Numeric(NumericOperator::new(NumericCmp::Le, arg)),
            Some(OperatorName::ValidateByteRange) => {
                Operator::Custom(validate_byte_range(arg)?)
            }
            Some(OperatorName::ValidateUrlEncoding) => Operator::Custom(validate_url_encoding()),
            Some(OperatorName::ValidateUtf8Encoding) => Operator::Custom(validate_utf8_encoding()),
            Some(OperatorName::IpMatch) => Operator::Custom(ip_match(arg)?),
            Some(OperatorName::IpMatchFromFile) => {
                Operator::Custom(network::ip_match_from_files(arg, ctx)?)
            }
            Some(OperatorName::UnconditionalMatch) => {
                Operator::Custom(CustomOperator::new("unconditionalMatch", |input: &str| {
                    Some(input.to_string())
                }))
            }
            Some(OperatorName::NoMatch) => {
                Operator::Custom(CustomOperator::new("noMatch", |_: &str| None))
            }
            None => {
                let factory = ctx.registry.operator(&spec.name).ok_or_else(|| {
                    Error::UnknownOperator {
                        name: spec.name.clone(),
                    }
                })?;
                Operator::Custom(CustomOperator::from_fn(&spec.name, factory(arg)?))
            }
        };

        Ok(Self {
            name: spec.name.clone(),
            negated: spec.negated,
            argument: spec.argument.clone(),
            kind,
        })
    }

    /// Evaluate against one (already transformed) value.
    ///
    /// Negation flips `matched` only; captures and the matched value are
    /// left as the underlying operator produced them. Indeterminate results
    /// never match.
    pub fn evaluate(&self, input: &str, ctx: &EvalContext<'_>) -> OperatorResult {
        let mut result = self.kind.execute(input, ctx);
        if result.indeterminate {
            result.matched = false;
        } else if self.negated {
            result.matched = !result.matched;
        }
        result
    }

    /// Operator name as written.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Operator argument as written.
    pub fn argument(&self) -> &str {
        &self.argument
    }

    /// Whether the operator is negated.
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// The compiled operator kind.
    pub fn kind(&self) -> &Operator {
        &self.kind
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{compile, eval};
    use super::*;
    use crate::parser::parse_operator;

    #[test]
    fn test_negation_keeps_metadata() {
        let op = compile("!@rx ^(ad)min");
        let r = eval(&op, "admin");
        assert!(!r.matched);
        assert_eq!(r.matched_value.as_deref(), Some("admin"));
        assert_eq!(r.captures, vec!["admin", "ad"]);

        assert!(eval(&op, "user").matched);
    }

    #[test]
    fn test_malformed_numeric_never_matches() {
        assert!(!eval(&compile("@eq abc"), "5").matched);
        assert!(!eval(&compile("!@eq abc"), "5").matched);
    }

    #[test]
    fn test_unknown_custom_operator() {
        let registry = Registry::default();
        let ctx = CompileContext {
            registry: &registry,
            limits: MatchLimits::default(),
            base_dir: None,
        };
        let err = CompiledOperator::compile(&parse_operator("@bogus x").unwrap(), &ctx).unwrap_err();
        assert!(matches!(err, Error::UnknownOperator { .. }));
    }

    #[test]
    fn test_registry_operator() {
        let mut registry = Registry::default();
        registry.register_predicate("lenAbove", |input: &str, arg: &str| {
            arg.parse::<usize>().map(|n| input.len() > n).unwrap_or(false)
        });
        let ctx = CompileContext {
            registry: &registry,
            limits: MatchLimits::default(),
            base_dir: None,
        };
        let op = CompiledOperator::compile(&parse_operator("@lenAbove 3").unwrap(), &ctx).unwrap();
        assert!(eval(&op, "abcd").matched);
        assert!(!eval(&op, "abc").matched);
    }

    #[test]
    fn test_unconditional_and_no_match() {
        assert!(eval(&compile("@unconditionalMatch"), "").matched);
        assert!(!eval(&compile("@noMatch"), "x").matched);
    }
}
