//! Operator parsing for SecRule.
//!
//! Built-in names resolve through a perfect hash map. Names that are not
//! built in are kept verbatim so the registry can resolve them as custom
//! operators when the ruleset is compiled.

use crate::error::{Error, Result};
use phf::phf_map;

/// An operator specification in a SecRule.
#[derive(Debug, Clone)]
pub struct OperatorSpec {
    /// Whether the operator is negated (! prefix).
    pub negated: bool,
    /// Operator name as written, without the `@`.
    pub name: String,
    /// Built-in operator, when the name is one.
    pub builtin: Option<OperatorName>,
    /// The operator argument.
    pub argument: String,
}

/// Built-in operator names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorName {
    /// Regular expression match.
    Rx,
    /// Phrase match (Aho-Corasick).
    Pm,
    /// Phrase match with phrases read from files.
    PmFromFile,
    /// Input is one of a space-separated list.
    Within,
    /// String equals.
    StrEq,
    /// Contains substring.
    Contains,
    /// Contains word.
    ContainsWord,
    /// Begins with.
    BeginsWith,
    /// Ends with.
    EndsWith,
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Validate byte range.
    ValidateByteRange,
    /// Validate URL encoding.
    ValidateUrlEncoding,
    /// Validate UTF-8 encoding.
    ValidateUtf8Encoding,
    /// IP address match.
    IpMatch,
    /// IP address match with networks read from files.
    IpMatchFromFile,
    /// Unconditional match (always true).
    UnconditionalMatch,
    /// No match (always false).
    NoMatch,
}

static OPERATOR_MAP: phf::Map<&'static str, OperatorName> = phf_map! {
    "rx" => OperatorName::Rx,
    "pm" => OperatorName::Pm,
    "pmfromfile" => OperatorName::PmFromFile,
    "pmf" => OperatorName::PmFromFile,
    "within" => OperatorName::Within,
    "streq" => OperatorName::StrEq,
    "contains" => OperatorName::Contains,
    "containsword" => OperatorName::ContainsWord,
    "beginswith" => OperatorName::BeginsWith,
    "endswith" => OperatorName::EndsWith,
    "eq" => OperatorName::Eq,
    "ne" => OperatorName::Ne,
    "gt" => OperatorName::Gt,
    "ge" => OperatorName::Ge,
    "lt" => OperatorName::Lt,
    "le" => OperatorName::Le,
    "validatebyterange" => OperatorName::ValidateByteRange,
    "validateurlencoding" => OperatorName::ValidateUrlEncoding,
    "validateutf8encoding" => OperatorName::ValidateUtf8Encoding,
    "ipmatch" => OperatorName::IpMatch,
    "ipmatchfromfile" => OperatorName::IpMatchFromFile,
    "ipmatchf" => OperatorName::IpMatchFromFile,
    "unconditionalmatch" => OperatorName::UnconditionalMatch,
    "nomatch" => OperatorName::NoMatch,
};

impl OperatorName {
    /// Look up a built-in operator (case-insensitive).
    #[inline]
    pub fn lookup(s: &str) -> Option<Self> {
        if s.bytes().all(|b| !b.is_ascii_uppercase()) {
            return OPERATOR_MAP.get(s).copied();
        }
        OPERATOR_MAP.get(s.to_ascii_lowercase().as_str()).copied()
    }

    /// Whether the operator takes no argument.
    pub fn is_nullary(&self) -> bool {
        matches!(
            self,
            Self::ValidateUrlEncoding
                | Self::ValidateUtf8Encoding
                | Self::UnconditionalMatch
                | Self::NoMatch
        )
    }
}

/// Parse an operator specification from a string.
pub fn parse_operator(input: &str) -> Result<OperatorSpec> {
    let input = input.trim();

    let (negated, input) = match input.strip_prefix('!') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, input),
    };

    let Some(rest) = input.strip_prefix('@') else {
        return Ok(OperatorSpec {
            negated,
            name: "rx".to_string(),
            builtin: Some(OperatorName::Rx),
            argument: input.to_string(),
        });
    };

    let (name, argument) = match rest.find(|c: char| c.is_ascii_whitespace()) {
        Some(pos) => (&rest[..pos], rest[pos..].trim_start()),
        None => (rest, ""),
    };

    if name.is_empty() {
        return Err(Error::UnknownOperator {
            name: String::new(),
        });
    }

    Ok(OperatorSpec {
        negated,
        name: name.to_string(),
        builtin: OperatorName::lookup(name),
        argument: argument.to_string(),
    })
}
