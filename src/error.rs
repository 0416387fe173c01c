//! Error types for zentinel-waf.
//!
//! Everything in here is either a configuration error (fatal when the engine
//! is built) or API misuse of a [`Transaction`](crate::Transaction). Anomalies
//! found while inspecting traffic are never errors; they surface as
//! transaction variables instead.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for zentinel-waf operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Error parsing a directive.
    #[error("parse error at {location}: {message}")]
    Parse {
        /// Human-readable error message.
        message: String,
        /// Location in the source (file:line:col or line:col).
        location: String,
    },

    /// Error loading a rule or data file.
    #[error("failed to load file {path}: {source}")]
    RuleFileLoad {
        /// Path to the file that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Error compiling a regex pattern.
    #[error("invalid regex pattern '{pattern}': {message}")]
    RegexCompile {
        /// The pattern that failed to compile.
        pattern: String,
        /// Compiler message.
        message: String,
    },

    /// Error compiling a phrase set.
    #[error("invalid pattern set: {message}")]
    PatternSet {
        /// Error message.
        message: String,
    },

    /// Error parsing an IP address or network.
    #[error("invalid IP address or network '{value}': {message}")]
    InvalidIp {
        /// The value that failed to parse.
        value: String,
        /// Error message.
        message: String,
    },

    /// Unknown variable name.
    #[error("unknown variable: {name}")]
    UnknownVariable {
        /// The unknown variable name.
        name: String,
    },

    /// Unknown operator name.
    #[error("unknown operator: @{name}")]
    UnknownOperator {
        /// The unknown operator name.
        name: String,
    },

    /// Unknown transformation name.
    #[error("unknown transformation: t:{name}")]
    UnknownTransformation {
        /// The unknown transformation name.
        name: String,
    },

    /// Unknown action name.
    #[error("unknown action: {name}")]
    UnknownAction {
        /// The unknown action name.
        name: String,
    },

    /// Invalid action argument.
    #[error("invalid argument for action '{action}': {message}")]
    InvalidActionArgument {
        /// The action name.
        action: String,
        /// Error message.
        message: String,
    },

    /// Rule is missing the required `id` action.
    #[error("rule at {location} is missing required 'id' action")]
    MissingRuleId {
        /// Where the rule was declared.
        location: String,
    },

    /// Rule id is zero or otherwise unusable.
    #[error("invalid rule id at {location}: {message}")]
    InvalidRuleId {
        /// Where the rule was declared.
        location: String,
        /// Error message.
        message: String,
    },

    /// Duplicate rule ID.
    #[error("duplicate rule id: {id}")]
    DuplicateRuleId {
        /// The duplicate ID.
        id: u64,
    },

    /// Rule chain is incomplete.
    #[error("incomplete rule chain: rule {id} declares 'chain' without a following rule")]
    IncompleteChain {
        /// Id of the chain head.
        id: u64,
    },

    /// Configuration value is malformed or inconsistent.
    #[error("configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// A transaction phase was driven out of order.
    #[error("cannot run {requested} after {current}")]
    PhaseOrder {
        /// Name of the phase that was requested.
        requested: &'static str,
        /// Name of the phase the transaction is in.
        current: &'static str,
    },

    /// Attempted to write a variable that is extracted from the transaction.
    #[error("variable {name} is read-only")]
    ReadOnlyVariable {
        /// Variable name.
        name: String,
    },

    /// I/O failure surfaced to the caller (only on explicit discard).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a parse error with location information.
    pub fn parse(message: impl Into<String>, location: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            location: location.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Source location for error reporting.
#[derive(Debug, Clone, Default)]
pub struct SourceLocation {
    /// File path (if known).
    pub file: Option<PathBuf>,
    /// Line number (1-indexed).
    pub line: usize,
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref file) = self.file {
            write!(f, "{}:{}", file.display(), self.line)
        } else {
            write!(f, "line {}", self.line)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_display() {
        let loc = SourceLocation {
            file: Some(PathBuf::from("rules.conf")),
            line: 12,
        };
        assert_eq!(loc.to_string(), "rules.conf:12");

        let loc = SourceLocation { file: None, line: 3 };
        assert_eq!(loc.to_string(), "line 3");
    }

    #[test]
    fn test_error_messages() {
        let err = Error::DuplicateRuleId { id: 42 };
        assert_eq!(err.to_string(), "duplicate rule id: 42");

        let err = Error::config("SecRequestBodyLimit must be positive");
        assert!(err.to_string().contains("must be positive"));
    }
}
