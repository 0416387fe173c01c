//! Rule Engine.
//!
//! [`Engine`] holds the compiled configuration and the Audit Logger behind
//! an `Arc`; cloning it is cheap and every clone hands out independent
//! [`Transaction`]s that may run on different threads.

mod chain;
pub mod config;
mod intervention;
mod matched;
mod phase;
mod ruleset;
mod transaction;

pub use intervention::{Disposition, Intervention};
pub use matched::{MatchedRule, RuleOutcome};
pub use phase::Phase;
pub use ruleset::{CompiledRule, CompiledRuleset};
pub use transaction::{Transaction, REQUEST_BODY_LIMIT_STATUS, RESPONSE_BODY_LIMIT_STATUS};

use crate::audit::AuditLogger;
use crate::error::Result;
use crate::registry::Registry;
use std::path::Path;
use std::sync::Arc;

pub(crate) struct Shared {
    pub(crate) ruleset: CompiledRuleset,
    pub(crate) audit: AuditLogger,
}

/// The inspection engine.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Shared>,
}

impl Engine {
    /// Wrap a compiled ruleset and build its Audit Logger.
    pub fn new(ruleset: CompiledRuleset) -> Self {
        let audit = AuditLogger::new(ruleset.config().audit.clone());
        Self::with_audit_logger(ruleset, audit)
    }

    /// Use a prepared Audit Logger (e.g. with a custom sink).
    pub fn with_audit_logger(ruleset: CompiledRuleset, audit: AuditLogger) -> Self {
        Self {
            inner: Arc::new(Shared { ruleset, audit }),
        }
    }

    /// Compile rules from a string.
    pub fn from_string(rules: &str) -> Result<Self> {
        Self::with_registry(rules, &Registry::default())
    }

    /// Compile rules from a string with custom transformations/operators.
    pub fn with_registry(rules: &str, registry: &Registry) -> Result<Self> {
        Ok(Self::new(CompiledRuleset::from_string_with(rules, registry)?))
    }

    /// Compile rules from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(CompiledRuleset::from_file(path, &Registry::default())?))
    }

    /// Start a transaction with a fresh unique id.
    pub fn new_transaction(&self) -> Transaction {
        self.new_transaction_with_id(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Start a transaction with a host-provided id.
    pub fn new_transaction_with_id(&self, unique_id: impl Into<String>) -> Transaction {
        Transaction::new(Arc::clone(&self.inner), unique_id.into())
    }

    /// The compiled ruleset.
    pub fn ruleset(&self) -> &CompiledRuleset {
        &self.inner.ruleset
    }

    /// The Audit Logger.
    pub fn audit_logger(&self) -> &AuditLogger {
        &self.inner.audit
    }

    /// Number of rules (chains count once).
    pub fn rule_count(&self) -> usize {
        self.inner.ruleset.rule_count()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("rule_count", &self.rule_count())
            .field("rule_engine", &self.inner.ruleset.config().rule_engine)
            .field("audit", &self.inner.audit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_from_string() {
        let engine = Engine::from_string(
            r#"
            SecRule REQUEST_URI "@contains /admin" "id:1,phase:1,deny"
        "#,
        )
        .unwrap();
        assert_eq!(engine.rule_count(), 1);
    }

    #[test]
    fn test_transactions_get_unique_ids() {
        let engine = Engine::from_string("").unwrap();
        let a = engine.new_transaction();
        let b = engine.new_transaction();
        assert_ne!(a.unique_id(), b.unique_id());
        assert_eq!(a.unique_id().len(), 32);
    }

    #[test]
    fn test_engine_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
        fn assert_send<T: Send>() {}
        assert_send::<Transaction>();
    }
}
