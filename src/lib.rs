//! # zentinel-waf
//!
//! Multi-phase HTTP transaction inspection driven by ModSecurity-style rules.
//!
//! A host feeds request and response data into a [`Transaction`] and runs the
//! five phases in order (request headers, request body, response headers,
//! response body, logging). Each phase evaluates its rules against the
//! [`VariableStore`], accumulates a [`Disposition`] and finally hands the
//! transaction to the audit logger.
//!
//! ## Features
//!
//! - SecRule/SecAction language with chains, markers and default actions
//! - Request body processors for urlencoded, multipart and JSON bodies
//! - Body buffering with disk spillover and configurable limit actions
//! - Regex match and recursion ceilings that degrade to a non-match
//! - Serial and concurrent audit logs in native or JSON format
//! - Custom transformations and operators through [`Registry`]
//!
//! ## Quick Start
//!
//! ```
//! use zentinel_waf::{Disposition, Engine};
//!
//! let engine = Engine::from_string(r#"
//!     SecRuleEngine On
//!     SecRule ARGS:id "@rx ^[0-9]+$" "id:100,phase:1,pass,nolog"
//!     SecRule REQUEST_URI "@contains /admin" "id:101,phase:1,deny,status:403,msg:'admin area'"
//! "#)?;
//!
//! let mut tx = engine.new_transaction();
//! tx.process_connection("10.0.0.1", 51000, "10.0.0.2", 80)?;
//! tx.process_uri("/admin/users?id=1", "GET", "HTTP/1.1")?;
//! tx.add_request_header("Host", "example.com")?;
//! tx.process_request_headers()?;
//!
//! assert_eq!(tx.disposition(), &Disposition::Deny { status: 403, drop: false });
//! # Ok::<(), zentinel_waf::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod actions;
pub mod audit;
pub mod body;
pub mod debuglog;
pub mod engine;
pub mod error;
pub mod guard;
pub mod operators;
pub mod parser;
pub mod registry;
pub mod transformations;
pub mod variables;

// Re-export main types at crate root
pub use audit::{AuditLogger, AuditRecord};
pub use engine::config::{EngineConfig, RuleEngineMode};
pub use engine::{
    CompiledRuleset, Disposition, Engine, Intervention, MatchedRule, Phase, Transaction,
};
pub use error::{Error, Result};
pub use guard::{LimitGuard, MatchLimits};
pub use registry::Registry;
pub use variables::{Value, VariableStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
