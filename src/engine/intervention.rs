//! Dispositions and the intervention reported to the host.

use super::phase::Phase;
use crate::parser::AllowScope;
use std::fmt;

/// The transaction outcome.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Disposition {
    /// Let the transaction through.
    #[default]
    Pass,
    /// Blocked through the phase's default action.
    Block {
        /// HTTP status to answer with.
        status: u16,
    },
    /// Denied by the rule.
    Deny {
        /// HTTP status to answer with.
        status: u16,
        /// Close the connection without answering.
        drop: bool,
    },
    /// Redirect the client.
    Redirect {
        /// 301, 302, 303 or 307.
        status: u16,
        /// Target location.
        url: String,
    },
    /// Stop inspecting.
    Allow(AllowScope),
}

impl Disposition {
    /// Whether the disposition ends the transaction (skips to logging).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Block { .. } | Self::Deny { .. } | Self::Redirect { .. })
    }

    /// Status the host should answer with, if it must intervene.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Block { status } | Self::Deny { status, .. } | Self::Redirect { status, .. } => {
                Some(*status)
            }
            Self::Pass | Self::Allow(_) => None,
        }
    }

    /// Short name for logs and audit records.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Block { .. } => "block",
            Self::Deny { drop: true, .. } => "drop",
            Self::Deny { .. } => "deny",
            Self::Redirect { .. } => "redirect",
            Self::Allow(_) => "allow",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redirect { status, url } => write!(f, "redirect {} {}", status, url),
            other => match other.status() {
                Some(status) => write!(f, "{} {}", other.name(), status),
                None => f.write_str(other.name()),
            },
        }
    }
}

/// A terminal decision with the rule that made it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intervention {
    /// The terminal disposition.
    pub disposition: Disposition,
    /// Phase the decision was made in.
    pub phase: Phase,
    /// Deciding rule; `None` for body-limit decisions.
    pub rule_id: Option<u64>,
    /// Rendered message of the deciding rule.
    pub message: Option<String>,
}

impl Intervention {
    /// HTTP status to answer with.
    pub fn status(&self) -> u16 {
        self.disposition.status().unwrap_or(200)
    }

    /// Redirect target.
    pub fn url(&self) -> Option<&str> {
        match &self.disposition {
            Disposition::Redirect { url, .. } => Some(url),
            _ => None,
        }
    }

    /// Whether the connection should be dropped.
    pub fn is_drop(&self) -> bool {
        matches!(self.disposition, Disposition::Deny { drop: true, .. })
    }

    /// Format as a log entry.
    pub fn format_log(&self) -> String {
        let mut parts = vec![format!("[status {}]", self.status())];

        if let Some(id) = self.rule_id {
            parts.push(format!("[id \"{}\"]", id));
        }
        if let Some(ref msg) = self.message {
            parts.push(format!("[msg \"{}\"]", msg));
        }
        if let Some(url) = self.url() {
            parts.push(format!("[redirect \"{}\"]", url));
        }
        parts.push(format!("[phase {}]", self.phase));
        parts.push(format!("[action {}]", self.disposition.name()));

        parts.join(" ")
    }
}
