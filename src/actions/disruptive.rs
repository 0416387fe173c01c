//! Disruptive action resolution.

use crate::engine::Disposition;
use crate::operators::MacroExpander;
use crate::parser::DisruptiveAction;

/// Status used by `deny` and `drop` without an explicit `status`.
pub const DEFAULT_DENY_STATUS: u16 = 403;

/// Status used by `redirect` unless `status` is another redirect code.
pub const DEFAULT_REDIRECT_STATUS: u16 = 302;

/// The phase default a `block` resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTarget {
    /// Disruptive action of the default template.
    pub action: DisruptiveAction,
    /// Status of the default template.
    pub status: Option<u16>,
}

/// Turn a disruptive action into a disposition.
///
/// `block` takes the phase default; when that default is itself `block`,
/// or there is none, nothing is blocked. A blocking default is reported
/// as [`Disposition::Block`].
pub fn resolve(
    action: &DisruptiveAction,
    status: Option<u16>,
    block: Option<&BlockTarget>,
    macros: &dyn MacroExpander,
) -> Disposition {
    match action {
        DisruptiveAction::Deny => Disposition::Deny {
            status: status.unwrap_or(DEFAULT_DENY_STATUS),
            drop: false,
        },
        DisruptiveAction::Drop => Disposition::Deny {
            status: status.unwrap_or(DEFAULT_DENY_STATUS),
            drop: true,
        },
        DisruptiveAction::Pass => Disposition::Pass,
        DisruptiveAction::Allow(scope) => Disposition::Allow(*scope),
        DisruptiveAction::Redirect(url) => Disposition::Redirect {
            status: match status {
                Some(s @ (301 | 302 | 303 | 307)) => s,
                _ => DEFAULT_REDIRECT_STATUS,
            },
            url: macros.expand(url).into_owned(),
        },
        DisruptiveAction::Block => match block {
            Some(target) if target.action != DisruptiveAction::Block => {
                match resolve(&target.action, status.or(target.status), None, macros) {
                    Disposition::Deny { status, drop: false } => Disposition::Block { status },
                    other => other,
                }
            }
            _ => Disposition::Pass,
        },
    }
}
