//! Metadata actions (id, msg, severity, tag, etc.).

use crate::engine::Phase;
use crate::parser::MetadataAction;

/// Syslog-style severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Severity {
    /// 0
    Emergency = 0,
    /// 1
    Alert = 1,
    /// 2
    Critical = 2,
    /// 3
    Error = 3,
    /// 4
    Warning = 4,
    /// 5
    Notice = 5,
    /// 6
    Info = 6,
    /// 7
    Debug = 7,
}

impl From<u8> for Severity {
    fn from(value: u8) -> Self {
        match value {
            0 => Severity::Emergency,
            1 => Severity::Alert,
            2 => Severity::Critical,
            3 => Severity::Error,
            4 => Severity::Warning,
            5 => Severity::Notice,
            6 => Severity::Info,
            _ => Severity::Debug,
        }
    }
}

impl Severity {
    /// Upper-case name.
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Emergency => "EMERGENCY",
            Severity::Alert => "ALERT",
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Notice => "NOTICE",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
        }
    }
}

/// Descriptive rule data. `msg` and `logdata` are macro templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleMetadata {
    /// Rule id.
    pub id: Option<u64>,
    /// Declared phase.
    pub phase: Option<Phase>,
    /// Message template.
    pub msg: Option<String>,
    /// Log data template.
    pub logdata: Option<String>,
    /// Severity (0-7).
    pub severity: Option<u8>,
    /// Tags.
    pub tags: Vec<String>,
    /// Revision.
    pub rev: Option<String>,
    /// Version.
    pub ver: Option<String>,
    /// Maturity level.
    pub maturity: Option<u8>,
    /// Accuracy level.
    pub accuracy: Option<u8>,
}

impl RuleMetadata {
    /// Record one metadata action. Returns `false` for `status`, which is
    /// not metadata.
    pub(super) fn apply(&mut self, action: &MetadataAction) -> bool {
        match action {
            MetadataAction::Id(id) => self.id = Some(*id),
            MetadataAction::Phase(p) => self.phase = Some(*p),
            MetadataAction::Msg(msg) => self.msg = Some(msg.clone()),
            MetadataAction::LogData(data) => self.logdata = Some(data.clone()),
            MetadataAction::Severity(sev) => self.severity = Some(*sev),
            MetadataAction::Tag(tag) => self.tags.push(tag.clone()),
            MetadataAction::Rev(rev) => self.rev = Some(rev.clone()),
            MetadataAction::Ver(ver) => self.ver = Some(ver.clone()),
            MetadataAction::Maturity(m) => self.maturity = Some(*m),
            MetadataAction::Accuracy(a) => self.accuracy = Some(*a),
            MetadataAction::Status(_) => return false,
        }
        true
    }

    /// Severity as enum.
    pub fn severity_level(&self) -> Option<Severity> {
        self.severity.map(Severity::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_from_u8() {
        assert_eq!(Severity::from(0), Severity::Emergency);
        assert_eq!(Severity::from(2), Severity::Critical);
        assert_eq!(Severity::from(99), Severity::Debug);
        assert!(Severity::Critical < Severity::Warning);
    }

    #[test]
    fn test_apply_collects_tags() {
        let mut meta = RuleMetadata::default();
        assert!(meta.apply(&MetadataAction::Tag("a".into())));
        assert!(meta.apply(&MetadataAction::Tag("b".into())));
        assert!(meta.apply(&MetadataAction::Severity(2)));
        assert!(!meta.apply(&MetadataAction::Status(403)));
        assert_eq!(meta.tags, vec!["a", "b"]);
        assert_eq!(meta.severity_level(), Some(Severity::Critical));
    }
}
