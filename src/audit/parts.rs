//! Audit log part selection (`SecAuditLogParts`).

use crate::error::{Error, Result};
use std::fmt;

/// One audit log part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuditPart {
    /// A: record header (always present).
    Header,
    /// B: request line and headers.
    RequestHeaders,
    /// C: request body.
    RequestBody,
    /// D: reserved.
    IntermediaryResponseHeaders,
    /// E: response body.
    ResponseBody,
    /// F: response status line and headers.
    ResponseHeaders,
    /// G: reserved.
    IntermediaryResponseBody,
    /// H: trailer with messages, disposition and stopwatch.
    Trailer,
    /// I: request body with file contents elided.
    ReducedRequestBody,
    /// J: uploaded file list.
    Files,
    /// K: matched rules.
    MatchedRules,
    /// Z: end of record (always present).
    End,
}

const ORDER: [AuditPart; 12] = [
    AuditPart::Header,
    AuditPart::RequestHeaders,
    AuditPart::RequestBody,
    AuditPart::IntermediaryResponseHeaders,
    AuditPart::ResponseBody,
    AuditPart::ResponseHeaders,
    AuditPart::IntermediaryResponseBody,
    AuditPart::Trailer,
    AuditPart::ReducedRequestBody,
    AuditPart::Files,
    AuditPart::MatchedRules,
    AuditPart::End,
];

impl AuditPart {
    /// Part for a code letter.
    pub fn from_code(code: char) -> Option<Self> {
        let part = match code.to_ascii_uppercase() {
            'A' => Self::Header,
            'B' => Self::RequestHeaders,
            'C' => Self::RequestBody,
            'D' => Self::IntermediaryResponseHeaders,
            'E' => Self::ResponseBody,
            'F' => Self::ResponseHeaders,
            'G' => Self::IntermediaryResponseBody,
            'H' => Self::Trailer,
            'I' => Self::ReducedRequestBody,
            'J' => Self::Files,
            'K' => Self::MatchedRules,
            'Z' => Self::End,
            _ => return None,
        };
        Some(part)
    }

    /// Code letter.
    pub fn code(&self) -> char {
        match self {
            Self::Header => 'A',
            Self::RequestHeaders => 'B',
            Self::RequestBody => 'C',
            Self::IntermediaryResponseHeaders => 'D',
            Self::ResponseBody => 'E',
            Self::ResponseHeaders => 'F',
            Self::IntermediaryResponseBody => 'G',
            Self::Trailer => 'H',
            Self::ReducedRequestBody => 'I',
            Self::Files => 'J',
            Self::MatchedRules => 'K',
            Self::End => 'Z',
        }
    }

    fn bit(&self) -> u16 {
        1 << (*self as u16)
    }
}

/// A set of audit parts. `A` and `Z` are always included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditParts(u16);

impl AuditParts {
    /// Parse a code string such as `ABIJDEFHZ`.
    pub fn parse(codes: &str) -> Result<Self> {
        let mut set = Self::minimal();
        for c in codes.trim().chars() {
            let part = AuditPart::from_code(c).ok_or_else(|| {
                Error::config(format!("SecAuditLogParts: unknown part code '{}'", c))
            })?;
            set.0 |= part.bit();
        }
        Ok(set)
    }

    /// Only `A` and `Z`.
    pub fn minimal() -> Self {
        Self(AuditPart::Header.bit() | AuditPart::End.bit())
    }

    /// Whether `part` is selected.
    pub fn contains(&self, part: AuditPart) -> bool {
        self.0 & part.bit() != 0
    }

    /// Selected parts in record order.
    pub fn iter(&self) -> impl Iterator<Item = AuditPart> + '_ {
        ORDER.into_iter().filter(|p| self.contains(*p))
    }
}

impl Default for AuditParts {
    fn default() -> Self {
        Self::minimal().with_codes("BIJDEFH")
    }
}

impl AuditParts {
    fn with_codes(mut self, codes: &str) -> Self {
        for part in codes.chars().filter_map(AuditPart::from_code) {
            self.0 |= part.bit();
        }
        self
    }
}

impl fmt::Display for AuditParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.iter().try_for_each(|p| write!(f, "{}", p.code()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_a_and_z_always_present() {
        let parts = AuditParts::parse("BH").unwrap();
        assert!(parts.contains(AuditPart::Header));
        assert!(parts.contains(AuditPart::End));
        assert!(!parts.contains(AuditPart::RequestBody));
        assert_eq!(parts.to_string(), "ABHZ");
    }

    #[test]
    fn test_default_parts() {
        assert_eq!(AuditParts::default().to_string(), "ABDEFHIJZ");
    }

    #[test]
    fn test_unknown_code() {
        assert!(matches!(AuditParts::parse("ABX"), Err(Error::Config { .. })));
        assert!(AuditParts::parse("abk").unwrap().contains(AuditPart::MatchedRules));
    }
}
