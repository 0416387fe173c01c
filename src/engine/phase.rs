//! Transaction phases.

use serde::{Serialize, Serializer};
use std::fmt;

/// The five inspection phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum Phase {
    /// Phase 1: request line and headers.
    #[default]
    RequestHeaders = 1,
    /// Phase 2: request body.
    RequestBody = 2,
    /// Phase 3: response status and headers.
    ResponseHeaders = 3,
    /// Phase 4: response body.
    ResponseBody = 4,
    /// Phase 5: logging. Never changes the disposition.
    Logging = 5,
}

impl Phase {
    /// All phases, in order.
    pub const ALL: [Phase; 5] = [
        Phase::RequestHeaders,
        Phase::RequestBody,
        Phase::ResponseHeaders,
        Phase::ResponseBody,
        Phase::Logging,
    ];

    /// Phase number, 1 to 5.
    pub fn number(&self) -> u8 {
        *self as u8
    }

    /// Zero-based slot for per-phase tables.
    pub fn index(&self) -> usize {
        usize::from(self.number() - 1)
    }

    /// Upper-case name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Phase::RequestHeaders => "REQUEST_HEADERS",
            Phase::RequestBody => "REQUEST_BODY",
            Phase::ResponseHeaders => "RESPONSE_HEADERS",
            Phase::ResponseBody => "RESPONSE_BODY",
            Phase::Logging => "LOGGING",
        }
    }

    /// Phase for a number, if in range.
    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.get(usize::from(n).checked_sub(1)?).copied()
    }

    /// The phase after this one.
    pub fn next(&self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    /// Whether this phase inspects the request.
    pub fn is_request_phase(&self) -> bool {
        matches!(self, Phase::RequestHeaders | Phase::RequestBody)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl Serialize for Phase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.number())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbering() {
        for (i, phase) in Phase::ALL.iter().enumerate() {
            assert_eq!(phase.index(), i);
            assert_eq!(Phase::from_number(phase.number()), Some(*phase));
        }
        assert_eq!(Phase::from_number(0), None);
        assert_eq!(Phase::from_number(6), None);
    }

    #[test]
    fn test_order_and_next() {
        assert!(Phase::RequestHeaders < Phase::Logging);
        assert_eq!(Phase::RequestBody.next(), Some(Phase::ResponseHeaders));
        assert_eq!(Phase::Logging.next(), None);
        assert!(Phase::RequestBody.is_request_phase());
        assert!(!Phase::ResponseHeaders.is_request_phase());
    }

    #[test]
    fn test_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Phase::ResponseBody).unwrap(), "4");
    }
}
