//! Validation operators. They match when the input is *invalid*.

use super::CustomOperator;
use crate::error::{Error, Result};

/// `@validateByteRange 9,10,13,32-126`: match when any byte falls outside.
pub fn validate_byte_range(spec: &str) -> Result<CustomOperator> {
    let mut allowed = [false; 256];

    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (start, end) = match part.split_once('-') {
            Some((a, b)) => (a.trim().parse::<u8>(), b.trim().parse::<u8>()),
            None => (part.parse::<u8>(), part.parse::<u8>()),
        };
        match (start, end) {
            (Ok(start), Ok(end)) if start <= end => {
                for b in start..=end {
                    allowed[usize::from(b)] = true;
                }
            }
            _ => {
                return Err(Error::config(format!(
                    "@validateByteRange: invalid range '{}'",
                    part
                )))
            }
        }
    }

    Ok(CustomOperator::new("validateByteRange", move |input: &str| {
        input
            .bytes()
            .find(|b| !allowed[usize::from(*b)])
            .map(|b| format!("byte {}", b))
    }))
}

/// `@validateUrlEncoding`: match on a `%` not followed by two hex digits.
pub fn validate_url_encoding() -> CustomOperator {
    CustomOperator::new("validateUrlEncoding", |input: &str| {
        let bytes = input.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' {
                let valid = bytes.len() > i + 2
                    && bytes[i + 1].is_ascii_hexdigit()
                    && bytes[i + 2].is_ascii_hexdigit();
                if !valid {
                    return Some(input[i..].chars().take(3).collect());
                }
                i += 3;
            } else {
                i += 1;
            }
        }
        None
    })
}

/// `@validateUtf8Encoding`: match when the value carries replacement
/// characters left by lossy decoding of invalid UTF-8.
pub fn validate_utf8_encoding() -> CustomOperator {
    CustomOperator::new("validateUtf8Encoding", |input: &str| {
        input
            .contains(char::REPLACEMENT_CHARACTER)
            .then(|| input.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_range() {
        let op = validate_byte_range("9,10,13,32-126").unwrap();
        assert!(!op.execute("hello world").matched);
        let r = op.execute("a\u{1}b");
        assert!(r.matched);
        assert_eq!(r.matched_value.as_deref(), Some("byte 1"));
    }

    #[test]
    fn test_byte_range_rejects_bad_spec() {
        assert!(validate_byte_range("10-2").is_err());
        assert!(validate_byte_range("300").is_err());
    }

    #[test]
    fn test_url_encoding() {
        let op = validate_url_encoding();
        assert!(!op.execute("hello%20world").matched);
        assert!(op.execute("hello%2").matched);
        assert!(op.execute("hello%GG").matched);
    }

    #[test]
    fn test_utf8_encoding() {
        let op = validate_utf8_encoding();
        let lossy = String::from_utf8_lossy(&[b'a', 0xC0, 0xAF]).into_owned();
        assert!(op.execute(&lossy).matched);
        assert!(!op.execute("caf\u{e9}").matched);
    }
}
