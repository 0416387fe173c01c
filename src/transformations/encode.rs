//! Encoding and hashing transformations.

use base64::Engine;
use md5::Md5;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha1::{Digest, Sha1};
use std::borrow::Cow;
use std::fmt::Write;

/// Characters left alone by `urlEncode`.
const URL_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// `base64Encode`
pub fn base64_encode(input: &str) -> Cow<'_, str> {
    Cow::Owned(base64::engine::general_purpose::STANDARD.encode(input))
}

/// `hexEncode` (lower-case digits).
pub fn hex_encode(input: &str) -> Cow<'_, str> {
    Cow::Owned(to_hex(input.as_bytes()))
}

/// `urlEncode`
pub fn url_encode(input: &str) -> Cow<'_, str> {
    utf8_percent_encode(input, URL_ENCODE_SET).into()
}

/// `md5`, rendered as lower-case hex.
pub fn md5(input: &str) -> Cow<'_, str> {
    Cow::Owned(to_hex(&Md5::digest(input.as_bytes())))
}

/// `sha1`, rendered as lower-case hex.
pub fn sha1(input: &str) -> Cow<'_, str> {
    Cow::Owned(to_hex(&Sha1::digest(input.as_bytes())))
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_encode() {
        assert_eq!(base64_encode("hello"), "aGVsbG8=");
    }

    #[test]
    fn test_hex_encode() {
        assert_eq!(hex_encode("AB"), "4142");
    }

    #[test]
    fn test_url_encode() {
        assert_eq!(url_encode("a b/c"), "a%20b%2Fc");
        assert!(matches!(url_encode("plain-text_1.0"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_md5() {
        assert_eq!(md5("hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_sha1() {
        assert_eq!(sha1("hello"), "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
    }
}
