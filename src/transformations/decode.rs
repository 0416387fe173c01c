//! Decoding transformations.
//!
//! Decoders never fail: malformed escapes are copied through unchanged.

use base64::Engine;
use std::borrow::Cow;

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    Some(hex_val(hi)? << 4 | hex_val(lo)?)
}

fn lossy(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

/// `urlDecode`: `%XX` escapes and `+` as space.
pub fn url_decode(input: &str) -> Cow<'_, str> {
    if !input.contains(['%', '+']) {
        return Cow::Borrowed(input);
    }
    let plus_decoded = input.replace('+', " ");
    let decoded = percent_encoding::percent_decode_str(&plus_decoded).decode_utf8_lossy();
    Cow::Owned(decoded.into_owned())
}

/// `urlDecodeUni`: like `urlDecode`, plus IIS-style `%uXXXX` escapes.
pub fn url_decode_uni(input: &str) -> Cow<'_, str> {
    if !input.contains(['%', '+']) {
        return Cow::Borrowed(input);
    }

    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if matches!(bytes.get(i + 1), Some(b'u' | b'U')) => {
                let code = bytes.get(i + 2..i + 6).and_then(|hex| {
                    hex.iter()
                        .try_fold(0u32, |acc, &b| hex_val(b).map(|v| acc << 4 | u32::from(v)))
                });
                match code.and_then(char::from_u32) {
                    Some(ch) => {
                        let mut buf = [0u8; 4];
                        out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                        i += 6;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'%' => {
                let byte = bytes
                    .get(i + 1)
                    .zip(bytes.get(i + 2))
                    .and_then(|(h, l)| hex_pair(*h, *l));
                match byte {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    Cow::Owned(lossy(out))
}

/// `base64Decode`: standard alphabet, padding optional. Invalid input is kept.
pub fn base64_decode(input: &str) -> Cow<'_, str> {
    let trimmed = input.trim_end_matches('=');
    match base64::engine::general_purpose::STANDARD_NO_PAD.decode(trimmed) {
        Ok(bytes) => Cow::Owned(lossy(bytes)),
        Err(_) => Cow::Borrowed(input),
    }
}

/// `hexDecode`: pairs of hex digits to bytes. Invalid input is kept.
pub fn hex_decode(input: &str) -> Cow<'_, str> {
    let bytes = input.as_bytes();
    if bytes.len() % 2 != 0 {
        return Cow::Borrowed(input);
    }
    let decoded: Option<Vec<u8>> = bytes
        .chunks_exact(2)
        .map(|pair| hex_pair(pair[0], pair[1]))
        .collect();
    match decoded {
        Some(out) => Cow::Owned(lossy(out)),
        None => Cow::Borrowed(input),
    }
}

/// `htmlEntityDecode`: named and numeric character references.
pub fn html_entity_decode(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }
    html_escape::decode_html_entities(input)
}

/// `jsDecode`: JavaScript escapes (`\n`, `\xHH`, `\uHHHH`, ...).
pub fn js_decode(input: &str) -> Cow<'_, str> {
    if !input.contains('\\') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('v') => out.push('\u{b}'),
            Some(esc @ ('x' | 'u')) => {
                let width = if esc == 'x' { 2 } else { 4 };
                let digits: String = chars.clone().take(width).collect();
                let decoded = (digits.len() == width)
                    .then(|| u32::from_str_radix(&digits, 16).ok())
                    .flatten()
                    .and_then(char::from_u32);
                match decoded {
                    Some(ch) => {
                        out.push(ch);
                        for _ in 0..width {
                            chars.next();
                        }
                    }
                    None => out.push(esc),
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }

    Cow::Owned(out)
}
