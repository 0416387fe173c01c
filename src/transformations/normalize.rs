//! Normalization transformations.

use std::borrow::Cow;

fn owned_if_changed<'a>(input: &'a str, output: String) -> Cow<'a, str> {
    if output == input {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(output)
    }
}

/// `lowercase`
pub fn lowercase(input: &str) -> Cow<'_, str> {
    if input.chars().any(char::is_uppercase) {
        Cow::Owned(input.to_lowercase())
    } else {
        Cow::Borrowed(input)
    }
}

/// `uppercase`
pub fn uppercase(input: &str) -> Cow<'_, str> {
    if input.chars().any(char::is_lowercase) {
        Cow::Owned(input.to_uppercase())
    } else {
        Cow::Borrowed(input)
    }
}

/// `trim`
pub fn trim(input: &str) -> Cow<'_, str> {
    Cow::Borrowed(input.trim())
}

/// `trimLeft`
pub fn trim_left(input: &str) -> Cow<'_, str> {
    Cow::Borrowed(input.trim_start())
}

/// `trimRight`
pub fn trim_right(input: &str) -> Cow<'_, str> {
    Cow::Borrowed(input.trim_end())
}

/// `compressWhitespace`: every whitespace run becomes one space.
pub fn compress_whitespace(input: &str) -> Cow<'_, str> {
    let mut out = String::with_capacity(input.len());
    let mut in_run = false;
    for c in input.chars() {
        if c.is_whitespace() {
            if !in_run {
                out.push(' ');
            }
            in_run = true;
        } else {
            out.push(c);
            in_run = false;
        }
    }
    owned_if_changed(input, out)
}

/// `removeWhitespace`
pub fn remove_whitespace(input: &str) -> Cow<'_, str> {
    if !input.chars().any(char::is_whitespace) {
        return Cow::Borrowed(input);
    }
    Cow::Owned(input.chars().filter(|c| !c.is_whitespace()).collect())
}

/// `removeNulls`
pub fn remove_nulls(input: &str) -> Cow<'_, str> {
    if !input.contains('\0') {
        return Cow::Borrowed(input);
    }
    Cow::Owned(input.replace('\0', ""))
}

/// `replaceNulls`: NUL bytes become spaces.
pub fn replace_nulls(input: &str) -> Cow<'_, str> {
    if !input.contains('\0') {
        return Cow::Borrowed(input);
    }
    Cow::Owned(input.replace('\0', " "))
}

/// `normalizePath`: collapse `//`, resolve `.` and `..` segments.
///
/// `..` never climbs above the root of an absolute path. A trailing slash is
/// preserved.
pub fn normalize_path(input: &str) -> Cow<'_, str> {
    if input.is_empty() {
        return Cow::Borrowed(input);
    }

    let absolute = input.starts_with('/');
    let trailing = input.ends_with('/') || input.ends_with("/.") || input.ends_with("/..");
    let mut segments: Vec<&str> = Vec::new();

    for seg in input.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if matches!(segments.last(), Some(s) if *s != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            s => segments.push(s),
        }
    }

    let mut out = String::with_capacity(input.len());
    if absolute {
        out.push('/');
    }
    out.push_str(&segments.join("/"));
    if trailing && !segments.is_empty() {
        out.push('/');
    }
    owned_if_changed(input, out)
}

/// `normalizePathWin`: backslashes become slashes, then `normalizePath`.
pub fn normalize_path_win(input: &str) -> Cow<'_, str> {
    if !input.contains('\\') {
        return normalize_path(input);
    }
    let slashed = input.replace('\\', "/");
    Cow::Owned(normalize_path(&slashed).into_owned())
}

/// `removeComments`: drops `/* */`, `<!-- -->`, and `--`/`#` to end of input.
pub fn remove_comments(input: &str) -> Cow<'_, str> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("/*") {
            rest = after.find("*/").map(|i| &after[i + 2..]).unwrap_or("");
        } else if let Some(after) = rest.strip_prefix("<!--") {
            rest = after.find("-->").map(|i| &after[i + 3..]).unwrap_or("");
        } else if rest.starts_with("--") || rest.starts_with('#') {
            break;
        } else {
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                out.push(c);
            }
            rest = chars.as_str();
        }
    }

    owned_if_changed(input, out)
}

/// `cmdLine`: shell-evasion normalization.
///
/// Drops `\ " ' ^`, turns `,` and `;` into spaces, collapses whitespace,
/// removes spaces before `/` and `(`, and lower-cases.
pub fn cmd_line(input: &str) -> Cow<'_, str> {
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;

    for c in input.chars() {
        match c {
            '\\' | '"' | '\'' | '^' => {}
            ',' | ';' => pending_space = true,
            c if c.is_whitespace() => pending_space = true,
            '/' | '(' => {
                pending_space = false;
                out.push(c);
            }
            c => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.extend(c.to_lowercase());
            }
        }
    }

    owned_if_changed(input, out)
}
