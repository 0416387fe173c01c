//! `multipart/form-data` parsing with strict-mode anomaly tracking.
//!
//! Parsing never aborts the transaction. Every deviation from a clean
//! RFC 7578 body raises a flag in [`MultipartFlags`]; unrecoverable
//! problems additionally produce a processor error message.

use crate::variables::Collection;

/// An uploaded file part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Form field name.
    pub field: String,
    /// File name as sent by the client.
    pub filename: String,
    /// Size of the part content.
    pub size: u64,
}

/// Multipart anomalies, exposed as `MULTIPART_*` variables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MultipartFlags {
    /// A line started with the boundary but did not match it.
    pub unmatched_boundary: bool,
    /// The boundary parameter was quoted.
    pub boundary_quoted: bool,
    /// Whitespace around or inside the boundary parameter.
    pub boundary_whitespace: bool,
    /// Content before the first boundary.
    pub data_before: bool,
    /// Content after the final boundary.
    pub data_after: bool,
    /// A part header used folding.
    pub header_folding: bool,
    /// A line ended in a bare LF.
    pub lf_line: bool,
    /// Both CRLF and bare LF line endings were seen.
    pub crlf_lf_lines: bool,
    /// Content-Disposition parameters without `;` between them.
    pub missing_semicolon: bool,
    /// Bad quoting in Content-Disposition.
    pub invalid_quoting: bool,
    /// A malformed part.
    pub invalid_part: bool,
    /// Folding without a header to continue.
    pub invalid_header_folding: bool,
    /// More file parts than the upload limit.
    pub file_limit_exceeded: bool,
}

impl MultipartFlags {
    /// Whether any anomaly was seen.
    pub fn any(&self) -> bool {
        self.unmatched_boundary
            || self.boundary_quoted
            || self.boundary_whitespace
            || self.data_before
            || self.data_after
            || self.header_folding
            || self.lf_line
            || self.crlf_lf_lines
            || self.missing_semicolon
            || self.invalid_quoting
            || self.invalid_part
            || self.invalid_header_folding
            || self.file_limit_exceeded
    }
}

/// Everything extracted from a multipart body.
#[derive(Debug, Clone, Default)]
pub struct MultipartData {
    /// Non-file fields (ARGS_POST).
    pub args: Collection,
    /// File parts within the upload limit.
    pub files: Vec<UploadedFile>,
    /// Field names of all parts (MULTIPART_NAME).
    pub names: Collection,
    /// File names by field (MULTIPART_FILENAME).
    pub filenames: Collection,
    /// Anomalies.
    pub flags: MultipartFlags,
}

#[derive(Default)]
struct Part {
    headers: Vec<(String, String)>,
    data: Vec<u8>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    Headers,
    Data,
    Epilogue,
}

struct Parser<'a> {
    boundary: &'a [u8],
    file_limit: usize,
    file_parts: usize,
    data: MultipartData,
    error: Option<String>,
}

/// Parse a multipart body. Returns the extracted data and the first
/// processor error, if any.
pub(super) fn parse(
    content_type: &str,
    body: &[u8],
    file_limit: usize,
) -> (MultipartData, Option<String>) {
    let mut flags = MultipartFlags::default();
    let boundary = match boundary(content_type, &mut flags) {
        Ok(b) => b,
        Err(message) => {
            return (
                MultipartData {
                    flags,
                    ..MultipartData::default()
                },
                Some(message),
            )
        }
    };

    let mut parser = Parser {
        boundary: boundary.as_bytes(),
        file_limit,
        file_parts: 0,
        data: MultipartData {
            flags,
            ..MultipartData::default()
        },
        error: None,
    };
    parser.run(body);
    (parser.data, parser.error)
}

/// Extract the boundary parameter from a Content-Type value.
fn boundary(content_type: &str, flags: &mut MultipartFlags) -> Result<String, String> {
    let mut found: Option<String> = None;

    for param in content_type.split(';').skip(1) {
        let param = param.trim_start();
        if param.len() < 8 || !param[..8].eq_ignore_ascii_case("boundary") {
            continue;
        }
        let rest = &param[8..];
        if rest.starts_with(char::is_whitespace) {
            flags.boundary_whitespace = true;
        }
        let Some(value) = rest.trim_start().strip_prefix('=') else {
            continue;
        };
        if value.starts_with(char::is_whitespace) {
            flags.boundary_whitespace = true;
        }
        let mut value = value.trim();

        if let Some(inner) = value.strip_prefix('"') {
            match inner.strip_suffix('"') {
                Some(unquoted) => {
                    flags.boundary_quoted = true;
                    value = unquoted;
                }
                None => return Err("Multipart: Invalid boundary in C-T (quote)".to_string()),
            }
        }
        if value.contains(char::is_whitespace) {
            flags.boundary_whitespace = true;
        }
        if value.is_empty() {
            return Err("Multipart: Invalid boundary in C-T (empty)".to_string());
        }
        if found.is_some() {
            return Err("Multipart: Multiple boundary parameters in C-T".to_string());
        }
        found = Some(value.to_string());
    }

    found.ok_or_else(|| "Multipart: Boundary not found in C-T".to_string())
}

enum Delimiter {
    Part,
    Final,
    Unmatched,
    None,
}

impl Parser<'_> {
    fn fail(&mut self, message: &str) {
        if self.error.is_none() {
            self.error = Some(message.to_string());
        }
    }

    fn delimiter(&self, line: &[u8]) -> Delimiter {
        let Some(rest) = line
            .strip_prefix(b"--")
            .and_then(|l| l.strip_prefix(self.boundary))
        else {
            return Delimiter::None;
        };
        let trimmed = trim_end_ws(rest);
        if trimmed.is_empty() {
            Delimiter::Part
        } else if trimmed == b"--" {
            Delimiter::Final
        } else {
            Delimiter::Unmatched
        }
    }

    fn run(&mut self, body: &[u8]) {
        let mut state = State::Preamble;
        let mut part = Part::default();
        let mut saw_crlf = false;
        let mut saw_lf = false;
        let mut pos = 0;

        while pos < body.len() {
            let (end, next) = match body[pos..].iter().position(|&b| b == b'\n') {
                Some(i) => (pos + i, pos + i + 1),
                None => (body.len(), body.len()),
            };
            let terminated = next > end;
            let raw = &body[pos..end];
            let (line, crlf) = match raw.strip_suffix(b"\r") {
                Some(l) => (l, true),
                None => (raw, false),
            };
            if terminated {
                if crlf {
                    saw_crlf = true;
                } else {
                    saw_lf = true;
                }
            }
            pos = next;

            let delimiter = self.delimiter(line);
            if matches!(delimiter, Delimiter::Unmatched) {
                self.data.flags.unmatched_boundary = true;
            }

            match (state, delimiter) {
                (State::Epilogue, _) => {
                    if !line.is_empty() {
                        self.data.flags.data_after = true;
                    }
                }
                (State::Preamble, Delimiter::Part) => state = State::Headers,
                (State::Preamble, Delimiter::Final) => {
                    self.data.flags.invalid_part = true;
                    state = State::Epilogue;
                }
                (State::Preamble, _) => {
                    if !line.is_empty() {
                        self.data.flags.data_before = true;
                    }
                }
                (State::Headers | State::Data, Delimiter::Part) => {
                    if state == State::Headers {
                        self.data.flags.invalid_part = true;
                    }
                    self.finish(std::mem::take(&mut part));
                    state = State::Headers;
                }
                (State::Headers | State::Data, Delimiter::Final) => {
                    if state == State::Headers {
                        self.data.flags.invalid_part = true;
                    }
                    self.finish(std::mem::take(&mut part));
                    state = State::Epilogue;
                }
                (State::Headers, _) => {
                    if line.is_empty() {
                        state = State::Data;
                    } else {
                        self.header_line(&mut part, line);
                    }
                }
                (State::Data, _) => {
                    part.data.extend_from_slice(raw);
                    if terminated {
                        part.data.push(b'\n');
                    }
                }
            }
        }

        self.data.flags.lf_line = saw_lf;
        self.data.flags.crlf_lf_lines = saw_lf && saw_crlf;

        match state {
            State::Epilogue => {}
            State::Preamble => self.fail("Multipart: No boundaries found in payload"),
            State::Headers | State::Data => {
                if state == State::Data {
                    self.finish(part);
                }
                self.fail("Multipart: Final boundary missing");
            }
        }
    }

    fn header_line(&mut self, part: &mut Part, line: &[u8]) {
        let line = String::from_utf8_lossy(line);

        if line.starts_with([' ', '\t']) {
            self.data.flags.header_folding = true;
            match part.headers.last_mut() {
                Some((_, value)) => {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                None => {
                    self.data.flags.invalid_header_folding = true;
                    self.data.flags.invalid_part = true;
                    self.fail("Multipart: Invalid part header (folding error)");
                }
            }
            return;
        }

        match line.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => {
                part.headers
                    .push((name.trim().to_string(), value.trim().to_string()));
            }
            _ => {
                self.data.flags.invalid_part = true;
                self.fail("Multipart: Invalid part header (colon missing)");
            }
        }
    }

    fn finish(&mut self, mut part: Part) {
        if part.data.ends_with(b"\r\n") {
            part.data.truncate(part.data.len() - 2);
        } else if part.data.ends_with(b"\n") {
            part.data.truncate(part.data.len() - 1);
        }

        let Some(disposition) = part
            .headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case("content-disposition"))
            .map(|(_, v)| v.clone())
        else {
            self.data.flags.invalid_part = true;
            self.fail("Multipart: Part missing Content-Disposition header");
            return;
        };

        let (name, filename) = match self.disposition(&disposition) {
            Some(parsed) => parsed,
            None => return,
        };

        self.data.names.add(name.clone(), name.clone());

        match filename {
            Some(filename) => {
                self.data.filenames.add(name.clone(), filename.clone());
                self.file_parts += 1;
                if self.file_parts > self.file_limit {
                    self.data.flags.file_limit_exceeded = true;
                    return;
                }
                self.data.files.push(UploadedFile {
                    field: name,
                    filename,
                    size: part.data.len() as u64,
                });
            }
            None => {
                let value = String::from_utf8_lossy(&part.data).into_owned();
                self.data.args.add(name, value);
            }
        }
    }

    /// Parse `form-data; name="x"; filename="y"`.
    fn disposition(&mut self, value: &str) -> Option<(String, Option<String>)> {
        let value = value.trim();
        let Some(mut rest) = value
            .get(..9)
            .filter(|p| p.eq_ignore_ascii_case("form-data"))
            .map(|_| &value[9..])
        else {
            self.data.flags.invalid_part = true;
            self.fail("Multipart: Content-Disposition is not form-data");
            return None;
        };

        let mut name = None;
        let mut filename = None;

        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }
            match rest.strip_prefix(';') {
                Some(r) => rest = r.trim_start(),
                None => self.data.flags.missing_semicolon = true,
            }
            if rest.is_empty() {
                break;
            }

            let Some(eq) = rest.find('=') else {
                self.data.flags.invalid_part = true;
                self.fail("Multipart: Invalid Content-Disposition parameter");
                return None;
            };
            let param = rest[..eq].trim().to_ascii_lowercase();
            rest = rest[eq + 1..].trim_start();

            let param_value = if let Some(quoted) = rest.strip_prefix('"') {
                match read_quoted(quoted) {
                    Some((v, remaining)) => {
                        rest = remaining;
                        v
                    }
                    None => {
                        self.data.flags.invalid_quoting = true;
                        self.fail("Multipart: Invalid quoting in Content-Disposition");
                        return None;
                    }
                }
            } else {
                let end = rest
                    .find(|c: char| c == ';' || c.is_whitespace())
                    .unwrap_or(rest.len());
                let token = &rest[..end];
                rest = &rest[end..];
                if token.contains(['"', '\'']) {
                    self.data.flags.invalid_quoting = true;
                }
                token.to_string()
            };

            let slot = match param.as_str() {
                "name" => &mut name,
                "filename" => &mut filename,
                _ => continue,
            };
            if slot.is_some() {
                self.data.flags.invalid_part = true;
                self.fail("Multipart: Duplicate Content-Disposition parameter");
                return None;
            }
            *slot = Some(param_value);
        }

        match name {
            Some(name) => Some((name, filename)),
            None => {
                self.data.flags.invalid_part = true;
                self.fail("Multipart: Content-Disposition without name");
                None
            }
        }
    }
}

/// Read up to the closing quote, honouring `\"` escapes.
fn read_quoted(input: &str) -> Option<(String, &str)> {
    let mut out = String::new();
    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, escaped)) => out.push(escaped),
                None => return None,
            },
            '"' => return Some((out, &input[i + 1..])),
            c => out.push(c),
        }
    }
    None
}

fn trim_end_ws(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !matches!(b, b' ' | b'\t'))
        .map_or(0, |i| i + 1);
    &bytes[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    const CT: &str = "multipart/form-data; boundary=XyZ";

    fn body(lines: &[&str]) -> Vec<u8> {
        lines.join("\r\n").into_bytes()
    }

    #[test]
    fn test_clean_body() {
        let b = body(&[
            "--XyZ",
            "Content-Disposition: form-data; name=\"user\"",
            "",
            "alice",
            "--XyZ",
            "Content-Disposition: form-data; name=\"doc\"; filename=\"a.txt\"",
            "Content-Type: text/plain",
            "",
            "line1",
            "line2",
            "--XyZ--",
            "",
        ]);
        let (data, error) = parse(CT, &b, 10);
        assert_eq!(error, None);
        assert!(!data.flags.any());
        assert_eq!(data.args.get("user"), Some("alice"));
        assert_eq!(
            data.files,
            vec![UploadedFile {
                field: "doc".into(),
                filename: "a.txt".into(),
                size: 12,
            }]
        );
        assert_eq!(data.names.len(), 2);
        assert_eq!(data.filenames.get("doc"), Some("a.txt"));
    }

    #[test]
    fn test_missing_boundary() {
        let (data, error) = parse("multipart/form-data", b"--x\r\n", 10);
        assert_eq!(error.as_deref(), Some("Multipart: Boundary not found in C-T"));
        assert!(!data.flags.any());
    }

    #[test]
    fn test_quoted_and_whitespace_boundary() {
        let mut flags = MultipartFlags::default();
        assert_eq!(boundary("multipart/form-data; boundary=\"abc\"", &mut flags).unwrap(), "abc");
        assert!(flags.boundary_quoted);

        let mut flags = MultipartFlags::default();
        assert_eq!(boundary("multipart/form-data; boundary = abc", &mut flags).unwrap(), "abc");
        assert!(flags.boundary_whitespace);

        let mut flags = MultipartFlags::default();
        assert!(boundary("multipart/form-data; boundary=a; boundary=b", &mut flags).is_err());
    }

    #[test]
    fn test_data_before_and_after() {
        let b = body(&[
            "junk",
            "--XyZ",
            "Content-Disposition: form-data; name=\"a\"",
            "",
            "1",
            "--XyZ--",
            "trailing",
        ]);
        let (data, error) = parse(CT, &b, 10);
        assert_eq!(error, None);
        assert!(data.flags.data_before);
        assert!(data.flags.data_after);
    }

    #[test]
    fn test_header_folding_and_semicolon() {
        let b = body(&[
            "--XyZ",
            "Content-Disposition: form-data;",
            " name=\"a\" filename=\"f\"",
            "",
            "x",
            "--XyZ--",
        ]);
        let (data, _) = parse(CT, &b, 10);
        assert!(data.flags.header_folding);
        assert!(data.flags.missing_semicolon);
        assert_eq!(data.files.len(), 1);
    }

    #[test]
    fn test_invalid_quoting_and_unmatched_boundary() {
        let b = body(&[
            "--XyZ",
            "Content-Disposition: form-data; name=\"a",
            "",
            "x",
            "--XyZextra",
            "--XyZ--",
        ]);
        let (data, error) = parse(CT, &b, 10);
        assert!(data.flags.invalid_quoting);
        assert!(data.flags.unmatched_boundary);
        assert!(error.is_some());
    }

    #[test]
    fn test_lf_lines_and_final_boundary_missing() {
        let b = b"--XyZ\nContent-Disposition: form-data; name=\"a\"\r\n\r\nvalue\n";
        let (data, error) = parse(CT, b, 10);
        assert!(data.flags.lf_line);
        assert!(data.flags.crlf_lf_lines);
        assert_eq!(error.as_deref(), Some("Multipart: Final boundary missing"));
        assert_eq!(data.args.get("a"), Some("value"));
    }

    #[test]
    fn test_file_limit() {
        let mut lines = Vec::new();
        for i in 0..3 {
            lines.push("--XyZ".to_string());
            lines.push(format!(
                "Content-Disposition: form-data; name=\"f{}\"; filename=\"{}.bin\"",
                i, i
            ));
            lines.push(String::new());
            lines.push("data".to_string());
        }
        lines.push("--XyZ--".to_string());
        let b = lines.join("\r\n").into_bytes();
        let (data, _) = parse(CT, &b, 2);
        assert!(data.flags.file_limit_exceeded);
        assert_eq!(data.files.len(), 2);
        assert_eq!(data.filenames.len(), 3);
    }
}
