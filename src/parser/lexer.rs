//! Lexer for the directive language.
//!
//! The input is folded into logical lines first (a backslash directly before a
//! newline joins the next physical line), then every logical line is split
//! into bare words and quoted strings.

/// A token on a logical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// An unquoted word.
    Word(String),
    /// A single- or double-quoted string, quotes removed.
    Quoted(String),
}

impl Token {
    /// Text content of the token.
    pub fn text(&self) -> &str {
        match self {
            Token::Word(s) | Token::Quoted(s) => s,
        }
    }

    /// Consume the token and return its text.
    pub fn into_text(self) -> String {
        match self {
            Token::Word(s) | Token::Quoted(s) => s,
        }
    }

    /// Whether the token was quoted in the source.
    pub fn is_quoted(&self) -> bool {
        matches!(self, Token::Quoted(_))
    }
}

/// One directive worth of tokens.
#[derive(Debug, Clone)]
pub struct LogicalLine {
    /// Physical line (1-indexed) where the logical line starts.
    pub line: usize,
    /// Tokens in order.
    pub tokens: Vec<Token>,
}

/// Lexing failure: physical line and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    /// Line where the failing logical line starts.
    pub line: usize,
    /// What went wrong.
    pub message: String,
}

/// Split configuration text into logical lines of tokens.
///
/// Comment lines and blank lines are dropped.
pub fn logical_lines(input: &str) -> Result<Vec<LogicalLine>, LexError> {
    let mut lines = Vec::new();
    let mut pending = String::new();
    let mut start_line = 0;

    for (idx, raw) in input.lines().enumerate() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if pending.is_empty() {
            start_line = idx + 1;
            if raw.trim_start().starts_with('#') {
                continue;
            }
        }

        if let Some(head) = raw.strip_suffix('\\') {
            pending.push_str(head);
            continue;
        }

        pending.push_str(raw);
        push_line(&mut lines, &pending, start_line)?;
        pending.clear();
    }

    if !pending.is_empty() {
        push_line(&mut lines, &pending, start_line)?;
    }

    Ok(lines)
}

fn push_line(lines: &mut Vec<LogicalLine>, text: &str, line: usize) -> Result<(), LexError> {
    let tokens = tokenize(text).map_err(|message| LexError { line, message })?;
    if !tokens.is_empty() {
        lines.push(LogicalLine { line, tokens });
    }
    Ok(())
}

/// Split one logical line into tokens.
fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' || c == '\'' {
            chars.next();
            let mut s = String::new();
            let mut closed = false;
            while let Some(ch) = chars.next() {
                if ch == '\\' && chars.peek() == Some(&c) {
                    s.push(c);
                    chars.next();
                } else if ch == c {
                    closed = true;
                    break;
                } else {
                    s.push(ch);
                }
            }
            if !closed {
                return Err(format!("unterminated {} quoted string", c));
            }
            tokens.push(Token::Quoted(s));
            continue;
        }

        let mut word = String::new();
        while let Some(&ch) = chars.peek() {
            if ch.is_whitespace() {
                break;
            }
            word.push(ch);
            chars.next();
        }
        tokens.push(Token::Word(word));
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_rule() {
        let lines =
            logical_lines(r#"SecRule REQUEST_URI "@contains /admin" "id:1,deny""#).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0].tokens,
            vec![
                Token::Word("SecRule".into()),
                Token::Word("REQUEST_URI".into()),
                Token::Quoted("@contains /admin".into()),
                Token::Quoted("id:1,deny".into()),
            ]
        );
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let lines = logical_lines("# comment\n\n   # indented\nSecRuleEngine On\n").unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].line, 4);
    }

    #[test]
    fn test_continuation() {
        let input = "SecRule REQUEST_URI \\\n    \"@rx ^/a\" \\\n    \"id:1,\\\n    deny\"";
        let lines = logical_lines(input).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].tokens.len(), 4);
        assert_eq!(lines[0].tokens[3].text(), "id:1,    deny");
    }

    #[test]
    fn test_continuation_inside_word() {
        let lines = logical_lines("Sec\\\nRule").unwrap();
        assert_eq!(lines[0].tokens[0].text(), "SecRule");
    }

    #[test]
    fn test_escaped_quote_keeps_other_escapes() {
        let lines = logical_lines(r#"SecRule ARGS "@rx \d+\"x" "id:1""#).unwrap();
        assert_eq!(lines[0].tokens[2].text(), r#"@rx \d+"x"#);
    }

    #[test]
    fn test_unterminated_quote() {
        let err = logical_lines("SecRule ARGS \"@rx abc").unwrap_err();
        assert_eq!(err.line, 1);
    }
}
