//! List operators (@pm, @pmFromFile, @within).

use super::{CompileContext, MacroExpander, OperatorResult};
use crate::error::{Error, Result};
use aho_corasick::AhoCorasick;

/// Phrase or list membership operator.
#[derive(Debug, Clone)]
pub enum ListOperator {
    /// Any phrase occurs in the input (case-insensitive).
    Phrases {
        /// Compiled automaton.
        automaton: AhoCorasick,
        /// Phrases by pattern id.
        phrases: Vec<String>,
    },
    /// The input equals one item of a whitespace/comma separated list.
    Within {
        /// List text, possibly containing macros.
        list: String,
    },
}

impl ListOperator {
    /// `@pm`: space-separated phrases.
    pub fn phrases(arg: &str) -> Result<Self> {
        build_phrases(arg.split_whitespace().map(str::to_string).collect())
    }

    /// `@pmFromFile`: one phrase per line, `#` comments, several files allowed.
    pub fn phrase_files(arg: &str, ctx: &CompileContext<'_>) -> Result<Self> {
        let mut phrases = Vec::new();
        for file in arg.split_whitespace() {
            let path = ctx.resolve(file);
            let content = std::fs::read_to_string(&path)
                .map_err(|source| Error::RuleFileLoad { path, source })?;
            phrases.extend(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(str::to_string),
            );
        }
        build_phrases(phrases)
    }

    /// `@within`
    pub fn within(arg: &str) -> Self {
        ListOperator::Within {
            list: arg.to_string(),
        }
    }

    /// Test `input`.
    pub fn execute(&self, input: &str, macros: &dyn MacroExpander) -> OperatorResult {
        match self {
            ListOperator::Phrases { automaton, phrases } => match automaton.find(input) {
                Some(m) => OperatorResult::matched(phrases[m.pattern().as_usize()].clone()),
                None => OperatorResult::no_match(),
            },
            ListOperator::Within { list } => {
                let list = macros.expand(list);
                let found = !input.is_empty()
                    && list
                        .split(|c: char| c.is_whitespace() || c == ',')
                        .any(|item| item == input);
                if found {
                    OperatorResult::matched(input)
                } else {
                    OperatorResult::no_match()
                }
            }
        }
    }
}

fn build_phrases(phrases: Vec<String>) -> Result<ListOperator> {
    if phrases.is_empty() {
        return Err(Error::PatternSet {
            message: "empty phrase list".to_string(),
        });
    }

    let automaton = AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(&phrases)
        .map_err(|e| Error::PatternSet {
            message: e.to_string(),
        })?;

    Ok(ListOperator::Phrases { automaton, phrases })
}
