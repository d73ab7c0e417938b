use std::fmt;

use thiserror::Error;

use crate::input::Input;

/// Everything a parse entry point can fail with. Parse failures are
/// recoverable; grammar errors are programming mistakes and are not.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Grammar(#[from] GrammarError),
}

/// Grammar misconfiguration, surfaced as soon as it is hit.
#[derive(Debug, Clone, Error)]
pub enum GrammarError {
    #[error("no rule named {name:?} is reachable from grammar {grammar}")]
    UnresolvedRule { name: String, grammar: String },
    #[error("rule {name} is not attached to a grammar")]
    DetachedRule { name: String },
    #[error("grammar {grammar} has no rules")]
    EmptyGrammar { grammar: String },
    #[error("root rule {root:?} is not defined in grammar {grammar}")]
    UnknownRoot { root: String, grammar: String },
    #[error("left recursion detected in {rule} at offset {offset}")]
    LeftRecursion { rule: String, offset: usize },
    #[error("pattern /{pattern}/ failed to compile: {source}")]
    RegexCompile {
        pattern: String,
        source: regex::Error,
    },
}

/// A failed parse: the root rule did not match, or full consumption was
/// required and the match fell short. Carries a copy of the input and the
/// furthest offset reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    input: String,
    max_offset: usize,
}

impl ParseError {
    pub(crate) fn from_input(input: &Input<'_>) -> Self {
        ParseError {
            input: input.text().to_string(),
            max_offset: input.max_offset(),
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn len(&self) -> usize {
        self.input.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    pub fn max_offset(&self) -> usize {
        self.max_offset
    }

    /// The input up to the furthest offset reached.
    pub fn consumed(&self) -> &str {
        let mut end = self.max_offset.min(self.input.len());
        while !self.input.is_char_boundary(end) {
            end -= 1;
        }
        &self.input[..end]
    }

    /// 1-based line and column of the furthest offset reached.
    pub fn line_and_column(&self) -> (usize, usize) {
        let consumed = self.consumed();
        let line_start = consumed.rfind('\n').map_or(0, |at| at + 1);
        (consumed.matches('\n').count() + 1, consumed.len() - line_start + 1)
    }

    fn tail(&self) -> &str {
        let consumed = self.consumed();
        if consumed.len() <= 40 {
            return consumed;
        }
        let mut start = consumed.len() - 40;
        while !consumed.is_char_boundary(start) {
            start += 1;
        }
        &consumed[start..]
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to parse input at offset {}, just after {:?}",
            self.max_offset,
            self.tail()
        )
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_at(input: &str, max_offset: usize) -> ParseError {
        ParseError {
            input: input.to_string(),
            max_offset,
        }
    }

    #[test]
    fn message_quotes_the_consumed_tail() {
        let error = error_at("1234", 3);
        assert_eq!(
            error.to_string(),
            "Failed to parse input at offset 3, just after \"123\""
        );
    }

    #[test]
    fn message_truncates_long_prefixes_to_forty() {
        let input = "x".repeat(60);
        let error = error_at(&input, 50);
        assert_eq!(
            error.to_string(),
            format!("Failed to parse input at offset 50, just after {:?}", "x".repeat(40))
        );
    }

    #[test]
    fn consumed_is_the_prefix_up_to_max_offset() {
        let error = error_at("abcdef", 4);
        assert_eq!(error.consumed(), "abcd");
        assert_eq!(error.len(), 6);
        assert_eq!(error.input(), "abcdef");
    }

    #[test]
    fn line_and_column_count_from_one() {
        assert_eq!(error_at("abc", 2).line_and_column(), (1, 3));
        assert_eq!(error_at("ab\ncd", 4).line_and_column(), (2, 2));
        assert_eq!(error_at("ab\n", 3).line_and_column(), (2, 1));
        assert_eq!(error_at("", 0).line_and_column(), (1, 1));
    }

    #[test]
    fn grammar_errors_render_their_context() {
        let error = GrammarError::UnresolvedRule {
            name: "digit".to_string(),
            grammar: "Number".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "no rule named \"digit\" is reachable from grammar Number"
        );
    }
}
