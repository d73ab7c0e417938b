//! A packrat PEG engine: a memoizing recursive-descent recognizer over
//! composable grammars.
//!
//! A parse either yields a tree of [`Match`] nodes borrowing the input, or a
//! [`ParseError`] reporting the furthest offset reached. Every rule dispatch
//! goes through a per-parse cache keyed by rule identity and offset, with
//! failures cached alongside successes, so a parse runs in linear time in the
//! input length for a fixed grammar. Left recursion is detected and reported
//! as a [`GrammarError`] instead of overflowing the stack.
//!
//! ```
//! use packrat_peg::{alias, alt, seq, zero_or_more, Grammar};
//!
//! let grammar = Grammar::build(|g| {
//!     g.define("list", seq!["(", zero_or_more(alias("item")), ")"]);
//!     g.define("item", alt!["a", "b"]);
//! });
//!
//! let matched = grammar.parse("(aab)").unwrap();
//! assert_eq!(matched.text(), "(aab)");
//! assert_eq!(matched.find("item", true).len(), 3);
//! ```

pub mod error;
pub mod grammar;
pub mod input;
pub mod matching;
pub mod rule;

pub use error::{Error, GrammarError, ParseError};
pub use grammar::{Grammar, ParseOptions};
pub use input::Input;
pub use matching::{Extension, Match};
pub use rule::{
    alias, alt, and_pred, label, literal, not_pred, one_or_more, optional, regex, rep, seq,
    super_ref, zero_or_more, Rule, RuleId,
};
