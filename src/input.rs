use std::collections::HashMap;

use log::{debug, trace};

use crate::error::GrammarError;
use crate::matching::Match;
use crate::rule::{Rule, RuleId};

enum CacheEntry<'i> {
    // the rule is being evaluated at this offset higher up the call stack
    InProgress,
    Done(Option<Match<'i>>),
}

/// An input string together with the per-parse packrat state. All rule
/// dispatch goes through [`match_rule`](Input::match_rule), which memoizes
/// successes and failures alike per `(rule, offset)`.
pub struct Input<'i> {
    text: &'i str,
    cache: HashMap<RuleId, HashMap<usize, CacheEntry<'i>>>,
    cache_hits: u64,
    max_offset: usize,
    depth: usize,
}

impl<'i> Input<'i> {
    pub fn new(text: &'i str) -> Self {
        Input {
            text,
            cache: HashMap::new(),
            cache_hits: 0,
            max_offset: 0,
            depth: 0,
        }
    }

    pub fn text(&self) -> &'i str {
        self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The furthest offset any match attempt has reached.
    pub fn max_offset(&self) -> usize {
        self.max_offset
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }

    /// Match `rule` at `offset`, memoized. `Ok(None)` is an ordinary parse
    /// failure; `Err` is grammar misconfiguration and aborts the parse.
    pub fn match_rule(
        &mut self,
        rule: &Rule,
        offset: usize,
    ) -> Result<Option<Match<'i>>, GrammarError> {
        if offset > self.max_offset {
            self.max_offset = offset;
        }
        match self.cache.get(&rule.id()).and_then(|slots| slots.get(&offset)) {
            Some(CacheEntry::Done(result)) => {
                self.cache_hits += 1;
                trace!("{}cached {} @ {}", "│".repeat(self.depth), rule, offset);
                return Ok(result.clone());
            }
            Some(CacheEntry::InProgress) => {
                return Err(GrammarError::LeftRecursion {
                    rule: rule.describe(),
                    offset,
                });
            }
            None => {}
        }

        self.cache
            .entry(rule.id())
            .or_default()
            .insert(offset, CacheEntry::InProgress);
        debug!("{}trying {} @ {}", "│".repeat(self.depth), rule, offset);
        self.depth += 1;
        let outcome = rule.match_at(self, offset);
        self.depth -= 1;
        let result = outcome?;

        match &result {
            Some(matched) => {
                let end = offset + matched.len();
                if end > self.max_offset {
                    self.max_offset = end;
                }
                debug!(
                    "{}└matched {} @ {}..{}",
                    "│".repeat(self.depth),
                    rule,
                    offset,
                    end
                );
            }
            None => debug!("{}└failed {} @ {}", "│".repeat(self.depth), rule, offset),
        }
        self.cache
            .entry(rule.id())
            .or_default()
            .insert(offset, CacheEntry::Done(result.clone()));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{literal, not_pred};
    use crate::{alt, seq};

    #[test]
    fn successes_are_cached_per_rule_and_offset() {
        let shared = literal("a");
        let rule = alt![
            seq![shared.clone(), literal("x")],
            seq![shared.clone(), literal("y")]
        ];
        let mut input = Input::new("ay");
        let matched = input.match_rule(&rule, 0).unwrap().unwrap();
        assert_eq!(matched.text(), "ay");
        // the second alternative re-asks for `shared` at offset 0
        assert_eq!(input.cache_hits(), 1);
    }

    #[test]
    fn failures_are_cached_too() {
        let shared = literal("b");
        let rule = alt![shared.clone(), shared.clone()];
        let mut input = Input::new("a");
        assert!(input.match_rule(&rule, 0).unwrap().is_none());
        assert_eq!(input.cache_hits(), 1);
    }

    #[test]
    fn repeated_dispatch_is_deterministic() {
        let rule = seq![literal("a"), literal("b")];
        let mut input = Input::new("ab");
        let first = input.match_rule(&rule, 0).unwrap();
        let again = input.match_rule(&rule, 0).unwrap();
        assert_eq!(first, again);

        let mut fresh = Input::new("ab");
        assert_eq!(fresh.match_rule(&rule, 0).unwrap(), first);
    }

    #[test]
    fn max_offset_tracks_the_furthest_attempt() {
        let rule = seq![literal("ab"), literal("cd")];
        let mut input = Input::new("abXX");
        assert!(input.match_rule(&rule, 0).unwrap().is_none());
        // "ab" matched up to 2, then "cd" was attempted (and failed) there
        assert_eq!(input.max_offset(), 2);
    }

    #[test]
    fn max_offset_includes_successful_ends() {
        let rule = literal("abc");
        let mut input = Input::new("abcdef");
        assert!(input.match_rule(&rule, 0).unwrap().is_some());
        assert_eq!(input.max_offset(), 3);
    }

    #[test]
    fn predicates_memoize_without_consuming() {
        let probe = literal("a");
        let rule = seq![not_pred(literal("b")), probe.clone(), not_pred(literal("b"))];
        let mut input = Input::new("a");
        let matched = input.match_rule(&rule, 0).unwrap().unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched.children().len(), 3);
        assert_eq!(matched.children()[0].len(), 0);
        assert_eq!(matched.children()[2].len(), 0);
    }

    #[test]
    fn in_progress_slots_surface_left_recursion() {
        let rule = literal("a");
        let mut input = Input::new("a");
        input
            .cache
            .entry(rule.id())
            .or_default()
            .insert(0, CacheEntry::InProgress);
        let error = input.match_rule(&rule, 0).unwrap_err();
        assert!(matches!(error, GrammarError::LeftRecursion { offset: 0, .. }));
    }
}
