use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::RangeInclusive;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use regex::Regex;

use crate::error::GrammarError;
use crate::grammar::{Grammar, GrammarInner};
use crate::input::Input;
use crate::matching::{Extension, Match};

/// Stable per-object identity, used as the memoization key. An alias and its
/// target share a name but never a cache entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RuleId(u64);

static NEXT_RULE_ID: AtomicU64 = AtomicU64::new(0);

/// A parsing expression. Cheap to clone; clones share state and identity.
#[derive(Clone)]
pub struct Rule {
    inner: Rc<RuleInner>,
}

struct RuleInner {
    id: RuleId,
    name: RefCell<Option<Rc<str>>>,
    extension: Cell<Option<Extension>>,
    grammar: RefCell<Option<Weak<GrammarInner>>>,
    kind: RuleKind,
}

enum RuleKind {
    FixedWidth(String),
    Expression(Regex),
    Sequence(Vec<Rule>),
    Choice(Vec<Rule>),
    Repeat {
        min: usize,
        max: Option<usize>,
        inner: Rule,
    },
    AndPredicate(Rule),
    NotPredicate(Rule),
    Label {
        label: Rc<str>,
        inner: Rule,
    },
    Alias {
        target: String,
        resolved: RefCell<Option<Rule>>,
    },
    Super {
        target: RefCell<Option<Rc<str>>>,
        resolved: RefCell<Option<Rule>>,
    },
}

pub fn literal(text: impl Into<String>) -> Rule {
    Rule::new(RuleKind::FixedWidth(text.into()))
}

/// A rule matching `pattern` anchored at the current offset.
pub fn regex(pattern: &str) -> Result<Rule, GrammarError> {
    let compiled = Regex::new(pattern).map_err(|source| GrammarError::RegexCompile {
        pattern: pattern.to_string(),
        source,
    })?;
    Ok(Rule::new(RuleKind::Expression(compiled)))
}

pub fn seq(items: Vec<Rule>) -> Rule {
    Rule::new(RuleKind::Sequence(items))
}

pub fn alt(items: Vec<Rule>) -> Rule {
    Rule::new(RuleKind::Choice(items))
}

/// Between `min` and `max` greedy repetitions; `None` means unbounded.
pub fn rep(rule: impl Into<Rule>, min: usize, max: Option<usize>) -> Rule {
    if let Some(max) = max {
        assert!(min <= max, "repetition bounds are inverted: {min} > {max}");
    }
    Rule::new(RuleKind::Repeat {
        min,
        max,
        inner: rule.into(),
    })
}

pub fn one_or_more(rule: impl Into<Rule>) -> Rule {
    rep(rule, 1, None)
}

pub fn zero_or_more(rule: impl Into<Rule>) -> Rule {
    rep(rule, 0, None)
}

pub fn optional(rule: impl Into<Rule>) -> Rule {
    rep(rule, 0, Some(1))
}

pub fn and_pred(rule: impl Into<Rule>) -> Rule {
    Rule::new(RuleKind::AndPredicate(rule.into()))
}

pub fn not_pred(rule: impl Into<Rule>) -> Rule {
    Rule::new(RuleKind::NotPredicate(rule.into()))
}

/// Matches `rule` and renames the resulting match to `name`.
pub fn label(name: &str, rule: impl Into<Rule>) -> Rule {
    Rule::new(RuleKind::Label {
        label: Rc::from(name),
        inner: rule.into(),
    })
}

/// A by-name reference into the enclosing grammar, resolved on first use.
pub fn alias(name: impl Into<String>) -> Rule {
    Rule::new(RuleKind::Alias {
        target: name.into(),
        resolved: RefCell::new(None),
    })
}

/// A reference to the same-named rule in the ancestor chain only. The name is
/// bound when the containing rule is installed.
pub fn super_ref() -> Rule {
    Rule::new(RuleKind::Super {
        target: RefCell::new(None),
        resolved: RefCell::new(None),
    })
}

/// Sequence of rule definitions, coercing each item: `seq!["(", alias("x"), ")"]`.
#[macro_export]
macro_rules! seq {
    ($($item:expr),+ $(,)?) => {
        $crate::rule::seq(vec![$($crate::Rule::from($item)),+])
    };
}

/// Ordered choice of rule definitions, coercing each item: `alt!["a", 0..=9]`.
#[macro_export]
macro_rules! alt {
    ($($item:expr),+ $(,)?) => {
        $crate::rule::alt(vec![$($crate::Rule::from($item)),+])
    };
}

impl Rule {
    fn new(kind: RuleKind) -> Self {
        Rule {
            inner: Rc::new(RuleInner {
                id: RuleId(NEXT_RULE_ID.fetch_add(1, Ordering::Relaxed)),
                name: RefCell::new(None),
                extension: Cell::new(None),
                grammar: RefCell::new(None),
                kind,
            }),
        }
    }

    pub fn id(&self) -> RuleId {
        self.inner.id
    }

    pub fn name(&self) -> Option<Rc<str>> {
        self.inner.name.borrow().clone()
    }

    pub fn extension(&self) -> Option<Extension> {
        self.inner.extension.get()
    }

    /// Attach an extension tag, propagated onto every match this rule makes.
    pub fn with_extension(self, extension: Extension) -> Self {
        self.inner.extension.set(Some(extension));
        self
    }

    pub(crate) fn describe(&self) -> String {
        match self.inner.name.borrow().as_deref() {
            Some(name) => name.to_string(),
            None => self.to_peg(),
        }
    }

    // rebinds the whole tree on every (re)definition: super references pick
    // up the rule's name, stale proxy resolutions are dropped
    pub(crate) fn attach(&self, name: Rc<str>, grammar: &Weak<GrammarInner>) {
        *self.inner.name.borrow_mut() = Some(name.clone());
        self.bind_tree(grammar, &name);
    }

    fn bind_tree(&self, grammar: &Weak<GrammarInner>, rule_name: &Rc<str>) {
        *self.inner.grammar.borrow_mut() = Some(grammar.clone());
        match &self.inner.kind {
            RuleKind::Sequence(items) | RuleKind::Choice(items) => {
                for item in items {
                    item.bind_tree(grammar, rule_name);
                }
            }
            RuleKind::Repeat { inner, .. }
            | RuleKind::AndPredicate(inner)
            | RuleKind::NotPredicate(inner)
            | RuleKind::Label { inner, .. } => inner.bind_tree(grammar, rule_name),
            RuleKind::Alias { resolved, .. } => {
                resolved.borrow_mut().take();
            }
            RuleKind::Super { target, resolved } => {
                *target.borrow_mut() = Some(rule_name.clone());
                resolved.borrow_mut().take();
            }
            RuleKind::FixedWidth(_) | RuleKind::Expression(_) => {}
        }
    }

    fn owner(&self) -> Result<Grammar, GrammarError> {
        self.inner
            .grammar
            .borrow()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(Grammar::from_inner)
            .ok_or_else(|| GrammarError::DetachedRule {
                name: self.describe(),
            })
    }

    // sub-rules are always matched through the input, never directly, so
    // every outcome lands in the cache
    pub(crate) fn match_at<'i>(
        &self,
        input: &mut Input<'i>,
        offset: usize,
    ) -> Result<Option<Match<'i>>, GrammarError> {
        let matched = match &self.inner.kind {
            RuleKind::FixedWidth(text) => match_fixed(text, input.text(), offset),
            RuleKind::Expression(pattern) => match_pattern(pattern, input.text(), offset),
            RuleKind::Sequence(items) => match_sequence(items, input, offset)?,
            RuleKind::Choice(items) => match_choice(items, input, offset)?,
            RuleKind::Repeat { min, max, inner } => {
                match_repeat(*min, *max, inner, input, offset)?
            }
            RuleKind::AndPredicate(inner) => {
                input.match_rule(inner, offset)?.map(|_| Match::empty(offset))
            }
            RuleKind::NotPredicate(inner) => match input.match_rule(inner, offset)? {
                Some(_) => None,
                None => Some(Match::empty(offset)),
            },
            RuleKind::Label { label, inner } => input
                .match_rule(inner, offset)?
                .map(|m| m.renamed(label.clone())),
            RuleKind::Alias { target, resolved } => {
                let rule = resolve_cached(resolved, || {
                    let grammar = self.owner()?;
                    let found =
                        grammar
                            .rule(target)
                            .ok_or_else(|| GrammarError::UnresolvedRule {
                                name: target.clone(),
                                grammar: grammar.display_name(),
                            })?;
                    debug!("alias {target} resolved to {found}");
                    Ok(found)
                })?;
                input.match_rule(&rule, offset)?
            }
            RuleKind::Super { target, resolved } => {
                let rule = resolve_cached(resolved, || {
                    let name =
                        target
                            .borrow()
                            .clone()
                            .ok_or_else(|| GrammarError::DetachedRule {
                                name: "super".to_string(),
                            })?;
                    let grammar = self.owner()?;
                    let found =
                        grammar
                            .super_rule(&name)
                            .ok_or_else(|| GrammarError::UnresolvedRule {
                                name: name.to_string(),
                                grammar: grammar.display_name(),
                            })?;
                    debug!("super {name} resolved to {found}");
                    Ok(found)
                })?;
                input.match_rule(&rule, offset)?
            }
        };
        let name = self.inner.name.borrow();
        Ok(matched.map(|m| m.decorated(name.as_ref(), self.inner.extension.get())))
    }

    /// Canonical PEG notation.
    pub fn to_peg(&self) -> String {
        self.render(false)
    }

    fn render(&self, embedded: bool) -> String {
        // embedded registered rules read better as their name
        if embedded {
            if let Some(name) = self.inner.name.borrow().as_deref() {
                return name.to_string();
            }
        }
        match &self.inner.kind {
            RuleKind::FixedWidth(text) => format!("{text:?}"),
            RuleKind::Expression(pattern) => format!("/{}/", pattern.as_str()),
            RuleKind::Sequence(items) => embed(join_rendered(items, " "), items.len(), embedded),
            RuleKind::Choice(items) => embed(join_rendered(items, " | "), items.len(), embedded),
            RuleKind::Repeat { min, max, inner } => {
                format!("{}{}", inner.render(true), repeat_op(*min, *max))
            }
            RuleKind::AndPredicate(inner) => format!("&{}", inner.render(true)),
            RuleKind::NotPredicate(inner) => format!("!{}", inner.render(true)),
            RuleKind::Label { label, inner } => format!("{}:{}", label, inner.render(true)),
            RuleKind::Alias { target, .. } => target.clone(),
            RuleKind::Super { .. } => "super".to_string(),
        }
    }
}

fn resolve_cached(
    slot: &RefCell<Option<Rule>>,
    resolve: impl FnOnce() -> Result<Rule, GrammarError>,
) -> Result<Rule, GrammarError> {
    if let Some(rule) = slot.borrow().as_ref() {
        return Ok(rule.clone());
    }
    let rule = resolve()?;
    *slot.borrow_mut() = Some(rule.clone());
    Ok(rule)
}

fn match_fixed<'i>(literal: &str, text: &'i str, offset: usize) -> Option<Match<'i>> {
    let end = offset.checked_add(literal.len())?;
    let slice = text.get(offset..end)?;
    if slice == literal {
        Some(Match::terminal(slice, offset))
    } else {
        None
    }
}

fn match_pattern<'i>(pattern: &Regex, text: &'i str, offset: usize) -> Option<Match<'i>> {
    if offset > text.len() || !text.is_char_boundary(offset) {
        return None;
    }
    let caps = pattern.captures_at(text, offset)?;
    let whole = caps.get(0)?;
    // the pattern may first match further into the slice; that is a failure
    if whole.start() != offset {
        return None;
    }
    let captures = caps
        .iter()
        .skip(1)
        .map(|group| group.map_or("", |g| g.as_str()))
        .collect();
    Some(Match::terminal_with_captures(
        whole.as_str(),
        offset,
        captures,
    ))
}

fn match_sequence<'i>(
    items: &[Rule],
    input: &mut Input<'i>,
    offset: usize,
) -> Result<Option<Match<'i>>, GrammarError> {
    let mut end = offset;
    let mut children = Vec::with_capacity(items.len());
    for item in items {
        match input.match_rule(item, end)? {
            Some(child) => {
                end += child.len();
                children.push(child);
            }
            None => return Ok(None),
        }
    }
    let text = &input.text()[offset..end];
    Ok(Some(Match::nonterminal(text, offset, children)))
}

fn match_choice<'i>(
    items: &[Rule],
    input: &mut Input<'i>,
    offset: usize,
) -> Result<Option<Match<'i>>, GrammarError> {
    for item in items {
        if let Some(child) = input.match_rule(item, offset)? {
            let text = child.text();
            return Ok(Some(Match::nonterminal(text, offset, vec![child])));
        }
    }
    Ok(None)
}

fn match_repeat<'i>(
    min: usize,
    max: Option<usize>,
    inner: &Rule,
    input: &mut Input<'i>,
    offset: usize,
) -> Result<Option<Match<'i>>, GrammarError> {
    let mut end = offset;
    let mut children = Vec::new();
    loop {
        if let Some(max) = max {
            if children.len() >= max {
                break;
            }
        }
        match input.match_rule(inner, end)? {
            Some(child) => {
                let width = child.len();
                children.push(child);
                end += width;
                // a zero-width match cannot advance; with no upper bound the
                // repetition is saturated once the minimum is reached
                if width == 0 && max.is_none() && children.len() >= min {
                    break;
                }
            }
            None => break,
        }
    }
    if children.len() < min {
        return Ok(None);
    }
    let text = &input.text()[offset..end];
    Ok(Some(Match::nonterminal(text, offset, children)))
}

fn join_rendered(items: &[Rule], separator: &str) -> String {
    items
        .iter()
        .map(|item| item.render(true))
        .collect::<Vec<_>>()
        .join(separator)
}

fn embed(text: String, parts: usize, embedded: bool) -> String {
    if embedded && parts > 1 {
        format!("({text})")
    } else {
        text
    }
}

fn repeat_op(min: usize, max: Option<usize>) -> String {
    match (min, max) {
        (0, Some(1)) => "?".to_string(),
        (1, None) => "+".to_string(),
        (0, None) => "*".to_string(),
        (min, None) => format!("{min}*"),
        (min, Some(max)) => format!("{min}*{max}"),
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_peg())
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rule({:?}, {})", self.inner.id, self.describe())
    }
}

impl From<&str> for Rule {
    fn from(text: &str) -> Self {
        literal(text)
    }
}

impl From<String> for Rule {
    fn from(text: String) -> Self {
        literal(text)
    }
}

impl From<char> for Rule {
    fn from(ch: char) -> Self {
        literal(ch.to_string())
    }
}

impl From<Regex> for Rule {
    fn from(pattern: Regex) -> Self {
        Rule::new(RuleKind::Expression(pattern))
    }
}

impl From<Vec<Rule>> for Rule {
    fn from(items: Vec<Rule>) -> Self {
        seq(items)
    }
}

impl From<RangeInclusive<char>> for Rule {
    fn from(range: RangeInclusive<char>) -> Self {
        alt(range.map(|ch| literal(ch.to_string())).collect())
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {$(
        impl From<$ty> for Rule {
            fn from(value: $ty) -> Self {
                literal(value.to_string())
            }
        }

        impl From<RangeInclusive<$ty>> for Rule {
            fn from(range: RangeInclusive<$ty>) -> Self {
                alt(range.map(|value| literal(value.to_string())).collect())
            }
        }
    )*};
}

impl_from_int!(i32, i64, u32, u64, usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_ids_are_distinct_per_object() {
        let a = literal("a");
        let b = literal("a");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn literal_renders_with_escapes() {
        assert_eq!(literal("abc").to_peg(), "\"abc\"");
        assert_eq!(literal("a\nb").to_peg(), "\"a\\nb\"");
        assert_eq!(literal("say \"hi\"").to_peg(), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn pattern_renders_between_slashes() {
        assert_eq!(regex("[a-z]+").unwrap().to_peg(), "/[a-z]+/");
    }

    #[test]
    fn sequences_and_choices_parenthesize_only_when_embedded() {
        let sequence = seq!["a", "b"];
        assert_eq!(sequence.to_peg(), "\"a\" \"b\"");

        let nested = seq![alt!["a", "b"], "c"];
        assert_eq!(nested.to_peg(), "(\"a\" | \"b\") \"c\"");

        let single = seq![alt!["a"], "c"];
        assert_eq!(single.to_peg(), "\"a\" \"c\"");
    }

    #[test]
    fn repeat_operators() {
        assert_eq!(optional(literal("a")).to_peg(), "\"a\"?");
        assert_eq!(one_or_more(literal("a")).to_peg(), "\"a\"+");
        assert_eq!(zero_or_more(literal("a")).to_peg(), "\"a\"*");
        assert_eq!(rep(literal("a"), 2, None).to_peg(), "\"a\"2*");
        assert_eq!(rep(literal("a"), 2, Some(4)).to_peg(), "\"a\"2*4");
        assert_eq!(rep(seq!["a", "b"], 0, None).to_peg(), "(\"a\" \"b\")*");
    }

    #[test]
    fn predicate_label_and_proxy_rendering() {
        assert_eq!(and_pred(literal("a")).to_peg(), "&\"a\"");
        assert_eq!(not_pred(literal("a")).to_peg(), "!\"a\"");
        assert_eq!(label("x", literal("a")).to_peg(), "x:\"a\"");
        assert_eq!(alias("foo").to_peg(), "foo");
        assert_eq!(super_ref().to_peg(), "super");
    }

    #[test]
    #[should_panic(expected = "repetition bounds are inverted")]
    fn inverted_repeat_bounds_panic() {
        rep(literal("a"), 3, Some(1));
    }

    #[test]
    fn definition_coercions() {
        assert_eq!(Rule::from("ab").to_peg(), "\"ab\"");
        assert_eq!(Rule::from('x').to_peg(), "\"x\"");
        assert_eq!(Rule::from(42).to_peg(), "\"42\"");
        assert_eq!(Rule::from(0..=2).to_peg(), "\"0\" | \"1\" | \"2\"");
        assert_eq!(Rule::from('a'..='c').to_peg(), "\"a\" | \"b\" | \"c\"");
        assert_eq!(
            Rule::from(vec![literal("a"), literal("b")]).to_peg(),
            "\"a\" \"b\""
        );
    }

    #[test]
    fn extension_tag_is_carried_by_the_rule() {
        let rule = literal("a").with_extension(Extension::new(9));
        assert_eq!(rule.extension(), Some(Extension::new(9)));
    }

    #[test]
    fn broken_patterns_are_reported_with_their_pattern() {
        let error = regex("[a-").unwrap_err();
        assert!(matches!(error, GrammarError::RegexCompile { .. }));
        assert!(error.to_string().starts_with("pattern /[a-/ failed to compile"));
    }
}
