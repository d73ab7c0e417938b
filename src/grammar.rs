use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use log::debug;

use crate::error::{Error, GrammarError, ParseError};
use crate::input::Input;
use crate::matching::Match;
use crate::rule::Rule;

/// A named, ordered collection of rules with an inheritance chain. Local
/// rules shadow included ones; [`super_ref`](crate::rule::super_ref) reaches
/// the shadowed definition.
#[derive(Clone)]
pub struct Grammar {
    inner: Rc<GrammarInner>,
}

pub(crate) struct GrammarInner {
    name: String,
    rules: RefCell<IndexMap<String, Rule>>,
    included: RefCell<Vec<Grammar>>,
    root: RefCell<Option<String>>,
}

/// Entry-point policy for [`Grammar::parse_with`].
#[derive(Clone, Debug)]
pub struct ParseOptions {
    /// Offset to start matching at.
    pub offset: usize,
    /// Require the root match to cover the rest of the input.
    pub consume_all: bool,
    /// Rule to dispatch at instead of the grammar root.
    pub root: Option<String>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            offset: 0,
            consume_all: true,
            root: None,
        }
    }
}

impl Grammar {
    pub fn new() -> Self {
        Self::named("")
    }

    pub fn named(name: &str) -> Self {
        Grammar {
            inner: Rc::new(GrammarInner {
                name: name.to_string(),
                rules: RefCell::new(IndexMap::new()),
                included: RefCell::new(Vec::new()),
                root: RefCell::new(None),
            }),
        }
    }

    pub fn build(build: impl FnOnce(&Grammar)) -> Self {
        let grammar = Self::new();
        build(&grammar);
        grammar
    }

    pub(crate) fn from_inner(inner: Rc<GrammarInner>) -> Self {
        Grammar { inner }
    }

    /// The grammar's name; empty for anonymous grammars.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn display_name(&self) -> String {
        if self.inner.name.is_empty() {
            "<anonymous>".to_string()
        } else {
            self.inner.name.clone()
        }
    }

    /// Install `definition` under `name`, replacing any previous definition
    /// and (re)binding the rule tree to this grammar.
    pub fn define(&self, name: &str, definition: impl Into<Rule>) -> Rule {
        let rule = definition.into();
        rule.attach(Rc::from(name), &Rc::downgrade(&self.inner));
        self.inner
            .rules
            .borrow_mut()
            .insert(name.to_string(), rule.clone());
        rule
    }

    /// Local lookup first, then included grammars, most recently included
    /// first.
    pub fn rule(&self, name: &str) -> Option<Rule> {
        if let Some(rule) = self.inner.rules.borrow().get(name) {
            return Some(rule.clone());
        }
        self.super_rule(name)
    }

    /// Like [`rule`](Grammar::rule), but skipping this grammar's own rules.
    pub fn super_rule(&self, name: &str) -> Option<Rule> {
        self.inner
            .included
            .borrow()
            .iter()
            .find_map(|ancestor| ancestor.rule(name))
    }

    /// Prepend `ancestor` to the inheritance chain.
    pub fn include(&self, ancestor: &Grammar) {
        self.inner.included.borrow_mut().insert(0, ancestor.clone());
    }

    /// The explicit root if set, otherwise the first rule defined.
    pub fn root(&self) -> Option<String> {
        self.inner.root.borrow().clone().or_else(|| {
            self.inner
                .rules
                .borrow()
                .get_index(0)
                .map(|(name, _)| name.clone())
        })
    }

    pub fn set_root(&self, name: &str) {
        *self.inner.root.borrow_mut() = Some(name.to_string());
    }

    /// Rule names in definition order.
    pub fn rule_names(&self) -> Vec<String> {
        self.inner.rules.borrow().keys().cloned().collect()
    }

    /// Parse `text` from offset 0, requiring full consumption.
    pub fn parse<'i>(&self, text: &'i str) -> Result<Match<'i>, Error> {
        self.parse_with(text, &ParseOptions::default())
    }

    /// Failing to match (or to consume the full input when required) is a
    /// [`ParseError`]; a bad root or rule name is a [`GrammarError`].
    pub fn parse_with<'i>(
        &self,
        text: &'i str,
        options: &ParseOptions,
    ) -> Result<Match<'i>, Error> {
        let root = match &options.root {
            Some(name) => name.clone(),
            None => self.root().ok_or_else(|| GrammarError::EmptyGrammar {
                grammar: self.display_name(),
            })?,
        };
        let rule = self.rule(&root).ok_or_else(|| GrammarError::UnknownRoot {
            root: root.clone(),
            grammar: self.display_name(),
        })?;
        debug!("parsing from root {} of grammar {}", root, self.display_name());

        let mut input = Input::new(text);
        match input.match_rule(&rule, options.offset)? {
            Some(matched) => {
                if options.consume_all
                    && matched.len() != text.len().saturating_sub(options.offset)
                {
                    return Err(ParseError::from_input(&input).into());
                }
                Ok(matched)
            }
            None => Err(ParseError::from_input(&input).into()),
        }
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grammar {} {{", self.display_name())?;
        for (name, rule) in self.inner.rules.borrow().iter() {
            write!(f, "\n  {} <- {}", name, rule.to_peg())?;
        }
        write!(f, "\n}}")
    }
}
