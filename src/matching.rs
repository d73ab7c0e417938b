use std::fmt;
use std::rc::Rc;

/// Opaque tag carried from a rule onto every match it produces; the engine
/// never interprets it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Extension(u64);

impl Extension {
    pub fn new(id: u64) -> Self {
        Extension(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// A node in the tree produced by a successful parse, borrowing its text from
/// the input. Cloning is cheap (shared state), which lets the packrat cache
/// hand out the same result many times without copying subtrees.
#[derive(Clone)]
pub struct Match<'i> {
    inner: Rc<MatchInner<'i>>,
}

#[derive(Debug, PartialEq, Eq)]
struct MatchInner<'i> {
    text: &'i str,
    offset: usize,
    children: Vec<Match<'i>>,
    captures: Vec<&'i str>,
    name: Option<Rc<str>>,
    extension: Option<Extension>,
}

impl<'i> Match<'i> {
    pub(crate) fn terminal(text: &'i str, offset: usize) -> Self {
        Self::terminal_with_captures(text, offset, Vec::new())
    }

    pub(crate) fn terminal_with_captures(
        text: &'i str,
        offset: usize,
        captures: Vec<&'i str>,
    ) -> Self {
        Match {
            inner: Rc::new(MatchInner {
                text,
                offset,
                children: Vec::new(),
                captures,
                name: None,
                extension: None,
            }),
        }
    }

    pub(crate) fn nonterminal(text: &'i str, offset: usize, children: Vec<Match<'i>>) -> Self {
        Match {
            inner: Rc::new(MatchInner {
                text,
                offset,
                children,
                captures: Vec::new(),
                name: None,
                extension: None,
            }),
        }
    }

    pub(crate) fn empty(offset: usize) -> Self {
        Self::terminal("", offset)
    }

    pub(crate) fn renamed(&self, name: Rc<str>) -> Self {
        self.decorated(Some(&name), None)
    }

    pub(crate) fn decorated(
        &self,
        name: Option<&Rc<str>>,
        extension: Option<Extension>,
    ) -> Self {
        if name.is_none() && extension.is_none() {
            return self.clone();
        }
        let inner = &self.inner;
        Match {
            inner: Rc::new(MatchInner {
                text: inner.text,
                offset: inner.offset,
                children: inner.children.clone(),
                captures: inner.captures.clone(),
                name: name.cloned().or_else(|| inner.name.clone()),
                extension: extension.or(inner.extension),
            }),
        }
    }

    pub fn text(&self) -> &'i str {
        self.inner.text
    }

    pub fn len(&self) -> usize {
        self.inner.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.text.is_empty()
    }

    pub fn offset(&self) -> usize {
        self.inner.offset
    }

    pub fn children(&self) -> &[Match<'i>] {
        &self.inner.children
    }

    /// Regex capture groups in group order; groups that did not participate
    /// are reported as empty strings.
    pub fn captures(&self) -> &[&'i str] {
        &self.inner.captures
    }

    /// Name given by the originating rule, or by a label or alias around it.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn extension(&self) -> Option<Extension> {
        self.inner.extension
    }

    pub fn is_terminal(&self) -> bool {
        self.inner.children.is_empty()
    }

    /// Descendant matches named `name`: the full subtree in pre-order when
    /// `deep`, otherwise immediate children only.
    pub fn find(&self, name: &str, deep: bool) -> Vec<&Match<'i>> {
        let mut found = Vec::new();
        self.collect_named(name, deep, &mut found);
        found
    }

    fn collect_named<'s>(&'s self, name: &str, deep: bool, found: &mut Vec<&'s Match<'i>>) {
        for child in self.children() {
            if child.name() == Some(name) {
                found.push(child);
            }
            if deep {
                child.collect_named(name, deep, found);
            }
        }
    }

    /// First immediate child named `name`; `children().first()` is the
    /// positional form.
    pub fn first(&self, name: &str) -> Option<&Match<'i>> {
        self.children().iter().find(|child| child.name() == Some(name))
    }
}

impl PartialEq for Match<'_> {
    fn eq(&self, other: &Self) -> bool {
        *self.inner == *other.inner
    }
}

impl Eq for Match<'_> {}

impl PartialEq<str> for Match<'_> {
    fn eq(&self, other: &str) -> bool {
        self.text() == other
    }
}

impl PartialEq<&str> for Match<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.text() == *other
    }
}

impl fmt::Debug for Match<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut node = f.debug_struct("Match");
        node.field("text", &self.text());
        node.field("offset", &self.offset());
        if let Some(name) = self.name() {
            node.field("name", &name);
        }
        if let Some(extension) = self.extension() {
            node.field("extension", &extension);
        }
        if !self.captures().is_empty() {
            node.field("captures", &self.captures());
        }
        if !self.children().is_empty() {
            node.field("children", &self.children());
        }
        node.finish()
    }
}
