//! Fragment queries.
//!
//! Selectors are compound only: `tag`, `*`, `.class`, `#id`, `[attr]` and
//! `[attr=value]` parts written back to back, e.g.
//! `x-fragment.note[type="text/plain"]`. Combinators are not supported.

use std::{
    iter::Peekable,
    str::{Chars, FromStr},
};

use crate::{dom::NodeId, fragment::Fragment};

use super::RegistryError;

/// A compound element selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, Option<String>)>,
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | ':')
}

fn take_name(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if !is_name_char(c) {
            break;
        }
        name.push(c);
        chars.next();
    }
    name
}

impl Selector {
    /// Matches every element.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..Self::default()
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.attributes.push((name.into(), value));
        self
    }

    /// Parse a compound selector.
    pub fn parse(input: &str) -> Result<Self, RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidSelector {
            selector: input.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty selector"));
        }

        let mut selector = Selector::default();
        let mut chars = trimmed.chars().peekable();
        if chars.peek() == Some(&'*') {
            chars.next();
        } else if chars.peek().is_some_and(|c| is_name_char(*c)) {
            selector.tag = Some(take_name(&mut chars));
        }

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    let class = take_name(&mut chars);
                    if class.is_empty() {
                        return Err(invalid("expected a class name after '.'"));
                    }
                    selector.classes.push(class);
                }
                '#' => {
                    let id = take_name(&mut chars);
                    if id.is_empty() {
                        return Err(invalid("expected an id after '#'"));
                    }
                    if selector.id.replace(id).is_some() {
                        return Err(invalid("more than one id"));
                    }
                }
                '[' => {
                    let name = take_name(&mut chars);
                    if name.is_empty() {
                        return Err(invalid("expected an attribute name after '['"));
                    }
                    let value = match chars.next() {
                        Some(']') => None,
                        Some('=') => {
                            let value = match chars.peek() {
                                Some(&(quote @ ('"' | '\''))) => {
                                    chars.next();
                                    let mut value = String::new();
                                    loop {
                                        match chars.next() {
                                            Some(c) if c == quote => break,
                                            Some(c) => value.push(c),
                                            None => return Err(invalid("unterminated string")),
                                        }
                                    }
                                    value
                                }
                                _ => {
                                    let mut value = String::new();
                                    while let Some(&c) = chars.peek() {
                                        if c == ']' {
                                            break;
                                        }
                                        value.push(c);
                                        chars.next();
                                    }
                                    value
                                }
                            };
                            if chars.next() != Some(']') {
                                return Err(invalid("expected ']'"));
                            }
                            Some(value)
                        }
                        _ => return Err(invalid("expected ']' or '='")),
                    };
                    selector.attributes.push((name, value));
                }
                other if other.is_whitespace() => {
                    return Err(invalid("combinators are not supported"));
                }
                other => return Err(invalid(&format!("unexpected character '{other}'"))),
            }
        }
        Ok(selector)
    }

    /// Whether an element with `tag` and `attributes` matches.
    ///
    /// `#id` is compared against `id_attribute`, classes against the
    /// whitespace-separated list in `class_attribute`.
    pub(crate) fn matches(
        &self,
        tag: &str,
        attributes: &[(String, String)],
        id_attribute: &str,
        class_attribute: &str,
    ) -> bool {
        let attribute = |name: &str| {
            attributes
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str())
        };
        if self.tag.as_deref().is_some_and(|wanted| wanted != tag) {
            return false;
        }
        if let Some(id) = &self.id {
            if attribute(id_attribute) != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let classes: Vec<&str> = attribute(class_attribute)
                .map(|list| list.split_whitespace().collect())
                .unwrap_or_default();
            if !self.classes.iter().all(|c| classes.contains(&c.as_str())) {
                return false;
            }
        }
        self.attributes.iter().all(|(name, wanted)| match (attribute(name.as_str()), wanted) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(value), Some(wanted)) => value == wanted,
        })
    }
}

impl FromStr for Selector {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}

/// What to look for with [`FragmentRegistry::find`](super::FragmentRegistry::find).
#[derive(Debug, Clone)]
pub enum Query {
    /// Wrapped fragments whose node matches the selector.
    Selector(Selector),
    /// The fragment itself, if it is still wrapped.
    Fragment(Fragment),
    /// The wrapper of a node, if any.
    Node(NodeId),
    /// Union of several queries.
    List(Vec<Query>),
}

impl From<Selector> for Query {
    fn from(selector: Selector) -> Self {
        Query::Selector(selector)
    }
}

impl From<Fragment> for Query {
    fn from(fragment: Fragment) -> Self {
        Query::Fragment(fragment)
    }
}

impl From<NodeId> for Query {
    fn from(node: NodeId) -> Self {
        Query::Node(node)
    }
}

impl From<Vec<Query>> for Query {
    fn from(queries: Vec<Query>) -> Self {
        Query::List(queries)
    }
}

impl TryFrom<&str> for Query {
    type Error = RegistryError;

    fn try_from(selector: &str) -> Result<Self, Self::Error> {
        Selector::parse(selector).map(Query::Selector)
    }
}
