//! Detached, serializable description of a subtree.
//!
//! `VNode` is used in three places: as the JSON representation of whole
//! documents, as the content produced for auto-DOM companions, and as the
//! cached value of a derived render.

use serde::{Deserialize, Serialize};

/// A detached node description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VNode {
    /// An element with ordered attributes and children.
    Element {
        tag: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attributes: Vec<(String, String)>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<VNode>,
    },
    /// A text node.
    Text(String),
}

impl VNode {
    /// An element with no attributes or children.
    pub fn element(tag: impl Into<String>) -> Self {
        VNode::Element {
            tag: tag.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// A text node.
    pub fn text(data: impl Into<String>) -> Self {
        VNode::Text(data.into())
    }

    /// Builder: set an attribute. No-op on text nodes.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let VNode::Element { attributes, .. } = &mut self {
            let name = name.into();
            let value = value.into();
            match attributes.iter_mut().find(|(n, _)| *n == name) {
                Some(slot) => slot.1 = value,
                None => attributes.push((name, value)),
            }
        }
        self
    }

    /// Builder: append a child. No-op on text nodes.
    pub fn with_child(mut self, child: VNode) -> Self {
        if let VNode::Element { children, .. } = &mut self {
            children.push(child);
        }
        self
    }

    /// Builder: append a text child.
    pub fn with_text(self, data: impl Into<String>) -> Self {
        self.with_child(VNode::text(data))
    }

    /// The tag name, if this is an element.
    pub fn tag(&self) -> Option<&str> {
        match self {
            VNode::Element { tag, .. } => Some(tag),
            VNode::Text(_) => None,
        }
    }

    /// Look up an attribute value.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match self {
            VNode::Element { attributes, .. } => attributes
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str()),
            VNode::Text(_) => None,
        }
    }

    /// Children of an element; empty for text.
    pub fn children(&self) -> &[VNode] {
        match self {
            VNode::Element { children, .. } => children,
            VNode::Text(_) => &[],
        }
    }

    /// Concatenated text of this subtree.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            VNode::Text(data) => out.push_str(data),
            VNode::Element { children, .. } => {
                for child in children {
                    child.collect_text(out);
                }
            }
        }
    }
}
