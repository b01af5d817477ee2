//! Mutation records and observer registration types.

use std::{fmt, sync::Arc};

use super::NodeId;

/// Kind of change carried by a [`MutationRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// An attribute was set or removed on the target element.
    Attributes,
    /// Children were added to or removed from the target.
    ChildList,
    /// The data of the target text node changed.
    CharacterData,
}

/// One observed change to the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    /// The changed element or text node; for child-list records, the parent.
    pub target: NodeId,
    /// Attribute name for attribute records.
    pub attribute_name: Option<String>,
    /// Previous attribute value or character data.
    pub old_value: Option<String>,
    /// Value at the time of the mutation (`None` for a removed attribute).
    pub value: Option<String>,
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
}

impl MutationRecord {
    pub(crate) fn attributes(
        target: NodeId,
        name: &str,
        old_value: Option<String>,
        value: Option<String>,
    ) -> Self {
        Self {
            kind: MutationKind::Attributes,
            target,
            attribute_name: Some(name.to_string()),
            old_value,
            value,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
        }
    }

    pub(crate) fn character_data(target: NodeId, old_value: String, value: String) -> Self {
        Self {
            kind: MutationKind::CharacterData,
            target,
            attribute_name: None,
            old_value: Some(old_value),
            value: Some(value),
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
        }
    }

    pub(crate) fn child_list(target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target,
            attribute_name: None,
            old_value: None,
            value: None,
            added_nodes: added,
            removed_nodes: removed,
        }
    }
}

/// What an observer wants to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObserveOptions {
    /// Also observe every descendant of the target.
    pub subtree: bool,
    pub child_list: bool,
    pub attributes: bool,
    pub character_data: bool,
}

impl ObserveOptions {
    /// Everything below and including the target.
    pub fn all() -> Self {
        Self {
            subtree: true,
            child_list: true,
            attributes: true,
            character_data: true,
        }
    }

    /// Structural changes anywhere below the target.
    pub fn structure() -> Self {
        Self {
            subtree: true,
            child_list: true,
            ..Self::default()
        }
    }

    pub(crate) fn accepts(&self, kind: MutationKind) -> bool {
        match kind {
            MutationKind::Attributes => self.attributes,
            MutationKind::ChildList => self.child_list,
            MutationKind::CharacterData => self.character_data,
        }
    }
}

/// Identifier of a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub(crate) u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// Callback invoked with an observer's batch at each delivery checkpoint.
pub type MutationCallback = Arc<dyn Fn(Vec<MutationRecord>) + Send + Sync>;
