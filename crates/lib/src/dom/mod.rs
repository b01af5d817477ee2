//! In-memory shared document tree.
//!
//! This is the reference implementation of the mutation source the fragment
//! runtime consumes. A real deployment replaces it with a tree kept in sync
//! by a collaboration transport; the runtime only relies on the operations
//! exposed here.
//!
//! ## Mutation delivery
//!
//! Every mutating operation queues a [`MutationRecord`] on each observer whose
//! registration matches the change. Nothing is delivered at mutation time:
//! [`Document::deliver_mutations`] is the checkpoint that hands each observer
//! its queued batch. Observer callbacks run without the tree lock held, so
//! they are free to read and write the document.
//!
//! Nodes live in an arena and are never freed. Removing a node only detaches
//! it, which lets teardown code walk a subtree after it left the document.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use handle_trait::Handle;

mod errors;
mod mutation;
mod vnode;

pub use errors::DomError;
pub use mutation::{MutationCallback, MutationKind, MutationRecord, ObserveOptions, ObserverId};
pub use vnode::VNode;

/// Tag of the root element of a fresh document.
pub const ROOT_TAG: &str = "body";

/// Arena index of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

type Result<T> = std::result::Result<T, DomError>;

#[derive(Debug, Clone)]
enum NodeData {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text {
        data: String,
    },
}

#[derive(Debug, Clone)]
struct NodeSlot {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

struct Registration {
    id: ObserverId,
    target: NodeId,
    options: ObserveOptions,
    callback: MutationCallback,
    pending: Vec<MutationRecord>,
}

fn inclusive_ancestor(nodes: &[NodeSlot], ancestor: NodeId, node: NodeId) -> bool {
    let mut current = Some(node);
    while let Some(id) = current {
        if id == ancestor {
            return true;
        }
        current = nodes.get(id.0 as usize).and_then(|s| s.parent);
    }
    false
}

struct Tree {
    nodes: Vec<NodeSlot>,
    root: NodeId,
    observers: Vec<Registration>,
    next_observer: u64,
}

impl Tree {
    fn slot(&self, node: NodeId) -> Result<&NodeSlot> {
        self.nodes
            .get(node.0 as usize)
            .ok_or(DomError::NodeNotFound { node })
    }

    fn slot_mut(&mut self, node: NodeId) -> Result<&mut NodeSlot> {
        self.nodes
            .get_mut(node.0 as usize)
            .ok_or(DomError::NodeNotFound { node })
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeSlot {
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    fn require_element(&self, node: NodeId) -> Result<()> {
        match self.slot(node)?.data {
            NodeData::Element { .. } => Ok(()),
            NodeData::Text { .. } => Err(DomError::NotAnElement { node }),
        }
    }

    /// True when `ancestor` is `node` or one of its ancestors.
    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        inclusive_ancestor(&self.nodes, ancestor, node)
    }

    fn queue(&mut self, record: MutationRecord) {
        let Tree {
            nodes, observers, ..
        } = self;
        for registration in observers.iter_mut() {
            if !registration.options.accepts(record.kind) {
                continue;
            }
            let matches = if registration.options.subtree {
                inclusive_ancestor(nodes, registration.target, record.target)
            } else {
                registration.target == record.target
            };
            if matches {
                registration.pending.push(record.clone());
            }
        }
    }

    /// Detach `node` from its parent, queuing a child-list record.
    fn detach(&mut self, node: NodeId) -> Result<()> {
        let Some(parent) = self.slot(node)?.parent else {
            return Ok(());
        };
        self.queue(MutationRecord::child_list(parent, Vec::new(), vec![node]));
        self.slot_mut(parent)?.children.retain(|c| *c != node);
        self.slot_mut(node)?.parent = None;
        Ok(())
    }

    /// Insert `child` into `parent` at `index`, moving it if already attached.
    fn insert_at(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) -> Result<()> {
        self.require_element(parent)?;
        self.slot(child)?;
        if child == self.root {
            return Err(DomError::HierarchyViolation {
                node: child,
                reason: "the root element cannot be moved".to_string(),
            });
        }
        if self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::HierarchyViolation {
                node: child,
                reason: format!("{child} is an ancestor of {parent}"),
            });
        }
        self.detach(child)?;
        let slot = self.slot_mut(parent)?;
        let index = index.unwrap_or(slot.children.len()).min(slot.children.len());
        slot.children.insert(index, child);
        self.slot_mut(child)?.parent = Some(parent);
        self.queue(MutationRecord::child_list(parent, vec![child], Vec::new()));
        Ok(())
    }

    fn build(&mut self, vnode: &VNode) -> NodeId {
        match vnode {
            VNode::Text(data) => self.alloc(NodeData::Text { data: data.clone() }),
            VNode::Element {
                tag,
                attributes,
                children,
            } => {
                let id = self.alloc(NodeData::Element {
                    tag: tag.clone(),
                    attributes: attributes.clone(),
                });
                for child in children {
                    let child_id = self.build(child);
                    // Detached subtree: link directly, nobody can observe it yet.
                    self.nodes[child_id.0 as usize].parent = Some(id);
                    self.nodes[id.0 as usize].children.push(child_id);
                }
                id
            }
        }
    }

    fn snapshot(&self, node: NodeId) -> Result<VNode> {
        let slot = self.slot(node)?;
        Ok(match &slot.data {
            NodeData::Text { data } => VNode::Text(data.clone()),
            NodeData::Element { tag, attributes } => VNode::Element {
                tag: tag.clone(),
                attributes: attributes.clone(),
                children: slot
                    .children
                    .iter()
                    .map(|c| self.snapshot(*c))
                    .collect::<Result<Vec<_>>>()?,
            },
        })
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        let Some(slot) = self.nodes.get(node.0 as usize) else {
            return;
        };
        match &slot.data {
            NodeData::Text { data } => out.push_str(data),
            NodeData::Element { .. } => {
                for child in &slot.children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    fn descendants(&self, node: NodeId, out: &mut Vec<NodeId>) {
        let Some(slot) = self.nodes.get(node.0 as usize) else {
            return;
        };
        out.push(node);
        for child in &slot.children {
            self.descendants(*child, out);
        }
    }
}

/// Handle to a shared document tree.
///
/// Cheap to clone; all clones observe and mutate the same tree.
#[derive(Clone, Handle)]
pub struct Document {
    inner: Arc<Mutex<Tree>>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tree = self.tree();
        f.debug_struct("Document")
            .field("nodes", &tree.nodes.len())
            .field("root", &tree.root)
            .field("observers", &tree.observers.len())
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document with a `body` root element.
    pub fn new() -> Self {
        let mut tree = Tree {
            nodes: Vec::new(),
            root: NodeId(0),
            observers: Vec::new(),
            next_observer: 0,
        };
        tree.root = tree.alloc(NodeData::Element {
            tag: ROOT_TAG.to_string(),
            attributes: Vec::new(),
        });
        Self {
            inner: Arc::new(Mutex::new(tree)),
        }
    }

    /// Create a document whose root is built from `vnode`.
    ///
    /// The description must be an element.
    pub fn from_vnode(vnode: &VNode) -> Result<Self> {
        let mut tree = Tree {
            nodes: Vec::new(),
            root: NodeId(0),
            observers: Vec::new(),
            next_observer: 0,
        };
        let root = tree.build(vnode);
        if let NodeData::Text { .. } = tree.nodes[root.0 as usize].data {
            return Err(DomError::NotAnElement { node: root });
        }
        tree.root = root;
        Ok(Self {
            inner: Arc::new(Mutex::new(tree)),
        })
    }

    fn tree(&self) -> MutexGuard<'_, Tree> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether two handles refer to the same tree.
    pub fn ptr_eq(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The root element.
    pub fn root(&self) -> NodeId {
        self.tree().root
    }

    /// Number of nodes ever allocated.
    pub fn len(&self) -> usize {
        self.tree().nodes.len()
    }

    /// Always false: a document has at least its root.
    pub fn is_empty(&self) -> bool {
        false
    }

    // === Construction ===

    /// Create a detached element.
    pub fn create_element(&self, tag: impl Into<String>) -> NodeId {
        self.tree().alloc(NodeData::Element {
            tag: tag.into(),
            attributes: Vec::new(),
        })
    }

    /// Create a detached text node.
    pub fn create_text(&self, data: impl Into<String>) -> NodeId {
        self.tree().alloc(NodeData::Text { data: data.into() })
    }

    /// Create a detached subtree from a description.
    pub fn build(&self, vnode: &VNode) -> NodeId {
        self.tree().build(vnode)
    }

    /// Describe the subtree rooted at `node`.
    pub fn snapshot(&self, node: NodeId) -> Result<VNode> {
        self.tree().snapshot(node)
    }

    // === Structural mutation ===

    /// Append `child` as the last child of `parent`, moving it if attached elsewhere.
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<()> {
        self.tree().insert_at(parent, child, None)
    }

    /// Insert `child` before `reference` (or at the end when `None`).
    pub fn insert_before(
        &self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<()> {
        let mut tree = self.tree();
        let index = match reference {
            None => None,
            Some(reference) => {
                let siblings = &tree.slot(parent)?.children;
                let mut position = siblings.iter().position(|c| *c == reference).ok_or_else(|| {
                    DomError::HierarchyViolation {
                        node: reference,
                        reason: format!("{reference} is not a child of {parent}"),
                    }
                })?;
                // Detaching `child` first shifts everything after it.
                if siblings.iter().position(|c| *c == child).is_some_and(|p| p < position) {
                    position -= 1;
                }
                Some(position)
            }
        };
        tree.insert_at(parent, child, index)
    }

    /// Insert `child` as the immediate next sibling of `reference`.
    pub fn insert_after(&self, reference: NodeId, child: NodeId) -> Result<()> {
        let mut tree = self.tree();
        let parent = tree
            .slot(reference)?
            .parent
            .ok_or_else(|| DomError::HierarchyViolation {
                node: reference,
                reason: format!("{reference} has no parent"),
            })?;
        if child == reference {
            return Ok(());
        }
        let siblings = &tree.slot(parent)?.children;
        let mut position = siblings
            .iter()
            .position(|c| *c == reference)
            .map_or(siblings.len(), |p| p + 1);
        // Detaching `child` first shifts everything after it.
        if siblings.iter().position(|c| *c == child).is_some_and(|p| p < position) {
            position -= 1;
        }
        tree.insert_at(parent, child, Some(position))
    }

    /// Detach `node` from its parent. No-op for detached nodes.
    pub fn remove(&self, node: NodeId) -> Result<()> {
        self.tree().detach(node)
    }

    /// Replace every child of `node` with one text node holding `data`.
    ///
    /// Returns the new text node.
    pub fn replace_children_with_text(&self, node: NodeId, data: impl Into<String>) -> Result<NodeId> {
        let mut tree = self.tree();
        tree.require_element(node)?;
        let removed = std::mem::take(&mut tree.slot_mut(node)?.children);
        for child in &removed {
            tree.slot_mut(*child)?.parent = None;
        }
        let text = tree.alloc(NodeData::Text { data: data.into() });
        tree.slot_mut(node)?.children.push(text);
        tree.slot_mut(text)?.parent = Some(node);
        tree.queue(MutationRecord::child_list(node, vec![text], removed));
        Ok(text)
    }

    // === Attribute and character data mutation ===

    /// Set an attribute on an element.
    pub fn set_attribute(
        &self,
        node: NodeId,
        name: &str,
        value: impl Into<String>,
    ) -> Result<()> {
        let value = value.into();
        let mut tree = self.tree();
        let old = match &mut tree.slot_mut(node)?.data {
            NodeData::Text { .. } => return Err(DomError::NotAnElement { node }),
            NodeData::Element { attributes, .. } => {
                match attributes.iter_mut().find(|(n, _)| n == name) {
                    Some(slot) => Some(std::mem::replace(&mut slot.1, value.clone())),
                    None => {
                        attributes.push((name.to_string(), value.clone()));
                        None
                    }
                }
            }
        };
        tree.queue(MutationRecord::attributes(node, name, old, Some(value)));
        Ok(())
    }

    /// Remove an attribute. No record is queued when it was absent.
    pub fn remove_attribute(&self, node: NodeId, name: &str) -> Result<()> {
        let mut tree = self.tree();
        let old = match &mut tree.slot_mut(node)?.data {
            NodeData::Text { .. } => return Err(DomError::NotAnElement { node }),
            NodeData::Element { attributes, .. } => {
                let position = attributes.iter().position(|(n, _)| n == name);
                position.map(|p| attributes.remove(p).1)
            }
        };
        if old.is_some() {
            tree.queue(MutationRecord::attributes(node, name, old, None));
        }
        Ok(())
    }

    /// Replace the data of a text node.
    pub fn set_text(&self, node: NodeId, data: impl Into<String>) -> Result<()> {
        let data = data.into();
        let mut tree = self.tree();
        let old = match &mut tree.slot_mut(node)?.data {
            NodeData::Element { .. } => return Err(DomError::NotAText { node }),
            NodeData::Text { data: current } => std::mem::replace(current, data.clone()),
        };
        tree.queue(MutationRecord::character_data(node, old, data));
        Ok(())
    }

    // === Reads ===

    /// Tag name of an element; `None` for text or unknown nodes.
    pub fn tag(&self, node: NodeId) -> Option<String> {
        match &self.tree().slot(node).ok()?.data {
            NodeData::Element { tag, .. } => Some(tag.clone()),
            NodeData::Text { .. } => None,
        }
    }

    /// Attribute value of an element.
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        match &self.tree().slot(node).ok()?.data {
            NodeData::Element { attributes, .. } => attributes
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone()),
            NodeData::Text { .. } => None,
        }
    }

    /// All attributes of an element, in insertion order.
    pub fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        match self.tree().slot(node).map(|s| &s.data) {
            Ok(NodeData::Element { attributes, .. }) => attributes.clone(),
            _ => Vec::new(),
        }
    }

    /// Data of a text node.
    pub fn text(&self, node: NodeId) -> Option<String> {
        match &self.tree().slot(node).ok()?.data {
            NodeData::Text { data } => Some(data.clone()),
            NodeData::Element { .. } => None,
        }
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(
            self.tree().slot(node).map(|s| &s.data),
            Ok(NodeData::Element { .. })
        )
    }

    pub fn is_text(&self, node: NodeId) -> bool {
        matches!(
            self.tree().slot(node).map(|s| &s.data),
            Ok(NodeData::Text { .. })
        )
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.tree()
            .slot(node)
            .map(|s| s.children.clone())
            .unwrap_or_default()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.tree().slot(node).ok()?.parent
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let tree = self.tree();
        let parent = tree.slot(node).ok()?.parent?;
        let siblings = &tree.slot(parent).ok()?.children;
        let position = siblings.iter().position(|c| *c == node)?;
        siblings.get(position + 1).copied()
    }

    /// Whether `node` is reachable from the root.
    pub fn is_connected(&self, node: NodeId) -> bool {
        let tree = self.tree();
        tree.slot(node).is_ok() && tree.is_inclusive_ancestor(tree.root, node)
    }

    /// Whether `node` is `ancestor` or lies below it.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.tree().is_inclusive_ancestor(ancestor, node)
    }

    /// Concatenated text of the subtree.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.tree().collect_text(node, &mut out);
        out
    }

    /// `node` and all of its descendants in document order.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.tree().descendants(node, &mut out);
        out
    }

    /// Elements under `node` (inclusive) for which `predicate` holds, in document order.
    pub fn elements_matching<F>(&self, node: NodeId, mut predicate: F) -> Vec<NodeId>
    where
        F: FnMut(&str, &[(String, String)]) -> bool,
    {
        let tree = self.tree();
        let mut all = Vec::new();
        tree.descendants(node, &mut all);
        all.into_iter()
            .filter(|id| match &tree.nodes[id.0 as usize].data {
                NodeData::Element { tag, attributes } => predicate(tag, attributes),
                NodeData::Text { .. } => false,
            })
            .collect()
    }

    // === Observation ===

    /// Register an observer on `target`.
    pub fn observe(
        &self,
        target: NodeId,
        options: ObserveOptions,
        callback: MutationCallback,
    ) -> Result<ObserverId> {
        let mut tree = self.tree();
        tree.slot(target)?;
        tree.next_observer += 1;
        let id = ObserverId(tree.next_observer);
        tree.observers.push(Registration {
            id,
            target,
            options,
            callback,
            pending: Vec::new(),
        });
        Ok(id)
    }

    /// Take the records queued for an observer without delivering them.
    pub fn take_records(&self, observer: ObserverId) -> Result<Vec<MutationRecord>> {
        let mut tree = self.tree();
        let registration = tree
            .observers
            .iter_mut()
            .find(|r| r.id == observer)
            .ok_or(DomError::ObserverNotFound { observer })?;
        Ok(std::mem::take(&mut registration.pending))
    }

    /// Remove an observer, discarding undelivered records. Returns whether it existed.
    pub fn disconnect(&self, observer: ObserverId) -> bool {
        let mut tree = self.tree();
        let before = tree.observers.len();
        tree.observers.retain(|r| r.id != observer);
        tree.observers.len() != before
    }

    /// Whether any observer has undelivered records.
    pub fn has_pending_mutations(&self) -> bool {
        self.tree().observers.iter().any(|r| !r.pending.is_empty())
    }

    /// Deliver every queued batch to its observer.
    ///
    /// Observers are invoked in registration order, once each, with the lock
    /// released. Returns the number of records delivered.
    pub fn deliver_mutations(&self) -> usize {
        let batches: Vec<(MutationCallback, Vec<MutationRecord>)> = {
            let mut tree = self.tree();
            tree.observers
                .iter_mut()
                .filter(|r| !r.pending.is_empty())
                .map(|r| (Arc::clone(&r.callback), std::mem::take(&mut r.pending)))
                .collect()
        };
        let mut delivered = 0;
        for (callback, records) in batches {
            delivered += records.len();
            callback(records);
        }
        delivered
    }
}
