//! Auto-DOM: derived companion views.
//!
//! A fragment whose kind supports it shows a rendered view of its content in
//! a companion element inserted as the fragment node's next sibling. The
//! controller here tracks whether that view is stale, recomputes it in the
//! background when content changes, and splices the result into the
//! companion so that existing nodes are patched in place instead of rebuilt.
//!
//! Renders of one fragment are serialized by a per-fragment async lock; a
//! change that lands while a render is running schedules one more render.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::{
    Result,
    cache::CacheKey,
    dom::{Document, DomError, NodeId, VNode},
    fragment::{ChangeContext, ContextToken, Fragment, FragmentError, ScopedWrite},
};

#[derive(Debug)]
struct AutoDomState {
    dirty: bool,
    scheduled: bool,
    /// Bumped on every invalidation; a render only clears `dirty` if no
    /// invalidation happened while it ran.
    generation: u64,
    companion: Option<NodeId>,
    renders: u64,
}

/// Per-fragment auto-DOM state.
#[derive(Debug)]
pub(crate) struct AutoDomController {
    token: ContextToken,
    state: Mutex<AutoDomState>,
    render_lock: tokio::sync::Mutex<()>,
}

impl AutoDomController {
    pub(crate) fn new() -> Self {
        Self {
            token: ContextToken::new(),
            state: Mutex::new(AutoDomState {
                dirty: true,
                scheduled: false,
                generation: 0,
                companion: None,
                renders: 0,
            }),
            render_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn state(&self) -> MutexGuard<'_, AutoDomState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn companion(&self) -> Option<NodeId> {
        self.state().companion
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.state().dirty
    }

    pub(crate) fn renders(&self) -> u64 {
        self.state().renders
    }

    pub(crate) fn mark_dirty(&self) {
        let mut state = self.state();
        state.dirty = true;
        state.generation += 1;
    }

    /// Claim the pending-render slot. False if a render is already queued.
    pub(crate) fn begin_schedule(&self) -> bool {
        let mut state = self.state();
        !std::mem::replace(&mut state.scheduled, true)
    }

    pub(crate) fn cancel_schedule(&self) {
        self.state().scheduled = false;
    }

    /// `changed` listener. Ignores the controller's own splices.
    pub(crate) fn on_changed(&self, fragment: &Fragment, context: &ChangeContext) {
        if *context == ChangeContext::Token(self.token) {
            return;
        }
        if !fragment.auto() || fragment.runtime().config.autorun_disabled {
            return;
        }
        self.mark_dirty();
        fragment.schedule_auto_dom();
    }

    /// Recompute and splice the companion if it is stale.
    ///
    /// A result that arrives after the fragment was unloaded or had `auto`
    /// switched off is dropped.
    pub(crate) async fn render(&self, fragment: &Fragment) -> Result<()> {
        let _render = self.render_lock.lock().await;
        let generation = {
            let mut state = self.state();
            state.scheduled = false;
            if !state.dirty {
                return Ok(());
            }
            state.generation
        };
        if fragment.is_unloaded() {
            return Ok(());
        }

        let raw = fragment.raw()?;
        let runtime = fragment.runtime();
        let key = CacheKey::new(fragment.type_id(), &raw);
        let content = match runtime.cache.as_ref().and_then(|cache| cache.get(&key)) {
            Some(hit) => {
                trace!(fragment = %fragment.id(), hash = %key.content_hash, "Render cache hit");
                Some(hit)
            }
            None => {
                let kind = fragment.kind().clone();
                let produced = kind.create_auto_dom(fragment).await?;
                if let (Some(cache), Some(content)) = (&runtime.cache, &produced) {
                    cache.set(key, content.clone());
                }
                produced
            }
        };

        if fragment.is_unloaded() || !fragment.auto() {
            debug!(fragment = %fragment.id(), "Dropping render for inactive fragment");
            return Ok(());
        }
        self.splice(fragment, content)?;

        let mut state = self.state();
        state.renders += 1;
        if state.generation == generation {
            state.dirty = false;
        }
        Ok(())
    }

    fn splice(&self, fragment: &Fragment, content: Option<Vec<VNode>>) -> Result<()> {
        let doc = fragment.document();
        let existing = self.companion().filter(|c| doc.is_connected(*c));
        match (existing, content) {
            (None, None) => Ok(()),
            (Some(companion), content) => {
                let content = content.unwrap_or_default();
                fragment.run_without_observing(ScopedWrite::new(self.token), |doc| {
                    Ok(patch_children(doc, companion, &content)?)
                })
            }
            (None, Some(content)) => {
                let root = fragment.node();
                if !doc.is_connected(root) {
                    return Err(FragmentError::Detached {
                        fragment: fragment.id(),
                    }
                    .into());
                }
                let config = &fragment.runtime().config;
                let id = fragment.id().to_string();
                let companion =
                    fragment.run_without_observing(ScopedWrite::new(self.token), |doc| {
                        let companion = doc.create_element(config.companion_tag.as_str());
                        doc.set_attribute(companion, &config.fragment_id_attribute, id)?;
                        if let Some(class) = doc.attribute(root, &config.class_attribute) {
                            doc.set_attribute(companion, &config.class_attribute, class)?;
                        }
                        patch_children(doc, companion, &content)?;
                        doc.insert_after(root, companion)?;
                        Ok(companion)
                    })?;
                debug!(fragment = %fragment.id(), companion = %companion, "Companion view created");
                self.state().companion = Some(companion);
                Ok(())
            }
        }
    }

    /// Remove the companion and mark the view stale.
    pub(crate) fn clear(&self, fragment: &Fragment) -> Result<()> {
        let companion = {
            let mut state = self.state();
            state.dirty = true;
            state.generation += 1;
            state.companion.take()
        };
        let Some(companion) = companion else {
            return Ok(());
        };
        fragment.run_without_observing(
            ScopedWrite::new(self.token).skip_if_unchanged(),
            |doc| Ok(doc.remove(companion)?),
        )
    }

    /// Copy the fragment's class onto the companion.
    pub(crate) fn mirror_class(&self, fragment: &Fragment, class: Option<&str>) -> Result<()> {
        let Some(companion) = self.companion() else {
            return Ok(());
        };
        let attribute = fragment.runtime().config.class_attribute.clone();
        fragment.run_without_observing(
            ScopedWrite::new(self.token).skip_if_unchanged(),
            |doc| {
                match class {
                    Some(class) => doc.set_attribute(companion, &attribute, class)?,
                    None => doc.remove_attribute(companion, &attribute)?,
                }
                Ok(())
            },
        )
    }
}

/// Make the children of `parent` match `content`, reusing nodes by position.
///
/// Nodes of the same kind (text, or element with the same tag) are updated
/// in place; anything else is replaced. Surplus children are removed.
pub(crate) fn patch_children(
    doc: &Document,
    parent: NodeId,
    content: &[VNode],
) -> std::result::Result<(), DomError> {
    let existing = doc.children(parent);
    for (index, vnode) in content.iter().enumerate() {
        match existing.get(index) {
            Some(&node) if same_shape(doc, node, vnode) => patch_node(doc, node, vnode)?,
            Some(&node) => {
                let fresh = doc.build(vnode);
                doc.insert_before(parent, fresh, Some(node))?;
                doc.remove(node)?;
            }
            None => {
                let fresh = doc.build(vnode);
                doc.append_child(parent, fresh)?;
            }
        }
    }
    for &surplus in existing.iter().skip(content.len()) {
        doc.remove(surplus)?;
    }
    Ok(())
}

fn same_shape(doc: &Document, node: NodeId, vnode: &VNode) -> bool {
    match vnode {
        VNode::Text(_) => doc.is_text(node),
        VNode::Element { tag, .. } => doc.tag(node).as_deref() == Some(tag.as_str()),
    }
}

fn patch_node(doc: &Document, node: NodeId, vnode: &VNode) -> std::result::Result<(), DomError> {
    match vnode {
        VNode::Text(data) => {
            if doc.text(node).as_deref() != Some(data.as_str()) {
                doc.set_text(node, data.as_str())?;
            }
        }
        VNode::Element {
            attributes,
            children,
            ..
        } => {
            for (name, _) in doc.attributes(node) {
                if !attributes.iter().any(|(wanted, _)| *wanted == name) {
                    doc.remove_attribute(node, &name)?;
                }
            }
            for (name, value) in attributes {
                if doc.attribute(node, name).as_deref() != Some(value.as_str()) {
                    doc.set_attribute(node, name, value.as_str())?;
                }
            }
            patch_children(doc, node, children)?;
        }
    }
    Ok(())
}
