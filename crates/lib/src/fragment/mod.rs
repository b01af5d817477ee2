//! Fragment wrappers.
//!
//! A [`Fragment`] is the live entity attached to one fragment node of the
//! shared document. It owns an observer over its subtree, turns the observed
//! mutations into typed events, and exposes the fragment's raw text and
//! automation flag to user code.
//!
//! Fragments are created by the [`FragmentRegistry`](crate::FragmentRegistry);
//! each node is wrapped at most once and the registry hands out clones of the
//! same wrapper.
//!
//! ## Events
//!
//! - `changed`: once per observed batch that touched content, and after every
//!   scoped write unless suppressed
//! - `text_inserted` / `text_deleted`: char-offset edits derived by diffing
//!   text nodes, in an order that replays the change
//! - `auto_changed` / `class_changed`: the corresponding attributes on the
//!   fragment node changed
//! - `unloaded`: the wrapper is being torn down

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use handle_trait::Handle;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{Instrument, debug, info_span, trace, warn};
use uuid::Uuid;

use crate::{
    Result,
    auto_dom::AutoDomController,
    cache::ContentHash,
    context::{FailurePhase, FragmentFailure, RuntimeContext},
    diff::{DiffConfig, DiffKind, diff_with_config},
    dom::{Document, MutationCallback, MutationKind, MutationRecord, NodeId},
    observer::FragmentObserver,
};

mod errors;
mod handlers;
mod kind;

pub use errors::FragmentError;
pub use handlers::{
    AutoChangedHandler, ChangeContext, ChangedHandler, ClassChangedHandler, ContextToken,
    ScopedWrite, Subscription, TextHandler, UnloadedHandler,
};
pub use kind::{FragmentKind, RequireOptions, RequireReason, content_from_value};

use handlers::{HandlerSlot, Handlers};

/// Unique id of a fragment wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FragmentId(Uuid);

impl FragmentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for FragmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentState {
    /// Built but not yet observing.
    Constructed,
    Observing,
    /// Inside a scoped write.
    Paused,
    /// Terminal.
    Unloaded,
}

#[derive(Debug, Default)]
struct Status {
    unloading: bool,
    unloaded: bool,
    loaded: bool,
}

pub(crate) struct FragmentInner {
    id: FragmentId,
    sequence: u64,
    node: NodeId,
    document: Document,
    kind: Arc<dyn FragmentKind>,
    runtime: Arc<RuntimeContext>,
    observer: FragmentObserver,
    pub(crate) handlers: Handlers,
    status: Mutex<Status>,
    auto_dom: Option<AutoDomController>,
}

/// Live wrapper around one fragment node.
///
/// Cheap to clone; clones share the same wrapper, and equality is identity.
#[derive(Clone, Handle)]
pub struct Fragment {
    inner: Arc<FragmentInner>,
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("id", &self.inner.id)
            .field("type_id", &self.type_id())
            .field("node", &self.inner.node)
            .field("state", &self.state())
            .field("handlers", &self.inner.handlers)
            .finish()
    }
}

impl PartialEq for Fragment {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Fragment {}

impl Fragment {
    /// Wrap `node` and start observing it.
    pub(crate) fn new(
        document: Document,
        node: NodeId,
        kind: Arc<dyn FragmentKind>,
        runtime: Arc<RuntimeContext>,
    ) -> Result<Self> {
        let inner = Arc::new_cyclic(|weak: &Weak<FragmentInner>| {
            let weak = weak.clone();
            let callback: MutationCallback = Arc::new(move |records| {
                if let Some(inner) = weak.upgrade() {
                    Fragment { inner }.process_mutations(records);
                }
            });
            FragmentInner {
                id: FragmentId::new(),
                sequence: runtime.next_sequence(),
                node,
                observer: FragmentObserver::new(document.handle(), node, callback),
                document,
                auto_dom: kind.supports_auto_dom().then(AutoDomController::new),
                kind,
                runtime,
                handlers: Handlers::default(),
                status: Mutex::new(Status::default()),
            }
        });
        let fragment = Fragment { inner };
        fragment.inner.observer.start()?;
        trace!(fragment = %fragment.id(), node = %node, type_id = fragment.type_id(), "Fragment constructed");
        Ok(fragment)
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        self.inner
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.status().unloaded {
            return Err(FragmentError::Unloaded {
                fragment: self.inner.id,
            }
            .into());
        }
        Ok(())
    }

    // === Identity ===

    pub fn id(&self) -> FragmentId {
        self.inner.id
    }

    /// The fragment node. It stays readable after unload, but is no longer
    /// linked to this wrapper.
    pub fn node(&self) -> NodeId {
        self.inner.node
    }

    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    pub fn type_id(&self) -> &str {
        self.inner.kind.type_id()
    }

    pub fn kind(&self) -> &Arc<dyn FragmentKind> {
        &self.inner.kind
    }

    /// Position in discovery order.
    pub(crate) fn sequence(&self) -> u64 {
        self.inner.sequence
    }

    pub fn state(&self) -> FragmentState {
        if self.status().unloaded {
            FragmentState::Unloaded
        } else if self.inner.observer.is_paused() {
            FragmentState::Paused
        } else if self.inner.observer.is_observing() {
            FragmentState::Observing
        } else {
            FragmentState::Constructed
        }
    }

    pub fn is_unloaded(&self) -> bool {
        self.status().unloaded
    }

    /// Whether a load pass has picked this fragment up.
    pub fn is_loaded(&self) -> bool {
        self.status().loaded
    }

    /// Mark as loaded. Returns false if it already was.
    pub(crate) fn mark_loaded(&self) -> bool {
        let mut status = self.status();
        !std::mem::replace(&mut status.loaded, true)
    }

    // === Content ===

    /// The single text child, if the node holds exactly that.
    fn content_text_node(&self) -> Option<NodeId> {
        let doc = &self.inner.document;
        match doc.children(self.inner.node).as_slice() {
            [only] if doc.is_text(*only) => Some(*only),
            _ => None,
        }
    }

    fn current_raw(&self) -> String {
        let doc = &self.inner.document;
        match self.content_text_node() {
            Some(text) => doc.text(text).unwrap_or_default(),
            None => doc.text_content(self.inner.node),
        }
    }

    /// The fragment's source text.
    pub fn raw(&self) -> Result<String> {
        self.ensure_live()?;
        Ok(self.current_raw())
    }

    /// Replace the source text.
    ///
    /// The write is observed like any other edit, so it produces
    /// `text_inserted`/`text_deleted` events and one `changed` notification
    /// at the next delivery. A node whose content is not a single text child
    /// is normalized first, without notification.
    pub fn set_raw(&self, value: &str) -> Result<()> {
        self.ensure_live()?;
        let root = self.inner.node;
        let text = match self.content_text_node() {
            Some(text) => text,
            None => self.run_without_observing(
                ScopedWrite::new(self.inner.id).skip_if_unchanged(),
                |doc| {
                    let current = doc.text_content(root);
                    Ok(doc.replace_children_with_text(root, current)?)
                },
            )?,
        };
        self.inner.document.set_text(text, value)?;
        Ok(())
    }

    /// Whether automation is enabled. Any value except `"false"` counts.
    pub fn auto(&self) -> bool {
        self.inner
            .document
            .attribute(self.inner.node, &self.inner.runtime.config.auto_attribute)
            .is_some_and(|v| v != "false")
    }

    /// Enable or disable automation.
    ///
    /// `auto_changed` handlers run before this returns.
    pub fn set_auto(&self, enabled: bool) -> Result<()> {
        self.ensure_live()?;
        if self.auto() == enabled {
            return Ok(());
        }
        let root = self.inner.node;
        let attribute = self.inner.runtime.config.auto_attribute.clone();
        self.run_without_observing(
            ScopedWrite::new(self.inner.id).skip_if_unchanged(),
            |doc| {
                if enabled {
                    doc.set_attribute(root, &attribute, "true")?;
                } else {
                    doc.remove_attribute(root, &attribute)?;
                }
                Ok(())
            },
        )?;
        self.dispatch_auto_changed(enabled);
        Ok(())
    }

    pub fn class(&self) -> Option<String> {
        self.inner
            .document
            .attribute(self.inner.node, &self.inner.runtime.config.class_attribute)
    }

    /// Interpret the raw text through the fragment's kind.
    pub async fn require(&self, options: RequireOptions) -> Result<Value> {
        self.ensure_live()?;
        let kind = self.inner.kind.clone();
        kind.require(self, options).await
    }

    // === Auto-DOM ===

    /// The companion element currently showing this fragment's derived view.
    pub fn companion(&self) -> Option<NodeId> {
        self.inner.auto_dom.as_ref().and_then(|c| c.companion())
    }

    /// Whether the derived view is out of date.
    pub fn is_auto_dom_dirty(&self) -> bool {
        self.inner.auto_dom.as_ref().is_some_and(|c| c.is_dirty())
    }

    /// Number of completed companion renders.
    pub fn auto_dom_renders(&self) -> u64 {
        self.inner.auto_dom.as_ref().map_or(0, |c| c.renders())
    }

    /// Recompute the derived view now, regardless of the dirty flag.
    ///
    /// Errors are returned to the caller rather than reported.
    pub async fn refresh_auto_dom(&self) -> Result<()> {
        self.ensure_live()?;
        match &self.inner.auto_dom {
            Some(controller) => {
                controller.mark_dirty();
                controller.render(self).await
            }
            None => Ok(()),
        }
    }

    /// Queue a background render if one is due.
    pub(crate) fn schedule_auto_dom(&self) {
        let Some(controller) = &self.inner.auto_dom else {
            return;
        };
        if !controller.begin_schedule() {
            return;
        }
        let fragment = self.handle();
        let span = info_span!("auto_dom", fragment = %self.inner.id, type_id = self.type_id());
        let spawned = self.inner.runtime.tasks.spawn(
            "auto-dom render",
            async move {
                if let Some(controller) = &fragment.inner.auto_dom {
                    if let Err(e) = controller.render(&fragment).await {
                        fragment.report(FailurePhase::AutoDom, &e);
                    }
                }
            }
            .instrument(span),
        );
        if !spawned {
            controller.cancel_schedule();
        }
    }

    // === Scoped writes ===

    /// Run `write_fn` against the document with this fragment's observer
    /// paused, then fire one `changed` notification carrying `write.context`.
    ///
    /// Mutations made inside are never seen by this fragment's observer. The
    /// observer is restarted even when `write_fn` fails. With
    /// `skip_if_unchanged`, the notification is dropped when the raw text
    /// hashes the same before and after.
    pub fn run_without_observing<R, F>(&self, write: ScopedWrite, write_fn: F) -> Result<R>
    where
        F: FnOnce(&Document) -> Result<R>,
    {
        self.ensure_live()?;
        let before = write
            .skip_if_unchanged
            .then(|| ContentHash::of(&self.current_raw()));
        let value = {
            let _pause = self.inner.observer.pause()?;
            write_fn(&self.inner.document)?
        };
        if before.is_some_and(|hash| hash == ContentHash::of(&self.current_raw())) {
            trace!(fragment = %self.inner.id, "Scoped write left content unchanged");
            return Ok(value);
        }
        self.fire_changed(write.context);
        Ok(value)
    }

    // === Subscriptions ===

    fn subscription(&self, slot: HandlerSlot, id: u64) -> Subscription {
        Subscription::new(Arc::downgrade(&self.inner), slot, id)
    }

    pub fn register_on_changed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Fragment, &ChangeContext) + Send + Sync + 'static,
    {
        let id = self.inner.handlers.changed.add(Arc::new(handler));
        self.subscription(HandlerSlot::Changed, id)
    }

    pub fn register_on_unloaded<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Fragment) + Send + Sync + 'static,
    {
        let id = self.inner.handlers.unloaded.add(Arc::new(handler));
        self.subscription(HandlerSlot::Unloaded, id)
    }

    pub fn register_on_auto_changed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Fragment, bool) + Send + Sync + 'static,
    {
        let id = self.inner.handlers.auto_changed.add(Arc::new(handler));
        self.subscription(HandlerSlot::AutoChanged, id)
    }

    pub fn register_on_class_changed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Fragment, Option<&str>) + Send + Sync + 'static,
    {
        let id = self.inner.handlers.class_changed.add(Arc::new(handler));
        self.subscription(HandlerSlot::ClassChanged, id)
    }

    pub fn register_on_text_inserted<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Fragment, usize, &str) + Send + Sync + 'static,
    {
        let id = self.inner.handlers.text_inserted.add(Arc::new(handler));
        self.subscription(HandlerSlot::TextInserted, id)
    }

    pub fn register_on_text_deleted<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Fragment, usize, &str) + Send + Sync + 'static,
    {
        let id = self.inner.handlers.text_deleted.add(Arc::new(handler));
        self.subscription(HandlerSlot::TextDeleted, id)
    }

    // === Dispatch ===

    pub(crate) fn fire_changed(&self, context: ChangeContext) {
        for handler in self.inner.handlers.changed.snapshot() {
            handler(self, &context);
        }
        if let Some(controller) = &self.inner.auto_dom {
            controller.on_changed(self, &context);
        }
    }

    fn dispatch_auto_changed(&self, enabled: bool) {
        debug!(fragment = %self.inner.id, enabled, "Automation flag changed");
        for handler in self.inner.handlers.auto_changed.snapshot() {
            handler(self, enabled);
        }
        let Some(controller) = &self.inner.auto_dom else {
            return;
        };
        if enabled {
            if !self.inner.runtime.config.autorun_disabled {
                controller.mark_dirty();
                self.schedule_auto_dom();
            }
        } else if let Err(e) = controller.clear(self) {
            self.report(FailurePhase::AutoDom, &e);
        }
    }

    fn dispatch_class_changed(&self, class: Option<String>) {
        for handler in self.inner.handlers.class_changed.snapshot() {
            handler(self, class.as_deref());
        }
        if let Some(controller) = &self.inner.auto_dom {
            if let Err(e) = controller.mirror_class(self, class.as_deref()) {
                self.report(FailurePhase::AutoDom, &e);
            }
        }
    }

    fn dispatch_text(&self, kind: DiffKind, offset: usize, value: &str) {
        let handlers = match kind {
            DiffKind::Insert => self.inner.handlers.text_inserted.snapshot(),
            DiffKind::Delete => self.inner.handlers.text_deleted.snapshot(),
        };
        for handler in handlers {
            handler(self, offset, value);
        }
    }

    /// Char offset of `text` within the fragment's raw text as of the end of
    /// the batch. Nodes edited in the batch count with their batch-end value.
    fn text_offset(
        &self,
        order: &[NodeId],
        text: NodeId,
        batch_values: &HashMap<NodeId, &str>,
    ) -> usize {
        let doc = &self.inner.document;
        order
            .iter()
            .take_while(|node| **node != text)
            .filter_map(|node| match batch_values.get(node) {
                Some(value) => Some(value.chars().count()),
                None => doc.text(*node).map(|data| data.chars().count()),
            })
            .sum()
    }

    /// Observer callback: turn one batch of records into events.
    fn process_mutations(&self, records: Vec<MutationRecord>) {
        if self.is_unloaded() {
            return;
        }
        let config = &self.inner.runtime.config;
        let doc = &self.inner.document;
        let root = self.inner.node;
        let mut content_changed = false;
        // Per text node: the value before the batch and the value after it.
        let mut texts: Vec<(NodeId, String, String)> = Vec::new();
        let mut text_index: HashMap<NodeId, usize> = HashMap::new();

        for record in &records {
            match record.kind {
                MutationKind::Attributes => {
                    let name = record.attribute_name.as_deref();
                    if record.target == root && name == Some(config.auto_attribute.as_str()) {
                        self.dispatch_auto_changed(self.auto());
                    } else if record.target == root
                        && name == Some(config.class_attribute.as_str())
                    {
                        self.dispatch_class_changed(self.class());
                    } else {
                        content_changed = true;
                    }
                }
                MutationKind::CharacterData => {
                    // First record supplies the old value, the last one the new.
                    let value = record.value.clone().unwrap_or_default();
                    match text_index.get(&record.target) {
                        Some(&i) => texts[i].2 = value,
                        None => {
                            text_index.insert(record.target, texts.len());
                            let old = record.old_value.clone().unwrap_or_default();
                            texts.push((record.target, old, value));
                        }
                    }
                    content_changed = true;
                }
                MutationKind::ChildList => content_changed = true,
            }
        }

        if !texts.is_empty() {
            let order = doc.descendants(root);
            // Detached text nodes are covered by their child-list record.
            let mut texts: Vec<(usize, NodeId, String, String)> = texts
                .into_iter()
                .filter_map(|(node, old, new)| {
                    let position = order.iter().position(|n| *n == node)?;
                    Some((position, node, old, new))
                })
                .collect();
            texts.sort_by_key(|(position, ..)| *position);
            let batch_values: HashMap<NodeId, &str> = texts
                .iter()
                .map(|(_, node, _, new)| (*node, new.as_str()))
                .collect();
            let diff_config = DiffConfig {
                max_cost: config.diff_max_cost,
            };
            for (_, node, old, new) in &texts {
                let base = self.text_offset(&order, *node, &batch_values);
                for op in diff_with_config(old, new, diff_config) {
                    self.dispatch_text(op.kind, base + op.offset, &op.value);
                }
            }
        }

        if content_changed && doc.is_connected(root) {
            trace!(fragment = %self.inner.id, records = records.len(), "Fragment content changed");
            self.fire_changed(ChangeContext::Fragment(self.inner.id));
        }
    }

    // === Lifecycle ===

    /// Run the first-load sequence. Failures are reported, not returned.
    pub(crate) async fn run_load(&self) {
        let kind = self.inner.kind.clone();
        if let Err(e) = kind.on_loaded(self).await {
            self.report(FailurePhase::Load, &e);
        }
        if self.is_unloaded() || !self.auto() {
            return;
        }
        if kind.supports_auto() {
            if let Err(e) = kind
                .require(self, RequireOptions::new(RequireReason::Load))
                .await
            {
                self.report(FailurePhase::Require, &e);
            }
        }
        if !self.inner.runtime.config.autorun_disabled {
            self.schedule_auto_dom();
        }
    }

    /// Tear the wrapper down. Idempotent.
    ///
    /// Unload handlers run first, then the companion view is removed and the
    /// observer flushed and released. The node link is severed last.
    pub fn unload(&self) {
        {
            let mut status = self.status();
            if status.unloaded || status.unloading {
                return;
            }
            status.unloading = true;
        }
        debug!(fragment = %self.inner.id, type_id = self.type_id(), "Unloading fragment");

        for handler in self.inner.handlers.unloaded.snapshot() {
            handler(self);
        }
        if let Some(controller) = &self.inner.auto_dom {
            if let Err(e) = controller.clear(self) {
                warn!(fragment = %self.inner.id, error = %e, "Failed to remove companion view");
            }
        }
        if let Err(e) = self.inner.observer.close() {
            warn!(fragment = %self.inner.id, error = %e, "Failed to flush observer during unload");
        }
        self.inner.handlers.clear();
        self.status().unloaded = true;
        self.inner
            .runtime
            .links
            .sever(self.inner.node, self.inner.id);
    }

    pub(crate) fn runtime(&self) -> &RuntimeContext {
        &self.inner.runtime
    }

    pub(crate) fn report(&self, phase: FailurePhase, err: &crate::Error) {
        self.inner.runtime.report(FragmentFailure {
            fragment: self.inner.id,
            type_id: self.type_id().to_string(),
            phase,
            message: err.to_string(),
        });
    }
}
