//! Event subscriptions on a fragment.

use std::{
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use uuid::Uuid;

use super::{Fragment, FragmentId, FragmentInner};

/// Opaque identity a writer attaches to its own changes so it can recognise
/// them when they come back as notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextToken(Uuid);

impl ContextToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token-{}", self.0)
    }
}

/// Who caused a change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeContext {
    /// Observed tree mutation; carries the fragment itself.
    Fragment(FragmentId),
    /// Scoped write performed by the holder of the token.
    Token(ContextToken),
}

impl From<ContextToken> for ChangeContext {
    fn from(token: ContextToken) -> Self {
        ChangeContext::Token(token)
    }
}

impl From<FragmentId> for ChangeContext {
    fn from(id: FragmentId) -> Self {
        ChangeContext::Fragment(id)
    }
}

/// Options for [`Fragment::run_without_observing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopedWrite {
    /// Context attached to the resulting change notification.
    pub context: ChangeContext,
    /// Suppress the notification when the raw text is unchanged afterwards.
    pub skip_if_unchanged: bool,
}

impl ScopedWrite {
    pub fn new(context: impl Into<ChangeContext>) -> Self {
        Self {
            context: context.into(),
            skip_if_unchanged: false,
        }
    }

    pub fn skip_if_unchanged(mut self) -> Self {
        self.skip_if_unchanged = true;
        self
    }
}

pub type ChangedHandler = dyn Fn(&Fragment, &ChangeContext) + Send + Sync;
pub type UnloadedHandler = dyn Fn(&Fragment) + Send + Sync;
pub type AutoChangedHandler = dyn Fn(&Fragment, bool) + Send + Sync;
pub type ClassChangedHandler = dyn Fn(&Fragment, Option<&str>) + Send + Sync;
/// Receives the char offset and the inserted or deleted text.
pub type TextHandler = dyn Fn(&Fragment, usize, &str) + Send + Sync;

/// Ordered handler list with removable entries.
pub(crate) struct HandlerList<H: ?Sized> {
    entries: Mutex<(u64, Vec<(u64, Arc<H>)>)>,
}

impl<H: ?Sized> Default for HandlerList<H> {
    fn default() -> Self {
        Self {
            entries: Mutex::new((0, Vec::new())),
        }
    }
}

impl<H: ?Sized> HandlerList<H> {
    fn lock(&self) -> MutexGuard<'_, (u64, Vec<(u64, Arc<H>)>)> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn add(&self, handler: Arc<H>) -> u64 {
        let mut entries = self.lock();
        entries.0 += 1;
        let id = entries.0;
        entries.1.push((id, handler));
        id
    }

    pub(crate) fn remove(&self, id: u64) -> bool {
        let mut entries = self.lock();
        let before = entries.1.len();
        entries.1.retain(|(entry, _)| *entry != id);
        entries.1.len() != before
    }

    /// Handlers in registration order, detached from the list so they may
    /// subscribe or unsubscribe while running.
    pub(crate) fn snapshot(&self) -> Vec<Arc<H>> {
        self.lock().1.iter().map(|(_, h)| h.clone()).collect()
    }

    pub(crate) fn clear(&self) {
        self.lock().1.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().1.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandlerSlot {
    Changed,
    Unloaded,
    AutoChanged,
    ClassChanged,
    TextInserted,
    TextDeleted,
}

#[derive(Default)]
pub(crate) struct Handlers {
    pub(crate) changed: HandlerList<ChangedHandler>,
    pub(crate) unloaded: HandlerList<UnloadedHandler>,
    pub(crate) auto_changed: HandlerList<AutoChangedHandler>,
    pub(crate) class_changed: HandlerList<ClassChangedHandler>,
    pub(crate) text_inserted: HandlerList<TextHandler>,
    pub(crate) text_deleted: HandlerList<TextHandler>,
}

impl Handlers {
    pub(crate) fn remove(&self, slot: HandlerSlot, id: u64) -> bool {
        match slot {
            HandlerSlot::Changed => self.changed.remove(id),
            HandlerSlot::Unloaded => self.unloaded.remove(id),
            HandlerSlot::AutoChanged => self.auto_changed.remove(id),
            HandlerSlot::ClassChanged => self.class_changed.remove(id),
            HandlerSlot::TextInserted => self.text_inserted.remove(id),
            HandlerSlot::TextDeleted => self.text_deleted.remove(id),
        }
    }

    pub(crate) fn clear(&self) {
        self.changed.clear();
        self.unloaded.clear();
        self.auto_changed.clear();
        self.class_changed.clear();
        self.text_inserted.clear();
        self.text_deleted.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.changed.len()
            + self.unloaded.len()
            + self.auto_changed.len()
            + self.class_changed.len()
            + self.text_inserted.len()
            + self.text_deleted.len()
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} handlers>", self.len())
    }
}

/// Handle returned by the `register_on_*` methods of a [`Fragment`].
///
/// Dropping it keeps the handler registered; call [`Subscription::delete`]
/// to remove it.
#[derive(Debug)]
pub struct Subscription {
    fragment: Weak<FragmentInner>,
    slot: HandlerSlot,
    id: u64,
    deleted: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(fragment: Weak<FragmentInner>, slot: HandlerSlot, id: u64) -> Self {
        Self {
            fragment,
            slot,
            id,
            deleted: AtomicBool::new(false),
        }
    }

    /// Remove the handler. Safe to call any number of times, including after
    /// the fragment was unloaded.
    pub fn delete(&self) {
        if self.deleted.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(inner) = self.fragment.upgrade() {
            inner.handlers.remove(self.slot, self.id);
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }
}
