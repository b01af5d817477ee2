//! Process-wide runtime context.
//!
//! One `RuntimeContext` is created per [`FragmentRegistry`](crate::FragmentRegistry)
//! and shared by every fragment it wraps. It owns what would otherwise be
//! scattered global state: configuration, the node↔wrapper table, the
//! failure channel, the optional render cache and the tracker for background
//! work.

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{error, warn};

use crate::{
    cache::RenderCache,
    config::RuntimeConfig,
    dom::NodeId,
    fragment::{Fragment, FragmentId},
};

/// Stage in which a contained failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePhase {
    /// A `require()` call made by the runtime.
    Require,
    /// Auto-DOM recomputation or splicing.
    AutoDom,
    /// A fragment type's on-loaded hook.
    Load,
}

/// A failure local to one fragment, reported instead of propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentFailure {
    pub fragment: FragmentId,
    pub type_id: String,
    pub phase: FailurePhase,
    pub message: String,
}

/// Background work spawned on the ambient tokio runtime.
#[derive(Debug, Default)]
pub(crate) struct TaskTracker {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskTracker {
    /// Spawn `future` and track it. Returns false when no runtime is available.
    pub(crate) fn spawn<F>(&self, what: &'static str, future: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let handle = runtime.spawn(future);
                let mut handles = self.lock();
                handles.retain(|h| !h.is_finished());
                handles.push(handle);
                true
            }
            Err(_) => {
                warn!(task = what, "No async runtime available; skipping background work");
                false
            }
        }
    }

    /// Take every tracked handle.
    pub(crate) fn take(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The node↔wrapper link table.
///
/// A node that has been set up always maps to exactly one fragment.
#[derive(Debug, Default)]
pub(crate) struct NodeLinks {
    table: Mutex<HashMap<NodeId, Fragment>>,
}

impl NodeLinks {
    fn lock(&self) -> MutexGuard<'_, HashMap<NodeId, Fragment>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn get(&self, node: NodeId) -> Option<Fragment> {
        self.lock().get(&node).cloned()
    }

    /// Link `fragment` to its node unless another wrapper got there first,
    /// in which case that wrapper is returned.
    pub(crate) fn insert_if_absent(&self, fragment: Fragment) -> Option<Fragment> {
        let mut table = self.lock();
        if let Some(existing) = table.get(&fragment.node()) {
            return Some(existing.clone());
        }
        table.insert(fragment.node(), fragment);
        None
    }

    /// Remove the link for `node` if it still points at `fragment`.
    pub(crate) fn sever(&self, node: NodeId, fragment: FragmentId) -> bool {
        let mut table = self.lock();
        if table.get(&node).is_some_and(|f| f.id() == fragment) {
            table.remove(&node);
            true
        } else {
            false
        }
    }

    /// Every linked fragment in discovery order.
    pub(crate) fn ordered(&self) -> Vec<Fragment> {
        let mut fragments: Vec<Fragment> = self.lock().values().cloned().collect();
        fragments.sort_by_key(Fragment::sequence);
        fragments
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Shared state behind a registry and its fragments.
pub(crate) struct RuntimeContext {
    pub(crate) config: RuntimeConfig,
    pub(crate) links: NodeLinks,
    pub(crate) tasks: TaskTracker,
    pub(crate) cache: Option<Arc<dyn RenderCache>>,
    failures: broadcast::Sender<FragmentFailure>,
    next_sequence: AtomicU64,
}

impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("config", &self.config)
            .field("links", &format!("<{} fragments>", self.links.len()))
            .field("cache", &self.cache.as_ref().map(|_| "<RenderCache>"))
            .finish()
    }
}

impl RuntimeContext {
    pub(crate) fn new(config: RuntimeConfig, cache: Option<Arc<dyn RenderCache>>) -> Self {
        let (failures, _) = broadcast::channel(config.failure_channel_capacity.max(1));
        Self {
            config,
            links: NodeLinks::default(),
            tasks: TaskTracker::default(),
            cache,
            failures,
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Next discovery sequence number.
    pub(crate) fn next_sequence(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn subscribe_failures(&self) -> broadcast::Receiver<FragmentFailure> {
        self.failures.subscribe()
    }

    /// Log a contained failure and publish it to subscribers.
    pub(crate) fn report(&self, failure: FragmentFailure) {
        error!(
            fragment = %failure.fragment,
            type_id = %failure.type_id,
            phase = ?failure.phase,
            "{}",
            failure.message
        );
        // No subscribers is fine.
        let _ = self.failures.send(failure);
    }
}
