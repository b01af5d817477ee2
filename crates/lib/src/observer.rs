//! Per-fragment mutation observer.
//!
//! Thin adapter over [`Document::observe`] that knows how to stop (flushing
//! whatever is still queued through the same callback), restart, and pause
//! itself for the duration of a write the runtime performs.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{trace, warn};

use crate::{
    Result,
    dom::{Document, MutationCallback, NodeId, ObserveOptions, ObserverId},
};

#[derive(Debug, Default)]
struct ObserverState {
    registration: Option<ObserverId>,
    paused: usize,
    closed: bool,
}

/// Observer over a fragment's subtree.
pub(crate) struct FragmentObserver {
    document: Document,
    target: NodeId,
    callback: MutationCallback,
    state: Mutex<ObserverState>,
}

impl std::fmt::Debug for FragmentObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentObserver")
            .field("target", &self.target)
            .field("state", &*self.state())
            .finish()
    }
}

impl FragmentObserver {
    pub(crate) fn new(document: Document, target: NodeId, callback: MutationCallback) -> Self {
        Self {
            document,
            target,
            callback,
            state: Mutex::new(ObserverState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ObserverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin observing. No-op when already observing or closed.
    pub(crate) fn start(&self) -> Result<()> {
        let mut state = self.state();
        if state.closed || state.registration.is_some() {
            return Ok(());
        }
        let id = self.document.observe(
            self.target,
            ObserveOptions::all(),
            self.callback.clone(),
        )?;
        trace!(target_node = %self.target, observer = %id, "Observer started");
        state.registration = Some(id);
        Ok(())
    }

    /// Stop observing, handing any queued records to the callback first.
    ///
    /// Idempotent. Errors from the mutation source propagate.
    pub(crate) fn stop(&self) -> Result<()> {
        let Some(id) = self.state().registration.take() else {
            return Ok(());
        };
        let records = self.document.take_records(id);
        self.document.disconnect(id);
        trace!(target_node = %self.target, observer = %id, "Observer stopped");
        let records = records?;
        if !records.is_empty() {
            (self.callback)(records);
        }
        Ok(())
    }

    /// Stop for good; later `start` calls do nothing.
    pub(crate) fn close(&self) -> Result<()> {
        self.state().closed = true;
        self.stop()
    }

    pub(crate) fn is_observing(&self) -> bool {
        self.state().registration.is_some()
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.state().paused > 0
    }

    /// Stop observing until the returned guard drops.
    ///
    /// Only the outermost pause of a nested set restarts observation.
    pub(crate) fn pause(&self) -> Result<ObservationPause<'_>> {
        let resume = self.is_observing();
        self.stop()?;
        self.state().paused += 1;
        Ok(ObservationPause {
            observer: self,
            resume,
        })
    }
}

/// Guard returned by [`FragmentObserver::pause`].
#[must_use = "observation resumes as soon as the guard is dropped"]
pub(crate) struct ObservationPause<'a> {
    observer: &'a FragmentObserver,
    resume: bool,
}

impl Drop for ObservationPause<'_> {
    fn drop(&mut self) {
        let outermost = {
            let mut state = self.observer.state();
            state.paused = state.paused.saturating_sub(1);
            state.paused == 0
        };
        if self.resume && outermost {
            if let Err(e) = self.observer.start() {
                warn!(target_node = %self.observer.target, error = %e, "Failed to resume observer");
            }
        }
    }
}
