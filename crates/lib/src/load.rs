//! Load passes.
//!
//! A load pass walks every wrapped fragment in discovery order and runs the
//! first-load sequence for those that have not had it yet. Passes never
//! overlap: a pass requested while another is running waits for the slot,
//! then picks up whatever the previous one did not cover.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::{Instrument, debug, info_span};

use crate::fragment::Fragment;

#[derive(Debug)]
pub(crate) struct LoadScheduler {
    slot: tokio::sync::Mutex<()>,
    installed: AtomicBool,
    passes: AtomicU64,
}

impl LoadScheduler {
    /// `gated` holds every pass until [`LoadScheduler::mark_installed`].
    pub(crate) fn new(gated: bool) -> Self {
        Self {
            slot: tokio::sync::Mutex::new(()),
            installed: AtomicBool::new(!gated),
            passes: AtomicU64::new(0),
        }
    }

    pub(crate) fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    /// Open the gate. Returns true the first time.
    pub(crate) fn mark_installed(&self) -> bool {
        !self.installed.swap(true, Ordering::AcqRel)
    }

    /// Number of passes that have run to completion.
    pub(crate) fn completed(&self) -> u64 {
        self.passes.load(Ordering::Acquire)
    }

    /// Run one pass over the fragments returned by `candidates`.
    ///
    /// Returns how many fragments were loaded; zero when the gate is closed.
    pub(crate) async fn run_pass<F>(&self, candidates: F) -> usize
    where
        F: FnOnce() -> Vec<Fragment>,
    {
        if !self.is_installed() {
            debug!("Load pass deferred until fragment types are installed");
            return 0;
        }
        let _slot = self.slot.lock().await;
        let pass = self.passes.load(Ordering::Acquire) + 1;
        let span = info_span!("load_pass", pass);
        let loaded = async {
            let mut loaded = 0;
            for fragment in candidates() {
                if fragment.is_unloaded() || !fragment.mark_loaded() {
                    continue;
                }
                debug!(fragment = %fragment.id(), type_id = fragment.type_id(), "Loading fragment");
                fragment.run_load().await;
                loaded += 1;
            }
            debug!(loaded, "Load pass finished");
            loaded
        }
        .instrument(span)
        .await;
        self.passes.fetch_add(1, Ordering::AcqRel);
        loaded
    }
}
