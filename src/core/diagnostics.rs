//! # Per-worker pass statistics.
//!
//! Each worker owns a [`PassCounter`] it updates after every full pass; the
//! pool keeps them keyed by [`WorkerId`] so the engine can report the last
//! pass duration of every worker at any time.
//!
//! ## Architecture
//! ```text
//! worker thread ──► PassCounter::record(elapsed)    (lock-free, every pass)
//!                          ▲
//! Diagnostics ─────────────┘ HashMap<WorkerId, Arc<PassCounter>>
//!     └──► pass_times() ──► { worker-0: 0.012ms, worker-1: 3.4ms, ... }
//! ```
//!
//! ## Rules
//! - Reads are **eventually consistent**: a reader may see the previous pass.
//! - A worker that has not finished a pass yet reports no duration.
//! - Counters of discarded workers are dropped with them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

use super::worker::WorkerId;

/// Pass counter of one worker.
#[derive(Debug, Default)]
pub(crate) struct PassCounter {
    passes: AtomicU64,
    last_pass_nanos: AtomicU64,
}

impl PassCounter {
    pub(crate) fn record(&self, elapsed: Duration) {
        let nanos = elapsed.as_nanos().min(u128::from(u64::MAX)) as u64;
        self.last_pass_nanos.store(nanos, Ordering::Relaxed);
        self.passes.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn passes(&self) -> u64 {
        self.passes.load(Ordering::Acquire)
    }

    /// Last pass duration in milliseconds, `None` before the first pass.
    pub(crate) fn last_pass_ms(&self) -> Option<f64> {
        if self.passes() == 0 {
            return None;
        }
        Some(self.last_pass_nanos.load(Ordering::Relaxed) as f64 / 1_000_000.0)
    }
}

/// Pass counters of every live worker.
#[derive(Default)]
pub(crate) struct Diagnostics {
    counters: RwLock<HashMap<WorkerId, Arc<PassCounter>>>,
}

impl Diagnostics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, id: WorkerId) -> Arc<PassCounter> {
        let counter = Arc::new(PassCounter::default());
        self.counters.write().insert(id, Arc::clone(&counter));
        counter
    }

    pub(crate) fn remove(&self, id: WorkerId) {
        self.counters.write().remove(&id);
    }

    /// Last pass duration (ms) of every worker that completed a pass.
    pub(crate) fn pass_times(&self) -> BTreeMap<WorkerId, f64> {
        self.counters
            .read()
            .iter()
            .filter_map(|(id, c)| c.last_pass_ms().map(|ms| (*id, ms)))
            .collect()
    }
}
