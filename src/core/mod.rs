//! Runtime core: registry, worker pool and the engine.
//!
//! The public API from this module is [`Engine`] (with [`EngineBuilder`]),
//! plus the read-only [`WorkerId`] and [`WorkerSnapshot`] types.
//!
//! Internal modules:
//! - [`registry`]: ordered, uniquely named components with dependency sorting;
//! - [`worker`]: one OS thread stepping its attached components;
//! - [`pool`]: rebuild protocol, round-robin assignment, failure respawn;
//! - [`diagnostics`]: per-worker pass counters and durations;
//! - [`engine`]: the process-level API and run loop;
//! - [`builder`]: engine construction and subscriber wiring;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod builder;
mod diagnostics;
mod engine;
mod pool;
mod registry;
mod shutdown;
mod worker;

pub use builder::EngineBuilder;
pub use engine::Engine;
pub use pool::WorkerSnapshot;
pub use worker::WorkerId;

use std::any::Any;

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::{Duration, Instant};

    /// Polls `cond` for up to five seconds.
    pub(crate) fn eventually(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        cond()
    }
}
