//! Respawn policies.
//!
//! ## Contents
//! - [`RespawnBackoff`] how long a crashed worker's slot waits before its replacement starts
//! - [`JitterPolicy`] randomization of that delay
//!
//! ## Wiring
//! ```text
//! Config { respawn_backoff: RespawnBackoff, .. }
//!      └─► core::pool failure handler:
//!           delay = respawn_backoff.delay(consecutive_failures)
//!           sleep(delay) on the dying worker thread, then start the replacement
//! ```
//!
//! ## Defaults
//! `RespawnBackoff::default()` respawns immediately (no delay, no limit).

mod jitter;
mod respawn;

pub use jitter::JitterPolicy;
pub use respawn::RespawnBackoff;
