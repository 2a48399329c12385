//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Engine`, `Registry`, `WorkerPool`, worker threads,
//!   `ActionBus`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the engine's subscriber listener (fans out to `SubscriberSet`)
//!   and any receiver obtained through [`Engine::events`](crate::Engine::events).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
