//! # stepvisor
//!
//! **Stepvisor** is a component runtime for long-running processes built from
//! small, independently written parts.
//!
//! Components register by unique name with capability and dependency tags.
//! A pool of OS-thread workers steps them in dependency order, round-robin
//! across workers. Components talk through named, typed, one-slot broadcast
//! channels (actions) instead of holding references to each other.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌───────────────┐   ┌───────────────┐   ┌───────────────┐
//!     │ ComponentSpec │   │ ComponentSpec │   │ ComponentSpec │
//!     │  (disk)       │   │  (cache)      │   │  (web)        │
//!     └──────┬────────┘   └──────┬────────┘   └──────┬────────┘
//!            ▼                   ▼                   ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Engine (process-level API)                                       │
//! │  - Registry (unique names, dependency order, capability index)    │
//! │  - WorkerPool (rebuild, pause/resume, move, crash respawn)        │
//! │  - ActionBus (named typed channels, deferred subscriptions)       │
//! │  - Globals (process-wide named variables)                         │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   ┌──────────┐       ┌──────────┐       ┌──────────┐
//!   │ worker-0 │       │ worker-1 │       │ worker-2 │   (OS threads)
//!   │ disk     │       │ cache    │       │ web      │
//!   └────┬─────┘       └────┬─────┘       └────┬─────┘
//!        │ step() each pass, skipping paused components
//!        ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                  Bus (runtime events, broadcast)                  │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                   subscriber listener ──► SubscriberSet ──► Subscribe::on_event
//! ```
//!
//! ### Rebuild
//! ```text
//! rebuild()
//!   ├─► reorder registry (stable topological sort on capabilities)
//!   ├─► stop and discard every worker, remember paused names
//!   ├─► create max(1, workers) fresh workers (or one per component)
//!   ├─► attach component i to worker i % count, restore pauses
//!   ├─► update() on every active component, on the calling thread
//!   └─► start the workers again if the pool was running
//! ```
//!
//! ### Crash respawn
//! ```text
//! step() returns Err or panics on worker-N
//!   ├─► worker-N loop ends, WorkerFailed published
//!   ├─► Fatal error: the component is deactivated
//!   ├─► replacement worker-M takes worker-N's position, components and pauses
//!   ├─► sleep(respawn_backoff.delay(consecutive failures))
//!   ├─► worker-M starts, WorkerRespawned published
//!   └─► reconcile: every registered component attached exactly once
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                              |
//! |-------------------|---------------------------------------------------------------|-------------------------------------------------|
//! | **Components**    | Plugin contract, closure-backed components, settings.         | [`Component`], [`ComponentFn`], [`Settings`]    |
//! | **Engine**        | Registry, worker pool, diagnostics, run loop.                 | [`Engine`], [`EngineBuilder`], [`WorkerId`]     |
//! | **Actions**       | Named typed one-slot broadcast channels.                      | [`ActionBus`], [`Action`], [`ActionData`]       |
//! | **Subscriber API**| Hook into runtime events (logging, metrics, custom).          | [`Subscribe`], [`Event`], [`EventKind`]         |
//! | **Policies**      | Delay before a crashed worker's replacement starts.           | [`RespawnBackoff`], [`JitterPolicy`]            |
//! | **Errors**        | Typed errors for the runtime, components and settings.        | [`RuntimeError`], [`ComponentError`]            |
//! | **Configuration** | Centralize runtime settings.                                  | [`Config`], [`DrainPolicy`]                     |
//!
//! ## Optional features
//! - `logging`: exports a built-in [`LogWriter`] subscriber that forwards events to `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use stepvisor::{ComponentFn, ComponentSpec, Config, Context, Engine};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::builder(Config::default()).build();
//!
//!     // Producer publishes a counter on the "ticks" action.
//!     let producer = ComponentFn::new("producer", |ctx: &Context| {
//!         let next = ctx.actions().payload::<u64>("ticks").unwrap_or(0) + 1;
//!         ctx.actions().trigger_with("ticks", next)?;
//!         std::thread::sleep(Duration::from_millis(5));
//!         Ok(())
//!     })
//!     .provides("ticks")
//!     .on_update(|ctx| {
//!         ctx.actions().create("ticks", 0_u64);
//!         Ok(())
//!     });
//!
//!     // Consumer subscribes once and stops the engine after a few ticks.
//!     let consumer = ComponentFn::new("consumer", |_ctx: &Context| {
//!         std::thread::sleep(Duration::from_millis(5));
//!         Ok(())
//!     })
//!     .depends_on("ticks")
//!     .on_update(|ctx| {
//!         let token = ctx.engine().map(|e| e.cancellation_token());
//!         ctx.actions().subscribe("ticks", move |data| {
//!             if data.get::<u64>().copied().unwrap_or(0) >= 3 {
//!                 if let Some(token) = &token {
//!                     token.cancel();
//!                 }
//!             }
//!         });
//!         Ok(())
//!     });
//!
//!     engine
//!         .run(vec![ComponentSpec::new(consumer), ComponentSpec::new(producer)])
//!         .await?;
//!     Ok(())
//! }
//! ```
mod actions;
mod components;
mod config;
mod core;
mod error;
mod events;
mod globals;
mod policies;
mod subscribers;
mod testing;

// ---- Public re-exports ----

pub use actions::{Action, ActionBus, ActionData, Callback};
pub use components::{
    Capability, Component, ComponentFn, ComponentRef, ComponentSpec, Context, INACTIVE_TEST_CODE,
    Settings,
};
pub use config::{Config, DrainPolicy};
pub use core::{Engine, EngineBuilder, WorkerId, WorkerSnapshot};
pub use error::{ComponentError, RuntimeError, SettingError};
pub use events::{Bus, Event, EventKind};
pub use globals::Globals;
pub use policies::{JitterPolicy, RespawnBackoff};
pub use subscribers::{Subscribe, SubscriberSet};
pub use testing::TestContext;

// Optional: expose a built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
