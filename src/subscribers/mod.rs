//! # Event subscribers for the engine.
//!
//! This module provides the [`Subscribe`] trait, the fan-out [`SubscriberSet`],
//! and built-in implementations (behind features).
//!
//! ## Architecture
//! ```text
//! Worker threads / pool / action bus ── publish(Event) ──► Bus
//!                                                           │
//!                                          engine listener (tokio task)
//!                                                           │
//!                                                   SubscriberSet::emit
//!                                              ┌────────────┼────────────┐
//!                                              ▼            ▼            ▼
//!                                          LogWriter     Metrics       Custom
//! ```

mod embedded;
mod subscribe;
mod subscriber_set;

pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
