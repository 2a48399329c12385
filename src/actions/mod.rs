//! Actions: named typed one-slot broadcast channels used to wire components
//! together without direct references.
//!
//! - [`ActionBus`] owns actions by name, queues early subscriptions, connects actions
//! - [`Action`] one channel (payload + subscribers)
//! - [`ActionData`] type-erased payload container

mod action;
mod bus;

pub use action::{Action, ActionData, Callback};
pub use bus::ActionBus;
