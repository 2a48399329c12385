//! # Named one-slot broadcast channel.
//!
//! An [`Action`] stores the most recently delivered payload ([`ActionData`])
//! and an ordered list of subscriber callbacks. The payload type is fixed at
//! creation by the default value; later payloads must have the same type.
//!
//! ## Rules
//! - Subscribers run synchronously, in subscription order, on the triggering thread.
//! - Subscribers run with no lock held: a callback may trigger or subscribe itself.
//! - A rejected payload (wrong type) leaves the stored payload untouched.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

/// Subscriber callback invoked with the action's current payload.
pub type Callback = Arc<dyn Fn(&ActionData) + Send + Sync>;

/// Type-erased payload container.
///
/// ## Example
/// ```rust
/// use stepvisor::ActionData;
///
/// let data = ActionData::new(42u32);
/// assert_eq!(data.get::<u32>(), Some(&42));
/// assert!(data.get::<i64>().is_none());
/// ```
#[derive(Clone)]
pub struct ActionData {
    value: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
}

impl ActionData {
    /// Wraps a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Borrows the payload as `T`, if it has that type.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Returns `true` if the payload has type `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Name of the payload type (diagnostics only).
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if both payloads have the same type.
    pub fn same_type(&self, other: &ActionData) -> bool {
        self.type_id == other.type_id
    }
}

impl fmt::Debug for ActionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionData")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// A named channel: current payload plus subscribers.
pub struct Action {
    name: Arc<str>,
    payload: RwLock<ActionData>,
    subscribers: Mutex<Vec<Callback>>,
}

impl Action {
    pub(crate) fn new(name: &str, default: ActionData, callbacks: Vec<Callback>) -> Self {
        Self {
            name: Arc::from(name),
            payload: RwLock::new(default),
            subscribers: Mutex::new(callbacks),
        }
    }

    /// Action name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the stored payload.
    pub fn payload(&self) -> ActionData {
        self.payload.read().clone()
    }

    /// Number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub(crate) fn subscribe(&self, callback: Callback) {
        self.subscribers.lock().push(callback);
    }

    /// Stores `payload` (if any) and invokes every subscriber with the current payload.
    ///
    /// On a type mismatch returns the expected type name and invokes nobody.
    pub(crate) fn fire(&self, payload: Option<ActionData>) -> Result<(), &'static str> {
        let current = {
            let mut slot = self.payload.write();
            if let Some(next) = payload {
                if !slot.same_type(&next) {
                    return Err(slot.type_name());
                }
                *slot = next;
            }
            slot.clone()
        };
        let subscribers = self.subscribers.lock().clone();
        for callback in subscribers {
            callback(&current);
        }
        Ok(())
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("payload", &*self.payload.read())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fire_replaces_payload_then_notifies() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let action = Action::new(
            "temp",
            ActionData::new(0i32),
            vec![Arc::new(move |d: &ActionData| {
                s.lock().push(d.get::<i32>().copied());
            })],
        );

        action.fire(Some(ActionData::new(21i32))).unwrap();
        action.fire(None).unwrap();
        assert_eq!(*seen.lock(), vec![Some(21), Some(21)]);
    }

    #[test]
    fn mismatched_payload_is_rejected() {
        let action = Action::new("temp", ActionData::new(0i32), Vec::new());
        let err = action.fire(Some(ActionData::new("hot"))).unwrap_err();
        assert_eq!(err, "i32");
        assert_eq!(action.payload().get::<i32>(), Some(&0));
    }
}
