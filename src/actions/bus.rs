//! # Action bus: named typed channels with deferred subscription.
//!
//! The [`ActionBus`] owns every [`Action`] by name and a FIFO queue of
//! subscriptions requested before their action existed.
//!
//! ```text
//! subscribe("X", cb) ──► "X" exists? ──yes──► appended to X's subscribers
//!                              │
//!                              no
//!                              ▼
//!                     pending queue (FIFO) ──► tick(policy) ──► resolved once "X" exists
//!                                                             └► re-queued otherwise
//! ```
//!
//! ## Rules
//! - **First writer wins**: `create` on an existing name is a no-op.
//! - **Deferred until tick**: a queued subscription never fires before the
//!   tick that resolves it, even if the action is created in the meantime.
//! - **Synchronous trigger**: every subscriber has run when `trigger` returns.
//! - **Acyclic connections**: `connect` refuses a link that would lead a
//!   trigger back to its own action.
//! - The action table and the pending queue have separate locks, and neither
//!   is held while subscribers run.

use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::action::{Action, ActionData, Callback};
use crate::config::DrainPolicy;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};

/// Registry of named actions.
///
/// ## Example
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use stepvisor::{ActionBus, ActionData};
///
/// let bus = ActionBus::new();
/// bus.create("level", 0u32);
///
/// let last = Arc::new(AtomicU32::new(0));
/// let l = last.clone();
/// bus.subscribe("level", move |d: &ActionData| {
///     l.store(*d.get::<u32>().unwrap_or(&0), Ordering::SeqCst);
/// });
///
/// bus.trigger_with("level", 7u32).unwrap();
/// assert_eq!(last.load(Ordering::SeqCst), 7);
/// ```
#[derive(Default)]
pub struct ActionBus {
    actions: Mutex<HashMap<String, Arc<Action>>>,
    pending: Mutex<VecDeque<(String, Callback)>>,
    /// `connect` edges: action name to the actions it forwards to.
    links: Mutex<HashMap<String, Vec<String>>>,
    events: Option<Bus>,
}

impl ActionBus {
    /// Creates an empty bus that publishes no runtime events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty bus that reports creations and subscription resolution on `events`.
    pub fn with_events(events: Bus) -> Self {
        Self {
            events: Some(events),
            ..Self::default()
        }
    }

    /// Creates an action holding `default`. Returns `false` if the name was taken.
    pub fn create<T: Any + Send + Sync>(&self, name: &str, default: T) -> bool {
        self.create_with(name, default, Vec::new())
    }

    /// Creates an action with default callbacks subscribed in order.
    /// Returns `false` (and drops `callbacks`) if the name was taken.
    pub fn create_with<T: Any + Send + Sync>(
        &self,
        name: &str,
        default: T,
        callbacks: Vec<Callback>,
    ) -> bool {
        {
            let mut actions = self.actions.lock();
            if actions.contains_key(name) {
                return false;
            }
            let action = Action::new(name, ActionData::new(default), callbacks);
            actions.insert(name.to_string(), Arc::new(action));
        }
        self.publish(Event::new(EventKind::ActionCreated).with_component(name));
        true
    }

    /// Looks up an action.
    pub fn get(&self, name: &str) -> Option<Arc<Action>> {
        self.actions.lock().get(name).cloned()
    }

    /// Returns `true` if an action named `name` exists.
    pub fn exists(&self, name: &str) -> bool {
        self.actions.lock().contains_key(name)
    }

    /// Sorted action names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Clones the stored payload of `name` as `T`.
    pub fn payload<T: Any + Clone>(&self, name: &str) -> Option<T> {
        self.get(name)?.payload().get::<T>().cloned()
    }

    /// Invokes every subscriber of `name` with its current payload.
    pub fn trigger(&self, name: &str) -> Result<(), RuntimeError> {
        self.fire(name, None)
    }

    /// Stores `payload` in `name` and invokes every subscriber with it.
    pub fn trigger_with<T: Any + Send + Sync>(
        &self,
        name: &str,
        payload: T,
    ) -> Result<(), RuntimeError> {
        self.fire(name, Some(ActionData::new(payload)))
    }

    /// Triggers `name`, replacing its payload when `payload` is `Some`.
    pub fn fire(&self, name: &str, payload: Option<ActionData>) -> Result<(), RuntimeError> {
        let action = self.get(name).ok_or_else(|| RuntimeError::ActionNotFound {
            name: name.to_string(),
        })?;
        action
            .fire(payload)
            .map_err(|expected| RuntimeError::PayloadTypeMismatch {
                name: name.to_string(),
                expected,
            })
    }

    /// Subscribes `callback` to `name`, or queues it until a tick finds the action.
    ///
    /// Returns `true` if the subscription was attached immediately.
    pub fn subscribe(
        &self,
        name: &str,
        callback: impl Fn(&ActionData) + Send + Sync + 'static,
    ) -> bool {
        self.subscribe_arc(name, Arc::new(callback))
    }

    /// Same as [`subscribe`](Self::subscribe) for an already shared callback.
    pub fn subscribe_arc(&self, name: &str, callback: Callback) -> bool {
        if let Some(action) = self.get(name) {
            action.subscribe(callback);
            return true;
        }
        self.pending.lock().push_back((name.to_string(), callback));
        self.publish(Event::new(EventKind::SubscriptionDeferred).with_component(name));
        false
    }

    /// Number of queued subscriptions.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Wires `a` to `b`: whenever `a` fires, `b` fires too.
    ///
    /// With matching payload types `b` receives `a`'s payload; otherwise `b`
    /// fires with its own stored payload. Connecting an action to itself is a
    /// no-op. A link that would lead back to `a` through earlier links fails
    /// with `CircularConnection`.
    pub fn connect(&self, a: &str, b: &str) -> Result<(), RuntimeError> {
        let first = self.get(a).ok_or_else(|| RuntimeError::ActionNotFound {
            name: a.to_string(),
        })?;
        let second = self.get(b).ok_or_else(|| RuntimeError::ActionNotFound {
            name: b.to_string(),
        })?;
        if a == b {
            return Ok(());
        }

        {
            let mut links = self.links.lock();
            if reaches(&links, b, a) {
                return Err(RuntimeError::CircularConnection {
                    from: a.to_string(),
                    to: b.to_string(),
                });
            }
            links.entry(a.to_string()).or_default().push(b.to_string());
        }

        let forward = first.payload().same_type(&second.payload());
        first.subscribe(Arc::new(move |data: &ActionData| {
            let payload = forward.then(|| data.clone());
            // Types were checked at connect time and never change.
            let _ = second.fire(payload);
        }));
        Ok(())
    }

    /// Resolves queued subscriptions whose action now exists.
    ///
    /// Entries whose action is still missing go back to the end of the queue.
    /// Returns the number of subscriptions attached.
    pub fn tick(&self, policy: DrainPolicy) -> usize {
        let batch: Vec<(String, Callback)> = {
            let mut pending = self.pending.lock();
            let take = match policy {
                DrainPolicy::OnePerTick => pending.len().min(1),
                DrainPolicy::All => pending.len(),
            };
            pending.drain(..take).collect()
        };

        let mut resolved = 0;
        let mut missing = Vec::new();
        for (name, callback) in batch {
            match self.get(&name) {
                Some(action) => {
                    action.subscribe(callback);
                    resolved += 1;
                    self.publish(Event::new(EventKind::SubscriptionResolved).with_component(name));
                }
                None => missing.push((name, callback)),
            }
        }
        if !missing.is_empty() {
            self.pending.lock().extend(missing);
        }
        resolved
    }

    fn publish(&self, event: Event) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

/// Depth-first search over `connect` edges.
fn reaches(links: &HashMap<String, Vec<String>>, from: &str, target: &str) -> bool {
    let mut seen = HashSet::new();
    let mut stack = vec![from];
    while let Some(name) = stack.pop() {
        if name == target {
            return true;
        }
        if !seen.insert(name) {
            continue;
        }
        if let Some(next) = links.get(name) {
            stack.extend(next.iter().map(String::as_str));
        }
    }
    false
}
