//! # Runtime events emitted by the engine, the worker pool and the action bus.
//!
//! [`EventKind`] groups events into:
//! - **Registry events**: membership and ordering changes
//! - **Worker events**: thread lifecycle, attachment, pause state, failures
//! - **Component events**: activation and setting changes
//! - **Action events**: channel creation and deferred subscriptions
//! - **Engine events**: rebuilds and shutdown
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Events published from different worker threads may be
//! delivered out of order; `seq` restores the publication order.
//!
//! ## Example
//! ```rust
//! use stepvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::WorkerFailed)
//!     .with_worker("worker-2")
//!     .with_component("cache")
//!     .with_reason("boom");
//!
//! assert_eq!(ev.kind, EventKind::WorkerFailed);
//! assert_eq!(ev.worker.as_deref(), Some("worker-2"));
//! assert_eq!(ev.reason.as_deref(), Some("boom"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `component` (subscriber name), `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `component` (subscriber name), `reason`.
    SubscriberOverflow,

    // === Registry events ===
    /// Component registered.
    ///
    /// Sets: `component`.
    ComponentAdded,

    /// Component removed from the registry.
    ///
    /// Sets: `component`.
    ComponentRemoved,

    /// Registration or reordering rejected (duplicate name, circular dependency).
    ///
    /// Sets: `component` (when known), `reason` (error label).
    RegistryRejected,

    // === Component events ===
    /// Component `active` flag changed.
    ///
    /// Sets: `component`, `reason` (`"active"` or `"inactive"`).
    ComponentActivity,

    /// A setting change was applied.
    ///
    /// Sets: `component`, `reason` (`"setting=option"`).
    SettingChanged,

    /// A setting change was rejected.
    ///
    /// Sets: `component`, `reason` (error message).
    SettingRejected,

    /// `update()` returned an error during a rebuild (the rebuild continues).
    ///
    /// Sets: `component`, `reason`.
    UpdateFailed,

    // === Worker events ===
    /// Worker loop started (or re-armed).
    ///
    /// Sets: `worker`.
    WorkerStarted,

    /// Worker loop observed its stop request and exited.
    ///
    /// Sets: `worker`.
    WorkerStopped,

    /// Stopping a worker exceeded `Config::stop_timeout`; the stop gave up waiting.
    ///
    /// Sets: `worker`, `duration_ms` (the timeout).
    WorkerStopTimedOut,

    /// A component's `step()` failed or panicked; the worker loop terminated.
    ///
    /// Sets: `worker`, `component`, `reason`.
    WorkerFailed,

    /// A replacement worker took over a failed worker's components.
    ///
    /// Sets: `worker` (replacement id), `reason` (failed worker id), `delay_ms`.
    WorkerRespawned,

    /// Component attached to a worker.
    ///
    /// Sets: `worker`, `component`.
    ComponentAttached,

    /// Component detached from a worker.
    ///
    /// Sets: `worker`, `component`.
    ComponentDetached,

    /// Component paused on its worker.
    ///
    /// Sets: `worker`, `component`.
    ComponentPaused,

    /// Component resumed on its worker.
    ///
    /// Sets: `worker`, `component`.
    ComponentResumed,

    // === Action events ===
    /// Action created.
    ///
    /// Sets: `component` (action name).
    ActionCreated,

    /// Subscription to a not-yet-created action was queued.
    ///
    /// Sets: `component` (action name).
    SubscriptionDeferred,

    /// A queued subscription was attached to its action by a tick.
    ///
    /// Sets: `component` (action name).
    SubscriptionResolved,

    // === Engine events ===
    /// Full rebuild finished.
    ///
    /// Sets: `reason` (`"workers=N components=M"`).
    RebuildCompleted,

    /// Reconciling pass after a respawn finished.
    ///
    /// Sets: `reason` (`"attached=N detached=M"`).
    ReconcileCompleted,

    /// Shutdown requested (OS signal or explicit cancel).
    ///
    /// Sets: `reason` (signal name or `"cancel"`).
    ShutdownRequested,

    /// All workers stopped and every component was shut down.
    ShutdownCompleted,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Component (or action/subscriber) name, if applicable.
    pub component: Option<Arc<str>>,
    /// Worker identity, if applicable.
    pub worker: Option<Arc<str>>,
    /// Human-readable reason (errors, details).
    pub reason: Option<Arc<str>>,
    /// Duration attached to the event in milliseconds (compact).
    pub duration_ms: Option<u32>,
    /// Respawn delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            component: None,
            worker: None,
            reason: None,
            duration_ms: None,
            delay_ms: None,
        }
    }

    /// Attaches a component name.
    #[inline]
    pub fn with_component(mut self, component: impl Into<Arc<str>>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Attaches a worker identity.
    #[inline]
    pub fn with_worker(mut self, worker: impl Into<Arc<str>>) -> Self {
        self.worker = Some(worker.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a duration (stored as milliseconds).
    #[inline]
    pub fn with_duration(mut self, d: Duration) -> Self {
        self.duration_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a respawn delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_component(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_component(subscriber)
            .with_reason(info)
    }

    /// Returns `true` for events produced by the subscriber machinery itself.
    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_is_monotonic() {
        let a = Event::new(EventKind::ComponentAdded);
        let b = Event::new(EventKind::ComponentRemoved);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn durations_are_compacted() {
        let ev = Event::new(EventKind::WorkerStopTimedOut)
            .with_duration(Duration::from_secs(u64::MAX))
            .with_delay(Duration::from_millis(15));
        assert_eq!(ev.duration_ms, Some(u32::MAX));
        assert_eq!(ev.delay_ms, Some(15));
    }

    #[test]
    fn subscriber_events_are_flagged() {
        assert!(Event::subscriber_overflow("audit", "full").is_subscriber_event());
        assert!(Event::subscriber_panicked("audit", "boom".into()).is_subscriber_event());
        assert!(!Event::new(EventKind::WorkerFailed).is_subscriber_event());
    }
}
