//! # Worker: one OS thread stepping its attached components.
//!
//! A [`Worker`] owns an ordered attached list and a paused set. While running,
//! its thread repeats passes over the attached components until asked to stop.
//!
//! ## Architecture
//! ```text
//! start() ──► thread "worker-N"
//!               loop {
//!                 ├─► snapshot attached list
//!                 ├─► for slot in snapshot (attachment order):
//!                 │      paused?  ──► skip
//!                 │      slot.step(ctx) under catch_unwind
//!                 │        ├─ Ok        ──► next
//!                 │        └─ Err/panic ──► retire ──► failure handler (same thread)
//!                 ├─► PassCounter::record(pass duration)
//!                 └─► run flag cleared? ──► mark exited, WorkerStopped
//!               }
//! ```
//!
//! ## Rules
//! - **Stop is cooperative**: the flag is checked between passes, never
//!   between two `step()` calls of one pass.
//! - **Bounded stop**: `stop()` waits at most `stop_timeout`, then gives up
//!   (`WorkerStopTimedOut`) instead of deadlocking on a blocked `step()`.
//! - **Self-stop**: `stop()` from the worker's own thread only requests the
//!   stop; a following `start()` on that thread re-arms the live loop.
//! - **Stop, mutate, restart**: `attach`/`detach` stop the worker, change the
//!   list, then restart it if it was running. A pass works on a snapshot, so
//!   no `step()` ever sees a half-changed list.
//! - `pause`/`resume` never stop the worker; they take effect on the next
//!   component the loop reaches.
//! - **Retired after failure**: a worker whose loop died on a failure never
//!   starts again; the pool replaces it.

use std::collections::BTreeSet;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, warn};

use super::diagnostics::PassCounter;
use crate::components::{Context, Slot};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};

/// Sleep between passes that stepped nothing (no component attached or all paused).
const IDLE_PASS_SLEEP: Duration = Duration::from_millis(1);

/// Identity of a worker. Displayed as `worker-N`; never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    pub(crate) fn new(n: u64) -> Self {
        Self(n)
    }

    /// Numeric part of the identity.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

impl FromStr for WorkerId {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("worker-")
            .and_then(|n| n.parse().ok())
            .map(WorkerId)
            .ok_or_else(|| RuntimeError::WorkerNotFound {
                worker: s.to_string(),
            })
    }
}

/// Why a worker loop died.
pub(crate) struct WorkerFailure {
    pub(crate) worker: WorkerId,
    pub(crate) component: Arc<str>,
    pub(crate) reason: String,
    pub(crate) fatal: bool,
}

/// Installed by the pool; runs on the dying worker's thread.
pub(crate) type FailureHandler = Arc<dyn Fn(WorkerFailure) + Send + Sync>;

#[derive(Default)]
struct Assignments {
    attached: Vec<Arc<Slot>>,
    paused: BTreeSet<Arc<str>>,
}

#[derive(Default)]
struct Lifecycle {
    /// A loop thread exists and has not marked itself exited.
    alive: bool,
    thread: Option<ThreadId>,
    /// The loop died on a failure; `start()` is refused from then on.
    retired: bool,
}

/// Thread-backed step loop over attached components.
pub(crate) struct Worker {
    id: WorkerId,
    label: Arc<str>,
    ctx: Context,
    bus: Bus,
    stop_timeout: Duration,
    /// Consecutive failures of the pool position this worker took over.
    failures: u32,
    passes: Arc<PassCounter>,
    assignments: RwLock<Assignments>,
    run: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
    exited: Condvar,
    on_failure: Mutex<Option<FailureHandler>>,
}

impl Worker {
    pub(crate) fn new(
        id: WorkerId,
        ctx: &Context,
        bus: Bus,
        stop_timeout: Duration,
        failures: u32,
        passes: Arc<PassCounter>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            label: Arc::from(id.to_string()),
            ctx: ctx.for_worker(id),
            bus,
            stop_timeout,
            failures,
            passes,
            assignments: RwLock::new(Assignments::default()),
            run: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle::default()),
            exited: Condvar::new(),
            on_failure: Mutex::new(None),
        })
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    pub(crate) fn context(&self) -> &Context {
        &self.ctx
    }

    pub(crate) fn failures(&self) -> u32 {
        self.failures
    }

    pub(crate) fn passes(&self) -> u64 {
        self.passes.passes()
    }

    pub(crate) fn last_pass_ms(&self) -> Option<f64> {
        self.passes.last_pass_ms()
    }

    pub(crate) fn set_failure_handler(&self, handler: FailureHandler) {
        *self.on_failure.lock() = Some(handler);
    }

    /// `true` while a loop thread exists and is not asked to stop.
    pub(crate) fn is_running(&self) -> bool {
        self.lifecycle.lock().alive && self.run.load(Ordering::Acquire)
    }

    /// Starts the loop thread, or re-arms a loop that was asked to stop but
    /// has not exited yet. A retired worker stays down.
    pub(crate) fn start(self: &Arc<Self>) -> Result<(), RuntimeError> {
        let mut lc = self.lifecycle.lock();
        if lc.retired {
            debug!(worker = %self.id, "retired worker not restarted");
            return Ok(());
        }
        if lc.alive {
            self.run.store(true, Ordering::Release);
            return Ok(());
        }

        self.run.store(true, Ordering::Release);
        let me = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(self.label.to_string())
            .spawn(move || me.run_loop());
        match spawned {
            Ok(handle) => {
                lc.alive = true;
                lc.thread = Some(handle.thread().id());
                drop(lc);
                debug!(worker = %self.id, "worker started");
                self.bus
                    .publish(Event::new(EventKind::WorkerStarted).with_worker(self.label.clone()));
                Ok(())
            }
            Err(err) => {
                self.run.store(false, Ordering::Release);
                Err(RuntimeError::WorkerSpawn {
                    worker: self.label.to_string(),
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Clears the run flag without waiting.
    pub(crate) fn request_stop(&self) {
        let _lc = self.lifecycle.lock();
        self.run.store(false, Ordering::Release);
    }

    /// Requests a stop and waits (bounded) for the loop to exit.
    ///
    /// Returns `true` if the worker is not looping anymore, or if the call
    /// came from the worker's own thread (the stop then takes effect at the
    /// end of the current pass).
    pub(crate) fn stop(&self) -> bool {
        self.request_stop();
        self.wait_stopped(Instant::now() + self.stop_timeout)
    }

    /// Waits for a previously requested stop until `deadline`.
    pub(crate) fn wait_stopped(&self, deadline: Instant) -> bool {
        let mut lc = self.lifecycle.lock();
        if !lc.alive || lc.thread == Some(thread::current().id()) {
            return true;
        }
        while lc.alive {
            if self.exited.wait_until(&mut lc, deadline).timed_out() {
                break;
            }
        }
        if lc.alive {
            drop(lc);
            warn!(worker = %self.id, timeout = ?self.stop_timeout, "worker did not stop in time");
            self.bus.publish(
                Event::new(EventKind::WorkerStopTimedOut)
                    .with_worker(self.label.clone())
                    .with_duration(self.stop_timeout),
            );
            return false;
        }
        true
    }

    /// Attaches `slot` (stop, mutate, restart). Returns `false` if already attached.
    pub(crate) fn attach(self: &Arc<Self>, slot: Arc<Slot>) -> Result<bool, RuntimeError> {
        if self.has(slot.name()) {
            return Ok(false);
        }
        let name = slot.name_arc();
        self.mutate(|a| a.attached.push(slot))?;
        self.bus.publish(
            Event::new(EventKind::ComponentAttached)
                .with_worker(self.label.clone())
                .with_component(name),
        );
        Ok(true)
    }

    /// Detaches `name` (stop, mutate, restart) and forgets its pause mark.
    pub(crate) fn detach(self: &Arc<Self>, name: &str) -> Result<Option<Arc<Slot>>, RuntimeError> {
        if !self.has(name) {
            return Ok(None);
        }
        let mut removed = None;
        self.mutate(|a| {
            if let Some(pos) = a.attached.iter().position(|s| s.name() == name) {
                removed = Some(a.attached.remove(pos));
            }
            a.paused.remove(name);
        })?;
        if removed.is_some() {
            self.bus.publish(
                Event::new(EventKind::ComponentDetached)
                    .with_worker(self.label.clone())
                    .with_component(name),
            );
        }
        Ok(removed)
    }

    fn mutate(self: &Arc<Self>, f: impl FnOnce(&mut Assignments)) -> Result<(), RuntimeError> {
        let was_running = self.is_running();
        if was_running {
            self.stop();
        }
        f(&mut self.assignments.write());
        if was_running {
            self.start()?;
        }
        Ok(())
    }

    /// Marks an attached component paused. Returns `false` if not attached.
    pub(crate) fn pause(&self, name: &str) -> bool {
        let changed = {
            let mut a = self.assignments.write();
            let found = a
                .attached
                .iter()
                .find(|s| s.name() == name)
                .map(|s| s.name_arc());
            match found {
                Some(name) => a.paused.insert(name),
                None => return false,
            }
        };
        if changed {
            self.bus.publish(
                Event::new(EventKind::ComponentPaused)
                    .with_worker(self.label.clone())
                    .with_component(name),
            );
        }
        true
    }

    /// Clears a pause mark. Returns `false` if not attached.
    pub(crate) fn resume(&self, name: &str) -> bool {
        let changed = {
            let mut a = self.assignments.write();
            if !a.attached.iter().any(|s| s.name() == name) {
                return false;
            }
            a.paused.remove(name)
        };
        if changed {
            self.bus.publish(
                Event::new(EventKind::ComponentResumed)
                    .with_worker(self.label.clone())
                    .with_component(name),
            );
        }
        true
    }

    pub(crate) fn has(&self, name: &str) -> bool {
        self.assignments
            .read()
            .attached
            .iter()
            .any(|s| s.name() == name)
    }

    pub(crate) fn is_paused(&self, name: &str) -> bool {
        self.assignments.read().paused.contains(name)
    }

    pub(crate) fn attached(&self) -> Vec<Arc<Slot>> {
        self.assignments.read().attached.clone()
    }

    pub(crate) fn attached_names(&self) -> Vec<String> {
        self.assignments
            .read()
            .attached
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    pub(crate) fn paused_names(&self) -> Vec<String> {
        self.assignments
            .read()
            .paused
            .iter()
            .map(|n| n.to_string())
            .collect()
    }

    /// Empties the worker, returning what it held. Only used on dead workers.
    pub(crate) fn take_assignments(&self) -> (Vec<Arc<Slot>>, Vec<String>) {
        let mut a = self.assignments.write();
        let attached = std::mem::take(&mut a.attached);
        let paused = std::mem::take(&mut a.paused)
            .into_iter()
            .map(|n| n.to_string())
            .collect();
        (attached, paused)
    }

    fn run_loop(self: Arc<Self>) {
        loop {
            let started = Instant::now();
            let attached = self.attached();
            let mut stepped = 0usize;

            for slot in &attached {
                if self.is_paused(slot.name()) {
                    continue;
                }
                stepped += 1;
                let failure = match catch_unwind(AssertUnwindSafe(|| slot.step(&self.ctx))) {
                    Ok(Ok(())) => None,
                    Ok(Err(err)) => Some((err.to_string(), err.is_fatal())),
                    Err(panic) => Some((super::panic_message(&*panic), false)),
                };
                if let Some((reason, fatal)) = failure {
                    self.retire();
                    self.fail(WorkerFailure {
                        worker: self.id,
                        component: slot.name_arc(),
                        reason,
                        fatal,
                    });
                    return;
                }
            }
            self.passes.record(started.elapsed());

            {
                let mut lc = self.lifecycle.lock();
                if !self.run.load(Ordering::Acquire) {
                    lc.alive = false;
                    lc.thread = None;
                    self.exited.notify_all();
                    break;
                }
            }
            if stepped == 0 {
                thread::sleep(IDLE_PASS_SLEEP);
            }
        }
        debug!(worker = %self.id, "worker stopped");
        self.bus
            .publish(Event::new(EventKind::WorkerStopped).with_worker(self.label.clone()));
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.lifecycle.lock().retired
    }

    fn retire(&self) {
        let mut lc = self.lifecycle.lock();
        self.run.store(false, Ordering::Release);
        lc.retired = true;
        lc.alive = false;
        lc.thread = None;
        self.exited.notify_all();
    }

    fn fail(&self, failure: WorkerFailure) {
        let handler = self.on_failure.lock().clone();
        match handler {
            Some(handler) => handler(failure),
            None => warn!(
                worker = %self.id,
                component = %failure.component,
                reason = %failure.reason,
                "worker failed without a failure handler"
            ),
        }
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("attached", &self.attached_names())
            .field("paused", &self.paused_names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::actions::ActionBus;
    use crate::components::{ComponentFn, ComponentSpec};
    use crate::core::test_support::eventually;
    use crate::error::ComponentError;
    use crate::globals::Globals;

    fn worker(stop_timeout: Duration) -> Arc<Worker> {
        let ctx = Context::detached(Arc::new(ActionBus::new()), Arc::new(Globals::new()));
        Worker::new(
            WorkerId::new(0),
            &ctx,
            Bus::new(256),
            stop_timeout,
            0,
            Arc::new(PassCounter::default()),
        )
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<Slot> {
        let log = Arc::clone(log);
        Arc::new(Slot::new(ComponentSpec::new(ComponentFn::new(
            name,
            move |_ctx: &Context| {
                log.lock().push(name);
                Ok(())
            },
        ))))
    }

    #[test]
    fn worker_id_round_trips_through_display() {
        let id = WorkerId::new(7);
        assert_eq!(id.to_string(), "worker-7");
        assert_eq!("worker-7".parse::<WorkerId>(), Ok(id));
        assert!("thread-7".parse::<WorkerId>().is_err());
    }

    #[test]
    fn steps_in_attachment_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let w = worker(Duration::from_secs(2));
        w.attach(recorder("a", &log)).unwrap();
        w.attach(recorder("b", &log)).unwrap();
        w.start().unwrap();

        assert!(eventually(|| log.lock().len() >= 6));
        assert!(w.stop());
        assert!(!w.is_running());

        let log = log.lock();
        let len = log.len() - log.len() % 2;
        for pair in log[..len].chunks(2) {
            assert_eq!(pair, ["a", "b"]);
        }
        assert!(w.passes() >= 3);
        assert!(w.last_pass_ms().is_some());
    }

    #[test]
    fn pause_skips_without_detaching() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let w = worker(Duration::from_secs(2));
        w.attach(recorder("a", &log)).unwrap();
        w.attach(recorder("b", &log)).unwrap();
        assert!(w.pause("a"));
        assert!(!w.pause("ghost"));
        w.start().unwrap();

        assert!(eventually(|| log.lock().len() >= 3));
        assert!(log.lock().iter().all(|n| *n == "b"));
        assert!(w.has("a"));
        assert_eq!(w.paused_names(), ["a"]);

        assert!(w.resume("a"));
        assert!(eventually(|| log.lock().contains(&"a")));
        w.stop();
    }

    #[test]
    fn attach_on_running_worker_restarts_it() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let w = worker(Duration::from_secs(2));
        w.attach(recorder("a", &log)).unwrap();
        w.start().unwrap();
        assert!(eventually(|| !log.lock().is_empty()));

        assert!(w.attach(recorder("b", &log)).unwrap());
        assert!(!w.attach(recorder("b", &log)).unwrap());
        assert!(w.is_running());
        assert!(eventually(|| log.lock().contains(&"b")));

        let removed = w.detach("a").unwrap();
        assert_eq!(removed.map(|s| s.name().to_string()).as_deref(), Some("a"));
        assert_eq!(w.attached_names(), ["b"]);
        w.stop();
    }

    #[test]
    fn failing_step_invokes_failure_handler() {
        let w = worker(Duration::from_secs(2));
        let slot = Arc::new(Slot::new(ComponentSpec::new(ComponentFn::new(
            "broken",
            |_ctx: &Context| Err(ComponentError::fatal("disk gone")),
        ))));
        w.attach(slot).unwrap();

        let seen = Arc::new(Mutex::new(None));
        let s = Arc::clone(&seen);
        w.set_failure_handler(Arc::new(move |f: WorkerFailure| {
            *s.lock() = Some((f.component.to_string(), f.reason, f.fatal));
        }));
        w.start().unwrap();

        assert!(eventually(|| seen.lock().is_some()));
        assert!(!w.is_running());
        let (component, reason, fatal) = seen.lock().clone().unwrap();
        assert_eq!(component, "broken");
        assert_eq!(reason, "fatal component error: disk gone");
        assert!(fatal);
    }

    #[test]
    fn failed_worker_cannot_be_restarted() {
        let w = worker(Duration::from_secs(2));
        let steps = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&steps);
        let slot = Arc::new(Slot::new(ComponentSpec::new(ComponentFn::new(
            "once",
            move |_ctx: &Context| {
                if s.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(ComponentError::fail("first call fails"));
                }
                Ok(())
            },
        ))));
        w.attach(slot).unwrap();
        let failed = Arc::new(AtomicBool::new(false));
        let f = Arc::clone(&failed);
        w.set_failure_handler(Arc::new(move |_failure: WorkerFailure| {
            f.store(true, Ordering::SeqCst);
        }));
        w.start().unwrap();
        assert!(eventually(|| failed.load(Ordering::SeqCst)));

        w.start().unwrap();
        thread::sleep(Duration::from_millis(30));
        assert!(w.is_retired());
        assert!(!w.is_running());
        assert_eq!(steps.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_step_is_contained() {
        let w = worker(Duration::from_secs(2));
        let slot = Arc::new(Slot::new(ComponentSpec::new(ComponentFn::new(
            "panicky",
            |_ctx: &Context| panic!("index out of range"),
        ))));
        w.attach(slot).unwrap();
        let failures = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&failures);
        w.set_failure_handler(Arc::new(move |failure: WorkerFailure| {
            assert_eq!(failure.reason, "index out of range");
            f.fetch_add(1, Ordering::SeqCst);
        }));
        w.start().unwrap();
        assert!(eventually(|| failures.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn stop_gives_up_on_blocked_step() {
        let w = worker(Duration::from_millis(20));
        let slot = Arc::new(Slot::new(ComponentSpec::new(ComponentFn::new(
            "sleepy",
            |_ctx: &Context| {
                thread::sleep(Duration::from_millis(300));
                Ok(())
            },
        ))));
        w.attach(slot).unwrap();
        w.start().unwrap();
        thread::sleep(Duration::from_millis(20));

        assert!(!w.stop());
        assert!(eventually(|| !w.is_running()));
        assert!(w.stop());
    }
}
