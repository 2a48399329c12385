//! # Worker pool: assignment, rebuild and crash respawn.
//!
//! The [`WorkerPool`] owns the workers, assigns registry components to them
//! and replaces workers whose loop died.
//!
//! ## Rebuild
//! ```text
//! rebuild()
//!   ├─► registry.reorder()                       (CircularDependency aborts here)
//!   ├─► W = cfg.worker_count(N)
//!   ├─► stop + discard every worker              (pause marks remembered by name)
//!   ├─► component i ──► fresh worker i % W       (round-robin, registry order)
//!   ├─► update() for every component             (calling thread, before any step)
//!   └─► start workers if the pool is running
//! ```
//!
//! ## Respawn (runs on the dying worker's thread)
//! ```text
//! WorkerFailed
//!   ├─► remove failed worker, keep its attached list and pause marks
//!   ├─► fatal error? ──► deactivate the component
//!   ├─► replacement (new id, same position) gets the list and the marks
//!   ├─► sleep respawn_backoff.delay(consecutive failures)
//!   ├─► start replacement if the pool is running (same failure handler)
//!   └─► reconcile: attach unassigned components, detach unregistered ones
//! ```
//!
//! ## Rules
//! - Structural operations are serialized by one reentrant control lock, so a
//!   component's `update()` may call back into the pool on the same thread.
//! - A failure never stops another worker; reconcile only touches workers
//!   that need a change.
//! - There is no respawn limit.
//! - A worker retired by a failure never receives components again; its
//!   replacement does.

use std::collections::{BTreeMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Instant;

use parking_lot::{ReentrantMutex, RwLock};
use tracing::{debug, error, info, warn};

use super::diagnostics::Diagnostics;
use super::registry::Registry;
use super::worker::{Worker, WorkerFailure, WorkerId};
use crate::components::{Context, Slot};
use crate::config::Config;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};

/// Point-in-time view of one worker.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkerSnapshot {
    /// Worker identity.
    pub id: WorkerId,
    /// Whether the loop is running.
    pub running: bool,
    /// Attached component names in step order.
    pub attached: Vec<String>,
    /// Paused component names.
    pub paused: Vec<String>,
    /// Completed passes.
    pub passes: u64,
    /// Duration of the last completed pass in milliseconds.
    pub last_pass_ms: Option<f64>,
}

pub(crate) struct WorkerPool {
    cfg: Config,
    ctx: Context,
    bus: Bus,
    registry: Arc<Registry>,
    diagnostics: Diagnostics,
    control: ReentrantMutex<()>,
    workers: RwLock<Vec<Arc<Worker>>>,
    /// Desired state: fresh and replacement workers start only when set.
    running: AtomicBool,
    built: AtomicBool,
    next_id: AtomicU64,
    me: Weak<WorkerPool>,
}

impl WorkerPool {
    pub(crate) fn new(cfg: Config, ctx: Context, bus: Bus, registry: Arc<Registry>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            cfg,
            ctx,
            bus,
            registry,
            diagnostics: Diagnostics::new(),
            control: ReentrantMutex::new(()),
            workers: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
            built: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            me: me.clone(),
        })
    }

    pub(crate) fn is_built(&self) -> bool {
        self.built.load(Ordering::Acquire)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn new_worker(&self, failures: u32) -> Arc<Worker> {
        let id = WorkerId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let worker = Worker::new(
            id,
            &self.ctx,
            self.bus.clone(),
            self.cfg.stop_timeout,
            failures,
            self.diagnostics.register(id),
        );
        let pool = self.me.clone();
        worker.set_failure_handler(Arc::new(move |failure: WorkerFailure| {
            if let Some(pool) = pool.upgrade() {
                pool.handle_failure(failure);
            }
        }));
        worker
    }

    /// Full rebuild: reorder, discard every worker, assign round-robin, update, restart.
    pub(crate) fn rebuild(&self) -> Result<(), RuntimeError> {
        let _control = self.control.lock();
        self.registry.reorder()?;

        let slots = self.registry.snapshot();
        let count = self.cfg.worker_count(slots.len());

        let paused: HashSet<String> = self
            .workers
            .read()
            .iter()
            .flat_map(|w| w.paused_names())
            .collect();
        let old = std::mem::take(&mut *self.workers.write());
        self.stop_workers(&old);
        for worker in &old {
            self.diagnostics.remove(worker.id());
        }

        let fresh: Vec<Arc<Worker>> = (0..count).map(|_| self.new_worker(0)).collect();
        for (i, slot) in slots.iter().enumerate() {
            let worker = &fresh[i % count];
            worker.attach(Arc::clone(slot))?;
            if paused.contains(slot.name()) {
                worker.pause(slot.name());
            }
        }
        *self.workers.write() = fresh.clone();

        for (i, slot) in slots.iter().enumerate() {
            self.run_update(slot, fresh[i % count].context());
        }
        self.built.store(true, Ordering::Release);

        info!(workers = count, components = slots.len(), "rebuild completed");
        self.bus.publish(
            Event::new(EventKind::RebuildCompleted)
                .with_reason(format!("workers={count} components={}", slots.len())),
        );

        if self.is_running() {
            self.start_workers(&fresh)?;
        }
        Ok(())
    }

    /// Starts every worker, building first if no rebuild ran yet.
    pub(crate) fn start(&self) -> Result<(), RuntimeError> {
        let _control = self.control.lock();
        if !self.is_built() {
            self.rebuild()?;
        }
        self.running.store(true, Ordering::Release);
        let workers = self.workers.read().clone();
        self.start_workers(&workers)?;
        info!(workers = workers.len(), "workers started");
        Ok(())
    }

    /// Stops every worker (bounded wait per `stop_timeout`, shared by all workers).
    pub(crate) fn stop(&self) {
        let _control = self.control.lock();
        self.running.store(false, Ordering::Release);
        let workers = self.workers.read().clone();
        self.stop_workers(&workers);
        info!(workers = workers.len(), "workers stopped");
    }

    fn start_workers(&self, workers: &[Arc<Worker>]) -> Result<(), RuntimeError> {
        for worker in workers {
            worker.start()?;
        }
        Ok(())
    }

    fn stop_workers(&self, workers: &[Arc<Worker>]) {
        for worker in workers {
            worker.request_stop();
        }
        let deadline = Instant::now() + self.cfg.stop_timeout;
        for worker in workers {
            worker.wait_stopped(deadline);
        }
    }

    fn run_update(&self, slot: &Slot, ctx: &Context) {
        let reason = match catch_unwind(AssertUnwindSafe(|| slot.update(ctx))) {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(panic) => super::panic_message(&*panic),
        };
        warn!(component = slot.name(), %reason, "update failed");
        self.bus.publish(
            Event::new(EventKind::UpdateFailed)
                .with_component(slot.name_arc())
                .with_reason(reason),
        );
    }

    fn owner(&self, name: &str) -> Option<Arc<Worker>> {
        self.workers.read().iter().find(|w| w.has(name)).cloned()
    }

    fn missing(&self, name: &str) -> RuntimeError {
        if self.registry.contains(name) {
            RuntimeError::NotAttached {
                name: name.to_string(),
            }
        } else {
            RuntimeError::ComponentNotFound {
                name: name.to_string(),
            }
        }
    }

    /// Worker a component is attached to.
    pub(crate) fn worker_of(&self, name: &str) -> Option<WorkerId> {
        self.owner(name).map(|w| w.id())
    }

    pub(crate) fn pause(&self, name: &str) -> Result<(), RuntimeError> {
        let _control = self.control.lock();
        match self.owner(name) {
            Some(worker) if worker.pause(name) => Ok(()),
            _ => Err(self.missing(name)),
        }
    }

    pub(crate) fn resume(&self, name: &str) -> Result<(), RuntimeError> {
        let _control = self.control.lock();
        match self.owner(name) {
            Some(worker) if worker.resume(name) => Ok(()),
            _ => Err(self.missing(name)),
        }
    }

    /// Detaches `name` from its worker and attaches it to `target`, keeping its pause mark.
    pub(crate) fn move_to_worker(&self, name: &str, target: WorkerId) -> Result<(), RuntimeError> {
        let _control = self.control.lock();
        let destination = self
            .workers
            .read()
            .iter()
            .find(|w| w.id() == target)
            .cloned()
            .ok_or_else(|| RuntimeError::WorkerNotFound {
                worker: target.to_string(),
            })?;
        let current = self.owner(name).ok_or_else(|| self.missing(name))?;
        if current.id() == target {
            return Ok(());
        }

        let paused = current.is_paused(name);
        let slot = current.detach(name)?.ok_or_else(|| self.missing(name))?;
        destination.attach(slot)?;
        if paused {
            destination.pause(name);
        }
        debug!(component = name, from = %current.id(), to = %target, "component moved");
        Ok(())
    }

    pub(crate) fn snapshots(&self) -> Vec<WorkerSnapshot> {
        self.workers
            .read()
            .iter()
            .map(|w| WorkerSnapshot {
                id: w.id(),
                running: w.is_running(),
                attached: w.attached_names(),
                paused: w.paused_names(),
                passes: w.passes(),
                last_pass_ms: w.last_pass_ms(),
            })
            .collect()
    }

    pub(crate) fn pass_times(&self) -> BTreeMap<WorkerId, f64> {
        self.diagnostics.pass_times()
    }

    fn handle_failure(&self, failure: WorkerFailure) {
        error!(
            worker = %failure.worker,
            component = %failure.component,
            reason = %failure.reason,
            "worker failed"
        );
        self.bus.publish(
            Event::new(EventKind::WorkerFailed)
                .with_worker(failure.worker.to_string())
                .with_component(Arc::clone(&failure.component))
                .with_reason(failure.reason.clone()),
        );

        let (replacement, delay) = {
            let _control = self.control.lock();
            let found = {
                let workers = self.workers.read();
                workers
                    .iter()
                    .position(|w| w.id() == failure.worker)
                    .map(|pos| (pos, Arc::clone(&workers[pos])))
            };
            let Some((pos, failed)) = found else {
                debug!(worker = %failure.worker, "failed worker was already discarded");
                return;
            };

            if failure.fatal {
                self.deactivate(&failure.component);
            }

            let (attached, paused) = failed.take_assignments();
            let failures = if failed.passes() == 0 {
                failed.failures().saturating_add(1)
            } else {
                1
            };
            let replacement = self.new_worker(failures);
            for slot in attached {
                // not running yet, so attaching cannot fail
                let _ = replacement.attach(slot);
            }
            for name in &paused {
                replacement.pause(name);
            }
            self.workers.write()[pos] = Arc::clone(&replacement);
            self.diagnostics.remove(failed.id());
            (replacement, self.cfg.respawn_backoff.delay(failures))
        };

        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let _control = self.control.lock();
        if !self
            .workers
            .read()
            .iter()
            .any(|w| Arc::ptr_eq(w, &replacement))
        {
            debug!(worker = %replacement.id(), "replacement discarded before start");
            return;
        }

        warn!(
            worker = %replacement.id(),
            replaced = %failure.worker,
            delay = ?delay,
            "worker respawned"
        );
        self.bus.publish(
            Event::new(EventKind::WorkerRespawned)
                .with_worker(replacement.id().to_string())
                .with_reason(failure.worker.to_string())
                .with_delay(delay),
        );

        if self.is_running() {
            if let Err(err) = replacement.start() {
                error!(worker = %replacement.id(), error = %err, "replacement failed to start");
            }
        }
        self.reconcile();
    }

    fn deactivate(&self, name: &str) {
        let Some(slot) = self.registry.get(name) else {
            return;
        };
        if slot.set_active(false) {
            warn!(component = name, "component deactivated after fatal error");
            self.bus.publish(
                Event::new(EventKind::ComponentActivity)
                    .with_component(name)
                    .with_reason("inactive"),
            );
        }
    }

    /// Aligns workers with the registry without stopping healthy workers.
    pub(crate) fn reconcile(&self) {
        let _control = self.control.lock();
        if let Err(err) = self.registry.reorder() {
            warn!(error = %err, "reconcile skipped");
            return;
        }
        let slots = self.registry.snapshot();
        let workers = self.workers.read().clone();
        if workers.is_empty() {
            return;
        }

        let mut detached = 0usize;
        for worker in &workers {
            for name in worker.attached_names() {
                if self.registry.contains(&name) {
                    continue;
                }
                match worker.detach(&name) {
                    Ok(Some(_)) => detached += 1,
                    Ok(None) => {}
                    Err(err) => error!(worker = %worker.id(), error = %err, "reconcile detach failed"),
                }
            }
        }

        let targets: Vec<Arc<Worker>> = workers
            .iter()
            .filter(|w| !w.is_retired())
            .cloned()
            .collect();
        let mut attached = 0usize;
        for (i, slot) in slots.iter().enumerate() {
            if targets.is_empty() || workers.iter().any(|w| w.has(slot.name())) {
                continue;
            }
            let worker = &targets[i % targets.len()];
            self.run_update(slot, worker.context());
            match worker.attach(Arc::clone(slot)) {
                Ok(_) => attached += 1,
                Err(err) => error!(worker = %worker.id(), error = %err, "reconcile attach failed"),
            }
        }

        debug!(attached, detached, "reconcile completed");
        self.bus.publish(
            Event::new(EventKind::ReconcileCompleted)
                .with_reason(format!("attached={attached} detached={detached}")),
        );
    }
}
