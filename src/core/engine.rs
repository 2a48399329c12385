//! # Engine: the process-level API over registry, worker pool and action bus.
//!
//! The [`Engine`] is the single owned context object of a process: it owns
//! the registry, the worker pool, the action bus, the globals and the event
//! bus, and hands components a [`Context`](crate::Context) to reach them.
//!
//! ## High-level architecture
//! ```text
//! Engine::run(specs)
//!   ├─► add(spec) for each spec              (registry: unique names, dependency order)
//!   ├─► start()                              (first call builds: rebuild protocol)
//!   ├─► every tick_interval: tick()          (deferred action subscriptions)
//!   └─► OS signal or cancel()
//!         └─► ShutdownRequested ──► shutdown():
//!               ├─► stop every worker (bounded by stop_timeout)
//!               ├─► shutdown() on each active component, registry order
//!               └─► ShutdownCompleted
//!
//! Event flow:
//!   workers / pool / registry / actions ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use stepvisor::{ComponentFn, ComponentSpec, Config, Context, Engine};
//!
//! let engine = Engine::builder(Config { workers: 2, ..Config::default() }).build();
//!
//! let beats = Arc::new(AtomicUsize::new(0));
//! let b = beats.clone();
//! engine.add(ComponentSpec::new(
//!     ComponentFn::new("heartbeat", move |_ctx: &Context| {
//!         b.fetch_add(1, Ordering::Relaxed);
//!         std::thread::sleep(std::time::Duration::from_millis(1));
//!         Ok(())
//!     })
//!     .provides("clock"),
//! ))?;
//!
//! engine.start()?;
//! while beats.load(Ordering::Relaxed) == 0 {
//!     std::thread::yield_now();
//! }
//! engine.shutdown();
//! assert_eq!(engine.status(), vec!["[clock]-heartbeat: active".to_string()]);
//! # Ok::<(), stepvisor::RuntimeError>(())
//! ```

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::builder::EngineBuilder;
use super::pool::{WorkerPool, WorkerSnapshot};
use super::registry::Registry;
use super::shutdown;
use super::worker::WorkerId;
use crate::actions::ActionBus;
use crate::components::{Capability, ComponentRef, ComponentSpec};
use crate::config::Config;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::globals::Globals;
use crate::testing::TestContext;

/// Owns every subsystem of the runtime. Created through [`Engine::builder`].
pub struct Engine {
    cfg: Config,
    bus: Bus,
    registry: Arc<Registry>,
    pool: Arc<WorkerPool>,
    actions: Arc<ActionBus>,
    globals: Arc<Globals>,
    runtime_token: CancellationToken,
    shut_down: AtomicBool,
}

impl Engine {
    /// Returns a builder for configuring and constructing an engine.
    pub fn builder(cfg: Config) -> EngineBuilder {
        EngineBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: Config,
        bus: Bus,
        registry: Arc<Registry>,
        pool: Arc<WorkerPool>,
        actions: Arc<ActionBus>,
        globals: Arc<Globals>,
        runtime_token: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            bus,
            registry,
            pool,
            actions,
            globals,
            runtime_token,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Subscribes to runtime events published after this call.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    // ---- Registry ----

    /// Registers a component.
    ///
    /// Fails with `DuplicateName` or `CircularDependency`, leaving the registry
    /// unchanged. Once the engine has been built, a successful add rebuilds.
    pub fn add(&self, spec: ComponentSpec) -> Result<(), RuntimeError> {
        self.registry.add(spec)?;
        if self.pool.is_built() {
            self.pool.rebuild()?;
        }
        Ok(())
    }

    /// Unregisters a component and returns it; the caller owns its teardown.
    /// Once the engine has been built, a successful remove rebuilds.
    pub fn remove(&self, name: &str) -> Result<ComponentRef, RuntimeError> {
        let slot = self.registry.remove(name)?;
        if self.pool.is_built() {
            self.pool.rebuild()?;
        }
        Ok(Arc::clone(slot.component()))
    }

    /// Component names in scheduling order.
    pub fn names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Looks a component up by name.
    pub fn get(&self, name: &str) -> Option<ComponentRef> {
        self.registry.get(name).map(|s| Arc::clone(s.component()))
    }

    /// Looks a component up by name and concrete type.
    pub fn component<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.registry.get(name)?.downcast::<T>()
    }

    /// Components providing `capability`, in scheduling order.
    pub fn components_with(&self, capability: impl Into<Capability>) -> Vec<ComponentRef> {
        self.registry
            .with_capability(&capability.into())
            .iter()
            .map(|s| Arc::clone(s.component()))
            .collect()
    }

    /// Enables or disables every lifecycle call of a component.
    pub fn set_active(&self, name: &str, active: bool) -> Result<(), RuntimeError> {
        let slot = self
            .registry
            .get(name)
            .ok_or_else(|| RuntimeError::ComponentNotFound {
                name: name.to_string(),
            })?;
        if slot.set_active(active) != active {
            info!(component = name, active, "component activity changed");
            self.bus.publish(
                Event::new(EventKind::ComponentActivity)
                    .with_component(name)
                    .with_reason(if active { "active" } else { "inactive" }),
            );
        }
        Ok(())
    }

    /// Returns `Some(active)` for a registered component.
    pub fn is_active(&self, name: &str) -> Option<bool> {
        self.registry.get(name).map(|s| s.is_active())
    }

    /// Applies a setting change to a component.
    ///
    /// A rejected change leaves the previous option in place.
    pub fn change_setting(
        &self,
        component: &str,
        setting: &str,
        option: &str,
    ) -> Result<(), RuntimeError> {
        let slot = self
            .registry
            .get(component)
            .ok_or_else(|| RuntimeError::ComponentNotFound {
                name: component.to_string(),
            })?;
        match slot.change_setting(setting, option) {
            Ok(()) => {
                info!(component, setting, option, "setting changed");
                self.bus.publish(
                    Event::new(EventKind::SettingChanged)
                        .with_component(component)
                        .with_reason(format!("{setting}={option}")),
                );
                Ok(())
            }
            Err(source) => {
                warn!(component, error = %source, "setting rejected");
                self.bus.publish(
                    Event::new(EventKind::SettingRejected)
                        .with_component(component)
                        .with_reason(source.to_string()),
                );
                Err(RuntimeError::InvalidSetting {
                    component: component.to_string(),
                    source,
                })
            }
        }
    }

    // ---- Worker pool ----

    /// Full rebuild: reorder, reassign every component round-robin, run `update()`.
    pub fn rebuild(&self) -> Result<(), RuntimeError> {
        self.pool.rebuild()
    }

    /// Starts every worker (building first if needed).
    pub fn start(&self) -> Result<(), RuntimeError> {
        self.pool.start()
    }

    /// Stops every worker.
    pub fn stop(&self) {
        self.pool.stop()
    }

    /// Whether the pool is meant to be running.
    pub fn is_running(&self) -> bool {
        self.pool.is_running()
    }

    /// Skips a component on its worker without detaching it.
    pub fn pause(&self, name: &str) -> Result<(), RuntimeError> {
        self.pool.pause(name)
    }

    /// Resumes a paused component.
    pub fn resume(&self, name: &str) -> Result<(), RuntimeError> {
        self.pool.resume(name)
    }

    /// Moves a component to another worker.
    pub fn move_to_worker(&self, name: &str, worker: WorkerId) -> Result<(), RuntimeError> {
        self.pool.move_to_worker(name, worker)
    }

    /// Worker a component is attached to.
    pub fn worker_of(&self, name: &str) -> Option<WorkerId> {
        self.pool.worker_of(name)
    }

    /// Snapshot of every worker.
    pub fn workers(&self) -> Vec<WorkerSnapshot> {
        self.pool.snapshots()
    }

    /// Last pass duration in milliseconds, keyed by worker.
    pub fn pass_times(&self) -> BTreeMap<WorkerId, f64> {
        self.pool.pass_times()
    }

    // ---- Actions and globals ----

    /// The shared action bus.
    pub fn actions(&self) -> &ActionBus {
        &self.actions
    }

    /// Process-wide named variables.
    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    /// Stores a process-wide variable (last writer wins).
    pub fn set_global<T: std::any::Any + Send + Sync>(&self, name: &str, value: T) {
        self.globals.set(name, value);
    }

    /// Reads a process-wide variable of type `T`.
    pub fn global<T: std::any::Any + Clone>(&self, name: &str) -> Option<T> {
        self.globals.get(name)
    }

    /// One scheduler tick: resolves deferred action subscriptions.
    pub fn tick(&self) -> usize {
        self.actions.tick(self.cfg.subscription_drain)
    }

    // ---- Diagnostics ----

    /// One line per component status line: `"[cap1, cap2]-name: line"`.
    pub fn status(&self) -> Vec<String> {
        self.registry
            .snapshot()
            .iter()
            .flat_map(|s| s.status_lines())
            .collect()
    }

    /// Runs `test()` of every component in an isolated context and collects the log.
    pub fn test_components(&self) -> Vec<String> {
        let mut log = Vec::new();
        for slot in self.registry.snapshot() {
            let mut ctx = TestContext::new(slot.name());
            let code = match catch_unwind(AssertUnwindSafe(|| slot.test(&mut ctx))) {
                Ok(code) => code,
                Err(panic) => {
                    let reason = super::panic_message(&*panic);
                    error!(component = slot.name(), %reason, "self-test panicked");
                    ctx.log(format!("panicked: {reason}"));
                    -1
                }
            };
            log.extend(ctx.finish(code));
        }
        log
    }

    // ---- Lifecycle ----

    /// Stops every worker, then calls `shutdown()` on each active component in
    /// registry order. Only the first call has an effect.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.pool.stop();
        for slot in self.registry.snapshot() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| slot.shutdown())) {
                let reason = super::panic_message(&*panic);
                error!(component = slot.name(), %reason, "component shutdown panicked");
            }
        }
        info!("engine shut down");
        self.bus.publish(Event::new(EventKind::ShutdownCompleted));
    }

    /// Requests [`run`](Self::run) to return.
    pub fn cancel(&self) {
        self.runtime_token.cancel();
    }

    /// Cancellation token observed by `run` and the subscriber listener.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.runtime_token.clone()
    }

    /// Adds `specs`, starts the workers and ticks every `tick_interval` until an
    /// OS termination signal or [`cancel`](Self::cancel), then shuts down.
    ///
    /// Starting runs every component's `update()` and shutting down waits up to
    /// `stop_timeout` for the workers. On a multi-threaded runtime both happen
    /// in [`block_in_place`](tokio::task::block_in_place) so other tasks keep
    /// running; on a current-thread runtime they block the whole runtime.
    pub async fn run(&self, specs: Vec<ComponentSpec>) -> Result<(), RuntimeError> {
        blocking(|| {
            for spec in specs {
                self.add(spec)?;
            }
            self.start()
        })?;

        let mut ticker = tokio::time::interval(self.cfg.tick_interval_clamped());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let signal = shutdown::wait_for_shutdown_signal();
        tokio::pin!(signal);
        let mut signals = true;

        let cause = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                res = &mut signal, if signals => {
                    match res {
                        Ok(name) => break name,
                        Err(err) => {
                            warn!(error = %err, "signal handlers unavailable; waiting for cancel()");
                            signals = false;
                        }
                    }
                }
                _ = self.runtime_token.cancelled() => break "cancel",
            }
        };

        info!(cause, "shutdown requested");
        self.bus
            .publish(Event::new(EventKind::ShutdownRequested).with_reason(cause));
        blocking(|| self.shutdown());
        self.runtime_token.cancel();
        Ok(())
    }
}

/// Runs synchronous engine work from async code, off the runtime's core when it can.
fn blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

impl Drop for Engine {
    /// Worker threads do not outlive the engine; components are not shut down here.
    fn drop(&mut self) {
        if !self.shut_down.load(Ordering::Acquire) {
            self.pool.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use crate::components::{ComponentFn, Context, INACTIVE_TEST_CODE, Settings};
    use crate::core::test_support::eventually;
    use crate::error::{ComponentError, SettingError};

    fn engine(workers: usize) -> Arc<Engine> {
        Engine::builder(Config {
            workers,
            stop_timeout: Duration::from_millis(500),
            ..Config::default()
        })
        .build()
    }

    fn idle(
        name: &'static str,
    ) -> ComponentFn<impl Fn(&Context) -> Result<(), ComponentError> + Send + Sync + 'static> {
        ComponentFn::new(name, |_ctx: &Context| {
            std::thread::sleep(Duration::from_millis(1));
            Ok(())
        })
    }

    #[test]
    fn add_after_build_rebuilds() {
        let e = engine(2);
        e.add(ComponentSpec::new(idle("a"))).unwrap();
        e.start().unwrap();
        assert!(e.worker_of("a").is_some());

        e.add(ComponentSpec::new(idle("b"))).unwrap();
        assert!(e.worker_of("b").is_some());
        assert!(e.workers().iter().all(|w| w.running));

        let removed = e.remove("a").unwrap();
        assert_eq!(removed.name(), "a");
        assert_eq!(e.worker_of("a"), None);
        assert_eq!(e.names(), vec!["b".to_string()]);
        e.shutdown();
    }

    #[test]
    fn queries_by_name_type_and_capability() {
        let e = engine(1);
        e.add(ComponentSpec::new(idle("disk").provides("storage"))).unwrap();
        e.add(ComponentSpec::new(idle("web").depends_on("storage"))).unwrap();

        assert!(e.get("disk").is_some());
        assert!(e.get("nope").is_none());
        let storage = e.components_with("storage");
        assert_eq!(storage.len(), 1);
        assert_eq!(storage[0].name(), "disk");
        assert!(e.components_with("none").is_empty());
    }

    #[test]
    fn inactive_components_are_reported_and_skipped() {
        let e = engine(1);
        let shut = Arc::new(AtomicUsize::new(0));
        let s = shut.clone();
        e.add(ComponentSpec::new(
            idle("cache")
                .provides("kv")
                .on_status(|| vec!["warm".into(), "3 entries".into()])
                .on_shutdown(move || {
                    s.fetch_add(1, Ordering::SeqCst);
                })
                .on_test(|t| {
                    t.log("checking");
                    0
                }),
        ))
        .unwrap();

        assert_eq!(
            e.status(),
            vec![
                "[kv]-cache: warm".to_string(),
                "[kv]-cache: 3 entries".to_string()
            ]
        );
        assert_eq!(
            e.test_components(),
            vec![
                "cache - checking".to_string(),
                "cache - Component returned: 0".to_string()
            ]
        );

        e.set_active("cache", false).unwrap();
        assert_eq!(e.is_active("cache"), Some(false));
        assert_eq!(e.status(), vec!["[kv]-cache: Component not active".to_string()]);
        assert_eq!(
            e.test_components(),
            vec![format!("cache - Component returned: {INACTIVE_TEST_CODE}")]
        );

        e.shutdown();
        assert_eq!(shut.load(Ordering::SeqCst), 0);
        assert_eq!(
            e.set_active("ghost", true),
            Err(RuntimeError::ComponentNotFound { name: "ghost".into() })
        );
    }

    #[test]
    fn settings_are_validated() {
        let e = engine(1);
        let settings = Settings::new().with("mode", ["fast", "safe"], "safe");
        e.add(ComponentSpec::new(idle("codec").with_settings(settings)))
            .unwrap();

        e.change_setting("codec", "mode", "fast").unwrap();
        let err = e.change_setting("codec", "mode", "turbo").unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::InvalidSetting {
                source: SettingError::IllegalOption { .. },
                ..
            }
        ));
        let codec = e.get("codec").unwrap();
        assert_eq!(
            codec.settings().and_then(|s| s.current("mode")),
            Some("fast".to_string())
        );
    }

    #[test]
    fn shutdown_runs_once_in_registry_order() {
        let e = engine(2);
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for name in ["first", "second"] {
            let o = order.clone();
            e.add(ComponentSpec::new(idle(name).on_shutdown(move || o.lock().push(name))))
                .unwrap();
        }
        e.start().unwrap();
        let mut rx = e.events();
        e.shutdown();
        e.shutdown();

        assert_eq!(*order.lock(), vec!["first", "second"]);
        assert!(!e.is_running());
        let mut completed = 0;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::ShutdownCompleted {
                completed += 1;
            }
        }
        assert_eq!(completed, 1);
    }

    #[test]
    fn components_reach_the_engine_through_context() {
        let e = engine(1);
        e.set_global("limit", 3_u32);
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        e.add(ComponentSpec::new(ComponentFn::new(
            "peer",
            move |ctx: &Context| {
                let limit = ctx.globals().get::<u32>("limit").unwrap_or(0);
                let names = ctx.engine().map(|en| en.names().len()).unwrap_or(0);
                s.store(limit as usize + names, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(1));
                Ok(())
            },
        )))
        .unwrap();
        e.start().unwrap();
        assert!(eventually(|| seen.load(Ordering::SeqCst) == 4));
        e.shutdown();
    }

    #[test]
    fn tick_resolves_deferred_subscriptions() {
        let e = engine(1);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        assert!(!e.actions().subscribe("later", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(e.tick(), 0);

        e.actions().create("later", ());
        assert_eq!(e.tick(), 1);
        e.actions().trigger("later").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_returns_after_cancel() {
        let e = engine(1);
        let steps = Arc::new(AtomicUsize::new(0));
        let s = steps.clone();
        let spec = ComponentSpec::new(ComponentFn::new("beat", move |_ctx: &Context| {
            s.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(1));
            Ok(())
        }));

        let runner = Arc::clone(&e);
        let handle = tokio::spawn(async move { runner.run(vec![spec]).await });

        while steps.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        e.cancel();
        handle.await.unwrap().unwrap();
        assert!(!e.is_running());
        assert!(e.cancellation_token().is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn slow_update_in_run_does_not_stall_other_tasks() {
        let e = engine(1);
        let pulses = Arc::new(AtomicUsize::new(0));
        let p = pulses.clone();
        tokio::spawn(async move {
            loop {
                p.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let advanced = Arc::new(AtomicUsize::new(0));
        let steps = Arc::new(AtomicUsize::new(0));
        let (p, a, s) = (pulses.clone(), advanced.clone(), steps.clone());
        let spec = ComponentSpec::new(
            ComponentFn::new("slow-start", move |_ctx: &Context| {
                s.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(1));
                Ok(())
            })
            .on_update(move |_ctx: &Context| {
                let before = p.load(Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(300));
                a.store(p.load(Ordering::SeqCst) - before, Ordering::SeqCst);
                Ok(())
            }),
        );

        let runner = Arc::clone(&e);
        let handle = tokio::spawn(async move { runner.run(vec![spec]).await });
        while steps.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        e.cancel();
        handle.await.unwrap().unwrap();

        assert!(advanced.load(Ordering::SeqCst) > 5);
        assert!(!e.is_running());
    }
}
