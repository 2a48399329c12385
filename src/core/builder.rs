use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{engine::Engine, pool::WorkerPool, registry::Registry};
use crate::{
    actions::ActionBus,
    components::Context,
    config::Config,
    events::Bus,
    globals::Globals,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing an [`Engine`] with optional features.
pub struct EngineBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl EngineBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (worker lifecycle, failures, etc.)
    /// through dedicated tasks with bounded queues. They need a tokio runtime:
    /// `build()` must then be called from within one.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds and returns the engine.
    ///
    /// This consumes the builder and initializes all runtime parts:
    /// - Event bus for broadcasting
    /// - Action bus and globals shared with every component
    /// - Registry and worker pool (no thread is spawned until `start()`)
    /// - Subscriber tasks and their bus listener, if any subscriber was given
    pub fn build(self) -> Arc<Engine> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let actions = Arc::new(ActionBus::with_events(bus.clone()));
        let globals = Arc::new(Globals::new());
        let runtime_token = CancellationToken::new();

        let registry = Arc::new(Registry::new(bus.clone()));

        let engine = Arc::new_cyclic(|me| {
            let ctx = Context::new(Arc::clone(&actions), Arc::clone(&globals), me.clone());
            let pool = WorkerPool::new(self.cfg.clone(), ctx, bus.clone(), Arc::clone(&registry));
            Engine::new_internal(
                self.cfg,
                bus.clone(),
                registry,
                pool,
                actions,
                globals,
                runtime_token.clone(),
            )
        });

        if !self.subscribers.is_empty() {
            match Handle::try_current() {
                Ok(handle) => {
                    let set = SubscriberSet::new(self.subscribers, bus.clone(), &handle);
                    subscriber_listener(&handle, &bus, set, runtime_token);
                }
                Err(_) => {
                    warn!(
                        subscribers = self.subscribers.len(),
                        "no tokio runtime; event subscribers disabled"
                    );
                }
            }
        }
        engine
    }
}

/// Forwards bus events to the subscriber set until the token is cancelled,
/// then flushes what is already queued and waits for the subscriber tasks.
fn subscriber_listener(handle: &Handle, bus: &Bus, set: SubscriberSet, token: CancellationToken) {
    let mut rx = bus.subscribe();
    handle.spawn(async move {
        loop {
            tokio::select! {
                res = rx.recv() => match res {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
                _ = token.cancelled() => {
                    loop {
                        match rx.try_recv() {
                            Ok(ev) => set.emit(&ev),
                            Err(TryRecvError::Lagged(_)) => continue,
                            Err(_) => break,
                        }
                    }
                    break;
                }
            }
        }
        set.shutdown().await;
    });
}
