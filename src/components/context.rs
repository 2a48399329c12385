//! # Execution context handed to components.
//!
//! A [`Context`] gives `step()`/`update()` access to the shared action bus, the
//! process-wide globals, the identity of the worker running the call, and a
//! weak handle back to the owning [`Engine`] (so a component may, for example,
//! pause itself or move itself to another worker).
//!
//! The engine handle is weak: workers live inside the engine, and a strong
//! handle from a worker would keep the engine alive forever.

use std::sync::{Arc, Weak};

use crate::actions::ActionBus;
use crate::core::{Engine, WorkerId};
use crate::globals::Globals;

/// Handle passed to [`Component::step`](crate::Component::step) and
/// [`Component::update`](crate::Component::update). Cheap to clone.
#[derive(Clone)]
pub struct Context {
    actions: Arc<ActionBus>,
    globals: Arc<Globals>,
    engine: Weak<Engine>,
    worker: Option<WorkerId>,
}

impl Context {
    pub(crate) fn new(actions: Arc<ActionBus>, globals: Arc<Globals>, engine: Weak<Engine>) -> Self {
        Self {
            actions,
            globals,
            engine,
            worker: None,
        }
    }

    /// Creates a context that is not bound to any engine.
    ///
    /// Useful for driving a component by hand in tests.
    pub fn detached(actions: Arc<ActionBus>, globals: Arc<Globals>) -> Self {
        Self::new(actions, globals, Weak::new())
    }

    pub(crate) fn for_worker(&self, worker: WorkerId) -> Self {
        Self {
            worker: Some(worker),
            ..self.clone()
        }
    }

    /// The shared action bus.
    pub fn actions(&self) -> &ActionBus {
        &self.actions
    }

    /// Process-wide named variables.
    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    /// The worker this call runs for (`None` outside the worker pool).
    pub fn worker(&self) -> Option<WorkerId> {
        self.worker
    }

    /// The owning engine, if it is still alive.
    pub fn engine(&self) -> Option<Arc<Engine>> {
        self.engine.upgrade()
    }
}
