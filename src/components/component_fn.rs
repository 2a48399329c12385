//! # Closure-backed component (`ComponentFn`)
//!
//! [`ComponentFn`] wraps a closure `F: Fn(&Context) -> Result<(), ComponentError>`
//! that runs as the component's `step`. Optional hooks cover the remaining
//! lifecycle calls. Shared state between hooks goes through `Arc<...>` captured
//! explicitly by the closures.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use stepvisor::{Component, ComponentError, ComponentFn, Context};
//!
//! let hits = Arc::new(AtomicUsize::new(0));
//! let seen = hits.clone();
//!
//! let counter = ComponentFn::new("counter", move |_ctx: &Context| {
//!     seen.fetch_add(1, Ordering::Relaxed);
//!     Ok::<_, ComponentError>(())
//! })
//! .provides("metrics")
//! .depends_on("clock");
//!
//! assert_eq!(counter.name(), "counter");
//! assert_eq!(counter.capabilities()[0].as_str(), "metrics");
//! ```

use std::borrow::Cow;
use std::fmt;

use crate::components::{Capability, Component, Context, Settings};
use crate::error::ComponentError;
use crate::testing::TestContext;

type UpdateHook = Box<dyn Fn(&Context) -> Result<(), ComponentError> + Send + Sync>;
type TestHook = Box<dyn Fn(&mut TestContext) -> i32 + Send + Sync>;
type ShutdownHook = Box<dyn Fn() + Send + Sync>;
type StatusHook = Box<dyn Fn() -> Vec<String> + Send + Sync>;

/// Function-backed component implementation.
pub struct ComponentFn<F> {
    name: Cow<'static, str>,
    capabilities: Vec<Capability>,
    dependencies: Vec<Capability>,
    settings: Option<Settings>,
    step: F,
    on_update: Option<UpdateHook>,
    on_test: Option<TestHook>,
    on_shutdown: Option<ShutdownHook>,
    on_status: Option<StatusHook>,
}

impl<F> ComponentFn<F>
where
    F: Fn(&Context) -> Result<(), ComponentError> + Send + Sync + 'static,
{
    /// Creates a component whose `step` runs `step`.
    pub fn new(name: impl Into<Cow<'static, str>>, step: F) -> Self {
        Self {
            name: name.into(),
            capabilities: Vec::new(),
            dependencies: Vec::new(),
            settings: None,
            step,
            on_update: None,
            on_test: None,
            on_shutdown: None,
            on_status: None,
        }
    }

    /// Adds a provided capability tag.
    pub fn provides(mut self, capability: impl Into<Capability>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    /// Adds a dependency tag.
    pub fn depends_on(mut self, capability: impl Into<Capability>) -> Self {
        self.dependencies.push(capability.into());
        self
    }

    /// Attaches a settings table.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Sets the `update` hook.
    pub fn on_update(
        mut self,
        f: impl Fn(&Context) -> Result<(), ComponentError> + Send + Sync + 'static,
    ) -> Self {
        self.on_update = Some(Box::new(f));
        self
    }

    /// Sets the `test` hook.
    pub fn on_test(mut self, f: impl Fn(&mut TestContext) -> i32 + Send + Sync + 'static) -> Self {
        self.on_test = Some(Box::new(f));
        self
    }

    /// Sets the `shutdown` hook.
    pub fn on_shutdown(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_shutdown = Some(Box::new(f));
        self
    }

    /// Sets the `status` hook.
    pub fn on_status(mut self, f: impl Fn() -> Vec<String> + Send + Sync + 'static) -> Self {
        self.on_status = Some(Box::new(f));
        self
    }
}

impl<F> fmt::Debug for ComponentFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentFn")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

impl<F> Component for ComponentFn<F>
where
    F: Fn(&Context) -> Result<(), ComponentError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    fn dependencies(&self) -> &[Capability] {
        &self.dependencies
    }

    fn step(&self, ctx: &Context) -> Result<(), ComponentError> {
        (self.step)(ctx)
    }

    fn update(&self, ctx: &Context) -> Result<(), ComponentError> {
        match &self.on_update {
            Some(f) => f(ctx),
            None => Ok(()),
        }
    }

    fn test(&self, ctx: &mut TestContext) -> i32 {
        match &self.on_test {
            Some(f) => f(ctx),
            None => 0,
        }
    }

    fn shutdown(&self) {
        if let Some(f) = &self.on_shutdown {
            f();
        }
    }

    fn status(&self) -> Vec<String> {
        match &self.on_status {
            Some(f) => f(),
            None => vec!["active".to_string()],
        }
    }

    fn settings(&self) -> Option<&Settings> {
        self.settings.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::actions::ActionBus;
    use crate::globals::Globals;

    fn ctx() -> Context {
        Context::detached(Arc::new(ActionBus::new()), Arc::new(Globals::new()))
    }

    #[test]
    fn hooks_are_dispatched() {
        let updates = Arc::new(AtomicUsize::new(0));
        let u = updates.clone();
        let c = ComponentFn::new("hooked", |_ctx: &Context| Err(ComponentError::fail("nope")))
            .on_update(move |_ctx| {
                u.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .on_test(|_ctx| 7)
            .on_status(|| vec!["warming".into(), "2 peers".into()]);

        let ctx = ctx();
        assert!(c.step(&ctx).is_err());
        assert!(c.update(&ctx).is_ok());
        assert_eq!(updates.load(Ordering::SeqCst), 1);
        assert_eq!(c.test(&mut TestContext::new("hooked")), 7);
        assert_eq!(c.status().len(), 2);
    }

    #[test]
    fn settings_are_exposed() {
        let c = ComponentFn::new("tuned", |_ctx: &Context| Ok(()))
            .with_settings(Settings::new().with("mode", ["a", "b"], "a"));
        assert!(c.change_setting("mode", "b").is_ok());
        assert!(c.change_setting("mode", "c").is_err());
        assert_eq!(
            c.settings().and_then(|s| s.current("mode")).as_deref(),
            Some("b")
        );
    }
}
