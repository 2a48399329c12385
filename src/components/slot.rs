//! Registry entry wrapping a component with its `active` flag.
//!
//! The slot is the only place lifecycle calls reach a component, so the
//! `active` gate is enforced in one spot. Name and tags are captured at
//! registration and never re-read from the component.
//!
//! `step` runs under a per-slot guard: a worker whose stop timed out may
//! still be inside `step` when a fresh worker picks the slot up, and the
//! fresh worker then waits for that call to return.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::components::{
    Capability, ComponentRef, ComponentSpec, Context, INACTIVE_TEST_CODE,
};
use crate::error::{ComponentError, SettingError};
use crate::testing::TestContext;

pub(crate) const INACTIVE_STATUS: &str = "Component not active";

pub(crate) struct Slot {
    name: Arc<str>,
    capabilities: Vec<Capability>,
    dependencies: Vec<Capability>,
    component: ComponentRef,
    any: Arc<dyn Any + Send + Sync>,
    active: AtomicBool,
    stepping: Mutex<()>,
}

impl Slot {
    pub(crate) fn new(spec: ComponentSpec) -> Self {
        let (component, any, active) = spec.into_parts();
        Self {
            name: Arc::from(component.name()),
            capabilities: component.capabilities().to_vec(),
            dependencies: component.dependencies().to_vec(),
            component,
            any,
            active: AtomicBool::new(active),
            stepping: Mutex::new(()),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub(crate) fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub(crate) fn dependencies(&self) -> &[Capability] {
        &self.dependencies
    }

    pub(crate) fn provides(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability)
    }

    pub(crate) fn component(&self) -> &ComponentRef {
        &self.component
    }

    pub(crate) fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.any).downcast::<T>().ok()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Returns the previous state.
    pub(crate) fn set_active(&self, active: bool) -> bool {
        self.active.swap(active, Ordering::AcqRel)
    }

    pub(crate) fn step(&self, ctx: &Context) -> Result<(), ComponentError> {
        let _stepping = self.stepping.lock();
        if !self.is_active() {
            return Ok(());
        }
        self.component.step(ctx)
    }

    pub(crate) fn update(&self, ctx: &Context) -> Result<(), ComponentError> {
        if !self.is_active() {
            return Ok(());
        }
        self.component.update(ctx)
    }

    pub(crate) fn test(&self, ctx: &mut TestContext) -> i32 {
        if !self.is_active() {
            return INACTIVE_TEST_CODE;
        }
        self.component.test(ctx)
    }

    pub(crate) fn shutdown(&self) {
        if self.is_active() {
            self.component.shutdown();
        }
    }

    pub(crate) fn change_setting(&self, setting: &str, option: &str) -> Result<(), SettingError> {
        self.component.change_setting(setting, option)
    }

    /// `"[cap1, cap2]-name: line"` for every status line.
    pub(crate) fn status_lines(&self) -> Vec<String> {
        let caps = self
            .capabilities
            .iter()
            .map(Capability::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let lines = if self.is_active() {
            self.component.status()
        } else {
            vec![INACTIVE_STATUS.to_string()]
        };
        lines
            .into_iter()
            .map(|line| format!("[{caps}]-{}: {line}", self.name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::actions::ActionBus;
    use crate::components::ComponentFn;
    use crate::globals::Globals;

    fn ctx() -> Context {
        Context::detached(Arc::new(ActionBus::new()), Arc::new(Globals::new()))
    }

    #[test]
    fn inactive_slot_gates_every_call() {
        let steps = Arc::new(AtomicUsize::new(0));
        let s = steps.clone();
        let slot = Slot::new(
            ComponentSpec::new(ComponentFn::new("gated", move |_ctx: &Context| {
                s.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .inactive(),
        );

        let ctx = ctx();
        assert!(slot.step(&ctx).is_ok());
        assert_eq!(steps.load(Ordering::SeqCst), 0);
        assert_eq!(slot.test(&mut TestContext::new("gated")), INACTIVE_TEST_CODE);

        assert!(!slot.set_active(true));
        assert!(slot.step(&ctx).is_ok());
        assert_eq!(steps.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn status_lines_carry_capabilities() {
        let slot = Slot::new(ComponentSpec::new(
            ComponentFn::new("edge", |_ctx: &Context| Ok(()))
                .provides("router")
                .provides("cache"),
        ));
        assert_eq!(slot.status_lines(), vec!["[router, cache]-edge: active"]);

        slot.set_active(false);
        assert_eq!(
            slot.status_lines(),
            vec!["[router, cache]-edge: Component not active"]
        );
    }

    struct Gauge;

    impl crate::components::Component for Gauge {
        fn name(&self) -> &str {
            "gauge"
        }
        fn step(&self, _ctx: &Context) -> Result<(), ComponentError> {
            Ok(())
        }
    }

    #[test]
    fn downcast_returns_concrete_type() {
        let slot = Slot::new(ComponentSpec::new(Gauge));
        assert!(slot.downcast::<Gauge>().is_some());
        assert!(slot.downcast::<String>().is_none());
        assert!(!slot.provides(&Capability::from("x")));
    }

    #[test]
    fn step_never_runs_twice_at_once() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (i, p) = (in_flight.clone(), peak.clone());
        let slot = Arc::new(Slot::new(ComponentSpec::new(ComponentFn::new(
            "exclusive",
            move |_ctx: &Context| {
                let now = i.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(20));
                i.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            },
        ))));

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let slot = Arc::clone(&slot);
                std::thread::spawn(move || {
                    let ctx = ctx();
                    for _ in 0..3 {
                        slot.step(&ctx).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
