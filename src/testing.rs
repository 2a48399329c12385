//! # Isolated self-test environment.
//!
//! [`TestContext`] is what [`Component::test`](crate::Component::test) receives
//! during [`Engine::test_components`](crate::Engine::test_components): a private
//! [`ActionBus`], private [`Globals`] and a log. Nothing a component does in
//! `test` reaches the live engine.
//!
//! Log lines are prefixed with the component name:
//! ```text
//! cache - warming 3 entries
//! cache - Component returned: 0
//! ```

use std::sync::Arc;

use crate::actions::ActionBus;
use crate::components::Context;
use crate::globals::Globals;

/// Isolated environment for one component's self-test.
pub struct TestContext {
    component: String,
    actions: Arc<ActionBus>,
    globals: Arc<Globals>,
    log: Vec<String>,
}

impl TestContext {
    /// Creates a fresh context for the component named `component`.
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            actions: Arc::new(ActionBus::new()),
            globals: Arc::new(Globals::new()),
            log: Vec::new(),
        }
    }

    /// Name of the component under test.
    pub fn component(&self) -> &str {
        &self.component
    }

    /// The private action bus.
    pub fn actions(&self) -> &ActionBus {
        &self.actions
    }

    /// The private globals.
    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    /// A [`Context`] over the private bus and globals, for driving
    /// `step`/`update` from inside a test.
    pub fn context(&self) -> Context {
        Context::detached(Arc::clone(&self.actions), Arc::clone(&self.globals))
    }

    /// Appends `"<component> - <line>"` to the log.
    pub fn log(&mut self, line: impl AsRef<str>) {
        self.log.push(format!("{} - {}", self.component, line.as_ref()));
    }

    /// Log lines written so far.
    pub fn lines(&self) -> &[String] {
        &self.log
    }

    pub(crate) fn finish(mut self, code: i32) -> Vec<String> {
        self.log(format!("Component returned: {code}"));
        self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_prefixed() {
        let mut ctx = TestContext::new("cache");
        ctx.log("warming");
        assert_eq!(ctx.lines(), ["cache - warming".to_string()]);
        assert_eq!(
            ctx.finish(3),
            vec![
                "cache - warming".to_string(),
                "cache - Component returned: 3".to_string()
            ]
        );
    }

    #[test]
    fn environment_is_private() {
        let a = TestContext::new("a");
        let b = TestContext::new("b");
        a.globals().set("k", 1u8);
        a.actions().create("x", ());
        assert!(!b.globals().contains("k"));
        assert!(!b.actions().exists("x"));
        assert!(a.context().actions().exists("x"));
    }
}
