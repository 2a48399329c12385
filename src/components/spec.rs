//! # Component registration bundle.
//!
//! [`ComponentSpec`] carries a component into [`Engine::add`](crate::Engine::add)
//! together with its initial `active` state. The spec keeps the concrete type
//! around so the engine can later hand the component back typed
//! ([`Engine::component`](crate::Engine::component)).

use std::any::Any;
use std::sync::Arc;

use crate::components::{Component, ComponentRef};

/// Specification for registering a component.
///
/// ## Example
/// ```rust
/// use stepvisor::{ComponentFn, ComponentSpec, Context};
///
/// let spec = ComponentSpec::new(ComponentFn::new("idle", |_ctx: &Context| Ok(())))
///     .inactive();
///
/// assert_eq!(spec.name(), "idle");
/// assert!(!spec.is_active());
/// ```
#[derive(Clone)]
pub struct ComponentSpec {
    component: ComponentRef,
    any: Arc<dyn Any + Send + Sync>,
    active: bool,
}

impl ComponentSpec {
    /// Wraps an owned component (registered active).
    pub fn new<C: Component>(component: C) -> Self {
        Self::from_arc(Arc::new(component))
    }

    /// Wraps a shared component (registered active).
    pub fn from_arc<C: Component>(component: Arc<C>) -> Self {
        Self {
            any: component.clone(),
            component,
            active: true,
        }
    }

    /// Registers the component inactive.
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Sets the initial `active` state.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Component name.
    pub fn name(&self) -> &str {
        self.component.name()
    }

    /// Initial `active` state.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn into_parts(self) -> (ComponentRef, Arc<dyn Any + Send + Sync>, bool) {
        (self.component, self.any, self.active)
    }
}

impl<C: Component> From<Arc<C>> for ComponentSpec {
    fn from(component: Arc<C>) -> Self {
        Self::from_arc(component)
    }
}
