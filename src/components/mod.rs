//! Components: the plugin contract and its helpers.
//!
//! - [`Component`] lifecycle contract (`step`, `update`, `test`, `shutdown`)
//! - [`ComponentFn`] closure-backed implementation
//! - [`ComponentSpec`] registration bundle (initial `active` state)
//! - [`Settings`] named settings with legal option lists
//! - [`Context`] handle passed to `step`/`update`

mod component;
mod component_fn;
mod context;
mod settings;
mod slot;
mod spec;

pub use component::{Capability, Component, ComponentRef, INACTIVE_TEST_CODE};
pub use component_fn::ComponentFn;
pub use context::Context;
pub use settings::Settings;
pub use spec::ComponentSpec;

pub(crate) use slot::Slot;
