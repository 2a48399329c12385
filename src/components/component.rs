//! # Component abstraction.
//!
//! This module defines the [`Component`] trait (the plugin contract consumed by
//! the engine) and the [`Capability`] tag type. The common handle type is
//! [`ComponentRef`], an `Arc<dyn Component>` shared between the registry and
//! whichever worker the component is attached to.
//!
//! ## Lifecycle
//! ```text
//! add ──► update() (on every rebuild, calling thread)
//!            │
//!            ▼
//!         step() step() step() ...   (attached worker thread, each pass)
//!            │
//!            ▼
//!         shutdown() (engine shutdown, once)
//! ```
//!
//! Every call is gated by the component's `active` flag, which the engine owns:
//! inactive components are skipped, and [`Component::test`] is not called
//! (the engine reports [`INACTIVE_TEST_CODE`] instead).

use std::fmt;
use std::sync::Arc;

use crate::components::{Context, Settings};
use crate::error::{ComponentError, SettingError};
use crate::testing::TestContext;

/// Result code reported for components that were inactive during a self-test pass.
pub const INACTIVE_TEST_CODE: i32 = -404;

/// Shared handle to a component.
pub type ComponentRef = Arc<dyn Component>;

/// Opaque role tag a component provides or depends on (`"router"`, `"cache"`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Capability(Arc<str>);

impl Capability {
    /// Creates a capability tag.
    pub fn new(tag: impl Into<Arc<str>>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Capability {
    fn from(tag: &str) -> Self {
        Self(Arc::from(tag))
    }
}

impl From<String> for Capability {
    fn from(tag: String) -> Self {
        Self(Arc::from(tag))
    }
}

/// # Independently lifecycled unit of work.
///
/// A `Component` has a stable unique [`name`](Component::name), declares the
/// capability tags it provides and the tags it must be scheduled after, and
/// implements the lifecycle calls the engine drives.
///
/// Methods take `&self`: a component is shared between the registry and a
/// worker thread, so mutable state lives behind atomics or locks.
///
/// # Example
/// ```
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use stepvisor::{Capability, Component, ComponentError, Context};
///
/// struct Ticker {
///     caps: Vec<Capability>,
///     ticks: AtomicU64,
/// }
///
/// impl Component for Ticker {
///     fn name(&self) -> &str { "ticker" }
///
///     fn capabilities(&self) -> &[Capability] { &self.caps }
///
///     fn step(&self, _ctx: &Context) -> Result<(), ComponentError> {
///         self.ticks.fetch_add(1, Ordering::Relaxed);
///         Ok(())
///     }
/// }
/// ```
pub trait Component: Send + Sync + 'static {
    /// Returns the unique component name.
    fn name(&self) -> &str;

    /// Capability tags this component provides.
    fn capabilities(&self) -> &[Capability] {
        &[]
    }

    /// Capability tags this component must be scheduled after.
    fn dependencies(&self) -> &[Capability] {
        &[]
    }

    /// One unit of recurring work, called by the attached worker every pass.
    ///
    /// May block, but a blocked `step` holds up every other component on the
    /// same worker. Returning `Err` (or panicking) fails the worker, which is
    /// then respawned.
    fn step(&self, ctx: &Context) -> Result<(), ComponentError>;

    /// (Re)initializes transient state. Called on the rebuilding thread for
    /// every attached component before its first `step`. Must be idempotent.
    fn update(&self, _ctx: &Context) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Runs self-diagnostics against an isolated context and returns a result code.
    fn test(&self, _ctx: &mut TestContext) -> i32 {
        0
    }

    /// Releases resources at engine shutdown.
    fn shutdown(&self) {}

    /// Human-readable status lines.
    fn status(&self) -> Vec<String> {
        vec!["active".to_string()]
    }

    /// Named settings with legal option lists, if the component has any.
    fn settings(&self) -> Option<&Settings> {
        None
    }

    /// Validates `option` against the current legal options of `setting` and applies it.
    ///
    /// The default delegates to [`settings`](Component::settings).
    fn change_setting(&self, setting: &str, option: &str) -> Result<(), SettingError> {
        match self.settings() {
            Some(settings) => settings.change(setting, option),
            None => Err(SettingError::UnknownSetting {
                setting: setting.to_string(),
            }),
        }
    }
}
