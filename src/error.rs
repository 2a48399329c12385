//! Error types used by the stepvisor runtime and by components.
//!
//! This module defines three enums:
//!
//! - [`RuntimeError`]: structural errors raised by the engine itself
//!   (registry, worker pool, action bus). Always returned synchronously.
//! - [`ComponentError`]: errors a component returns from `step`/`update`.
//!   Never surfaced to callers; an error escaping `step` fails the worker.
//! - [`SettingError`]: rejected setting change requests.
//!
//! All of them provide `as_label` for logs/events.

use thiserror::Error;

/// # Errors produced by the stepvisor runtime.
///
/// These represent rejected structural or configuration operations.
/// The state that existed before the failed call is always kept.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// A component (or action) with this name is already registered.
    #[error("a component named {name:?} already exists")]
    DuplicateName {
        /// The rejected name.
        name: String,
    },

    /// No dependency-consistent order exists for the registered components.
    #[error("circular dependency between components: {involved:?}")]
    CircularDependency {
        /// Names of the components that could not be placed.
        involved: Vec<String>,
    },

    /// No component with this name is registered.
    #[error("component {name:?} not found")]
    ComponentNotFound {
        /// The requested name.
        name: String,
    },

    /// No worker with this identity exists in the pool.
    #[error("worker {worker:?} not found")]
    WorkerNotFound {
        /// The requested worker identity.
        worker: String,
    },

    /// The component is registered but not attached to any worker.
    #[error("component {name:?} is not attached to a worker")]
    NotAttached {
        /// The component name.
        name: String,
    },

    /// A setting change request was rejected.
    #[error("setting rejected for component {component:?}: {source}")]
    InvalidSetting {
        /// Component the request targeted.
        component: String,
        /// Why the request was rejected.
        #[source]
        source: SettingError,
    },

    /// No action with this name exists.
    #[error("action {name:?} not found")]
    ActionNotFound {
        /// The requested action name.
        name: String,
    },

    /// The payload passed to `trigger` is not of the action's payload type.
    #[error("payload type mismatch for action {name:?}: expected {expected}")]
    PayloadTypeMismatch {
        /// The action name.
        name: String,
        /// Type name of the action's payload.
        expected: &'static str,
    },

    /// Connecting the two actions would make a trigger fire itself again.
    #[error("connecting action {from:?} to {to:?} would close a cycle")]
    CircularConnection {
        /// Action whose triggers would be forwarded.
        from: String,
        /// Action that already leads back to `from`.
        to: String,
    },

    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker {worker}: {reason}")]
    WorkerSpawn {
        /// The worker identity.
        worker: String,
        /// The OS error message.
        reason: String,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/events.
    ///
    /// # Example
    /// ```
    /// use stepvisor::RuntimeError;
    ///
    /// let err = RuntimeError::DuplicateName { name: "cache".into() };
    /// assert_eq!(err.as_label(), "duplicate_name");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::DuplicateName { .. } => "duplicate_name",
            RuntimeError::CircularDependency { .. } => "circular_dependency",
            RuntimeError::ComponentNotFound { .. } => "component_not_found",
            RuntimeError::WorkerNotFound { .. } => "worker_not_found",
            RuntimeError::NotAttached { .. } => "not_attached",
            RuntimeError::InvalidSetting { .. } => "invalid_setting",
            RuntimeError::ActionNotFound { .. } => "action_not_found",
            RuntimeError::PayloadTypeMismatch { .. } => "payload_type_mismatch",
            RuntimeError::CircularConnection { .. } => "circular_connection",
            RuntimeError::WorkerSpawn { .. } => "worker_spawn",
        }
    }
}

/// # Errors returned by component lifecycle calls.
///
/// Returning an error from `step` is the same as panicking in it: the worker
/// running the component is considered crashed and gets respawned.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComponentError {
    /// The call failed; the component may succeed on a later call.
    #[error("component failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable failure. The component is deactivated before its
    /// worker is respawned, so it stops failing the replacement.
    #[error("fatal component error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },
}

impl ComponentError {
    /// Shorthand for [`ComponentError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        ComponentError::Fail {
            error: error.into(),
        }
    }

    /// Shorthand for [`ComponentError::Fatal`].
    pub fn fatal(error: impl Into<String>) -> Self {
        ComponentError::Fatal {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/events.
    pub fn as_label(&self) -> &'static str {
        match self {
            ComponentError::Fail { .. } => "component_failed",
            ComponentError::Fatal { .. } => "component_fatal",
        }
    }

    /// Returns `true` for [`ComponentError::Fatal`].
    pub fn is_fatal(&self) -> bool {
        matches!(self, ComponentError::Fatal { .. })
    }
}

/// Runtime errors raised inside a lifecycle call (a failed `trigger`, a
/// missing action) count as recoverable component failures.
impl From<RuntimeError> for ComponentError {
    fn from(err: RuntimeError) -> Self {
        ComponentError::fail(err.to_string())
    }
}

/// # Rejected setting change.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingError {
    /// The component does not declare a setting with this name.
    #[error("unknown setting {setting:?}")]
    UnknownSetting {
        /// The requested setting.
        setting: String,
    },

    /// The option is not in the setting's current list of legal options.
    #[error("option {option:?} is not legal for {setting:?} (legal: {legal:?})")]
    IllegalOption {
        /// The setting name.
        setting: String,
        /// The rejected option.
        option: String,
        /// Options that were legal at the time of the request.
        legal: Vec<String>,
    },
}

impl SettingError {
    /// Returns a short stable label (snake_case) for use in logs/events.
    pub fn as_label(&self) -> &'static str {
        match self {
            SettingError::UnknownSetting { .. } => "unknown_setting",
            SettingError::IllegalOption { .. } => "illegal_option",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_setting_keeps_source() {
        let err = RuntimeError::InvalidSetting {
            component: "router".into(),
            source: SettingError::IllegalOption {
                setting: "mode".into(),
                option: "fast".into(),
                legal: vec!["safe".into()],
            },
        };
        assert_eq!(err.as_label(), "invalid_setting");
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(
            source.as_deref(),
            Some("option \"fast\" is not legal for \"mode\" (legal: [\"safe\"])")
        );
    }

    #[test]
    fn runtime_errors_become_recoverable_failures() {
        let err: ComponentError = RuntimeError::ActionNotFound {
            name: "ticks".into(),
        }
        .into();
        assert!(!err.is_fatal());
        assert_eq!(err.as_label(), "component_failed");
    }

    #[test]
    fn component_error_labels() {
        assert_eq!(ComponentError::fail("x").as_label(), "component_failed");
        assert_eq!(ComponentError::fatal("x").as_label(), "component_fatal");
        assert_eq!(
            ComponentError::fail("boom").to_string(),
            "component failed: boom"
        );
    }
}
