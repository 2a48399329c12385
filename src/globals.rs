//! # Process-wide named variables.
//!
//! [`Globals`] is a typed key/value table shared by every component through
//! [`Context::globals`](crate::Context::globals). Writes are last-writer-wins;
//! a read with the wrong type yields `None`.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Typed key/value store (last writer wins).
///
/// ## Example
/// ```rust
/// use stepvisor::Globals;
///
/// let globals = Globals::new();
/// globals.set("port", 8080u16);
/// globals.set("port", 9090u16);
///
/// assert_eq!(globals.get::<u16>("port"), Some(9090));
/// assert_eq!(globals.get::<String>("port"), None);
/// ```
#[derive(Default)]
pub struct Globals {
    values: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl Globals {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `name`, replacing any previous value of any type.
    pub fn set<T: Any + Send + Sync>(&self, name: &str, value: T) {
        self.values.write().insert(name.to_string(), Arc::new(value));
    }

    /// Clones the value stored under `name` if it has type `T`.
    pub fn get<T: Any + Clone>(&self, name: &str) -> Option<T> {
        self.values.read().get(name)?.downcast_ref::<T>().cloned()
    }

    /// Shared handle to the value stored under `name` if it has type `T`.
    pub fn get_arc<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let value = Arc::clone(self.values.read().get(name)?);
        value.downcast::<T>().ok()
    }

    /// Removes `name`. Returns `true` if it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.values.write().remove(name).is_some()
    }

    /// Returns `true` if a value is stored under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.values.read().contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_writer_wins_across_types() {
        let g = Globals::new();
        g.set("mode", 1u8);
        g.set("mode", String::from("fast"));
        assert_eq!(g.get::<u8>("mode"), None);
        assert_eq!(g.get::<String>("mode").as_deref(), Some("fast"));
    }

    #[test]
    fn missing_and_removed() {
        let g = Globals::new();
        assert_eq!(g.get::<u8>("nope"), None);
        g.set("peers", vec![1u32, 2]);
        assert_eq!(g.get_arc::<Vec<u32>>("peers").map(|v| v.len()), Some(2));
        assert!(g.remove("peers"));
        assert!(!g.contains("peers"));
    }
}
