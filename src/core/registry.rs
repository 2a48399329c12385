//! # Component registry: ordered, uniquely named, dependency sorted.
//!
//! The registry owns the ordered component list. The order encodes scheduling
//! priority: every component comes after the components providing the
//! capability tags it depends on.
//!
//! ## Architecture
//! ```text
//! add(spec) ──► duplicate name? ──► DuplicateName
//!                  │
//!                  ▼
//!              append ──► reorder() ──► cycle? ──► roll back, CircularDependency
//!                                         │
//!                                         ▼
//!                               capability index rebuilt
//! ```
//!
//! ## Rules
//! - Names are unique; a rejected `add` leaves the registry unchanged.
//! - Reordering is a stable topological sort: among components whose
//!   providers are already placed, the one earliest in the current order goes first.
//! - Dependency tags nobody provides are ignored; a component never depends on itself.
//! - Lookups return `None`/empty on no match.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::components::{Capability, ComponentSpec, Slot};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};

#[derive(Default)]
struct Inner {
    slots: Vec<Arc<Slot>>,
    by_capability: HashMap<Capability, Vec<Arc<Slot>>>,
}

impl Inner {
    fn reindex(&mut self) {
        let mut index: HashMap<Capability, Vec<Arc<Slot>>> = HashMap::new();
        for slot in &self.slots {
            for cap in slot.capabilities() {
                index.entry(cap.clone()).or_default().push(Arc::clone(slot));
            }
        }
        self.by_capability = index;
    }
}

/// Ordered collection of registered components.
pub(crate) struct Registry {
    inner: RwLock<Inner>,
    bus: Bus,
}

impl Registry {
    pub(crate) fn new(bus: Bus) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            bus,
        }
    }

    /// Registers a component and reorders.
    pub(crate) fn add(&self, spec: ComponentSpec) -> Result<Arc<Slot>, RuntimeError> {
        let slot = Arc::new(Slot::new(spec));
        let name = slot.name_arc();

        let result = {
            let mut inner = self.inner.write();
            if inner.slots.iter().any(|s| s.name() == &*name) {
                Err(RuntimeError::DuplicateName {
                    name: name.to_string(),
                })
            } else {
                let mut candidate = inner.slots.clone();
                candidate.push(Arc::clone(&slot));
                sorted(candidate).map(|order| {
                    inner.slots = order;
                    inner.reindex();
                })
            }
        };

        match result {
            Ok(()) => {
                debug!(component = %name, "component registered");
                self.bus
                    .publish(Event::new(EventKind::ComponentAdded).with_component(name));
                Ok(slot)
            }
            Err(err) => {
                warn!(component = %name, error = %err, "component rejected");
                self.bus.publish(
                    Event::new(EventKind::RegistryRejected)
                        .with_component(name)
                        .with_reason(err.as_label()),
                );
                Err(err)
            }
        }
    }

    /// Removes a component and reorders.
    pub(crate) fn remove(&self, name: &str) -> Result<Arc<Slot>, RuntimeError> {
        let removed = {
            let mut inner = self.inner.write();
            let pos = inner
                .slots
                .iter()
                .position(|s| s.name() == name)
                .ok_or_else(|| RuntimeError::ComponentNotFound {
                    name: name.to_string(),
                })?;
            let removed = inner.slots.remove(pos);
            // A subset of an acyclic order stays acyclic.
            if let Ok(order) = sorted(inner.slots.clone()) {
                inner.slots = order;
            }
            inner.reindex();
            removed
        };

        debug!(component = %name, "component removed");
        self.bus
            .publish(Event::new(EventKind::ComponentRemoved).with_component(name));
        Ok(removed)
    }

    /// Re-sorts the current components. On a cycle the order is left untouched.
    pub(crate) fn reorder(&self) -> Result<(), RuntimeError> {
        let mut inner = self.inner.write();
        match sorted(inner.slots.clone()) {
            Ok(order) => {
                inner.slots = order;
                inner.reindex();
                Ok(())
            }
            Err(err) => {
                drop(inner);
                self.bus.publish(
                    Event::new(EventKind::RegistryRejected).with_reason(err.as_label()),
                );
                Err(err)
            }
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<Slot>> {
        self.inner
            .read()
            .slots
            .iter()
            .find(|s| s.name() == name)
            .cloned()
    }

    pub(crate) fn with_capability(&self, capability: &Capability) -> Vec<Arc<Slot>> {
        self.inner
            .read()
            .by_capability
            .get(capability)
            .cloned()
            .unwrap_or_default()
    }

    /// Components in scheduling order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Slot>> {
        self.inner.read().slots.clone()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.inner
            .read()
            .slots
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.inner.read().slots.iter().any(|s| s.name() == name)
    }
}

/// Stable Kahn sort of `slots` by capability dependencies.
fn sorted(slots: Vec<Arc<Slot>>) -> Result<Vec<Arc<Slot>>, RuntimeError> {
    let n = slots.len();
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree = vec![0usize; n];

    for (c, consumer) in slots.iter().enumerate() {
        let mut providers = BTreeSet::new();
        for dep in consumer.dependencies() {
            for (m, provider) in slots.iter().enumerate() {
                if m != c && provider.provides(dep) {
                    providers.insert(m);
                }
            }
        }
        indegree[c] = providers.len();
        for m in providers {
            successors[m].push(c);
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &succ in &successors[next] {
            indegree[succ] -= 1;
            if indegree[succ] == 0 {
                ready.insert(succ);
            }
        }
    }

    if order.len() < n {
        let involved = (0..n)
            .filter(|&i| indegree[i] > 0)
            .map(|i| slots[i].name().to_string())
            .collect();
        return Err(RuntimeError::CircularDependency { involved });
    }

    let mut slots: Vec<Option<Arc<Slot>>> = slots.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ComponentFn, Context};

    fn spec(name: &'static str, provides: &[&str], depends: &[&str]) -> ComponentSpec {
        let mut c = ComponentFn::new(name, |_ctx: &Context| Ok(()));
        for p in provides {
            c = c.provides(*p);
        }
        for d in depends {
            c = c.depends_on(*d);
        }
        ComponentSpec::new(c)
    }

    fn registry() -> Registry {
        Registry::new(Bus::new(64))
    }

    fn assert_dependencies_satisfied(reg: &Registry) {
        let order = reg.snapshot();
        for (i, consumer) in order.iter().enumerate() {
            for dep in consumer.dependencies() {
                for (j, provider) in order.iter().enumerate() {
                    if j != i && provider.provides(dep) {
                        assert!(j < i, "{} must precede {}", provider.name(), consumer.name());
                    }
                }
            }
        }
    }

    #[test]
    fn providers_come_first() {
        let reg = registry();
        reg.add(spec("app", &["app"], &["db", "cache"])).unwrap();
        reg.add(spec("cache", &["cache"], &["db"])).unwrap();
        reg.add(spec("db", &["db"], &[])).unwrap();
        reg.add(spec("log", &["log"], &[])).unwrap();

        assert_eq!(reg.names(), ["db", "cache", "app", "log"]);
        assert_dependencies_satisfied(&reg);
    }

    #[test]
    fn independent_components_keep_insertion_order() {
        let reg = registry();
        for name in ["c", "a", "b"] {
            reg.add(spec(name, &[], &[])).unwrap();
        }
        assert_eq!(reg.names(), ["c", "a", "b"]);
    }

    #[test]
    fn duplicate_name_leaves_registry_unchanged() {
        let reg = registry();
        reg.add(spec("db", &["db"], &[])).unwrap();
        let err = reg.add(spec("db", &["other"], &[])).err();
        assert_eq!(err, Some(RuntimeError::DuplicateName { name: "db".into() }));
        assert_eq!(reg.names().len(), 1);
        assert!(reg.with_capability(&"other".into()).is_empty());
    }

    #[test]
    fn cycle_is_rejected_and_rolled_back() {
        let reg = registry();
        reg.add(spec("a", &["a"], &["b"])).unwrap();
        let err = reg.add(spec("b", &["b"], &["a"])).err();
        match err {
            Some(RuntimeError::CircularDependency { involved }) => {
                assert!(involved.contains(&"a".to_string()));
                assert!(involved.contains(&"b".to_string()));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(reg.names(), ["a"]);
    }

    #[test]
    fn unprovided_and_self_tags_are_ignored() {
        let reg = registry();
        reg.add(spec("x", &["x"], &["x", "ghost"])).unwrap();
        reg.add(spec("y", &[], &[])).unwrap();
        assert_eq!(reg.names(), ["x", "y"]);
    }

    #[test]
    fn capability_index_and_remove() {
        let reg = registry();
        reg.add(spec("edge", &["router", "cache"], &[])).unwrap();
        reg.add(spec("core", &["router"], &[])).unwrap();

        let routers: Vec<String> = reg
            .with_capability(&"router".into())
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(routers, ["edge", "core"]);

        let removed = reg.remove("edge").unwrap();
        assert_eq!(removed.name(), "edge");
        assert!(reg.with_capability(&"cache".into()).is_empty());
        assert_eq!(
            reg.remove("edge").err(),
            Some(RuntimeError::ComponentNotFound { name: "edge".into() })
        );
        assert!(reg.get("core").is_some());
        assert!(!reg.contains("edge"));
    }

    #[test]
    fn rejections_are_published() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let reg = Registry::new(bus);
        reg.add(spec("a", &[], &[])).unwrap();
        let _ = reg.add(spec("a", &[], &[]));

        assert_eq!(rx.try_recv().map(|e| e.kind), Ok(EventKind::ComponentAdded));
        let rejected = rx.try_recv().expect("rejection event");
        assert_eq!(rejected.kind, EventKind::RegistryRejected);
        assert_eq!(rejected.reason.as_deref(), Some("duplicate_name"));
    }
}
