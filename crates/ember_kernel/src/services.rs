//! Name-to-capability service registry.
//!
//! Plugins publish capabilities here during `init` and look up other
//! plugins' capabilities from `start` onward. Registration overwrites
//! silently (last writer wins); lookups for unknown names return `None`
//! rather than failing, so callers branch on presence once.
//!
//! A service lives until explicitly removed. No plugin may assume another
//! plugin's service is still present after that plugin's `dispose` phase has
//! run.

use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

type Capability = Arc<dyn Any + Send + Sync>;

/// Shared capability map.
pub struct ServiceRegistry {
    entries: DashMap<String, Capability>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Registers a capability under `name`, replacing any previous entry.
    pub fn register(&self, name: &str, capability: Capability) {
        if self.entries.insert(name.to_string(), capability).is_some() {
            debug!("🔧 Service `{name}` replaced");
        } else {
            debug!("🔧 Service `{name}` registered");
        }
    }

    /// Convenience wrapper that arcs a concrete capability value.
    pub fn register_value<T: Send + Sync + 'static>(&self, name: &str, capability: T) {
        self.register(name, Arc::new(capability));
    }

    /// Typed lookup. Returns `None` when the name is unknown or the stored
    /// capability is not a `T`.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        let capability = self.entries.get(name)?.value().clone();
        capability.downcast::<T>().ok()
    }

    /// Untyped lookup for callers that do their own downcasting.
    pub fn get_raw(&self, name: &str) -> Option<Capability> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    /// Removes a service. Returns whether it existed.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.entries.remove(name).is_some();
        if removed {
            debug!("🔧 Service `{name}` unregistered");
        }
        removed
    }

    /// Names of all registered services, in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct GoldLedger {
        balance: u64,
    }

    #[test]
    fn typed_roundtrip_and_missing_lookups() {
        let registry = ServiceRegistry::new();
        registry.register_value("economy:ledger", GoldLedger { balance: 250 });

        let ledger = registry.get::<GoldLedger>("economy:ledger").unwrap();
        assert_eq!(ledger.balance, 250);

        assert!(registry.get::<GoldLedger>("economy:missing").is_none());
        // Wrong type on a present name is also a clean miss.
        assert!(registry.get::<String>("economy:ledger").is_none());
    }

    #[test]
    fn last_writer_wins_silently() {
        let registry = ServiceRegistry::new();
        registry.register_value("slot", 1u64);
        registry.register_value("slot", 2u64);

        assert_eq!(*registry.get::<u64>("slot").unwrap(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_removes_exactly_one_name() {
        let registry = ServiceRegistry::new();
        registry.register_value("a", 1u32);
        registry.register_value("b", 2u32);

        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        assert!(registry.get::<u32>("a").is_none());
        assert_eq!(*registry.get::<u32>("b").unwrap(), 2);
    }
}
