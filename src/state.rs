//! Read-only view of previously recorded instance state.
//!
//! The walk never writes state. Expansion takes a read guard on the shared
//! store and attaches matching entries to the instances it creates.

use crate::core::address::{ResourceAddress, ResourceInstanceAddress};
use crate::core::types::Value;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Recorded state of one resource instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceState {
    /// Remote object identifier
    pub id: String,
    /// Last known attribute values
    #[serde(default)]
    pub attributes: IndexMap<String, Value>,
}

impl InstanceState {
    /// Create state for an object with no recorded attributes.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: IndexMap::new(),
        }
    }

    /// Set an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}

/// All recorded instances, keyed by address.
#[derive(Debug, Clone, Default)]
pub struct State {
    resources: IndexMap<ResourceInstanceAddress, Arc<InstanceState>>,
}

/// State shared between concurrently walked nodes.
pub type SharedState = Arc<RwLock<State>>;

impl State {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an instance, replacing any previous entry.
    pub fn insert(&mut self, addr: ResourceInstanceAddress, instance: InstanceState) {
        self.resources.insert(addr, Arc::new(instance));
    }

    /// State for one instance, if recorded.
    pub fn get(&self, addr: &ResourceInstanceAddress) -> Option<Arc<InstanceState>> {
        self.resources.get(addr).cloned()
    }

    /// All recorded instances of one resource.
    pub fn instances_of<'a>(
        &'a self,
        resource: &'a ResourceAddress,
    ) -> impl Iterator<Item = (&'a ResourceInstanceAddress, &'a Arc<InstanceState>)> + 'a {
        self.resources
            .iter()
            .filter(move |(addr, _)| addr.resource == *resource)
    }

    /// Number of recorded instances.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Wrap into a shared store.
    pub fn into_shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::InstanceKey;

    #[test]
    fn test_get_and_instances_of() {
        let web = ResourceAddress::managed("aws_instance", "web");
        let db = ResourceAddress::managed("aws_instance", "db");

        let mut state = State::new();
        state.insert(web.instance(InstanceKey::Int(0)), InstanceState::new("i-0"));
        state.insert(web.instance(InstanceKey::Int(1)), InstanceState::new("i-1"));
        state.insert(db.instance(InstanceKey::NoKey), InstanceState::new("i-db"));

        assert_eq!(state.len(), 3);
        assert_eq!(state.get(&web.instance(InstanceKey::Int(1))).unwrap().id, "i-1");
        assert!(state.get(&web.instance(InstanceKey::Int(2))).is_none());
        assert_eq!(state.instances_of(&web).count(), 2);
    }

    #[test]
    fn test_shared_readers() {
        let shared = State::new().into_shared();
        let a = shared.read();
        let b = shared.read();
        assert!(a.is_empty() && b.is_empty());
        assert!(shared.try_write().is_none());
    }
}
