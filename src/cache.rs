//! Per-entity property stores.
//!
//! The engine only reads dataset-level caches through the [`Cache`] trait;
//! fold-local caches are always built as [`MemoryCache`] copies holding just
//! the referenced instances.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// One entity with its property values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub uri: String,
    #[serde(default)]
    pub properties: BTreeMap<String, BTreeSet<String>>,
}

impl Instance {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property insertion.
    pub fn with_property(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_property(property, value);
        self
    }

    pub fn add_property(&mut self, property: impl Into<String>, value: impl Into<String>) {
        self.properties
            .entry(property.into())
            .or_default()
            .insert(value.into());
    }

    /// Values of one property, empty when the property is absent.
    pub fn values(&self, property: &str) -> impl Iterator<Item = &str> {
        self.properties
            .get(property)
            .into_iter()
            .flat_map(|values| values.iter().map(String::as_str))
    }

    /// Values of every property.
    pub fn all_values(&self) -> impl Iterator<Item = &str> {
        self.properties
            .values()
            .flat_map(|values| values.iter().map(String::as_str))
    }
}

/// Read access to an instance store.
pub trait Cache: Send + Sync {
    fn contains_uri(&self, uri: &str) -> bool;

    fn instance(&self, uri: &str) -> Option<&Instance>;

    /// All instances, ordered by URI.
    fn instances(&self) -> Box<dyn Iterator<Item = &Instance> + '_>;

    fn all_uris(&self) -> BTreeSet<String> {
        self.instances().map(|i| i.uri.clone()).collect()
    }

    fn len(&self) -> usize {
        self.instances().count()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory cache keyed by URI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryCache {
    instances: BTreeMap<String, Instance>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an instance, replacing any previous instance with the same URI.
    pub fn add_instance(&mut self, instance: Instance) {
        self.instances.insert(instance.uri.clone(), instance);
    }

    /// Copy one instance from another cache. Returns false if it is missing there.
    pub fn copy_from(&mut self, other: &dyn Cache, uri: &str) -> bool {
        match other.instance(uri) {
            Some(instance) => {
                self.add_instance(instance.clone());
                true
            }
            None => false,
        }
    }

    /// Union of two instance sets.
    pub fn union(&self, other: &dyn Cache) -> MemoryCache {
        let mut result = self.clone();
        for instance in other.instances() {
            result.add_instance(instance.clone());
        }
        result
    }
}

impl FromIterator<Instance> for MemoryCache {
    fn from_iter<I: IntoIterator<Item = Instance>>(iter: I) -> Self {
        let mut cache = MemoryCache::new();
        for instance in iter {
            cache.add_instance(instance);
        }
        cache
    }
}

impl Cache for MemoryCache {
    fn contains_uri(&self, uri: &str) -> bool {
        self.instances.contains_key(uri)
    }

    fn instance(&self, uri: &str) -> Option<&Instance> {
        self.instances.get(uri)
    }

    fn instances(&self) -> Box<dyn Iterator<Item = &Instance> + '_> {
        Box::new(self.instances.values())
    }

    fn all_uris(&self) -> BTreeSet<String> {
        self.instances.keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.instances.len()
    }
}
