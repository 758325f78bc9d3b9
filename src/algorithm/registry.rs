//! Algorithm registry: name → factory lookup.
//!
//! Experiment files reference algorithms by implementation name. The
//! [`AlgorithmRegistry`] resolves those names to factories and is safe to share
//! across worker threads. Names are normalized to lowercase.

use std::sync::Arc;

use dashmap::DashMap;

use crate::algorithm::threshold::ThresholdFactory;
use crate::algorithm::{AlgorithmFactory, AlgorithmResult};
use crate::error::AlgorithmError;

pub struct AlgorithmRegistry {
    factories: DashMap<String, Arc<dyn AlgorithmFactory>>,
}

impl AlgorithmRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }

    /// A registry holding the built-in algorithms.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(ThresholdFactory));
        registry
    }

    /// Register a factory under its own name, replacing any previous one.
    pub fn register(&self, factory: Arc<dyn AlgorithmFactory>) {
        let name = factory.name().to_lowercase();
        if self.factories.insert(name.clone(), factory).is_some() {
            tracing::debug!(name = %name, "replaced algorithm factory");
        }
    }

    pub fn get(&self, name: &str) -> AlgorithmResult<Arc<dyn AlgorithmFactory>> {
        self.factories
            .get(&name.to_lowercase())
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| AlgorithmError::UnknownAlgorithm {
                name: name.to_string(),
            })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_resolve_case_insensitively() {
        let registry = AlgorithmRegistry::with_builtins();
        assert!(registry.get("Threshold").is_ok());
        assert_eq!(registry.names(), vec!["threshold".to_string()]);
    }

    #[test]
    fn unknown_names_fail() {
        let registry = AlgorithmRegistry::new();
        assert!(matches!(
            registry.get("wombat"),
            Err(AlgorithmError::UnknownAlgorithm { .. })
        ));
    }
}
