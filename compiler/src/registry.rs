//! Name-keyed collection of target backends.

use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    backend::{BackendDescriptor, DartBackend, JavaScriptBackend, TargetBackend, TypeScriptBackend},
    error::GenError,
};

/// Backends selectable by name at generation time.
///
/// Adding a target means registering one more [`TargetBackend`]; nothing in
/// the resolver or the emission engine knows which backends exist.
#[derive(Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Box<dyn TargetBackend>>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        BackendRegistry { backends: BTreeMap::new() }
    }

    /// A registry holding the `typescript`, `javascript` and `dart` backends.
    pub fn with_builtin() -> Self {
        let mut registry = BackendRegistry::new();
        registry.register(Box::new(TypeScriptBackend::new()));
        registry.register(Box::new(JavaScriptBackend::new()));
        registry.register(Box::new(DartBackend::new()));
        registry
    }

    /// Adds a backend under its descriptor name, replacing any backend
    /// previously registered under that name.
    pub fn register(&mut self, backend: Box<dyn TargetBackend>) {
        let name = backend.descriptor().name.to_string();
        debug!(backend = name.as_str(), "registered backend");
        self.backends.insert(name, backend);
    }

    pub fn get(&self, name: &str) -> Result<&dyn TargetBackend, GenError> {
        self.backends
            .get(name)
            .map(|b| b.as_ref())
            .ok_or_else(|| GenError::UnknownBackend(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }

    pub fn descriptors(&self) -> Vec<&BackendDescriptor> {
        self.backends.values().map(|b| b.descriptor()).collect()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry").field("backends", &self.names()).finish()
    }
}
