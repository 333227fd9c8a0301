//! Factory registry mapping pipe identity + version to constructors.
//!
//! # Design Decisions
//! - Resolution is exact on both identity and version
//! - The catalog is consulted once, at startup; nothing is loaded lazily

use std::collections::HashMap;
use std::sync::Arc;

use crate::pipe::{builtin, Pipe, PipeContext, PipeError};

/// Builds a pipe instance for one declaration.
pub type PipeFactory = Arc<dyn Fn(PipeContext) -> Result<Arc<dyn Pipe>, PipeError> + Send + Sync>;

/// Known pipe modules.
#[derive(Clone, Default)]
pub struct PipeCatalog {
    factories: HashMap<(String, String), PipeFactory>,
}

impl PipeCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding the built-in pipes.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        builtin::register(&mut catalog);
        catalog
    }

    /// Register a factory for `identity` at `version`, replacing any previous one.
    pub fn register<F, P>(
        &mut self,
        identity: impl Into<String>,
        version: impl Into<String>,
        factory: F,
    ) -> &mut Self
    where
        F: Fn(PipeContext) -> Result<P, PipeError> + Send + Sync + 'static,
        P: Pipe,
    {
        let factory: PipeFactory =
            Arc::new(move |ctx: PipeContext| -> Result<Arc<dyn Pipe>, PipeError> {
                Ok(Arc::new(factory(ctx)?) as Arc<dyn Pipe>)
            });
        self.factories
            .insert((identity.into(), version.into()), factory);
        self
    }

    /// Look up the factory for an exact identity and version.
    pub fn resolve(&self, identity: &str, version: &str) -> Option<&PipeFactory> {
        self.factories
            .get(&(identity.to_string(), version.to_string()))
    }

    /// Registered versions of `identity`, sorted.
    pub fn versions(&self, identity: &str) -> Vec<String> {
        let mut versions: Vec<String> = self
            .factories
            .keys()
            .filter(|(id, _)| id == identity)
            .map(|(_, version)| version.clone())
            .collect();
        versions.sort();
        versions
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for PipeCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut modules: Vec<String> = self
            .factories
            .keys()
            .map(|(identity, version)| format!("{identity}@{version}"))
            .collect();
        modules.sort();
        f.debug_struct("PipeCatalog").field("modules", &modules).finish()
    }
}
