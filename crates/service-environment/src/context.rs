//! Runtime context of one environment run
//!
//! A context is created every time an environment starts. It carries the
//! catalog of started services, the shutting-down flag consulted before
//! cascading further starts, and the spawner used to run those starts.
//! Services only get shared access, which limits them to the read methods.

use crate::{ServiceMetadata, Spawner, runtime::default_spawner};
use futures::future::BoxFuture;
use indexmap::IndexMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// State shared by every controller during one run
pub struct RuntimeContext {
    name: String,
    catalog: RwLock<IndexMap<String, ServiceMetadata>>,
    shutting_down: AtomicBool,
    spawner: Arc<dyn Spawner>,
}

impl RuntimeContext {
    /// Create a context using the spawner of the enabled runtime feature
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_spawner(name, default_spawner())
    }

    /// Create a context with a specific spawner
    pub fn with_spawner(name: impl Into<String>, spawner: Arc<dyn Spawner>) -> Self {
        Self {
            name: name.into(),
            catalog: RwLock::new(IndexMap::new()),
            shutting_down: AtomicBool::new(false),
            spawner,
        }
    }

    /// Name of the environment this run belongs to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the catalog, in registration order
    pub fn catalog(&self) -> IndexMap<String, ServiceMetadata> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Metadata of a started service
    pub fn get(&self, id: &str) -> Option<ServiceMetadata> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Whether a service is in the catalog
    pub fn contains(&self, id: &str) -> bool {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Number of services in the catalog
    pub fn len(&self) -> usize {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a start failed or teardown began
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Add or replace a catalog entry; returns the catalog size afterwards
    pub(crate) fn register(&self, metadata: ServiceMetadata) -> usize {
        let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        catalog.insert(metadata.id().to_string(), metadata);
        catalog.len()
    }

    /// Remove a catalog entry
    pub(crate) fn unregister(&self, id: &str) -> Option<ServiceMetadata> {
        self.catalog
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(id)
    }

    pub(crate) fn mark_shutting_down(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub(crate) fn spawn(&self, future: BoxFuture<'static, ()>) {
        self.spawner.spawn(future);
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("name", &self.name)
            .field("catalog", &self.catalog().keys().collect::<Vec<_>>())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}
