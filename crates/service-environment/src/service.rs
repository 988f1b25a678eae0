//! Service capability and registration records.

use crate::RuntimeContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A unit the environment can start and stop
///
/// Implementations own their resources; the environment only decides when
/// `start` and `stop` are called. Both calls may fail, and neither is subject
/// to a timeout imposed by the environment.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Unique id of the service within one environment
    fn id(&self) -> &str;

    /// Bring the service up and describe it
    ///
    /// The returned value becomes the `meta` of the [`ServiceMetadata`]
    /// published in the run catalog. Services started earlier in the same run
    /// are visible through `ctx`.
    async fn start(&self, ctx: &RuntimeContext) -> anyhow::Result<Value>;

    /// Release whatever `start` acquired
    async fn stop(&self, ctx: &RuntimeContext) -> anyhow::Result<()>;
}

/// Description of a started service, as published in the run catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMetadata {
    id: String,
    #[serde(default)]
    meta: Value,
}

impl ServiceMetadata {
    /// Create metadata for the service `id`
    pub fn new(id: impl Into<String>, meta: Value) -> Self {
        Self {
            id: id.into(),
            meta,
        }
    }

    /// Id of the service that produced this metadata
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Payload returned by the service's `start`
    pub fn meta(&self) -> &Value {
        &self.meta
    }

    /// Look up a field of an object payload
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }
}

impl fmt::Display for ServiceMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} -> {}]", self.id, self.meta)
    }
}

/// One registration record: a service and the services it depends on
#[derive(Clone)]
pub struct ServiceSpec {
    /// The service to register
    pub service: Arc<dyn Service>,
    /// Services that must be started before `service`
    pub depends_on: Vec<Arc<dyn Service>>,
}

impl ServiceSpec {
    /// Register a service with no dependencies
    pub fn new(service: Arc<dyn Service>) -> Self {
        Self {
            service,
            depends_on: Vec::new(),
        }
    }

    /// Add one dependency
    pub fn depends_on(mut self, dependency: Arc<dyn Service>) -> Self {
        self.depends_on.push(dependency);
        self
    }

    /// Add several dependencies
    pub fn with_dependencies(
        mut self,
        dependencies: impl IntoIterator<Item = Arc<dyn Service>>,
    ) -> Self {
        self.depends_on.extend(dependencies);
        self
    }
}

impl fmt::Debug for ServiceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceSpec")
            .field("service", &self.service.id())
            .field(
                "depends_on",
                &self.depends_on.iter().map(|d| d.id()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
