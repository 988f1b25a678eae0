//! Turning declarations into services

use crate::{ConfigError, EnvironmentConfig, Result, ServiceDecl};
use indexmap::IndexMap;
use serde_json::Value;
use service_environment::{Environment, Service, ServiceSpec};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Builds services of one kind
pub trait ServiceFactory: Send + Sync {
    /// Kind name used in declarations
    fn kind(&self) -> &str;

    /// Create the service declared as `id` with its `settings`
    ///
    /// The returned service must report `id` as its id.
    fn create(&self, id: &str, settings: &Value) -> anyhow::Result<Arc<dyn Service>>;
}

/// Factories keyed by kind
#[derive(Default, Clone)]
pub struct FactoryRegistry {
    factories: HashMap<String, Arc<dyn ServiceFactory>>,
}

impl FactoryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous one for the same kind
    pub fn register(&mut self, factory: impl ServiceFactory + 'static) -> &mut Self {
        let factory: Arc<dyn ServiceFactory> = Arc::new(factory);
        self.factories.insert(factory.kind().to_string(), factory);
        self
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, factory: impl ServiceFactory + 'static) -> Self {
        self.register(factory);
        self
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Create one declared service
    pub fn create(&self, id: &str, decl: &ServiceDecl) -> Result<Arc<dyn Service>> {
        let factory = self
            .factories
            .get(&decl.kind)
            .ok_or_else(|| ConfigError::UnknownKind {
                id: id.to_string(),
                kind: decl.kind.clone(),
            })?;

        debug!("Creating service '{}' of kind '{}'", id, decl.kind);
        let service = factory
            .create(id, &decl.settings)
            .map_err(|source| ConfigError::FactoryError {
                id: id.to_string(),
                source,
            })?;

        if service.id() != id {
            return Err(ConfigError::ValidationError(format!(
                "Factory '{}' created service '{}' for declaration '{}'",
                decl.kind,
                service.id(),
                id
            )));
        }
        Ok(service)
    }

    /// Registration records for every declared service
    ///
    /// Each service is created once and shared between its own record and
    /// the records of its dependents.
    pub fn build_specs(&self, config: &EnvironmentConfig) -> Result<Vec<ServiceSpec>> {
        let mut services = IndexMap::with_capacity(config.services.len());
        for (id, decl) in &config.services {
            services.insert(id.as_str(), self.create(id, decl)?);
        }

        config
            .services
            .iter()
            .map(|(id, decl)| -> Result<ServiceSpec> {
                let dependencies = decl
                    .depends_on
                    .iter()
                    .map(|dep| {
                        services
                            .get(dep.as_str())
                            .cloned()
                            .ok_or_else(|| ConfigError::ServiceNotFound(dep.clone()))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let service = services
                    .get(id.as_str())
                    .cloned()
                    .ok_or_else(|| ConfigError::ServiceNotFound(id.clone()))?;
                Ok(ServiceSpec::new(service).with_dependencies(dependencies))
            })
            .collect()
    }

    /// Build an environment from a declaration
    pub fn build_environment(&self, config: &EnvironmentConfig) -> Result<Environment> {
        let specs = self.build_specs(config)?;
        let environment = match &config.name {
            Some(name) => Environment::named(name.clone(), specs)?,
            None => Environment::new(specs)?,
        };
        Ok(environment)
    }
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
