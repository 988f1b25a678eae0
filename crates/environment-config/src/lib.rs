//! # Environment Configuration
//!
//! YAML declarations of service environments.
//!
//! A declaration names each service, its kind and the services it depends
//! on. Kinds are turned into [`Service`](service_environment::Service)
//! instances by [`ServiceFactory`] implementations collected in a
//! [`FactoryRegistry`].
//!
//! ```yaml
//! name: demo
//! services:
//!   db:
//!     kind: noop
//!   api:
//!     kind: echo
//!     depends_on: [db]
//!     settings:
//!       host: ${ECHO_HOST:-127.0.0.1}
//! ```

#![warn(missing_docs)]

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod factory;
pub mod parser;

pub use factory::{FactoryRegistry, ServiceFactory};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// Environment variable not found
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    /// Service reference not found
    #[error("Service '{0}' not found")]
    ServiceNotFound(String),

    /// No factory registered for a service kind
    #[error("Service '{id}' has unknown kind '{kind}'")]
    UnknownKind {
        /// Declared service id
        id: String,
        /// Declared kind
        kind: String,
    },

    /// A factory could not create a service
    #[error("Failed to create service '{id}': {source:#}")]
    FactoryError {
        /// Declared service id
        id: String,
        /// Error returned by the factory
        #[source]
        source: anyhow::Error,
    },

    /// The environment rejected the declared services
    #[error(transparent)]
    EnvironmentError(#[from] service_environment::Error),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Root of an environment declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Environment name; a unique one is generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Services keyed by id, in declaration order
    #[serde(default)]
    pub services: IndexMap<String, ServiceDecl>,
}

/// One declared service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDecl {
    /// Factory kind that builds the service
    pub kind: String,

    /// Ids of services that must start first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Kind-specific settings handed to the factory
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub settings: Value,
}

impl ServiceDecl {
    /// Declare a service of `kind` with no dependencies or settings
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            depends_on: Vec::new(),
            settings: Value::Null,
        }
    }
}
