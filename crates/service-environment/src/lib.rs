//! # Service Environment
//!
//! Dependency-aware startup and teardown of a set of services.
//!
//! Services are registered with the services they depend on. Starting an
//! environment brings every service up as soon as all of its dependencies are
//! up, running independent services concurrently. Stopping it tears services
//! down one at a time, dependents before dependencies, and keeps going when
//! individual services fail to stop.
//!
//! ## Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use serde_json::{Value, json};
//! use service_environment::{Environment, RuntimeContext, Service, ServiceSpec};
//! use std::sync::Arc;
//!
//! struct Database;
//!
//! #[async_trait]
//! impl Service for Database {
//!     fn id(&self) -> &str {
//!         "db"
//!     }
//!
//!     async fn start(&self, _ctx: &RuntimeContext) -> anyhow::Result<Value> {
//!         Ok(json!({ "url": "postgres://localhost:5432" }))
//!     }
//!
//!     async fn stop(&self, _ctx: &RuntimeContext) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> service_environment::Result<()> {
//! let db: Arc<dyn Service> = Arc::new(Database);
//! let mut env = Environment::named("demo", vec![ServiceSpec::new(db)])?;
//!
//! let ctx = env.start().await?;
//! assert!(ctx.get("db").is_some());
//!
//! env.stop().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

mod context;
mod controller;
mod environment;
mod events;
mod graph;
mod runtime;
mod service;
mod state;

pub use context::RuntimeContext;
pub use directed_graph::{CycleError, GraphError};
pub use environment::Environment;
pub use runtime::{Spawner, default_spawner};
pub use service::{Service, ServiceMetadata, ServiceSpec};
pub use state::ServiceState;

#[cfg(feature = "smol")]
pub use runtime::SmolSpawner;
#[cfg(feature = "tokio")]
pub use runtime::TokioSpawner;

use std::sync::Arc;

/// Result type alias for environment operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for environment operations
///
/// Errors are cheap to clone so that every caller joined on the same start
/// observes the same failure.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// Registering a dependency would have created a cycle
    #[error("Dependency cycle: {0}")]
    Cycle(#[from] CycleError),

    /// The service graph could not be traversed
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// A service failed to start
    #[error("Service '{id}' failed to start: {cause:#}")]
    Start {
        /// Id of the failing service
        id: String,
        /// Error returned by the service
        cause: Arc<anyhow::Error>,
    },

    /// A service failed to stop
    #[error("Service '{id}' failed to stop: {cause:#}")]
    Stop {
        /// Id of the failing service
        id: String,
        /// Error returned by the service
        cause: Arc<anyhow::Error>,
    },

    /// One or more services failed to stop during a teardown pass
    #[error("{}", join_lines(.0))]
    Teardown(Vec<Error>),

    /// `start` called on a started environment
    #[error("Already started")]
    AlreadyStarted,

    /// `stop` called on an environment that is not started
    #[error("Not started")]
    NotStarted,

    /// Startup events stopped arriving before every service reported
    #[error("Startup interrupted before every service reported")]
    StartupInterrupted,
}

impl Error {
    /// Create a start error
    pub fn start(id: impl Into<String>, cause: anyhow::Error) -> Self {
        Self::Start {
            id: id.into(),
            cause: Arc::new(cause),
        }
    }

    /// Create a stop error
    pub fn stop(id: impl Into<String>, cause: anyhow::Error) -> Self {
        Self::Stop {
            id: id.into(),
            cause: Arc::new(cause),
        }
    }

    /// Id of the service this error is about, if any
    pub fn service_id(&self) -> Option<&str> {
        match self {
            Self::Start { id, .. } | Self::Stop { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Individual failures of a teardown pass; a single error otherwise
    pub fn failures(&self) -> &[Error] {
        match self {
            Self::Teardown(failures) => failures,
            other => std::slice::from_ref(other),
        }
    }
}

fn join_lines(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
