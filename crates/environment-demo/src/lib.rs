//! # Environment Demo
//!
//! Example services for `service-environment` and the declarations the
//! `env-demo` binary runs.
//!
//! - [`EchoService`]: a TCP echo server that checks it is reachable before
//!   reporting itself started
//! - [`NoopService`]: an in-memory service with configurable delay and
//!   failures

#![warn(missing_docs)]

pub mod echo;
pub mod noop;

pub use echo::{EchoFactory, EchoService, EchoSettings};
pub use noop::{NoopFactory, NoopService, NoopSettings};

use environment_config::{EnvironmentConfig, FactoryRegistry, ServiceDecl};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Registry with the `echo` and `noop` factories
pub fn demo_registry() -> FactoryRegistry {
    FactoryRegistry::new().with(EchoFactory).with(NoopFactory)
}

/// Built-in demo environment
///
/// `config-srv` depends on `storage-srv` and `mq-srv`, `auth-srv` on
/// `config-srv`, and `app-srv` on both `config-srv` and `auth-srv`.
pub fn demo_config() -> EnvironmentConfig {
    let mut config = EnvironmentConfig {
        name: Some("demo-env".to_string()),
        ..Default::default()
    };

    let echo = |depends_on: &[&str]| ServiceDecl {
        depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
        ..ServiceDecl::new("echo")
    };
    config.services.insert("storage-srv".into(), echo(&[]));
    config.services.insert("mq-srv".into(), echo(&[]));
    config
        .services
        .insert("config-srv".into(), echo(&["storage-srv", "mq-srv"]));
    config
        .services
        .insert("auth-srv".into(), echo(&["config-srv"]));
    config
        .services
        .insert("app-srv".into(), echo(&["config-srv", "auth-srv"]));
    config
}

/// Deserialize factory settings; absent settings mean defaults
pub(crate) fn parse_settings<T>(settings: &Value) -> anyhow::Result<T>
where
    T: DeserializeOwned + Default,
{
    if settings.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(settings.clone())?)
}
