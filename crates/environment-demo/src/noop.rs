//! In-memory service

use crate::parse_settings;
use async_trait::async_trait;
use environment_config::ServiceFactory;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use service_environment::{RuntimeContext, Service};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Settings of a `noop` service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoopSettings {
    /// Time `start` takes, in milliseconds
    pub start_delay_ms: u64,
    /// Fail every start
    pub fail_on_start: bool,
    /// Fail every stop
    pub fail_on_stop: bool,
}

/// Service that holds no resources
#[derive(Debug)]
pub struct NoopService {
    id: String,
    settings: NoopSettings,
}

impl NoopService {
    /// Create a noop service
    pub fn new(id: impl Into<String>, settings: NoopSettings) -> Self {
        Self {
            id: id.into(),
            settings,
        }
    }
}

#[async_trait]
impl Service for NoopService {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&self, ctx: &RuntimeContext) -> anyhow::Result<Value> {
        info!("{}: starting in env '{}'", self.id, ctx.name());
        if self.settings.start_delay_ms > 0 {
            smol::Timer::after(Duration::from_millis(self.settings.start_delay_ms)).await;
        }
        if self.settings.fail_on_start {
            anyhow::bail!("{} is configured to fail on start", self.id);
        }
        Ok(json!({ "kind": "noop", "delay_ms": self.settings.start_delay_ms }))
    }

    async fn stop(&self, ctx: &RuntimeContext) -> anyhow::Result<()> {
        info!("{}: stopping in env '{}'", self.id, ctx.name());
        if self.settings.fail_on_stop {
            anyhow::bail!("{} is configured to fail on stop", self.id);
        }
        Ok(())
    }
}

/// Factory for `kind: noop`
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFactory;

impl ServiceFactory for NoopFactory {
    fn kind(&self) -> &str {
        "noop"
    }

    fn create(&self, id: &str, settings: &Value) -> anyhow::Result<Arc<dyn Service>> {
        let settings: NoopSettings = parse_settings(settings)?;
        Ok(Arc::new(NoopService::new(id, settings)))
    }
}
