//! TCP echo service

use crate::parse_settings;
use anyhow::Context;
use async_net::{TcpListener, TcpStream};
use async_trait::async_trait;
use environment_config::ServiceFactory;
use futures::io::{AsyncReadExt, AsyncWriteExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use service_environment::{RuntimeContext, Service};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

const PROBE: &[u8] = b"ping\n";

/// Settings of an `echo` service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoSettings {
    /// Address to bind
    pub host: String,
    /// Port to bind; 0 picks a free one
    pub port: u16,
    /// Liveness probes before giving up
    pub probe_attempts: u32,
    /// Pause between probes, in milliseconds
    pub probe_interval_ms: u64,
}

impl Default for EchoSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            probe_attempts: 3,
            probe_interval_ms: 1000,
        }
    }
}

/// Echo server started and stopped as a service
///
/// Metadata: `{ scheme, host, port, url }`.
pub struct EchoService {
    id: String,
    settings: EchoSettings,
    server: Mutex<Option<smol::Task<()>>>,
}

impl EchoService {
    /// Create an echo service
    pub fn new(id: impl Into<String>, settings: EchoSettings) -> Self {
        Self {
            id: id.into(),
            settings,
            server: Mutex::new(None),
        }
    }

    async fn wait_until_alive(&self, addr: SocketAddr) -> anyhow::Result<()> {
        let interval = Duration::from_millis(self.settings.probe_interval_ms);
        let mut attempt = 1;

        loop {
            match probe(addr).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.settings.probe_attempts => {
                    debug!("{}: probe {} failed: {:#}", self.id, attempt, e);
                    attempt += 1;
                    smol::Timer::after(interval).await;
                }
                Err(e) => {
                    return Err(e.context(format!(
                        "{} not alive at {} after {} probes",
                        self.id, addr, attempt
                    )));
                }
            }
        }
    }

    fn take_server(&self) -> Option<smol::Task<()>> {
        self.server
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[async_trait]
impl Service for EchoService {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&self, ctx: &RuntimeContext) -> anyhow::Result<Value> {
        info!("{}: start called with context of env '{}'", self.id, ctx.name());
        let available: Vec<String> = ctx.catalog().values().map(ToString::to_string).collect();
        info!("{}: available services: {}", self.id, available.join(", "));

        let listener = TcpListener::bind((self.settings.host.as_str(), self.settings.port))
            .await
            .with_context(|| {
                format!(
                    "Failed to bind {}:{}",
                    self.settings.host, self.settings.port
                )
            })?;
        let addr = listener.local_addr()?;
        info!("{}: echo server listening on {}", self.id, addr);

        let server = smol::spawn(serve(listener, self.id.clone()));
        if let Err(e) = self.wait_until_alive(addr).await {
            server.cancel().await;
            return Err(e);
        }
        if let Some(previous) = self
            .server
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(server)
        {
            warn!("{}: replacing a server that was never stopped", self.id);
            drop(previous);
        }

        let url = format!("tcp://{}:{}", self.settings.host, addr.port());
        Ok(json!({
            "scheme": "tcp",
            "host": self.settings.host,
            "port": addr.port(),
            "url": url,
        }))
    }

    async fn stop(&self, ctx: &RuntimeContext) -> anyhow::Result<()> {
        info!("{}: stop called with context of env '{}'", self.id, ctx.name());
        if let Some(server) = self.take_server() {
            info!("{}: stopping echo server", self.id);
            server.cancel().await;
        }
        Ok(())
    }
}

async fn serve(listener: TcpListener, id: String) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("{}: connection from {}", id, peer);
                smol::spawn(echo(stream)).detach();
            }
            Err(e) => {
                warn!("{}: accept failed: {}", id, e);
                return;
            }
        }
    }
}

async fn echo(stream: TcpStream) {
    let mut writer = stream.clone();
    if let Err(e) = futures::io::copy(stream, &mut writer).await {
        debug!("Echo connection closed: {}", e);
    }
}

async fn probe(addr: SocketAddr) -> anyhow::Result<()> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(PROBE).await?;

    let mut reply = vec![0u8; PROBE.len()];
    stream.read_exact(&mut reply).await?;
    anyhow::ensure!(reply == PROBE, "unexpected probe reply {:?}", reply);
    Ok(())
}

/// Factory for `kind: echo`
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoFactory;

impl ServiceFactory for EchoFactory {
    fn kind(&self) -> &str {
        "echo"
    }

    fn create(&self, id: &str, settings: &Value) -> anyhow::Result<Arc<dyn Service>> {
        let settings: EchoSettings = parse_settings(settings)?;
        Ok(Arc::new(EchoService::new(id, settings)))
    }
}
