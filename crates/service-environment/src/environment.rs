//! Environment coordinator
//!
//! An [`Environment`] owns the service graph and is either stopped or started.
//! Starting fans out to every root service and waits, on a channel fed by
//! per-controller listeners, until each service has reported. The first
//! failure flips the run into shutting down and rolls back whatever started.
//! Stopping walks the graph dependents-first, one service at a time.

use crate::controller::ServiceController;
use crate::events::{ControllerEvent, EventKind, SubscriptionId};
use crate::graph::ServiceGraph;
use crate::{Error, Result, RuntimeContext, ServiceSpec, ServiceState, Spawner, default_spawner};
use async_channel::{Receiver, Sender};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A set of services started and stopped as a unit
pub struct Environment {
    name: String,
    graph: ServiceGraph,
    spawner: Arc<dyn Spawner>,
    state: EnvState,
}

enum EnvState {
    Stopped,
    Started(Run),
}

/// State that only exists while started
struct Run {
    ctx: Arc<RuntimeContext>,
    _listeners: RunListeners,
}

/// Coordinator listeners attached to every controller for one run
///
/// Detached on drop.
struct RunListeners(Vec<(Arc<ServiceController>, SubscriptionId)>);

impl RunListeners {
    fn attach(graph: &ServiceGraph, env_name: &str, events: &Sender<ControllerEvent>) -> Self {
        let subscriptions = graph
            .services()
            .map(|controller| {
                let events = events.clone();
                let env_name = env_name.to_string();
                let id = controller.subscribe(
                    &EventKind::ALL,
                    Arc::new(move |event| {
                        if events.try_send(event.clone()).is_ok() {
                            return;
                        }
                        // Startup already settled, nobody is reading the channel
                        match event {
                            ControllerEvent::Error { error, .. } => {
                                warn!("Environment '{}': {}", env_name, error)
                            }
                            other => debug!(
                                "Environment '{}': {:?} event for '{}'",
                                env_name,
                                other.kind(),
                                other.service_id()
                            ),
                        }
                    }),
                );
                (Arc::clone(controller), id)
            })
            .collect();
        Self(subscriptions)
    }
}

impl Drop for RunListeners {
    fn drop(&mut self) {
        for (controller, id) in self.0.drain(..) {
            controller.unsubscribe(id);
        }
    }
}

impl Environment {
    /// Build an environment named `env-<uuid>`
    ///
    /// Fails if the declared dependencies contain a cycle.
    pub fn new(specs: impl IntoIterator<Item = ServiceSpec>) -> Result<Self> {
        Self::named(format!("env-{}", Uuid::new_v4()), specs)
    }

    /// Build a named environment
    pub fn named(
        name: impl Into<String>,
        specs: impl IntoIterator<Item = ServiceSpec>,
    ) -> Result<Self> {
        Self::with_spawner(name, specs, default_spawner())
    }

    /// Build a named environment that runs starts on `spawner`
    pub fn with_spawner(
        name: impl Into<String>,
        specs: impl IntoIterator<Item = ServiceSpec>,
        spawner: Arc<dyn Spawner>,
    ) -> Result<Self> {
        let name = name.into();
        let mut graph = ServiceGraph::new();

        for spec in specs {
            debug!("Registering service: {:?}", spec);
            graph.add_service(&spec.service);
            for dependency in &spec.depends_on {
                graph.add_dependency(&spec.service, dependency)?;
            }
        }
        info!("Environment '{}' has {} services", name, graph.len());

        Ok(Self {
            name,
            graph,
            spawner,
            state: EnvState::Stopped,
        })
    }

    /// Name of the environment, shared by every run context
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the last `start` succeeded and no `stop` has completed since
    pub fn is_started(&self) -> bool {
        matches!(self.state, EnvState::Started(_))
    }

    /// Context of the current run, while started
    pub fn context(&self) -> Option<Arc<RuntimeContext>> {
        match &self.state {
            EnvState::Started(run) => Some(Arc::clone(&run.ctx)),
            EnvState::Stopped => None,
        }
    }

    /// Ids of every registered service, in registration order
    pub fn service_ids(&self) -> Vec<String> {
        self.graph.services().map(|c| c.id().to_string()).collect()
    }

    /// Lifecycle state of one service
    pub fn service_state(&self, id: &str) -> Option<ServiceState> {
        self.graph.service(id).map(|c| c.state())
    }

    /// Lifecycle state of every service, in registration order
    pub fn service_states(&self) -> Vec<(String, ServiceState)> {
        self.graph
            .services()
            .map(|c| (c.id().to_string(), c.state()))
            .collect()
    }

    /// Start every service, dependencies first
    ///
    /// Resolves once every service is in the returned context's catalog. On
    /// the first start failure, services that did start are stopped again and
    /// that failure is returned.
    pub async fn start(&mut self) -> Result<Arc<RuntimeContext>> {
        if self.is_started() {
            return Err(Error::AlreadyStarted);
        }

        info!("Starting environment '{}'", self.name);
        let ctx = Arc::new(RuntimeContext::with_spawner(
            self.name.clone(),
            Arc::clone(&self.spawner),
        ));
        for controller in self.graph.services() {
            controller.prepare();
        }

        let (sender, events) = async_channel::unbounded();
        let listeners = RunListeners::attach(&self.graph, &self.name, &sender);
        drop(sender);

        for root in self.graph.bootstrap_services() {
            let flight = root.start_flight(&ctx);
            let id = root.id().to_string();
            ctx.spawn(Box::pin(async move {
                if let Err(e) = flight.await {
                    debug!("Bootstrap start of '{}' failed: {}", id, e);
                }
            }));
        }

        match self.await_startup(&ctx, events).await {
            Ok(()) => {
                info!(
                    "Environment '{}' started with {} services",
                    self.name,
                    ctx.len()
                );
                self.state = EnvState::Started(Run {
                    ctx: Arc::clone(&ctx),
                    _listeners: listeners,
                });
                Ok(ctx)
            }
            Err(e) => {
                error!("Environment '{}' failed to start: {}", self.name, e);
                if let Err(rollback) = teardown(&self.graph, &ctx).await {
                    error!(
                        "Rollback of environment '{}' left failures:\n{}",
                        self.name, rollback
                    );
                }
                drop(listeners);
                Err(e)
            }
        }
    }

    async fn await_startup(
        &self,
        ctx: &RuntimeContext,
        events: Receiver<ControllerEvent>,
    ) -> Result<()> {
        if self.graph.is_empty() {
            return Ok(());
        }
        let total = self.graph.len();

        loop {
            match events.recv().await {
                Ok(ControllerEvent::Started { metadata, .. }) => {
                    debug!("Environment '{}': {} reported", self.name, metadata.id());
                    if ctx.register(metadata) == total {
                        return Ok(());
                    }
                }
                Ok(ControllerEvent::Error { error, .. }) => {
                    ctx.mark_shutting_down();
                    return Err(error);
                }
                Ok(ControllerEvent::Stopped { .. }) => {}
                Err(_) => return Err(Error::StartupInterrupted),
            }
        }
    }

    /// Stop every service, dependents first
    ///
    /// Every started service is visited even when some fail to stop; those
    /// failures come back together as [`Error::Teardown`] and the environment
    /// stays started.
    pub async fn stop(&mut self) -> Result<()> {
        let ctx = match &self.state {
            EnvState::Started(run) => Arc::clone(&run.ctx),
            EnvState::Stopped => return Err(Error::NotStarted),
        };

        info!("Stopping environment '{}'", self.name);
        teardown(&self.graph, &ctx).await?;

        self.state = EnvState::Stopped;
        info!("Environment '{}' stopped", self.name);
        Ok(())
    }
}

/// Stop every controller in reverse topological order
async fn teardown(graph: &ServiceGraph, ctx: &Arc<RuntimeContext>) -> Result<()> {
    ctx.mark_shutting_down();

    let mut failures = Vec::new();
    for controller in graph.teardown_services()? {
        if let Err(e) = controller.stop(ctx).await {
            failures.push(e);
        }
        ctx.unregister(controller.id());
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::Teardown(failures))
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        let active = self
            .graph
            .services()
            .filter(|c| c.state().is_active())
            .count();
        if active > 0 {
            warn!(
                "Environment '{}' dropped with {} services not stopped",
                self.name, active
            );
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("started", &self.is_started())
            .field("services", &self.service_states())
            .finish()
    }
}
