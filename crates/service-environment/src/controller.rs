//! Per-service lifecycle controller
//!
//! A controller wraps one [`Service`] and owns its lifecycle: the set of
//! dependencies still pending in the current run, the metadata of a
//! successful start, and the shared future of a start in flight. Controllers
//! never talk to a coordinator directly. Dependents subscribe to the
//! `Started` events of their dependencies and start themselves once the last
//! one fires.

use crate::events::{ControllerEvent, EventKind, Listener, Listeners, SubscriptionId};
use crate::{Error, Result, RuntimeContext, Service, ServiceMetadata, ServiceState};
use directed_graph::Identifiable;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use indexmap::IndexSet;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Start of one service, joinable by any number of callers
pub(crate) type StartFlight = Shared<BoxFuture<'static, Result<ServiceMetadata>>>;

#[derive(Default)]
struct Lifecycle {
    /// Declared dependencies, in registration order
    dependencies: IndexSet<String>,
    /// Dependencies that have not started yet in the current run
    pending: HashSet<String>,
    meta: Option<ServiceMetadata>,
    in_flight: Option<StartFlight>,
    state: ServiceState,
}

pub(crate) struct ServiceController {
    id: String,
    service: Arc<dyn Service>,
    lifecycle: Mutex<Lifecycle>,
    listeners: Listeners,
}

impl ServiceController {
    pub(crate) fn new(service: Arc<dyn Service>) -> Arc<Self> {
        Arc::new(Self {
            id: service.id().to_string(),
            service,
            lifecycle: Mutex::new(Lifecycle::default()),
            listeners: Listeners::default(),
        })
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn state(&self) -> ServiceState {
        self.lifecycle().state.clone()
    }

    #[cfg(test)]
    pub(crate) fn metadata(&self) -> Option<ServiceMetadata> {
        self.lifecycle().meta.clone()
    }

    #[cfg(test)]
    pub(crate) fn pending_dependencies(&self) -> HashSet<String> {
        self.lifecycle().pending.clone()
    }

    pub(crate) fn subscribe(&self, kinds: &[EventKind], listener: Listener) -> SubscriptionId {
        self.listeners.subscribe(kinds, listener)
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Make `self` wait for `dependency` and start once every dependency has
    ///
    /// Registering the same dependency twice has no further effect.
    pub(crate) fn add_dependency(self: &Arc<Self>, dependency: &Arc<ServiceController>) {
        {
            let mut lifecycle = self.lifecycle();
            if !lifecycle.dependencies.insert(dependency.id.clone()) {
                return;
            }
            lifecycle.pending.insert(dependency.id.clone());
        }

        let dependent = Arc::downgrade(self);
        dependency.subscribe(
            &[EventKind::Started],
            Arc::new(move |event| {
                if let ControllerEvent::Started { metadata, ctx } = event
                    && let Some(dependent) = dependent.upgrade()
                {
                    dependent.on_dependency_started(metadata.id(), ctx);
                }
            }),
        );
    }

    /// Re-arm for a new run: every declared dependency is pending again
    pub(crate) fn prepare(&self) {
        let mut lifecycle = self.lifecycle();
        lifecycle.pending = lifecycle.dependencies.iter().cloned().collect();
        if matches!(lifecycle.state, ServiceState::Failed(_)) {
            lifecycle.state = ServiceState::Stopped;
        }
    }

    fn on_dependency_started(self: &Arc<Self>, dependency: &str, ctx: &Arc<RuntimeContext>) {
        let flight = {
            let mut lifecycle = self.lifecycle();
            lifecycle.pending.remove(dependency);
            debug!("{}: dependency '{}' started", self.id, dependency);

            if !lifecycle.pending.is_empty()
                || lifecycle.meta.is_some()
                || lifecycle.in_flight.is_some()
                || matches!(lifecycle.state, ServiceState::Failed(_))
            {
                return;
            }
            if ctx.is_shutting_down() {
                debug!("{}: environment is shutting down, not starting", self.id);
                return;
            }

            debug!("{}: all dependencies started", self.id);
            self.begin_start(&mut lifecycle, ctx)
        };

        let id = self.id.clone();
        ctx.spawn(Box::pin(async move {
            if let Err(e) = flight.await {
                debug!("Cascaded start of '{}' failed: {}", id, e);
            }
        }));
    }

    /// Start the service, or join the start already in flight
    pub(crate) async fn start(
        self: &Arc<Self>,
        ctx: &Arc<RuntimeContext>,
    ) -> Result<ServiceMetadata> {
        self.start_flight(ctx).await
    }

    /// Shared future of this service's start, created if needed
    ///
    /// The flight is registered before this returns, so a later `stop` or
    /// `start` always sees it even if the caller has not polled it yet.
    pub(crate) fn start_flight(self: &Arc<Self>, ctx: &Arc<RuntimeContext>) -> StartFlight {
        let mut lifecycle = self.lifecycle();
        if let Some(meta) = &lifecycle.meta {
            return future::ready(Ok(meta.clone())).boxed().shared();
        }
        if let Some(flight) = &lifecycle.in_flight {
            return flight.clone();
        }
        self.begin_start(&mut lifecycle, ctx)
    }

    fn begin_start(
        self: &Arc<Self>,
        lifecycle: &mut Lifecycle,
        ctx: &Arc<RuntimeContext>,
    ) -> StartFlight {
        info!("Starting service: {}", self.id);
        let flight = Arc::clone(self)
            .run_start(Arc::clone(ctx))
            .boxed()
            .shared();
        lifecycle.state = ServiceState::Starting;
        lifecycle.in_flight = Some(flight.clone());
        flight
    }

    async fn run_start(self: Arc<Self>, ctx: Arc<RuntimeContext>) -> Result<ServiceMetadata> {
        match self.service.start(&ctx).await {
            Ok(meta) => {
                let metadata = ServiceMetadata::new(self.id.clone(), meta);
                ctx.register(metadata.clone());
                {
                    let mut lifecycle = self.lifecycle();
                    lifecycle.meta = Some(metadata.clone());
                    lifecycle.in_flight = None;
                    lifecycle.state = ServiceState::Started;
                }
                info!("Service started: {}", metadata);
                self.publish(ControllerEvent::Started {
                    metadata: metadata.clone(),
                    ctx,
                });
                Ok(metadata)
            }
            Err(cause) => {
                let error = Error::start(&self.id, cause);
                {
                    let mut lifecycle = self.lifecycle();
                    lifecycle.in_flight = None;
                    lifecycle.state = ServiceState::Failed(error.to_string());
                }
                warn!("{}", error);
                // No cascade may begin once a start has failed
                ctx.mark_shutting_down();
                self.publish(ControllerEvent::Error {
                    id: self.id.clone(),
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    /// Stop the service if it is started or starting
    ///
    /// An in-flight start is awaited first. A service that never started, or
    /// whose start failed, has nothing to release.
    pub(crate) async fn stop(&self, ctx: &Arc<RuntimeContext>) -> Result<()> {
        let in_flight = {
            let lifecycle = self.lifecycle();
            if lifecycle.meta.is_none() && lifecycle.in_flight.is_none() {
                debug!("{}: not started, nothing to stop", self.id);
                return Ok(());
            }
            lifecycle.in_flight.clone()
        };

        if let Some(flight) = in_flight {
            debug!("{}: waiting for start in flight before stopping", self.id);
            if flight.await.is_err() {
                return Ok(());
            }
        }

        {
            let mut lifecycle = self.lifecycle();
            if lifecycle.meta.is_none() || matches!(lifecycle.state, ServiceState::Stopping) {
                return Ok(());
            }
            lifecycle.state = ServiceState::Stopping;
        }

        info!("Stopping service: {}", self.id);
        match self.service.stop(ctx).await {
            Ok(()) => {
                self.settle(ServiceState::Stopped);
                info!("Service stopped: {}", self.id);
                self.publish(ControllerEvent::Stopped {
                    id: self.id.clone(),
                });
                Ok(())
            }
            Err(cause) => {
                let error = Error::stop(&self.id, cause);
                self.settle(ServiceState::Failed(error.to_string()));
                warn!("{}", error);
                self.publish(ControllerEvent::Error {
                    id: self.id.clone(),
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    fn settle(&self, state: ServiceState) {
        let mut lifecycle = self.lifecycle();
        lifecycle.meta = None;
        lifecycle.state = state;
    }

    /// Notify subscribers
    ///
    /// # Panics
    ///
    /// If an `Error` event finds no error listener. Failures must always
    /// reach someone.
    fn publish(&self, event: ControllerEvent) {
        let delivered = self.listeners.publish(&event);
        if event.kind() == EventKind::Error {
            assert!(
                delivered > 0,
                "service '{}' reported an error with no error listener attached",
                self.id
            );
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Identifiable for ServiceController {
    fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for ServiceController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lifecycle = self.lifecycle();
        f.debug_struct("ServiceController")
            .field("id", &self.id)
            .field("state", &lifecycle.state)
            .field("dependencies", &lifecycle.dependencies)
            .field("pending", &lifecycle.pending)
            .field("listeners", &self.listeners)
            .finish()
    }
}
