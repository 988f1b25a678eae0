//! Lifecycle events published by controllers

use crate::{Error, RuntimeContext, ServiceMetadata};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Kinds of lifecycle events a listener can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum EventKind {
    Started,
    Stopped,
    Error,
}

impl EventKind {
    pub(crate) const ALL: [EventKind; 3] = [Self::Started, Self::Stopped, Self::Error];
}

/// Something that happened to one service
#[derive(Debug, Clone)]
pub(crate) enum ControllerEvent {
    /// The service started; carries the context of the run that started it
    Started {
        metadata: ServiceMetadata,
        ctx: Arc<RuntimeContext>,
    },
    Stopped {
        id: String,
    },
    Error {
        id: String,
        error: Error,
    },
}

impl ControllerEvent {
    pub(crate) fn kind(&self) -> EventKind {
        match self {
            Self::Started { .. } => EventKind::Started,
            Self::Stopped { .. } => EventKind::Stopped,
            Self::Error { .. } => EventKind::Error,
        }
    }

    pub(crate) fn service_id(&self) -> &str {
        match self {
            Self::Started { metadata, .. } => metadata.id(),
            Self::Stopped { id } | Self::Error { id, .. } => id,
        }
    }
}

pub(crate) type Listener = Arc<dyn Fn(&ControllerEvent) + Send + Sync>;

/// Handle returned by [`Listeners::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    kinds: Vec<EventKind>,
    listener: Listener,
}

/// Subscriber list of one controller
///
/// Listeners are invoked outside the lock, so a listener may subscribe,
/// unsubscribe or publish on any controller, including this one.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Listeners {
    pub(crate) fn subscribe(&self, kinds: &[EventKind], listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                id,
                kinds: kinds.to_vec(),
                listener,
            });
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Deliver `event` to every subscriber of its kind; returns how many were notified
    pub(crate) fn publish(&self, event: &ControllerEvent) -> usize {
        let kind = event.kind();
        let matching: Vec<Listener> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.kinds.contains(&kind))
            .map(|s| Arc::clone(&s.listener))
            .collect();

        for listener in &matching {
            listener(event);
        }
        matching.len()
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_list()
            .entries(subscribers.iter().map(|s| (s.id, &s.kinds)))
            .finish()
    }
}
