//! Lifecycle state of a single service

use std::fmt;

/// Where a service is in its lifecycle
///
/// `Stopped -> Starting -> Started -> Stopping -> Stopped`. A failed start or
/// stop lands in `Failed`, which behaves like `Stopped`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ServiceState {
    /// Not running
    #[default]
    Stopped,
    /// Start in flight
    Starting,
    /// Start succeeded
    Started,
    /// Stop in flight
    Stopping,
    /// Last start or stop failed
    Failed(String),
}

impl ServiceState {
    /// Whether the service holds (or is acquiring or releasing) resources
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Started | Self::Stopping)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Starting => write!(f, "starting"),
            Self::Started => write!(f, "started"),
            Self::Stopping => write!(f, "stopping"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}
