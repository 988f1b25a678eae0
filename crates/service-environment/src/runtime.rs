//! Runtime-agnostic spawning
//!
//! Controllers start their services on background tasks so that independent
//! services come up concurrently. The executor is hidden behind [`Spawner`]
//! and selected with the `smol` or `tokio` feature.

use futures::future::BoxFuture;
use std::sync::Arc;

/// A spawner that can run futures on an async runtime
pub trait Spawner: Send + Sync {
    /// Spawn a future on the runtime; it runs to completion in the background
    fn spawn(&self, future: BoxFuture<'static, ()>);
}

/// Spawner for the smol runtime
#[cfg(feature = "smol")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SmolSpawner;

#[cfg(feature = "smol")]
impl Spawner for SmolSpawner {
    fn spawn(&self, future: BoxFuture<'static, ()>) {
        smol::spawn(future).detach();
    }
}

/// Spawner for the tokio runtime
///
/// Must be used from within a tokio runtime context.
#[cfg(feature = "tokio")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSpawner;

#[cfg(feature = "tokio")]
impl Spawner for TokioSpawner {
    fn spawn(&self, future: BoxFuture<'static, ()>) {
        tokio::spawn(future);
    }
}

/// Spawner selected by the enabled runtime feature
///
/// `smol` wins when both `smol` and `tokio` are enabled.
pub fn default_spawner() -> Arc<dyn Spawner> {
    #[cfg(feature = "smol")]
    {
        Arc::new(SmolSpawner)
    }

    #[cfg(all(feature = "tokio", not(feature = "smol")))]
    {
        Arc::new(TokioSpawner)
    }

    #[cfg(not(any(feature = "smol", feature = "tokio")))]
    {
        compile_error!("One of the runtime features must be enabled: smol or tokio");
    }
}
