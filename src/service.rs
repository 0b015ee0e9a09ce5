//! Service lifecycle contract and composition
//!
//! A [`Service`] is a long-running worker that can be reconfigured,
//! started and stopped uniformly. A [`ServiceGroup`] composes several
//! services into one unit with the same contract.
//!
//! ## Contract
//!
//! - `reload` replaces the stored configuration. It is safe to call at any
//!   time, including while running, and takes effect without a stop.
//! - `start` is idempotent: calling it on a started service is a no-op.
//! - `stop` requests shutdown and is idempotent too. It is advisory:
//!   in-flight tasks finish on their own and are observed via
//!   [`Service::live_tasks`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;

/// A configurable long-running service.
#[async_trait]
pub trait Service: Send {
    /// Replace the stored configuration.
    ///
    /// The new configuration must be taken into account without requiring
    /// a `stop` first.
    fn reload(&mut self, config: Arc<Config>);

    /// Start the underlying implementation and initialize resources.
    ///
    /// Idempotent: a second call while started does nothing.
    async fn start(&mut self) -> anyhow::Result<()>;

    /// Request shutdown and release resources.
    ///
    /// Idempotent. Already-launched tasks are not forcibly killed; they
    /// observe the service's cancellation token and exit at their next
    /// natural yield point.
    async fn stop(&mut self);

    /// Number of background tasks the service has spawned that are still
    /// running. Used by the supervisor to drain before process exit.
    fn live_tasks(&mut self) -> usize;
}

/// An ordered collection of services driven as one.
///
/// Every call fans out to all members in insertion order. A member's
/// failure is not caught here: a failing `start` propagates to the caller
/// and the remaining members are not started.
#[derive(Default)]
pub struct ServiceGroup {
    services: Vec<Box<dyn Service>>,
}

impl ServiceGroup {
    pub fn new(services: Vec<Box<dyn Service>>) -> Self {
        Self { services }
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[async_trait]
impl Service for ServiceGroup {
    fn reload(&mut self, config: Arc<Config>) {
        for svc in &mut self.services {
            svc.reload(Arc::clone(&config));
        }
    }

    async fn start(&mut self) -> anyhow::Result<()> {
        for svc in &mut self.services {
            svc.start().await?;
        }
        Ok(())
    }

    async fn stop(&mut self) {
        for svc in &mut self.services {
            svc.stop().await;
        }
    }

    fn live_tasks(&mut self) -> usize {
        self.services.iter_mut().map(|svc| svc.live_tasks()).sum()
    }
}
