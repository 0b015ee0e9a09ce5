//! Process supervision: start, wait for interrupt, stop, drain
//!
//! The supervisor owns the service group for the lifetime of the process.
//! On shutdown it stops the group and then polls until every background
//! task the services spawned has naturally completed, so nothing is
//! orphaned and no transaction is cut short. There is deliberately no
//! drain timeout: a stuck task stalls shutdown visibly instead of being
//! abandoned silently.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info};

use crate::service::{Service, ServiceGroup};

/// How often the drain loop re-checks for remaining tasks.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Run a service group until `shutdown` resolves, then stop and drain.
///
/// `shutdown` is typically `tokio::signal::ctrl_c()`; tests pass a timer
/// or a channel. A start failure propagates before anything is awaited.
pub async fn run<F>(mut group: ServiceGroup, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    group.start().await?;

    shutdown.await;
    info!("shutdown requested");

    group.stop().await;

    let mut remaining = group.live_tasks();
    while remaining > 0 {
        debug!("waiting for {remaining} remaining tasks");
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        remaining = group.live_tasks();
    }

    info!("all service tasks finished");
    Ok(())
}
