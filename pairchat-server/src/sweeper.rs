//! Background task that expires stale typing indicators.

use std::{sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::coordinator::Coordinator;

/// Runs until `shutdown` is cancelled.
pub fn spawn(
    coordinator: Arc<Coordinator>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_ms = period.as_millis() as u64, "typing sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let expired = coordinator.expire_typing(Instant::now()).await;
                    if expired > 0 {
                        debug!(expired, "typing indicators expired");
                    }
                }
            }
        }

        info!("typing sweeper stopped");
    })
}
