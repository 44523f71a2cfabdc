//! Background statistics polling

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::models::DeviceStats;
use crate::protocol::ProtocolHandler;

/// Polls `getStats` on a fixed period while connected and publishes the
/// latest snapshot. Polling stops when the poller is dropped.
pub struct StatsPoller {
    latest: watch::Receiver<Option<DeviceStats>>,
    task: JoinHandle<()>,
}

impl StatsPoller {
    pub fn spawn(handler: Arc<ProtocolHandler>, period: Duration) -> Self {
        let (publisher, latest) = watch::channel(None);
        let period = period.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if !handler.is_connected() {
                    continue;
                }

                match handler.get_stats().await {
                    Ok(Some(stats)) => {
                        publisher.send_replace(Some(stats));
                    }
                    Ok(None) => debug!("Stats response carried no statistics"),
                    Err(err) => debug!("Stats poll failed: {}", err),
                }
            }
        });

        Self { latest, task }
    }

    /// Most recent snapshot, if any poll has succeeded
    pub fn latest(&self) -> Option<DeviceStats> {
        self.latest.borrow().clone()
    }

    /// Watch for new snapshots
    pub fn subscribe(&self) -> watch::Receiver<Option<DeviceStats>> {
        self.latest.clone()
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for StatsPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}
