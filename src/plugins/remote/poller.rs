use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::core::model::ProgressSnapshot;
use crate::core::source::ProgressSource;
use crate::plugins::remote::client::BackendClient;

/// Turns the backend's `/progress` record into a sequence of snapshots.
///
/// One fetch per tick, each awaited before the next tick is taken, so
/// fetches never overlap and snapshots come out in fetch order. A failed
/// fetch becomes a terminal error snapshot; there is no reconnect.
pub struct RemotePoller {
    backend: BackendClient,
    ticker: Interval,
    fetch_timeout: Duration,
    finished: bool,
}

impl RemotePoller {
    pub fn new(backend: BackendClient, poll_interval: Duration, fetch_timeout: Duration) -> Self {
        let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { backend, ticker, fetch_timeout, finished: false }
    }

    async fn poll_once(&self) -> ProgressSnapshot {
        match self.backend.fetch_progress(self.fetch_timeout).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "progress fetch failed, giving up on the job");
                ProgressSnapshot::failed(format!("failed to get progress: {e}"))
            }
        }
    }
}

#[async_trait]
impl ProgressSource for RemotePoller {
    fn name(&self) -> &'static str {
        "remote-poller"
    }

    async fn next_snapshot(&mut self) -> Option<ProgressSnapshot> {
        if self.finished {
            return None;
        }
        self.ticker.tick().await;
        let snapshot = self.poll_once().await;
        debug!(current = ?snapshot.current, total = ?snapshot.total, message = %snapshot.message, "polled");
        if snapshot.is_terminal() {
            self.finished = true;
        }
        Some(snapshot)
    }

    /// Stops observing only; the backend keeps running whatever it was doing.
    async fn stop(&mut self) -> Option<ProgressSnapshot> {
        self.finished = true;
        None
    }
}
