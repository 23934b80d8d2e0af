//! Background eviction of expired records.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::Cache;

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10;

/// Periodically prunes every container and drops the empty ones.
///
/// Runs on its own timer, so query traffic cannot postpone a pass.
pub struct Sweeper {
    cache: Arc<Cache>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl Sweeper {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self {
            cache,
            interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs_f64(), "Starting cache sweeper");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Cache sweeper shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let outcome = self.cache.sweep();
                    if outcome.slots_pruned > 0 {
                        debug!(
                            slots_pruned = outcome.slots_pruned,
                            entries_removed = outcome.entries_removed,
                            cache_size = outcome.entries_remaining,
                            "Cache sweep completed"
                        );
                    }
                }
            }
        }
    }
}
