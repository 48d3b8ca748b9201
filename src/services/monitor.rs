//! Probe coordinator.
//!
//! Fires one cycle per poll interval. Each cycle snapshots the enabled
//! targets under the registry lock, fans the probes out with bounded
//! concurrency, and records every outcome. A slow or unreachable target
//! bounds the cycle by its own timeout, never by the sum of all timeouts.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::adapters::probe::probe;
use crate::config::Config;
use crate::registry::TargetRegistry;
use crate::stats::StatsStore;

/// Upper bound on in-flight probes per cycle.
const MAX_CONCURRENT_PROBES: usize = 16;

#[derive(Debug)]
pub struct Monitor {
    registry: Arc<TargetRegistry>,
    stats: Arc<StatsStore>,
    config: Config,
}

impl Monitor {
    pub fn new(registry: Arc<TargetRegistry>, stats: Arc<StatsStore>, config: Config) -> Monitor {
        Monitor {
            registry,
            stats,
            config,
        }
    }

    /// Probe every enabled target once and record the outcomes.
    pub async fn cycle(&self) {
        let targets = self.registry.enabled_snapshot();
        if targets.is_empty() {
            return;
        }
        let timeout = self.config.probe_timeout();
        debug!(targets = targets.len(), "probe cycle started");
        let samples: Vec<_> = stream::iter(
            targets
                .into_iter()
                .map(|t| async move { probe(t.id, t.resolved, timeout).await }),
        )
        .buffer_unordered(MAX_CONCURRENT_PROBES)
        .collect()
        .await;
        let mut valid = 0usize;
        let total = samples.len();
        for sample in samples {
            // A target removed mid-cycle keeps its history purged.
            if !self.registry.contains(sample.target) {
                continue;
            }
            if sample.valid {
                valid += 1;
            }
            self.stats.record(sample);
        }
        debug!(valid, total, "probe cycle finished");
    }

    /// Coordinator loop. On shutdown, stops scheduling new cycles and
    /// allows an in-flight cycle a bounded grace period before abandoning
    /// it.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.poll_interval_secs,
            "probe coordinator started"
        );
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let cycle = self.cycle();
                    tokio::pin!(cycle);
                    tokio::select! {
                        _ = &mut cycle => {}
                        _ = shutdown.changed() => {
                            let grace = self.config.shutdown_grace();
                            if tokio::time::timeout(grace, &mut cycle).await.is_err() {
                                warn!(
                                    grace_secs = self.config.shutdown_grace_secs,
                                    "probe cycle abandoned after shutdown grace period"
                                );
                            }
                            break;
                        }
                    }
                }
            }
        }
        info!("probe coordinator stopped");
    }
}
