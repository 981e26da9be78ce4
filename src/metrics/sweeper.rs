//! Background eviction sweepers, one per metric group.

use crate::metrics::{LivenessMetrics, MetricGroups, TimestampedMetricGroup};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Sweep `group` every `period` until `shutdown` flips to true.
pub async fn run_sweeper(
    group: Arc<TimestampedMetricGroup>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let kind = group.kind();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    info!(%kind, ?period, ttl = ?group.ttl(), "Sweeper started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = group.sweep();
                LivenessMetrics::record_sweep(kind, &report);
                if report.evicted + report.deactivated + report.forgotten + report.corrupt > 0 {
                    info!(
                        %kind,
                        evicted = report.evicted,
                        deactivated = report.deactivated,
                        forgotten = report.forgotten,
                        corrupt = report.corrupt,
                        remaining = report.remaining,
                        "Swept stale series"
                    );
                } else {
                    debug!(%kind, remaining = report.remaining, "Sweep found nothing stale");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!(%kind, "Sweeper stopped");
}

pub fn spawn_sweepers(
    groups: &MetricGroups,
    period: Duration,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    groups
        .iter()
        .map(|group| tokio::spawn(run_sweeper(group.clone(), period, shutdown.clone())))
        .collect()
}
