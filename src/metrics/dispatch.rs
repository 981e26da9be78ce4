//! Dispatch Phase Metrics
//!
//! Worker pool throughput, queue overflow, and recovered task panics.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};
use crate::telemetry::TelemetryKind;

pub struct DispatchMetrics;

impl DispatchMetrics {
    pub fn record_job_queued(kind: TelemetryKind) {
        ::metrics::counter!(
            phase_metric!(counter, "dispatch", "jobs_queued"),
            "kind" => kind.wire_name()
        )
        .increment(1);
    }

    /// Queue was full; the job ran on a fresh task instead
    pub fn record_job_overflow(kind: TelemetryKind) {
        ::metrics::counter!(
            phase_metric!(counter, "dispatch", "jobs_overflowed"),
            "kind" => kind.wire_name()
        )
        .increment(1);
    }

    pub fn record_job_completed(kind: TelemetryKind, duration_secs: f64) {
        ::metrics::counter!(
            phase_metric!(counter, "dispatch", "jobs_completed"),
            "kind" => kind.wire_name()
        )
        .increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "dispatch", "job_duration_seconds"))
            .record(duration_secs);
    }

    pub fn record_job_panicked(kind: TelemetryKind) {
        ::metrics::counter!(
            phase_metric!(counter, "dispatch", "jobs_panicked"),
            "kind" => kind.wire_name()
        )
        .increment(1);
    }

    pub fn set_queue_depth(depth: usize) {
        ::metrics::gauge!(phase_metric!(gauge, "dispatch", "queue_depth")).set(depth as f64);
    }
}

impl PhaseMetrics for DispatchMetrics {
    fn register_metrics() {
        use metrics::{describe_counter, describe_gauge, describe_histogram};

        describe_counter!(
            phase_metric!(counter, "dispatch", "jobs_queued"),
            "Total number of projection jobs queued to the worker pool"
        );
        describe_counter!(
            phase_metric!(counter, "dispatch", "jobs_overflowed"),
            "Total number of projection jobs run outside the pool because the queue was full"
        );
        describe_counter!(
            phase_metric!(counter, "dispatch", "jobs_completed"),
            "Total number of projection jobs completed"
        );
        describe_counter!(
            phase_metric!(counter, "dispatch", "jobs_panicked"),
            "Total number of projection jobs that panicked"
        );
        describe_gauge!(
            phase_metric!(gauge, "dispatch", "queue_depth"),
            "Jobs waiting in the dispatch queue"
        );
        describe_histogram!(
            phase_metric!(histogram, "dispatch", "job_duration_seconds"),
            "Projection job duration including shard wait, in seconds"
        );
    }

    fn phase_name() -> &'static str {
        "dispatch"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "dispatch", "jobs_queued"),
                metric_type: MetricType::Counter,
                help: "Total number of projection jobs queued to the worker pool",
                labels: vec!["kind"],
            },
            MetricDoc {
                name: phase_metric!(counter, "dispatch", "jobs_overflowed"),
                metric_type: MetricType::Counter,
                help: "Total number of projection jobs run outside the pool because the queue was full",
                labels: vec!["kind"],
            },
            MetricDoc {
                name: phase_metric!(counter, "dispatch", "jobs_completed"),
                metric_type: MetricType::Counter,
                help: "Total number of projection jobs completed",
                labels: vec!["kind"],
            },
            MetricDoc {
                name: phase_metric!(counter, "dispatch", "jobs_panicked"),
                metric_type: MetricType::Counter,
                help: "Total number of projection jobs that panicked",
                labels: vec!["kind"],
            },
            MetricDoc {
                name: phase_metric!(gauge, "dispatch", "queue_depth"),
                metric_type: MetricType::Gauge,
                help: "Jobs waiting in the dispatch queue",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "dispatch", "job_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Projection job duration including shard wait, in seconds",
                labels: vec![],
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_metrics_documentation() {
        let docs = DispatchMetrics::metrics_documentation();
        assert_eq!(docs.len(), 6);
        for doc in &docs {
            assert!(doc.name.starts_with("gateway_dispatch_"));
        }
    }
}
