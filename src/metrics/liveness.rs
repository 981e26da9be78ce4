//! Liveness Phase Metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics, SweepReport};
use crate::telemetry::TelemetryKind;

pub struct LivenessMetrics;

impl LivenessMetrics {
    /// Record the outcome of one sweep over a metric group
    pub fn record_sweep(kind: TelemetryKind, report: &SweepReport) {
        let kind = kind.wire_name();
        ::metrics::counter!(phase_metric!(counter, "liveness", "sweeps"), "kind" => kind)
            .increment(1);
        ::metrics::counter!(
            phase_metric!(counter, "liveness", "series_evicted"),
            "kind" => kind
        )
        .increment(report.evicted as u64);
        ::metrics::counter!(
            phase_metric!(counter, "liveness", "series_deactivated"),
            "kind" => kind
        )
        .increment(report.deactivated as u64);
        ::metrics::counter!(
            phase_metric!(counter, "liveness", "series_forgotten"),
            "kind" => kind
        )
        .increment(report.forgotten as u64);
        ::metrics::counter!(
            phase_metric!(counter, "liveness", "corrupt_keys"),
            "kind" => kind
        )
        .increment(report.corrupt as u64);
        ::metrics::gauge!(
            phase_metric!(gauge, "liveness", "tracked_series"),
            "kind" => kind
        )
        .set(report.remaining as f64);
    }
}

impl PhaseMetrics for LivenessMetrics {
    fn register_metrics() {
        use metrics::{describe_counter, describe_gauge};

        describe_counter!(
            phase_metric!(counter, "liveness", "sweeps"),
            "Total number of liveness sweeps"
        );
        describe_counter!(
            phase_metric!(counter, "liveness", "series_evicted"),
            "Total number of label tuples evicted after their TTL"
        );
        describe_counter!(
            phase_metric!(counter, "liveness", "series_deactivated"),
            "Total number of label tuples marked inactive after their TTL"
        );
        describe_counter!(
            phase_metric!(counter, "liveness", "series_forgotten"),
            "Total number of inactive label tuples dropped from the registry"
        );
        describe_counter!(
            phase_metric!(counter, "liveness", "corrupt_keys"),
            "Total number of liveness keys discarded because they failed to decode"
        );
        describe_gauge!(
            phase_metric!(gauge, "liveness", "tracked_series"),
            "Label tuples currently tracked by the liveness registry"
        );
    }

    fn phase_name() -> &'static str {
        "liveness"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "liveness", "sweeps"),
                metric_type: MetricType::Counter,
                help: "Total number of liveness sweeps",
                labels: vec!["kind"],
            },
            MetricDoc {
                name: phase_metric!(counter, "liveness", "series_evicted"),
                metric_type: MetricType::Counter,
                help: "Total number of label tuples evicted after their TTL",
                labels: vec!["kind"],
            },
            MetricDoc {
                name: phase_metric!(counter, "liveness", "series_deactivated"),
                metric_type: MetricType::Counter,
                help: "Total number of label tuples marked inactive after their TTL",
                labels: vec!["kind"],
            },
            MetricDoc {
                name: phase_metric!(counter, "liveness", "series_forgotten"),
                metric_type: MetricType::Counter,
                help: "Total number of inactive label tuples dropped from the registry",
                labels: vec!["kind"],
            },
            MetricDoc {
                name: phase_metric!(counter, "liveness", "corrupt_keys"),
                metric_type: MetricType::Counter,
                help: "Total number of liveness keys discarded because they failed to decode",
                labels: vec!["kind"],
            },
            MetricDoc {
                name: phase_metric!(gauge, "liveness", "tracked_series"),
                metric_type: MetricType::Gauge,
                help: "Label tuples currently tracked by the liveness registry",
                labels: vec!["kind"],
            },
        ]
    }
}
