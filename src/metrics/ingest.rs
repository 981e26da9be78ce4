//! Ingest Phase Metrics
//!
//! Metrics for the HTTP edge: ingest requests and their outcomes, payload
//! sizes through decryption and decompression, records rejected during
//! projection, scrape access decisions and config reloads.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};
use crate::telemetry::TelemetryKind;

/// Metrics collection for the ingest and scrape phase
pub struct IngestMetrics;

impl IngestMetrics {
    /// Record a batch accepted for dispatch
    pub fn record_batch_accepted(
        kind: TelemetryKind,
        records: usize,
        payload_bytes: usize,
        processing_duration_secs: f64,
    ) {
        ::metrics::counter!(
            phase_metric!(counter, "ingest", "batches_accepted"),
            "kind" => kind.wire_name()
        )
        .increment(1);
        ::metrics::counter!(
            phase_metric!(counter, "ingest", "records_received"),
            "kind" => kind.wire_name()
        )
        .increment(records as u64);
        ::metrics::histogram!(phase_metric!(histogram, "ingest", "payload_bytes"))
            .record(payload_bytes as f64);
        ::metrics::histogram!(phase_metric!(
            histogram,
            "ingest",
            "processing_duration_seconds"
        ))
        .record(processing_duration_secs);
    }

    /// Record a rejected ingest request
    pub fn record_request_rejected(reason: &'static str) {
        ::metrics::counter!(
            phase_metric!(counter, "ingest", "requests_rejected"),
            "reason" => reason
        )
        .increment(1);
    }

    /// Record the size of a payload after decompression
    pub fn record_decompressed_bytes(bytes: usize) {
        ::metrics::histogram!(phase_metric!(histogram, "ingest", "decompressed_bytes"))
            .record(bytes as f64);
    }

    /// Record a batch element that failed to decode and was skipped
    pub fn record_record_skipped(kind: TelemetryKind) {
        ::metrics::counter!(
            phase_metric!(counter, "ingest", "records_skipped"),
            "kind" => kind.wire_name()
        )
        .increment(1);
    }

    /// Record a scrape decision
    pub fn record_scrape(allowed: bool) {
        let result = if allowed { "allowed" } else { "denied" };
        ::metrics::counter!(
            phase_metric!(counter, "ingest", "scrapes"),
            "result" => result
        )
        .increment(1);
    }

    /// Record a configuration reload attempt
    pub fn record_reload(success: bool) {
        let result = if success { "ok" } else { "failed" };
        ::metrics::counter!(
            phase_metric!(counter, "ingest", "config_reloads"),
            "result" => result
        )
        .increment(1);
    }
}

impl PhaseMetrics for IngestMetrics {
    fn register_metrics() {
        use metrics::{describe_counter, describe_histogram};

        for doc in Self::metrics_documentation() {
            match doc.metric_type {
                MetricType::Counter => describe_counter!(doc.name, doc.help),
                MetricType::Histogram => describe_histogram!(doc.name, doc.help),
                MetricType::Gauge => {}
            }
        }
    }

    fn phase_name() -> &'static str {
        "ingest"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "ingest", "batches_accepted"),
                metric_type: MetricType::Counter,
                help: "Total number of ingest batches accepted for dispatch",
                labels: vec!["kind"],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "records_received"),
                metric_type: MetricType::Counter,
                help: "Total number of records received in accepted batches",
                labels: vec!["kind"],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "requests_rejected"),
                metric_type: MetricType::Counter,
                help: "Total number of ingest requests rejected",
                labels: vec!["reason"],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "records_skipped"),
                metric_type: MetricType::Counter,
                help: "Total number of batch elements that failed to decode",
                labels: vec!["kind"],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "scrapes"),
                metric_type: MetricType::Counter,
                help: "Total number of scrape requests by allowlist decision",
                labels: vec!["result"],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "config_reloads"),
                metric_type: MetricType::Counter,
                help: "Total number of configuration reloads",
                labels: vec!["result"],
            },
            MetricDoc {
                name: phase_metric!(histogram, "ingest", "payload_bytes"),
                metric_type: MetricType::Histogram,
                help: "Size of encrypted request bodies in bytes",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "ingest", "decompressed_bytes"),
                metric_type: MetricType::Histogram,
                help: "Size of decompressed payloads in bytes",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "ingest", "processing_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Time from body read to dispatch in seconds",
                labels: vec![],
            },
        ]
    }
}
