//! Metrics for the gateway.
//!
//! Two concerns live here:
//! - the telemetry store agents write into ([`MetricStore`], one
//!   [`TimestampedMetricGroup`] per telemetry kind, and their sweepers);
//! - the gateway's own operational metrics, recorded through the `metrics`
//!   facade and organized per phase like the rest of our services.

pub mod dispatch;
pub mod ingest;
pub mod group;
pub mod liveness;
pub mod registry;
pub mod store;
pub mod sweeper;

pub use dispatch::DispatchMetrics;
pub use ingest::IngestMetrics;
pub use group::{
    EvictionPolicy, GaugeSpec, GroupSpec, MetricGroups, SweepReport, TimestampedMetricGroup,
};
pub use liveness::LivenessMetrics;
pub use store::MetricStore;
pub use sweeper::{run_sweeper, spawn_sweepers};

use once_cell::sync::OnceCell;
use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();
static HANDLE: OnceCell<metrics_exporter_prometheus::PrometheusHandle> = OnceCell::new();

/// Install the self-metrics recorder.
///
/// Idempotent. No HTTP listener is started: the scrape endpoint appends
/// [`render_self_metrics`] to the telemetry exposition so both are served
/// from one allowlisted route.
pub fn init_metrics() {
    INIT.call_once(|| {
        match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                if HANDLE.set(handle).is_err() {
                    warn!("Prometheus handle already stored");
                }
                registry::register_all_metrics();
                info!("Self-metrics recorder installed");
            }
            Err(e) => {
                warn!("Failed to install Prometheus recorder: {}", e);
            }
        }
    });
}

/// Render the gateway's own metrics, or an empty string before init.
pub fn render_self_metrics() -> String {
    HANDLE.get().map(|h| h.render()).unwrap_or_default()
}

/// Trait for phase-specific metrics collections
///
/// Each phase implements this trait to provide:
/// - Metric registration at startup
/// - Consistent naming conventions
/// - Documentation of what each metric measures
pub trait PhaseMetrics {
    /// Register all metrics for this phase
    fn register_metrics();

    /// Get the phase name for prefixing metrics
    fn phase_name() -> &'static str;

    /// Get documentation for all metrics in this phase
    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// Build a phase metric name: `gateway_{phase}_{metric_name}[_total]`
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("gateway_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("gateway_", $phase, "_", $name)
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("gateway_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;
