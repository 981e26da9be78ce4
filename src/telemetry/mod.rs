//! Telemetry kinds accepted by the gateway and their per-record schemas.
//!
//! Each kind maps to one [`GroupSpec`](crate::metrics::GroupSpec): an ordered
//! label schema, the gauges sharing it, and how stale series are retired.

pub mod samples;

use crate::metrics::GroupSpec;
use serde::de::DeserializeOwned;
use std::fmt;

pub use samples::{
    ContainerSample, ControllerSample, HardwareSample, HeartbeatSample, NginxSample, SslSample,
    SuccessRate, TrafficSwitchingSample,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelemetryKind {
    Hardware,
    Nginx,
    Ssl,
    Container,
    Controller,
    Heartbeat,
    TrafficSwitching,
}

impl TelemetryKind {
    pub const ALL: [TelemetryKind; 7] = [
        TelemetryKind::Hardware,
        TelemetryKind::Nginx,
        TelemetryKind::Ssl,
        TelemetryKind::Container,
        TelemetryKind::Controller,
        TelemetryKind::Heartbeat,
        TelemetryKind::TrafficSwitching,
    ];

    /// The `source` value agents put in the envelope.
    pub fn wire_name(&self) -> &'static str {
        match self {
            TelemetryKind::Hardware => "hard",
            TelemetryKind::Nginx => "nginx",
            TelemetryKind::Ssl => "ssl",
            TelemetryKind::Container => "k8s",
            TelemetryKind::Controller => "k8sController",
            TelemetryKind::Heartbeat => "heart",
            TelemetryKind::TrafficSwitching => "trafficSwitching",
        }
    }

    pub fn from_wire(source: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.wire_name() == source)
    }

    pub fn spec(&self) -> &'static GroupSpec {
        match self {
            TelemetryKind::Hardware => &samples::HARDWARE,
            TelemetryKind::Nginx => &samples::NGINX,
            TelemetryKind::Ssl => &samples::SSL,
            TelemetryKind::Container => &samples::CONTAINER,
            TelemetryKind::Controller => &samples::CONTROLLER,
            TelemetryKind::Heartbeat => &samples::HEARTBEAT,
            TelemetryKind::TrafficSwitching => &samples::TRAFFIC_SWITCHING,
        }
    }
}

impl fmt::Display for TelemetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// One decoded record of a telemetry kind.
///
/// Implementations tolerate missing fields (`#[serde(default)]`) so agents on
/// older schema versions still report what they have.
pub trait Sample: DeserializeOwned {
    const KIND: TelemetryKind;

    /// Label values in the order of the kind's label schema.
    fn label_values(&self, project_name: &str) -> Vec<String>;

    /// `(gauge name, value)` pairs to set under those labels.
    fn gauge_values(&self) -> Vec<(&'static str, f64)>;
}

/// Strips a trailing `-v1`/`-v2` deployment suffix from a namespace.
pub fn clean_namespace(namespace: &str) -> &str {
    namespace
        .strip_suffix("-v1")
        .or_else(|| namespace.strip_suffix("-v2"))
        .unwrap_or(namespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip() {
        for kind in TelemetryKind::ALL {
            assert_eq!(TelemetryKind::from_wire(kind.wire_name()), Some(kind));
        }
        assert_eq!(TelemetryKind::from_wire("es"), None);
        assert_eq!(TelemetryKind::from_wire("HARD"), None);
    }

    #[test]
    fn test_specs_are_consistent() {
        for kind in TelemetryKind::ALL {
            let spec = kind.spec();
            assert_eq!(spec.kind, kind);
            assert!(spec.labels.contains(&"project"), "{kind} lacks project label");
            assert!(!spec.gauges.is_empty());
        }
    }

    #[test]
    fn test_clean_namespace() {
        assert_eq!(clean_namespace("payments-v1"), "payments");
        assert_eq!(clean_namespace("payments-v2"), "payments");
        assert_eq!(clean_namespace("payments-v3"), "payments-v3");
        assert_eq!(clean_namespace("v1"), "v1");
    }
}
