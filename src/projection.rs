//! Projection of decoded samples onto their metric group.

use crate::metrics::{IngestMetrics, MetricGroups, TimestampedMetricGroup};
use crate::telemetry::{
    ContainerSample, ControllerSample, HardwareSample, HeartbeatSample, NginxSample, Sample,
    SslSample, TelemetryKind, TrafficSwitchingSample,
};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionReport {
    pub projected: usize,
    pub skipped: usize,
}

/// Decode each element as `T` and record it under `project_name`.
///
/// Elements that fail to decode are logged and skipped; the rest of the
/// batch is still applied.
pub fn project_batch<T: Sample>(
    group: &TimestampedMetricGroup,
    project_id: &str,
    project_name: &str,
    items: Vec<Value>,
) -> ProjectionReport {
    let mut report = ProjectionReport::default();
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<T>(item) {
            Ok(sample) => {
                let labels = sample.label_values(project_name);
                if group.record(&labels, &sample.gauge_values()) {
                    report.projected += 1;
                } else {
                    report.skipped += 1;
                }
            }
            Err(e) => {
                warn!(kind = %T::KIND, project = project_id, index, error = %e, "skipping undecodable record");
                IngestMetrics::record_record_skipped(T::KIND);
                report.skipped += 1;
            }
        }
    }
    report
}

/// Route a batch to the projection for `kind`.
pub fn project(
    groups: &MetricGroups,
    kind: TelemetryKind,
    project_id: &str,
    project_name: &str,
    items: Vec<Value>,
) -> ProjectionReport {
    let group = groups.get(kind);
    match kind {
        TelemetryKind::Hardware => project_batch::<HardwareSample>(&group, project_id, project_name, items),
        TelemetryKind::Nginx => project_batch::<NginxSample>(&group, project_id, project_name, items),
        TelemetryKind::Ssl => project_batch::<SslSample>(&group, project_id, project_name, items),
        TelemetryKind::Container => project_batch::<ContainerSample>(&group, project_id, project_name, items),
        TelemetryKind::Controller => project_batch::<ControllerSample>(&group, project_id, project_name, items),
        TelemetryKind::Heartbeat => project_batch::<HeartbeatSample>(&group, project_id, project_name, items),
        TelemetryKind::TrafficSwitching => {
            project_batch::<TrafficSwitchingSample>(&group, project_id, project_name, items)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_hardware_batch_uses_display_name() {
        let groups = MetricGroups::new(Duration::from_secs(20)).unwrap();
        let report = project(
            &groups,
            TelemetryKind::Hardware,
            "svc-a",
            "Payments",
            vec![json!({
                "hostName": "h1",
                "cpu_percent": 12.5,
                "cpu_model": "xeon",
                "os_version": "centos7",
                "kernel_version": "3.10"
            })],
        );
        assert_eq!(report, ProjectionReport { projected: 1, skipped: 0 });
        assert_eq!(
            groups
                .store()
                .get("cpu_percent", &["h1", "Payments", "xeon", "centos7", "3.10"]),
            Some(12.5)
        );
    }

    #[test]
    fn test_bad_element_does_not_abort_batch() {
        let groups = MetricGroups::new(Duration::from_secs(20)).unwrap();
        let report = project(
            &groups,
            TelemetryKind::Nginx,
            "svc-a",
            "svc-a",
            vec![
                json!({"hostName": "edge-1", "isRun": 1}),
                json!({"hostName": 42}),
                json!("not an object"),
                json!({"hostName": "edge-2", "tcpEstab": 7}),
            ],
        );
        assert_eq!(report, ProjectionReport { projected: 2, skipped: 2 });
        assert_eq!(groups.store().get("nginx_is_run", &["edge-1", "svc-a"]), Some(1.0));
        assert_eq!(groups.store().get("nginx_tcp_estab", &["edge-2", "svc-a"]), Some(7.0));
    }

    #[test]
    fn test_traffic_switching_percentage() {
        let groups = MetricGroups::new(Duration::from_secs(20)).unwrap();
        project(
            &groups,
            TelemetryKind::TrafficSwitching,
            "gw",
            "gw",
            vec![json!({"service": "api", "total_success_rate": "85.50%", "realtime_qps": 12.0})],
        );
        let rate = groups
            .store()
            .get("trafficswitching_total_success_rate", &["api", "gw"])
            .unwrap();
        assert!((rate - 0.855).abs() < 1e-9);
    }
}
