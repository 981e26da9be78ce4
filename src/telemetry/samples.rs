use super::{clean_namespace, Sample, TelemetryKind};
use crate::metrics::{EvictionPolicy, GaugeSpec, GroupSpec};
use serde::Deserialize;

/// Label value used when an SSL record carries no comment, so uncommented
/// certificates for different domains never collapse onto a blank label.
pub const EMPTY_COMMENT_PLACEHOLDER: &str = "未备注";

const fn gauge(name: &'static str, help: &'static str) -> GaugeSpec {
    GaugeSpec { name, help }
}

// ============================================================================
// Hardware
// ============================================================================

pub static HARDWARE: GroupSpec = GroupSpec {
    kind: TelemetryKind::Hardware,
    labels: &["hostName", "project", "cpu_model", "os_version", "kernel_version"],
    gauges: &[
        gauge("cpu_percent", "CPU usage percent"),
        gauge("disk_total", "Total disk space"),
        gauge("disk_used", "Used disk space"),
        gauge("disk_free", "Free disk space"),
        gauge("disk_used_percent", "Disk usage percent"),
        gauge("memory_total", "Total memory"),
        gauge("memory_used", "Used memory"),
        gauge("memory_free", "Free memory"),
        gauge("memory_used_percent", "Memory usage percent"),
        gauge("cpu_load_1", "1 minute load average"),
        gauge("cpu_load_5", "5 minute load average"),
        gauge("cpu_load_15", "15 minute load average"),
        gauge("cpu_total", "CPU core count"),
    ],
    policy: EvictionPolicy::Hard,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HardwareSample {
    #[serde(rename = "hostName")]
    pub host_name: String,
    pub cpu_percent: f64,
    pub disk_total: f64,
    pub disk_used: f64,
    pub disk_free: f64,
    pub disk_used_percent: f64,
    pub memory_total: f64,
    pub memory_used: f64,
    pub memory_free: f64,
    pub memory_buffered: f64,
    pub memory_cached: f64,
    pub memory_shared: f64,
    pub memory_available: f64,
    pub memory_used_percent: f64,
    pub cpu_load_1: f64,
    pub cpu_load_5: f64,
    pub cpu_load_15: f64,
    pub cpu_count: f64,
    pub cpu_model: String,
    pub os_version: String,
    pub kernel_version: String,
}

impl Sample for HardwareSample {
    const KIND: TelemetryKind = TelemetryKind::Hardware;

    fn label_values(&self, project_name: &str) -> Vec<String> {
        vec![
            self.host_name.clone(),
            project_name.to_string(),
            self.cpu_model.clone(),
            self.os_version.clone(),
            self.kernel_version.clone(),
        ]
    }

    fn gauge_values(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("cpu_percent", self.cpu_percent),
            ("disk_total", self.disk_total),
            ("disk_used", self.disk_used),
            ("disk_free", self.disk_free),
            ("disk_used_percent", self.disk_used_percent),
            ("memory_total", self.memory_total),
            ("memory_used", self.memory_used),
            ("memory_free", self.memory_free),
            ("memory_used_percent", self.memory_used_percent),
            ("cpu_load_1", self.cpu_load_1),
            ("cpu_load_5", self.cpu_load_5),
            ("cpu_load_15", self.cpu_load_15),
            ("cpu_total", self.cpu_count),
        ]
    }
}

// ============================================================================
// Nginx
// ============================================================================

pub static NGINX: GroupSpec = GroupSpec {
    kind: TelemetryKind::Nginx,
    labels: &["hostName", "project"],
    gauges: &[
        gauge("nginx_is_run", "Whether nginx is running"),
        gauge("nginx_re_total", "Total nginx requests"),
        gauge("nginx_login_user_count", "Logged in user count"),
        gauge("nginx_raw_total", "Raw sockets"),
        gauge("nginx_udptotal", "UDP sockets"),
        gauge("nginx_tcp_total", "TCP sockets"),
        gauge("nginx_total_tcp", "Total TCP connections"),
        gauge("nginx_inet_total", "INET sockets"),
        gauge("nginx_frag_total", "Fragment sockets"),
        gauge("nginx_tcp_estab", "Established TCP connections"),
        gauge("nginx_tcp_closed", "Closed TCP connections"),
        gauge("nginx_tcp_orphaned", "Orphaned TCP connections"),
        gauge("nginx_tcp_timewait", "TCP connections in TIME-WAIT"),
    ],
    policy: EvictionPolicy::Hard,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NginxSample {
    pub host_name: String,
    pub is_run: i64,
    pub re_total: i64,
    pub login_user_count: i64,
    pub raw_total: i64,
    #[serde(rename = "udptotal")]
    pub udp_total: i64,
    pub tcp_total: i64,
    #[serde(rename = "totaltcp")]
    pub total_tcp: i64,
    pub inet_total: i64,
    pub frag_total: i64,
    pub tcp_estab: i64,
    pub tcp_closed: i64,
    pub tcp_orphaned: i64,
    pub tcp_timewait: i64,
}

impl Sample for NginxSample {
    const KIND: TelemetryKind = TelemetryKind::Nginx;

    fn label_values(&self, project_name: &str) -> Vec<String> {
        vec![self.host_name.clone(), project_name.to_string()]
    }

    fn gauge_values(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("nginx_is_run", self.is_run as f64),
            ("nginx_re_total", self.re_total as f64),
            ("nginx_login_user_count", self.login_user_count as f64),
            ("nginx_raw_total", self.raw_total as f64),
            ("nginx_udptotal", self.udp_total as f64),
            ("nginx_tcp_total", self.tcp_total as f64),
            ("nginx_total_tcp", self.total_tcp as f64),
            ("nginx_inet_total", self.inet_total as f64),
            ("nginx_frag_total", self.frag_total as f64),
            ("nginx_tcp_estab", self.tcp_estab as f64),
            ("nginx_tcp_closed", self.tcp_closed as f64),
            ("nginx_tcp_orphaned", self.tcp_orphaned as f64),
            ("nginx_tcp_timewait", self.tcp_timewait as f64),
        ]
    }
}

// ============================================================================
// SSL certificates
// ============================================================================

pub static SSL: GroupSpec = GroupSpec {
    kind: TelemetryKind::Ssl,
    labels: &["domain", "comment", "status", "resolve", "project"],
    gauges: &[gauge("ssl_domain_days_left", "Days until the certificate expires")],
    policy: EvictionPolicy::Hard,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SslSample {
    pub domain: String,
    pub comment: String,
    pub expiration: String,
    pub days_left: i64,
    pub status: String,
    pub resolve: bool,
}

impl Sample for SslSample {
    const KIND: TelemetryKind = TelemetryKind::Ssl;

    fn label_values(&self, project_name: &str) -> Vec<String> {
        let comment = if self.comment.is_empty() {
            EMPTY_COMMENT_PLACEHOLDER.to_string()
        } else {
            self.comment.clone()
        };
        vec![
            self.domain.clone(),
            comment,
            self.status.clone(),
            self.resolve.to_string(),
            project_name.to_string(),
        ]
    }

    fn gauge_values(&self) -> Vec<(&'static str, f64)> {
        vec![("ssl_domain_days_left", self.days_left as f64)]
    }
}

// ============================================================================
// Container resources
// ============================================================================

pub static CONTAINER: GroupSpec = GroupSpec {
    kind: TelemetryKind::Container,
    labels: &["namespace", "podName", "container", "controllerName", "project"],
    gauges: &[
        gauge("container_cpu_usage", "Container CPU usage in cores"),
        gauge("container_memory_usage", "Container memory usage in bytes"),
        gauge("container_cpu_limit", "Container CPU limit in cores"),
        gauge("container_memory_limit", "Container memory limit in bytes"),
        gauge("container_restart_count", "Container restart count"),
        gauge("container_last_termination_time", "Last container termination time"),
    ],
    policy: EvictionPolicy::Hard,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContainerSample {
    pub namespace: String,
    pub pod_name: String,
    pub controller_name: String,
    pub container: String,
    pub limit_cpu: f64,
    pub limit_memory: i64,
    pub request_cpu: f64,
    pub request_memory: i64,
    pub use_cpu: f64,
    pub use_memory: i64,
    pub restart_count: i64,
    pub last_termination_time: i64,
}

impl Sample for ContainerSample {
    const KIND: TelemetryKind = TelemetryKind::Container;

    fn label_values(&self, project_name: &str) -> Vec<String> {
        vec![
            clean_namespace(&self.namespace).to_string(),
            self.pod_name.clone(),
            self.container.clone(),
            self.controller_name.clone(),
            project_name.to_string(),
        ]
    }

    fn gauge_values(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("container_cpu_usage", self.use_cpu),
            ("container_memory_usage", self.use_memory as f64),
            ("container_cpu_limit", self.limit_cpu),
            ("container_memory_limit", self.limit_memory as f64),
            ("container_restart_count", self.restart_count as f64),
            ("container_last_termination_time", self.last_termination_time as f64),
        ]
    }
}

// ============================================================================
// Workload controllers
// ============================================================================

pub static CONTROLLER: GroupSpec = GroupSpec {
    kind: TelemetryKind::Controller,
    labels: &["namespace", "container", "controllerType", "project"],
    gauges: &[
        gauge("controller_replicas", "Desired replicas"),
        gauge("controller_replicas_available", "Ready replicas"),
        gauge("controller_replicas_unavailable", "Unready replicas"),
    ],
    policy: EvictionPolicy::Hard,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ControllerSample {
    pub namespace: String,
    pub container: String,
    #[serde(rename = "controllerType")]
    pub controller_type: String,
    pub replicas: i64,
    pub replicas_available: i64,
    pub replicas_unavailable: i64,
}

impl Sample for ControllerSample {
    const KIND: TelemetryKind = TelemetryKind::Controller;

    fn label_values(&self, project_name: &str) -> Vec<String> {
        vec![
            clean_namespace(&self.namespace).to_string(),
            self.container.clone(),
            self.controller_type.clone(),
            project_name.to_string(),
        ]
    }

    fn gauge_values(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("controller_replicas", self.replicas as f64),
            ("controller_replicas_available", self.replicas_available as f64),
            ("controller_replicas_unavailable", self.replicas_unavailable as f64),
        ]
    }
}

// ============================================================================
// Agent heartbeat
// ============================================================================

pub static HEARTBEAT: GroupSpec = GroupSpec {
    kind: TelemetryKind::Heartbeat,
    labels: &["hostName", "project"],
    gauges: &[
        gauge("is_active", "Whether the agent is alive (1) or silent past its TTL (0)"),
        gauge("agent_version", "Agent version"),
    ],
    policy: EvictionPolicy::Soft { gauge: "is_active" },
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HeartbeatSample {
    #[serde(rename = "isActive")]
    pub is_active: i64,
    pub project: String,
    pub hostname: String,
    pub version: f64,
}

impl Sample for HeartbeatSample {
    const KIND: TelemetryKind = TelemetryKind::Heartbeat;

    fn label_values(&self, project_name: &str) -> Vec<String> {
        vec![self.hostname.clone(), project_name.to_string()]
    }

    fn gauge_values(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("is_active", self.is_active as f64),
            ("agent_version", self.version),
        ]
    }
}

// ============================================================================
// Traffic switching
// ============================================================================

pub static TRAFFIC_SWITCHING: GroupSpec = GroupSpec {
    kind: TelemetryKind::TrafficSwitching,
    labels: &["service", "project"],
    gauges: &[
        gauge("trafficswitching_total_requests", "Cumulative requests"),
        gauge("trafficswitching_total_success", "Cumulative successful requests"),
        gauge("trafficswitching_total_errors", "Cumulative failed requests"),
        gauge("trafficswitching_total_success_rate", "Cumulative success rate (0-1)"),
        gauge("trafficswitching_today_requests", "Requests today"),
        gauge("trafficswitching_today_success", "Successful requests today"),
        gauge("trafficswitching_today_errors", "Errors today"),
        gauge("trafficswitching_today_canceled", "Canceled requests today"),
        gauge("trafficswitching_today_status_2xx", "2xx responses today"),
        gauge("trafficswitching_today_status_3xx", "3xx responses today"),
        gauge("trafficswitching_today_status_4xx", "4xx responses today"),
        gauge("trafficswitching_today_status_5xx", "5xx responses today"),
        gauge("trafficswitching_realtime_qps", "Current QPS"),
        gauge("trafficswitching_realtime_success_qps", "Current successful QPS"),
        gauge("trafficswitching_realtime_error_qps", "Current error QPS"),
        gauge("trafficswitching_realtime_active_connections", "Current active connections"),
        gauge("trafficswitching_realtime_avg_latency_ms", "Current average latency in ms"),
        gauge("trafficswitching_realtime_max_latency_ms", "Current maximum latency in ms"),
        gauge("trafficswitching_error_backend_error", "Backend errors"),
        gauge("trafficswitching_error_broken_pipe", "Broken pipe errors"),
        gauge("trafficswitching_error_connection_refused", "Connection refused errors"),
        gauge("trafficswitching_error_connection_reset", "Connection reset errors"),
        gauge("trafficswitching_error_dns_error", "DNS resolution errors"),
        gauge("trafficswitching_error_eof", "EOF errors"),
        gauge("trafficswitching_error_timeout", "Timeout errors"),
        gauge("trafficswitching_proxy_cache_size", "Current proxy cache size"),
        gauge("trafficswitching_proxy_max_cache_size", "Proxy cache size limit"),
        gauge("trafficswitching_runtime_goroutines", "Runtime goroutine count"),
        gauge("trafficswitching_runtime_memory_mb", "Runtime memory in MB"),
        gauge("trafficswitching_runtime_cpu_cores", "Machine CPU cores"),
        gauge("trafficswitching_runtime_gomaxprocs", "GOMAXPROCS"),
        gauge("trafficswitching_runtime_gc_cycles", "GC cycles"),
        gauge("trafficswitching_transport_max_conns_per_host", "Max connections per host"),
        gauge("trafficswitching_transport_max_idle_conns", "Max idle connections"),
        gauge("trafficswitching_transport_max_idle_conns_per_host", "Max idle connections per host"),
        gauge("trafficswitching_timestamp", "Timestamp of this report"),
    ],
    policy: EvictionPolicy::Hard,
};

/// Success rate as reported: either a fraction or a percentage string.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SuccessRate {
    Fraction(f64),
    Percent(String),
}

impl SuccessRate {
    /// `0.9` stays `0.9`; `"85.50%"` becomes `0.855`. Unparseable text is 0.
    pub fn as_fraction(&self) -> f64 {
        match self {
            SuccessRate::Fraction(v) => *v,
            SuccessRate::Percent(s) => s
                .trim()
                .trim_end_matches('%')
                .trim()
                .parse::<f64>()
                .map(|v| v / 100.0)
                .unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TrafficSwitchingSample {
    pub service: String,

    pub total_requests: f64,
    pub total_success: f64,
    pub total_errors: f64,
    pub total_success_rate: Option<SuccessRate>,

    pub today_requests: f64,
    pub today_success: f64,
    pub today_errors: f64,
    pub today_canceled: f64,
    pub today_status_2xx: f64,
    pub today_status_3xx: f64,
    pub today_status_4xx: f64,
    pub today_status_5xx: f64,

    pub realtime_qps: f64,
    pub realtime_success_qps: f64,
    pub realtime_error_qps: f64,
    pub realtime_active_connections: f64,
    pub realtime_avg_latency_ms: f64,
    pub realtime_max_latency_ms: f64,

    pub error_backend_error: f64,
    pub error_broken_pipe: f64,
    pub error_connection_refused: f64,
    pub error_connection_reset: f64,
    pub error_dns_error: f64,
    pub error_eof: f64,
    pub error_timeout: f64,

    pub proxy_cache_size: f64,
    pub proxy_max_cache_size: f64,

    pub runtime_goroutines: f64,
    pub runtime_memory_mb: f64,
    pub runtime_cpu_cores: f64,
    pub runtime_gomaxprocs: f64,
    pub runtime_gc_cycles: f64,

    pub transport_max_conns_per_host: f64,
    pub transport_max_idle_conns: f64,
    pub transport_max_idle_conns_per_host: f64,

    pub timestamp: f64,
}

impl TrafficSwitchingSample {
    pub fn success_rate(&self) -> f64 {
        self.total_success_rate
            .as_ref()
            .map(SuccessRate::as_fraction)
            .unwrap_or(0.0)
    }
}

impl Sample for TrafficSwitchingSample {
    const KIND: TelemetryKind = TelemetryKind::TrafficSwitching;

    fn label_values(&self, project_name: &str) -> Vec<String> {
        vec![self.service.clone(), project_name.to_string()]
    }

    fn gauge_values(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("trafficswitching_total_requests", self.total_requests),
            ("trafficswitching_total_success", self.total_success),
            ("trafficswitching_total_errors", self.total_errors),
            ("trafficswitching_total_success_rate", self.success_rate()),
            ("trafficswitching_today_requests", self.today_requests),
            ("trafficswitching_today_success", self.today_success),
            ("trafficswitching_today_errors", self.today_errors),
            ("trafficswitching_today_canceled", self.today_canceled),
            ("trafficswitching_today_status_2xx", self.today_status_2xx),
            ("trafficswitching_today_status_3xx", self.today_status_3xx),
            ("trafficswitching_today_status_4xx", self.today_status_4xx),
            ("trafficswitching_today_status_5xx", self.today_status_5xx),
            ("trafficswitching_realtime_qps", self.realtime_qps),
            ("trafficswitching_realtime_success_qps", self.realtime_success_qps),
            ("trafficswitching_realtime_error_qps", self.realtime_error_qps),
            ("trafficswitching_realtime_active_connections", self.realtime_active_connections),
            ("trafficswitching_realtime_avg_latency_ms", self.realtime_avg_latency_ms),
            ("trafficswitching_realtime_max_latency_ms", self.realtime_max_latency_ms),
            ("trafficswitching_error_backend_error", self.error_backend_error),
            ("trafficswitching_error_broken_pipe", self.error_broken_pipe),
            ("trafficswitching_error_connection_refused", self.error_connection_refused),
            ("trafficswitching_error_connection_reset", self.error_connection_reset),
            ("trafficswitching_error_dns_error", self.error_dns_error),
            ("trafficswitching_error_eof", self.error_eof),
            ("trafficswitching_error_timeout", self.error_timeout),
            ("trafficswitching_proxy_cache_size", self.proxy_cache_size),
            ("trafficswitching_proxy_max_cache_size", self.proxy_max_cache_size),
            ("trafficswitching_runtime_goroutines", self.runtime_goroutines),
            ("trafficswitching_runtime_memory_mb", self.runtime_memory_mb),
            ("trafficswitching_runtime_cpu_cores", self.runtime_cpu_cores),
            ("trafficswitching_runtime_gomaxprocs", self.runtime_gomaxprocs),
            ("trafficswitching_runtime_gc_cycles", self.runtime_gc_cycles),
            ("trafficswitching_transport_max_conns_per_host", self.transport_max_conns_per_host),
            ("trafficswitching_transport_max_idle_conns", self.transport_max_idle_conns),
            ("trafficswitching_transport_max_idle_conns_per_host", self.transport_max_idle_conns_per_host),
            ("trafficswitching_timestamp", self.timestamp),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assert_gauges_match_spec<S: Sample>(sample: &S) {
        let spec = S::KIND.spec();
        let names: Vec<&str> = sample.gauge_values().iter().map(|(n, _)| *n).collect();
        let expected: Vec<&str> = spec.gauges.iter().map(|g| g.name).collect();
        assert_eq!(names, expected, "gauge order drifted for {}", S::KIND);
        assert_eq!(sample.label_values("p").len(), spec.labels.len());
    }

    #[test]
    fn test_every_sample_matches_its_spec() {
        assert_gauges_match_spec(&HardwareSample::default());
        assert_gauges_match_spec(&NginxSample::default());
        assert_gauges_match_spec(&SslSample::default());
        assert_gauges_match_spec(&ContainerSample::default());
        assert_gauges_match_spec(&ControllerSample::default());
        assert_gauges_match_spec(&HeartbeatSample::default());
        assert_gauges_match_spec(&TrafficSwitchingSample::default());
    }

    #[test]
    fn test_percentage_success_rate() {
        let rate = SuccessRate::Percent("85.50%".to_string());
        assert!((rate.as_fraction() - 0.8550).abs() < 1e-9);
        assert_eq!(SuccessRate::Fraction(0.9).as_fraction(), 0.9);
        assert_eq!(SuccessRate::Percent("n/a".to_string()).as_fraction(), 0.0);
    }

    #[test]
    fn test_success_rate_accepts_both_wire_forms() {
        let numeric: TrafficSwitchingSample =
            serde_json::from_value(json!({"service": "gw", "total_success_rate": 0.9})).unwrap();
        assert_eq!(numeric.success_rate(), 0.9);

        let text: TrafficSwitchingSample =
            serde_json::from_value(json!({"service": "gw", "total_success_rate": "85.50%"}))
                .unwrap();
        assert!((text.success_rate() - 0.855).abs() < 1e-9);

        let missing: TrafficSwitchingSample =
            serde_json::from_value(json!({"service": "gw"})).unwrap();
        assert_eq!(missing.success_rate(), 0.0);
    }

    #[test]
    fn test_missing_fields_default_to_zero() {
        let hw: HardwareSample =
            serde_json::from_value(json!({"hostName": "h1", "cpu_percent": 42.0})).unwrap();
        assert_eq!(hw.host_name, "h1");
        assert_eq!(hw.cpu_percent, 42.0);
        assert_eq!(hw.memory_total, 0.0);
        assert_eq!(hw.cpu_model, "");
    }

    #[test]
    fn test_ssl_labels_fill_comment_and_resolve() {
        let ssl: SslSample = serde_json::from_value(
            json!({"domain": "example.com", "status": "ok", "resolve": true, "days_left": 30}),
        )
        .unwrap();
        assert_eq!(
            ssl.label_values("shop"),
            vec!["example.com", EMPTY_COMMENT_PLACEHOLDER, "ok", "true", "shop"]
        );
    }

    #[test]
    fn test_container_namespace_is_cleaned() {
        let c: ContainerSample = serde_json::from_value(json!({
            "namespace": "orders-v2",
            "podName": "orders-7d9f",
            "container": "app",
            "controllerName": "orders",
            "useCpu": 0.25
        }))
        .unwrap();
        assert_eq!(c.label_values("p")[0], "orders");
    }

    #[test]
    fn test_nginx_camel_case_fields() {
        let n: NginxSample = serde_json::from_value(
            json!({"hostName": "edge-1", "isRun": 1, "udptotal": 4, "totaltcp": 9, "tcpTimewait": 3}),
        )
        .unwrap();
        assert_eq!(n.is_run, 1);
        assert_eq!(n.udp_total, 4);
        assert_eq!(n.total_tcp, 9);
        assert_eq!(n.tcp_timewait, 3);
    }
}
