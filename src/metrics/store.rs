//! Label-vector gauge store backing the scrape endpoint.

use crate::error::Result;
use crate::metrics::GroupSpec;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use tracing::warn;

/// Named gauge vectors in a private registry.
///
/// The gauge set is fixed at construction; `set`/`delete` address a series
/// by gauge name plus its ordered label values.
pub struct MetricStore {
    registry: Registry,
    gauges: HashMap<&'static str, (GaugeVec, &'static [&'static str])>,
}

impl MetricStore {
    pub fn new(specs: &[&'static GroupSpec]) -> Result<Self> {
        let registry = Registry::new();
        let mut gauges = HashMap::new();
        for spec in specs {
            for g in spec.gauges {
                let vec = GaugeVec::new(Opts::new(g.name, g.help), spec.labels)?;
                registry.register(Box::new(vec.clone()))?;
                gauges.insert(g.name, (vec, spec.labels));
            }
        }
        Ok(Self { registry, gauges })
    }

    pub fn set(&self, name: &str, labels: &[&str], value: f64) -> bool {
        let Some((vec, _)) = self.gauges.get(name) else {
            warn!(gauge = name, "set on unknown gauge");
            return false;
        };
        match vec.get_metric_with_label_values(labels) {
            Ok(g) => {
                g.set(value);
                true
            }
            Err(e) => {
                warn!(gauge = name, error = %e, "rejected gauge labels");
                false
            }
        }
    }

    /// Remove one series. Returns false when it did not exist.
    pub fn delete(&self, name: &str, labels: &[&str]) -> bool {
        self.gauges
            .get(name)
            .map(|(vec, _)| vec.remove_label_values(labels).is_ok())
            .unwrap_or(false)
    }

    /// Current value of a series, without creating it.
    pub fn get(&self, name: &str, labels: &[&str]) -> Option<f64> {
        let (_, names) = self.gauges.get(name)?;
        if names.len() != labels.len() {
            return None;
        }
        let family = self
            .registry
            .gather()
            .into_iter()
            .find(|f| f.get_name() == name)?;
        family
            .get_metric()
            .iter()
            .find(|m| {
                // gather() sorts label pairs by name, so match each schema label by name
                let by_name: HashMap<&str, &str> = m
                    .get_label()
                    .iter()
                    .map(|p| (p.get_name(), p.get_value()))
                    .collect();
                names
                    .iter()
                    .zip(labels)
                    .all(|(n, v)| by_name.get(n) == Some(v))
            })
            .map(|m| m.get_gauge().get_value())
    }

    /// Number of live series for one gauge.
    pub fn series_count(&self, name: &str) -> usize {
        self.registry
            .gather()
            .iter()
            .find(|f| f.get_name() == name)
            .map(|f| f.get_metric().len())
            .unwrap_or(0)
    }

    /// Prometheus text exposition of every gauge.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buf) {
            warn!(error = %e, "failed to encode metric store");
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TelemetryKind;

    fn nginx_store() -> MetricStore {
        MetricStore::new(&[TelemetryKind::Nginx.spec()]).unwrap()
    }

    #[test]
    fn test_set_get_delete() {
        let store = nginx_store();
        assert!(store.set("nginx_is_run", &["edge-1", "shop"], 1.0));
        assert_eq!(store.get("nginx_is_run", &["edge-1", "shop"]), Some(1.0));
        assert_eq!(store.get("nginx_is_run", &["edge-2", "shop"]), None);

        assert!(store.delete("nginx_is_run", &["edge-1", "shop"]));
        assert!(!store.delete("nginx_is_run", &["edge-1", "shop"]));
        assert_eq!(store.get("nginx_is_run", &["edge-1", "shop"]), None);
    }

    #[test]
    fn test_rejects_unknown_gauge_and_bad_arity() {
        let store = nginx_store();
        assert!(!store.set("cpu_percent", &["a", "b"], 1.0));
        assert!(!store.set("nginx_is_run", &["only-one"], 1.0));
        assert_eq!(store.series_count("nginx_is_run"), 0);
    }

    #[test]
    fn test_render_contains_labels() {
        let store = nginx_store();
        store.set("nginx_tcp_estab", &["edge-1", "支付"], 12.0);
        let text = store.render();
        assert!(text.contains("nginx_tcp_estab"));
        assert!(text.contains("hostName=\"edge-1\""));
        assert!(text.contains("project=\"支付\""));
    }
}
