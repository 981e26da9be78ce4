//! Registration of every self-metric phase.
//!
//! Names follow `gateway_{phase}_{metric}`; registration warns when a phase
//! declares a name outside its own prefix or one another phase already owns.

use crate::metrics::{
    DispatchMetrics, IngestMetrics, LivenessMetrics, MetricDoc, PhaseMetrics,
};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Describe all phase metrics to the installed recorder.
pub fn register_all_metrics() {
    let mut owners: HashMap<&'static str, &'static str> = HashMap::new();

    register_phase::<IngestMetrics>(&mut owners);
    register_phase::<DispatchMetrics>(&mut owners);
    register_phase::<LivenessMetrics>(&mut owners);

    info!(metrics = owners.len(), "Self-metrics registered");
}

fn register_phase<T: PhaseMetrics>(owners: &mut HashMap<&'static str, &'static str>) {
    T::register_metrics();
    let phase = T::phase_name();

    for doc in T::metrics_documentation() {
        if !in_phase(&doc, phase) {
            warn!(metric = doc.name, phase, "metric name outside its phase prefix");
        }
        match owners.get(doc.name) {
            Some(owner) => warn!(metric = doc.name, owner, phase, "metric name registered twice"),
            None => {
                debug!(metric = doc.name, labels = ?doc.labels, kind = ?doc.metric_type, "registered");
                owners.insert(doc.name, phase);
            }
        }
    }
}

fn in_phase(doc: &MetricDoc, phase: &str) -> bool {
    doc.name
        .strip_prefix("gateway_")
        .and_then(|rest| rest.strip_prefix(phase))
        .is_some_and(|rest| rest.starts_with('_'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn all_docs() -> Vec<(&'static str, MetricDoc)> {
        fn tagged<T: PhaseMetrics>() -> Vec<(&'static str, MetricDoc)> {
            T::metrics_documentation()
                .into_iter()
                .map(|d| (T::phase_name(), d))
                .collect()
        }
        let mut docs = tagged::<IngestMetrics>();
        docs.extend(tagged::<DispatchMetrics>());
        docs.extend(tagged::<LivenessMetrics>());
        docs
    }

    #[test]
    fn test_every_name_carries_its_phase_once() {
        for (phase, doc) in all_docs() {
            assert!(in_phase(&doc, phase), "{} not under {phase}", doc.name);
            assert!(!doc.name.starts_with("gateway_gateway_"), "{}", doc.name);
        }
    }

    #[test]
    fn test_phase_metric_names_are_unique() {
        let mut seen = HashSet::new();
        for (_, doc) in all_docs() {
            assert!(seen.insert(doc.name), "duplicate metric {}", doc.name);
        }
    }

    #[test]
    fn test_register_without_recorder_is_noop() {
        register_all_metrics();
    }
}
