//! Timestamped metric groups: gauges plus a liveness registry per telemetry kind.
//!
//! Every projected sample upserts a last-seen instant for its label tuple.
//! A periodic sweep retires tuples that have been silent longer than the TTL,
//! either by deleting every gauge series for the tuple ([`EvictionPolicy::Hard`])
//! or by forcing one activity gauge to 0 ([`EvictionPolicy::Soft`]).
//!
//! ## Concurrency
//!
//! The registry is a [`DashMap`]. [`TimestampedMetricGroup::record`] writes
//! its gauges while holding the entry's write guard, and the sweep re-checks
//! staleness and retracts gauges inside `remove_if`/`get_mut`, which take the
//! same guard. A sample and an eviction for one tuple therefore never
//! interleave: either the sweep sees the fresh timestamp and skips the tuple,
//! or the eviction completes first and the sample recreates everything.
//!
//! Soft-evicted tuples keep their series but their liveness record is
//! dropped once they have been silent for the soft retention period.

use crate::error::Result;
use crate::labels;
use crate::metrics::MetricStore;
use crate::telemetry::TelemetryKind;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How long a deactivated soft tuple stays in the liveness registry.
pub const DEFAULT_SOFT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy)]
pub struct GaugeSpec {
    pub name: &'static str,
    pub help: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Delete every gauge series of a stale tuple.
    Hard,
    /// Keep the series visible but set `gauge` to 0.
    Soft { gauge: &'static str },
}

/// Static description of one telemetry kind's metric family set.
#[derive(Debug)]
pub struct GroupSpec {
    pub kind: TelemetryKind,
    pub labels: &'static [&'static str],
    pub gauges: &'static [GaugeSpec],
    pub policy: EvictionPolicy,
}

#[derive(Debug, Clone, Copy)]
struct LivenessRecord {
    last_seen: Instant,
    deactivated: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: usize,
    pub deactivated: usize,
    /// Deactivated soft tuples dropped from the registry after the retention period.
    pub forgotten: usize,
    pub corrupt: usize,
    pub remaining: usize,
}

pub struct TimestampedMetricGroup {
    spec: &'static GroupSpec,
    store: Arc<MetricStore>,
    liveness: DashMap<String, LivenessRecord>,
    ttl: Duration,
    soft_retention: Duration,
}

impl TimestampedMetricGroup {
    pub fn new(spec: &'static GroupSpec, store: Arc<MetricStore>, ttl: Duration) -> Self {
        Self {
            spec,
            store,
            liveness: DashMap::new(),
            ttl,
            soft_retention: DEFAULT_SOFT_RETENTION.max(ttl),
        }
    }

    pub fn with_soft_retention(mut self, retention: Duration) -> Self {
        self.soft_retention = retention.max(self.ttl);
        self
    }

    pub fn spec(&self) -> &'static GroupSpec {
        self.spec
    }

    pub fn kind(&self) -> TelemetryKind {
        self.spec.kind
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Set the given gauges for one label tuple and mark it live now.
    ///
    /// Returns false (and touches nothing) when the tuple does not match the
    /// label schema or a value contains the key separator.
    pub fn record(&self, label_values: &[String], values: &[(&'static str, f64)]) -> bool {
        if label_values.len() != self.spec.labels.len() {
            warn!(
                kind = %self.spec.kind,
                expected = self.spec.labels.len(),
                found = label_values.len(),
                "label tuple does not match schema"
            );
            return false;
        }
        if !labels::is_encodable(label_values) {
            warn!(
                kind = %self.spec.kind,
                labels = ?label_values,
                "label value contains the key separator"
            );
            return false;
        }

        let now = Instant::now();
        let key = labels::encode(label_values);
        let label_refs: Vec<&str> = label_values.iter().map(String::as_str).collect();

        // Hold the entry guard while writing gauges so a concurrent sweep
        // cannot retract this tuple halfway through.
        let mut entry = self.liveness.entry(key).or_insert(LivenessRecord {
            last_seen: now,
            deactivated: false,
        });
        for (name, value) in values {
            self.store.set(name, &label_refs, *value);
        }
        entry.last_seen = now;
        entry.deactivated = false;
        true
    }

    pub fn last_seen(&self, label_values: &[String]) -> Option<Instant> {
        self.liveness
            .get(&labels::encode(label_values))
            .map(|r| r.last_seen)
    }

    pub fn is_deactivated(&self, label_values: &[String]) -> Option<bool> {
        self.liveness
            .get(&labels::encode(label_values))
            .map(|r| r.deactivated)
    }

    pub fn len(&self) -> usize {
        self.liveness.len()
    }

    pub fn is_empty(&self) -> bool {
        self.liveness.is_empty()
    }

    /// Retire every tuple silent for longer than the TTL.
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();

        // Snapshot candidates first; holding iterator guards while removing
        // would deadlock on the same shard.
        let candidates: Vec<String> = self
            .liveness
            .iter()
            .filter(|e| {
                let rec = e.value();
                self.is_stale(rec, now) && (!rec.deactivated || self.is_expired(rec, now))
            })
            .map(|e| e.key().clone())
            .collect();

        for key in candidates {
            match self.spec.policy {
                EvictionPolicy::Hard => {
                    let mut corrupt = false;
                    let removed = self.liveness.remove_if(&key, |k, rec| {
                        if !self.is_stale(rec, now) {
                            return false;
                        }
                        corrupt = !self.retract(k);
                        true
                    });
                    if removed.is_some() {
                        if corrupt {
                            report.corrupt += 1;
                        } else {
                            report.evicted += 1;
                        }
                    }
                }
                EvictionPolicy::Soft { gauge } => {
                    let expired = self
                        .liveness
                        .remove_if(&key, |_, rec| self.is_expired(rec, now));
                    if expired.is_some() {
                        report.forgotten += 1;
                        continue;
                    }
                    if let Some(mut rec) = self.liveness.get_mut(&key) {
                        if rec.deactivated || !self.is_stale(&rec, now) {
                            continue;
                        }
                        rec.deactivated = true;
                        match labels::decode(&key, self.spec.labels.len()) {
                            Some(values) => {
                                let refs: Vec<&str> = values.iter().map(String::as_str).collect();
                                self.store.set(gauge, &refs, 0.0);
                                report.deactivated += 1;
                            }
                            None => report.corrupt += 1,
                        }
                    }
                }
            }
        }

        report.remaining = self.liveness.len();
        report
    }

    fn is_stale(&self, rec: &LivenessRecord, now: Instant) -> bool {
        now.saturating_duration_since(rec.last_seen) > self.ttl
    }

    fn is_expired(&self, rec: &LivenessRecord, now: Instant) -> bool {
        rec.deactivated && now.saturating_duration_since(rec.last_seen) > self.soft_retention
    }

    /// Delete every gauge series for the tuple behind `key`.
    fn retract(&self, key: &str) -> bool {
        let Some(values) = labels::decode(key, self.spec.labels.len()) else {
            return false;
        };
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        for gauge in self.spec.gauges {
            self.store.delete(gauge.name, &refs);
        }
        debug!(kind = %self.spec.kind, labels = ?values, "evicted stale series");
        true
    }
}

/// The seven metric groups sharing one store.
pub struct MetricGroups {
    store: Arc<MetricStore>,
    groups: HashMap<TelemetryKind, Arc<TimestampedMetricGroup>>,
}

impl MetricGroups {
    pub fn new(ttl: Duration) -> Result<Self> {
        Self::with_soft_retention(ttl, DEFAULT_SOFT_RETENTION)
    }

    pub fn with_soft_retention(ttl: Duration, soft_retention: Duration) -> Result<Self> {
        let specs: Vec<&'static GroupSpec> =
            TelemetryKind::ALL.iter().map(|k| k.spec()).collect();
        let store = Arc::new(MetricStore::new(&specs)?);
        let groups = specs
            .into_iter()
            .map(|spec| {
                (
                    spec.kind,
                    Arc::new(
                        TimestampedMetricGroup::new(spec, store.clone(), ttl)
                            .with_soft_retention(soft_retention),
                    ),
                )
            })
            .collect();
        Ok(Self { store, groups })
    }

    pub fn get(&self, kind: TelemetryKind) -> Arc<TimestampedMetricGroup> {
        // Every kind is inserted in `new`
        self.groups[&kind].clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TimestampedMetricGroup>> {
        self.groups.values()
    }

    pub fn store(&self) -> &Arc<MetricStore> {
        &self.store
    }
}
