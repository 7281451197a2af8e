use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use ahash::RandomState;
use dashmap::DashMap;

use crate::metrics::{
    HistogramSummary, MetricHandle, MetricKind, MetricStorage, summarize_histogram,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSnapshot {
    pub passed: u64,
    pub total: u64,
    /// `passed / total`, or `None` when there are no samples.
    pub rate: Option<f64>,
}

/// Point-in-time view of every registered series. Taking a snapshot never
/// blocks writers beyond the per-histogram mutex; records that race with the
/// snapshot may or may not be included.
#[derive(Debug, Clone, Default)]
pub struct MetricSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, i64>,
    pub rates: BTreeMap<String, RateSnapshot>,
    pub histograms: BTreeMap<String, HistogramSummary>,
}

impl MetricSnapshot {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn gauge(&self, name: &str) -> i64 {
        self.gauges.get(name).copied().unwrap_or(0)
    }

    pub fn rate(&self, name: &str) -> Option<RateSnapshot> {
        self.rates.get(name).copied()
    }

    pub fn histogram(&self, name: &str) -> Option<&HistogramSummary> {
        self.histograms.get(name)
    }
}

/// Write-optimized registry of named metric series. Handles are resolved once
/// and then written through atomics, so the iteration hot path never touches
/// the map.
#[derive(Debug, Default)]
pub struct Registry {
    series: DashMap<Arc<str>, MetricStorage, RandomState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a write handle for `name`, creating the series on first use.
    /// If the series already exists with a different kind, the existing
    /// storage wins and the returned handle writes to it.
    pub fn handle(&self, name: &str, kind: MetricKind) -> MetricHandle {
        if let Some(existing) = self.series.get(name) {
            return existing.value().handle();
        }

        let entry = self
            .series
            .entry(Arc::from(name))
            .or_insert_with(|| MetricStorage::new(kind));
        entry.value().handle()
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        let mut out = MetricSnapshot::default();

        for entry in self.series.iter() {
            let name = entry.key().to_string();
            match entry.value() {
                MetricStorage::Counter(c) => {
                    out.counters.insert(name, c.load(Ordering::Relaxed));
                }
                MetricStorage::Gauge(g) => {
                    out.gauges.insert(name, g.load(Ordering::Relaxed));
                }
                MetricStorage::Rate(r) => {
                    let passed = r.passed.load(Ordering::Relaxed);
                    let total = r.total.load(Ordering::Relaxed);
                    let rate = (total > 0).then(|| passed as f64 / total as f64);
                    out.rates.insert(
                        name,
                        RateSnapshot {
                            passed,
                            total,
                            rate,
                        },
                    );
                }
                MetricStorage::Histogram(h) => {
                    let h = h.lock();
                    out.histograms.insert(name, summarize_histogram(&h));
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_is_stable_across_lookups() {
        let reg = Registry::new();
        let a = reg.handle("iterations", MetricKind::Counter);
        let b = reg.handle("iterations", MetricKind::Counter);

        a.increment(2);
        b.increment(3);

        assert_eq!(reg.snapshot().counter("iterations"), 5);
    }

    #[test]
    fn snapshot_reports_all_kinds() {
        let reg = Registry::new();
        reg.handle("iterations", MetricKind::Counter).increment(7);
        reg.handle("vus", MetricKind::Gauge).set_gauge(12);

        let check = reg.handle("check:status was 200", MetricKind::Rate);
        check.add_rate(true);
        check.add_rate(true);
        check.add_rate(false);

        let hist = reg.handle("iteration_duration", MetricKind::Histogram);
        hist.observe_histogram(1_000);
        hist.observe_histogram(2_000);

        let snap = reg.snapshot();
        assert_eq!(snap.counter("iterations"), 7);
        assert_eq!(snap.gauge("vus"), 12);

        let rate = match snap.rate("check:status was 200") {
            Some(r) => r,
            None => panic!("expected rate series"),
        };
        assert_eq!(rate.passed, 2);
        assert_eq!(rate.total, 3);
        let ratio = match rate.rate {
            Some(v) => v,
            None => panic!("expected ratio"),
        };
        assert!((ratio - 2.0 / 3.0).abs() < 1e-9);

        let hist = match snap.histogram("iteration_duration") {
            Some(h) => h,
            None => panic!("expected histogram series"),
        };
        assert_eq!(hist.count, 2);
        assert_eq!(hist.min, Some(1000.0));
    }

    #[test]
    fn missing_series_read_as_zero() {
        let snap = Registry::new().snapshot();
        assert_eq!(snap.counter("nope"), 0);
        assert_eq!(snap.gauge("nope"), 0);
        assert!(snap.rate("nope").is_none());
        assert!(snap.histogram("nope").is_none());
    }

    #[test]
    fn rate_ratio_is_only_computed_at_snapshot_time() {
        let reg = Registry::new();
        let r = reg.handle("checks", MetricKind::Rate);
        for _ in 0..10 {
            r.add_rate(true);
        }

        let (passed, total) = r.get_rate();
        assert_eq!((passed, total), (10, 10));
        assert_eq!(
            reg.snapshot().rate("checks").and_then(|r| r.rate),
            Some(1.0)
        );
    }
}
