use std::sync::Arc;

use rampr_metrics::{MetricHandle, MetricKind, MetricSnapshot, Registry};

use crate::vu::{IterationOutcome, IterationResult};

/// Built-in metric names.
pub mod metric {
    pub const ITERATIONS: &str = "iterations";
    pub const ITERATIONS_FAILED: &str = "iterations_failed";
    pub const ITERATION_ERRORS: &str = "iteration_errors";
    pub const ITERATION_DURATION: &str = "iteration_duration";
    pub const VUS: &str = "vus";
    pub const VUS_MAX: &str = "vus_max";
    pub const CAPACITY_EXCEEDED: &str = "capacity_exceeded";
    pub const CHECKS: &str = "checks";

    pub fn check(name: &str) -> String {
        format!("check:{name}")
    }
}

/// The engine's write path into the registry. Handles are resolved once at
/// run start; recording an iteration is a handful of atomic increments plus
/// one histogram record, so a VU is never delayed by more than the
/// histogram's short mutex.
#[derive(Debug, Clone)]
pub struct EngineMetrics {
    registry: Arc<Registry>,
    iterations: MetricHandle,
    iterations_failed: MetricHandle,
    iteration_errors: MetricHandle,
    iteration_duration: MetricHandle,
    vus: MetricHandle,
    vus_max: MetricHandle,
    capacity_exceeded: MetricHandle,
}

impl EngineMetrics {
    pub fn new(registry: Arc<Registry>) -> Self {
        let iterations = registry.handle(metric::ITERATIONS, MetricKind::Counter);
        let iterations_failed = registry.handle(metric::ITERATIONS_FAILED, MetricKind::Counter);
        let iteration_errors = registry.handle(metric::ITERATION_ERRORS, MetricKind::Counter);
        let iteration_duration = registry.handle(metric::ITERATION_DURATION, MetricKind::Histogram);
        let vus = registry.handle(metric::VUS, MetricKind::Gauge);
        let vus_max = registry.handle(metric::VUS_MAX, MetricKind::Gauge);
        let capacity_exceeded = registry.handle(metric::CAPACITY_EXCEEDED, MetricKind::Counter);

        Self {
            registry,
            iterations,
            iterations_failed,
            iteration_errors,
            iteration_duration,
            vus,
            vus_max,
            capacity_exceeded,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn record_iteration(&self, result: &IterationResult) {
        self.iterations.increment(1);
        match result.outcome {
            IterationOutcome::Success => {}
            IterationOutcome::Failed => self.iterations_failed.increment(1),
            IterationOutcome::Errored => self.iteration_errors.increment(1),
        }

        let micros = result.duration.as_micros().min(u64::MAX as u128) as u64;
        self.iteration_duration.observe_histogram(micros);
    }

    pub fn record_capacity_exceeded(&self, overflow: u64) {
        self.capacity_exceeded.increment(overflow);
    }

    pub fn iterations_total(&self) -> u64 {
        self.iterations.get_counter()
    }

    pub fn active_vus(&self) -> i64 {
        self.vus.get_gauge()
    }

    /// Marks one VU as live for the duration of the returned guard and keeps
    /// the peak in `vus_max`, so an end-of-run summary never shows `vus = 0`
    /// as the only population figure.
    pub fn enter_active_vu(&self) -> ActiveVuGuard {
        let new_active = if let MetricHandle::Gauge(g) = &self.vus {
            g.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
                .saturating_add(1)
        } else {
            0
        };
        self.vus_max.raise_gauge(new_active);

        ActiveVuGuard {
            vus: self.vus.clone(),
        }
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        self.registry.snapshot()
    }
}

pub struct ActiveVuGuard {
    vus: MetricHandle,
}

impl Drop for ActiveVuGuard {
    fn drop(&mut self) {
        self.vus.decrement_gauge(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vu::CheckSample;
    use std::time::Duration;
    use tokio::time::Instant;

    fn result(outcome: IterationOutcome, duration: Duration) -> IterationResult {
        IterationResult {
            vu_id: 1,
            started_at: Instant::now(),
            duration,
            outcome,
            checks: Vec::<CheckSample>::new(),
        }
    }

    #[test]
    fn record_iteration_updates_counters_and_histogram() {
        let m = EngineMetrics::new(Arc::new(Registry::new()));
        m.record_iteration(&result(
            IterationOutcome::Success,
            Duration::from_millis(5),
        ));
        m.record_iteration(&result(IterationOutcome::Failed, Duration::from_millis(7)));
        m.record_iteration(&result(IterationOutcome::Errored, Duration::from_millis(9)));

        let snap = m.snapshot();
        assert_eq!(snap.counter(metric::ITERATIONS), 3);
        assert_eq!(snap.counter(metric::ITERATIONS_FAILED), 1);
        assert_eq!(snap.counter(metric::ITERATION_ERRORS), 1);
        assert_eq!(
            snap.histogram(metric::ITERATION_DURATION).map(|h| h.count),
            Some(3)
        );
    }

    #[test]
    fn active_vu_guard_tracks_live_and_peak() {
        let m = EngineMetrics::new(Arc::new(Registry::new()));
        {
            let _a = m.enter_active_vu();
            let _b = m.enter_active_vu();
            assert_eq!(m.active_vus(), 2);
        }
        assert_eq!(m.active_vus(), 0);
        assert_eq!(m.snapshot().gauge(metric::VUS_MAX), 2);
    }
}
