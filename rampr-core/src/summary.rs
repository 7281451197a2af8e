use std::time::Duration;

use rampr_metrics::{HistogramSummary, MetricSnapshot};

use crate::metrics_agg::metric;
use crate::run::RunState;

#[derive(Debug, Clone)]
pub struct CheckSummary {
    pub name: String,
    pub passed: u64,
    pub total: u64,
}

impl CheckSummary {
    pub fn failed(&self) -> u64 {
        self.total.saturating_sub(self.passed)
    }

    pub fn pass_rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.passed as f64 / self.total as f64)
    }
}

/// Final result of a run, produced once the controller reaches Completed or
/// Aborted. The embedded snapshot is guaranteed final.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub state: RunState,
    pub elapsed: Duration,

    pub iterations_total: u64,
    pub iterations_failed: u64,
    pub iteration_errors: u64,
    pub iterations_per_sec: f64,

    pub peak_vus: u64,
    pub capacity_exceeded: bool,
    /// Set when the abort grace period expired and VUs were force-stopped.
    pub force_stopped: bool,

    pub checks: Vec<CheckSummary>,
    pub iteration_duration_us: Option<HistogramSummary>,

    pub snapshot: MetricSnapshot,
}

impl RunSummary {
    pub(crate) fn from_snapshot(
        state: RunState,
        elapsed: Duration,
        force_stopped: bool,
        snapshot: MetricSnapshot,
    ) -> Self {
        let iterations_total = snapshot.counter(metric::ITERATIONS);
        let secs = elapsed.as_secs_f64().max(1e-9);

        let mut checks: Vec<CheckSummary> = snapshot
            .rates
            .iter()
            .filter_map(|(name, rate)| {
                let name = name.strip_prefix("check:")?;
                Some(CheckSummary {
                    name: name.to_string(),
                    passed: rate.passed,
                    total: rate.total,
                })
            })
            .collect();
        checks.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            state,
            elapsed,
            iterations_total,
            iterations_failed: snapshot.counter(metric::ITERATIONS_FAILED),
            iteration_errors: snapshot.counter(metric::ITERATION_ERRORS),
            iterations_per_sec: iterations_total as f64 / secs,
            peak_vus: snapshot.gauge(metric::VUS_MAX).max(0) as u64,
            capacity_exceeded: snapshot.counter(metric::CAPACITY_EXCEEDED) > 0,
            force_stopped,
            checks,
            iteration_duration_us: snapshot.histogram(metric::ITERATION_DURATION).cloned(),
            snapshot,
        }
    }

    pub fn checks_failed_total(&self) -> u64 {
        self.checks.iter().map(CheckSummary::failed).sum()
    }

    pub fn completed(&self) -> bool {
        self.state == RunState::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampr_metrics::{MetricKind, Registry};

    #[test]
    fn summary_extracts_checks_and_totals() {
        let reg = Registry::new();
        reg.handle(metric::ITERATIONS, MetricKind::Counter)
            .increment(100);
        reg.handle(metric::ITERATION_ERRORS, MetricKind::Counter)
            .increment(3);
        reg.handle(metric::VUS_MAX, MetricKind::Gauge).set_gauge(12);

        let check = reg.handle("check:status was 201", MetricKind::Rate);
        for _ in 0..9 {
            check.add_rate(true);
        }
        check.add_rate(false);

        let summary = RunSummary::from_snapshot(
            RunState::Completed,
            Duration::from_secs(10),
            false,
            reg.snapshot(),
        );

        assert!(summary.completed());
        assert_eq!(summary.iterations_total, 100);
        assert_eq!(summary.iteration_errors, 3);
        assert_eq!(summary.peak_vus, 12);
        assert!((summary.iterations_per_sec - 10.0).abs() < 1e-9);

        assert_eq!(summary.checks.len(), 1);
        assert_eq!(summary.checks[0].name, "status was 201");
        assert_eq!(summary.checks[0].failed(), 1);
        assert_eq!(summary.checks_failed_total(), 1);
        assert_eq!(summary.checks[0].pass_rate(), Some(0.9));
    }
}
