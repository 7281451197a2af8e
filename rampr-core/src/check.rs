use std::fmt;
use std::sync::Arc;

use rampr_metrics::{MetricHandle, MetricKind, Registry};

use crate::transport::Response;
use crate::vu::CheckSample;

type Predicate = Arc<dyn Fn(&Response) -> bool + Send + Sync>;

/// A named boolean assertion over an iteration's observable result. One
/// pass/fail sample is recorded per check per iteration.
#[derive(Clone)]
pub struct Check {
    name: Arc<str>,
    predicate: Predicate,
}

impl Check {
    pub fn new<F>(name: impl Into<Arc<str>>, predicate: F) -> Self
    where
        F: Fn(&Response) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check").field("name", &self.name).finish()
    }
}

/// The registered checks for a run, with their rate handles resolved up
/// front so recording a sample is a pair of atomic increments.
#[derive(Debug, Default, Clone)]
pub struct CheckSet {
    checks: Vec<Check>,
}

impl CheckSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn register(&mut self, check: Check) {
        self.checks.push(check);
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().map(Check::name)
    }

    pub(crate) fn bind(&self, registry: &Registry) -> BoundCheckSet {
        let checks_all = registry.handle(crate::metric::CHECKS, MetricKind::Rate);
        let bound = self
            .checks
            .iter()
            .map(|c| {
                let handle = registry.handle(&crate::metric::check(&c.name), MetricKind::Rate);
                (c.clone(), handle)
            })
            .collect();

        BoundCheckSet { bound, checks_all }
    }
}

/// CheckSet with metric handles attached, shared by every VU of a run.
#[derive(Debug, Clone)]
pub(crate) struct BoundCheckSet {
    bound: Vec<(Check, MetricHandle)>,
    checks_all: MetricHandle,
}

impl BoundCheckSet {
    /// Runs every registered predicate against `response`, records the
    /// pass/fail samples, and returns them in registration order.
    pub(crate) fn evaluate(&self, response: &Response) -> Vec<CheckSample> {
        let mut samples = Vec::with_capacity(self.bound.len());
        for (check, handle) in &self.bound {
            let passed = (check.predicate)(response);
            handle.add_rate(passed);
            self.checks_all.add_rate(passed);
            samples.push(CheckSample {
                name: check.name.clone(),
                passed,
            });
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16) -> Response {
        Response {
            status,
            ..Response::default()
        }
    }

    #[test]
    fn evaluate_records_one_sample_per_check() {
        let registry = Registry::new();
        let set = CheckSet::new()
            .with_check(Check::new("status was 200", |r| r.status == 200))
            .with_check(Check::new("body not empty", |r| !r.body.is_empty()));

        let bound = set.bind(&registry);
        let samples = bound.evaluate(&response(200));

        assert_eq!(samples.len(), 2);
        assert!(samples[0].passed);
        assert!(!samples[1].passed);

        let snap = registry.snapshot();
        let ok = snap.rate("check:status was 200");
        assert_eq!(ok.map(|r| (r.passed, r.total)), Some((1, 1)));
        let body = snap.rate("check:body not empty");
        assert_eq!(body.map(|r| (r.passed, r.total)), Some((0, 1)));
        let all = snap.rate("checks");
        assert_eq!(all.map(|r| (r.passed, r.total)), Some((1, 2)));
    }

    #[test]
    fn evaluation_order_matches_registration_order() {
        let registry = Registry::new();
        let set = CheckSet::new()
            .with_check(Check::new("b", |_| true))
            .with_check(Check::new("a", |_| true));

        let samples = set.bind(&registry).evaluate(&response(200));
        let names: Vec<&str> = samples.iter().map(|s| s.name.as_ref()).collect();
        assert_eq!(names, ["b", "a"]);
    }
}
