use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rampr_core::{
    Check, CheckSet, IterationContext, Request, Response, Transport, TransportError,
};

/// Knobs for the built-in workload: each request sleeps for a fixed time and
/// then either responds with the configured status or fails with a transport
/// error, paced deterministically by `error_rate`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SyntheticWorkload {
    pub iteration_time: Duration,
    pub error_rate: f64,
    pub status: u16,
}

impl SyntheticWorkload {
    pub(crate) fn transport(self) -> Arc<dyn Transport> {
        let seq = Arc::new(AtomicU64::new(0));

        Arc::new(move |_req: Request| {
            let seq = seq.clone();
            async move {
                tokio::time::sleep(self.iteration_time).await;

                let n = seq.fetch_add(1, Ordering::Relaxed);
                if error_due(n, self.error_rate) {
                    return Err(TransportError::new("synthetic transport error"));
                }

                Ok(Response {
                    status: self.status,
                    duration: self.iteration_time,
                    ..Response::default()
                })
            }
        })
    }
}

pub(crate) fn iteration_body(ctx: IterationContext) -> impl Future<Output = Result<Response, TransportError>> {
    async move { ctx.transport.request(Request::new("GET", "synthetic://load")).await }
}

pub(crate) fn default_checks(expect_status: u16) -> CheckSet {
    CheckSet::new().with_check(Check::new(
        format!("status is {expect_status}"),
        move |r: &Response| r.status == expect_status,
    ))
}

/// Errors are spread evenly over the sequence rather than randomized, so a
/// given rate produces the same failure count on every run.
fn error_due(seq: u64, rate: f64) -> bool {
    if rate <= 0.0 {
        return false;
    }
    if rate >= 1.0 {
        return true;
    }
    (((seq + 1) as f64) * rate).floor() > ((seq as f64) * rate).floor()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors_in(rate: f64, n: u64) -> u64 {
        (0..n).filter(|&seq| error_due(seq, rate)).count() as u64
    }

    #[test]
    fn error_pacing_matches_rate() {
        assert_eq!(errors_in(0.0, 1000), 0);
        assert_eq!(errors_in(1.0, 1000), 1000);
        assert_eq!(errors_in(0.25, 100), 25);
        assert_eq!(errors_in(0.05, 100), 5);
    }

    #[tokio::test]
    async fn transport_alternates_per_error_rate() {
        let workload = SyntheticWorkload {
            iteration_time: Duration::from_millis(1),
            error_rate: 0.5,
            status: 204,
        };
        let transport = workload.transport();

        let mut errors = 0;
        let mut oks = 0;
        for _ in 0..10 {
            match transport.request(Request::new("GET", "synthetic://load")).await {
                Ok(resp) => {
                    assert_eq!(resp.status, 204);
                    oks += 1;
                }
                Err(_) => errors += 1,
            }
        }
        assert_eq!(errors, 5);
        assert_eq!(oks, 5);
    }

    #[test]
    fn default_checks_register_one_check() {
        let checks = default_checks(200);
        let names: Vec<&str> = checks.names().collect();
        assert_eq!(names, ["status is 200"]);
    }
}
