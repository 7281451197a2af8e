use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

// Test-pausable time source; identical to std's Instant outside tests.
use tokio::time::Instant;

use crate::check::BoundCheckSet;
use crate::metrics_agg::EngineMetrics;
use crate::signal::AbortSignal;
use crate::transport::{Response, Transport};

/// Lifecycle of one virtual user. The VU transitions its own status; the
/// pool decides when a record is created and when it is finally discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[repr(u8)]
pub enum VuStatus {
    Starting = 0,
    Running = 1,
    /// Finish the in-flight iteration, then stop. Never starts a new one.
    Draining = 2,
    Stopped = 3,
}

impl VuStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

/// Shared status cell: written by the owning VU, with the single exception
/// of the pool marking Starting/Running VUs as Draining.
#[derive(Debug)]
pub(crate) struct VuStatusCell(AtomicU8);

impl VuStatusCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(VuStatus::Starting as u8))
    }

    pub(crate) fn load(&self) -> VuStatus {
        VuStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, status: VuStatus) {
        self.0.store(status as u8, Ordering::Release);
    }

    /// Starting/Running -> Draining. A no-op once the VU is already
    /// Draining or Stopped, which is what makes reconciliation idempotent.
    pub(crate) fn mark_draining(&self) -> bool {
        for from in [VuStatus::Starting, VuStatus::Running] {
            if self
                .0
                .compare_exchange(
                    from as u8,
                    VuStatus::Draining as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return true;
            }
        }
        false
    }

    fn try_start_running(&self) {
        let _ = self.0.compare_exchange(
            VuStatus::Starting as u8,
            VuStatus::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum IterationOutcome {
    /// Body returned and every registered check passed.
    Success,
    /// Body returned but at least one check failed.
    Failed,
    /// Body returned an error; checks were not evaluated.
    Errored,
}

#[derive(Debug, Clone)]
pub struct CheckSample {
    pub name: Arc<str>,
    pub passed: bool,
}

/// Produced once per iteration, consumed by the aggregator, not retained.
#[derive(Debug, Clone)]
pub struct IterationResult {
    pub vu_id: u64,
    pub started_at: Instant,
    pub duration: Duration,
    pub outcome: IterationOutcome,
    pub checks: Vec<CheckSample>,
}

pub type BodyError = Box<dyn std::error::Error + Send + Sync>;
pub type BodyFuture = Pin<Box<dyn Future<Output = Result<Response, BodyError>> + Send>>;

/// The opaque iteration body, cloned into every VU. The engine never
/// inspects its internals, only the returned outcome.
pub type IterationFn = Arc<dyn Fn(IterationContext) -> BodyFuture + Send + Sync>;

/// Wraps an async closure into the boxed form the pool stores.
pub fn iteration_fn<F, Fut, E>(f: F) -> IterationFn
where
    F: Fn(IterationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, E>> + Send + 'static,
    E: Into<BodyError>,
{
    Arc::new(move |ctx| {
        let fut = f(ctx);
        Box::pin(async move { fut.await.map_err(Into::into) })
    })
}

/// Handle injected into each iteration body invocation.
#[derive(Clone)]
pub struct IterationContext {
    pub vu_id: u64,
    /// 0-based index of this iteration within its VU.
    pub iteration: u64,
    pub run_started: Instant,
    pub transport: Arc<dyn Transport>,
}

impl IterationContext {
    pub fn elapsed(&self) -> Duration {
        self.run_started.elapsed()
    }
}

impl std::fmt::Debug for IterationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IterationContext")
            .field("vu_id", &self.vu_id)
            .field("iteration", &self.iteration)
            .finish()
    }
}

pub(crate) struct VuRunArgs {
    pub id: u64,
    pub status: Arc<VuStatusCell>,
    pub iterations: Arc<AtomicU64>,
    pub body: IterationFn,
    pub checks: Arc<BoundCheckSet>,
    pub metrics: EngineMetrics,
    pub transport: Arc<dyn Transport>,
    pub abort: Arc<AbortSignal>,
    pub run_started: Instant,
    /// Scheduled end of the run; no iteration starts at or after it.
    pub deadline: Instant,
}

/// The iteration loop for one VU: run the body, evaluate checks, record the
/// result, repeat. Exits after the in-flight iteration when draining or
/// aborted; there is no preemption mid-call since the body is opaque.
pub(crate) async fn run_vu(args: VuRunArgs) {
    let _active = args.metrics.enter_active_vu();
    let mut iteration: u64 = 0;

    loop {
        if args.abort.is_aborted() || args.status.load() == VuStatus::Draining {
            break;
        }
        if Instant::now() >= args.deadline {
            break;
        }

        args.status.try_start_running();

        let ctx = IterationContext {
            vu_id: args.id,
            iteration,
            run_started: args.run_started,
            transport: args.transport.clone(),
        };

        let started_at = Instant::now();
        let body_result = (args.body)(ctx).await;
        let duration = started_at.elapsed();

        let (outcome, checks) = match body_result {
            Ok(response) => {
                let samples = args.checks.evaluate(&response);
                let outcome = if samples.iter().all(|s| s.passed) {
                    IterationOutcome::Success
                } else {
                    IterationOutcome::Failed
                };
                (outcome, samples)
            }
            Err(_) => (IterationOutcome::Errored, Vec::new()),
        };

        args.metrics.record_iteration(&IterationResult {
            vu_id: args.id,
            started_at,
            duration,
            outcome,
            checks,
        });

        iteration = iteration.saturating_add(1);
        args.iterations.store(iteration, Ordering::Relaxed);

        // Yield between iterations so a zero-cost body cannot monopolize a
        // worker thread and starve the reconcile tick.
        tokio::task::yield_now().await;
    }

    args.status.store(VuStatus::Stopped);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_cell_transitions() {
        let cell = VuStatusCell::new();
        assert_eq!(cell.load(), VuStatus::Starting);

        cell.try_start_running();
        assert_eq!(cell.load(), VuStatus::Running);

        assert!(cell.mark_draining());
        assert_eq!(cell.load(), VuStatus::Draining);

        // Already draining: marking again is a no-op.
        assert!(!cell.mark_draining());

        cell.store(VuStatus::Stopped);
        assert!(!cell.mark_draining());
        assert_eq!(cell.load(), VuStatus::Stopped);
    }

    #[test]
    fn running_transition_does_not_clobber_draining() {
        let cell = VuStatusCell::new();
        assert!(cell.mark_draining());
        cell.try_start_running();
        assert_eq!(cell.load(), VuStatus::Draining);
    }
}
