use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use rampr_metrics::Registry;
use tokio::time::{Instant, MissedTickBehavior};

use crate::check::CheckSet;
use crate::config::{EngineConfig, RunProfile};
use crate::error::{Error, Result};
use crate::metrics_agg::{EngineMetrics, metric};
use crate::pool::PoolManager;
use crate::progress::{ProgressFn, ProgressUpdate};
use crate::schedule::RampingSchedule;
use crate::signal::AbortSignal;
use crate::summary::RunSummary;
use crate::transport::{Response, Transport};
use crate::vu::{BodyError, IterationContext, IterationFn, iteration_fn};

/// Run lifecycle: Configured -> Running -> (Completed | Aborted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[repr(u8)]
pub enum RunState {
    Configured = 0,
    Running = 1,
    Completed = 2,
    Aborted = 3,
}

impl RunState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Configured,
            1 => Self::Running,
            2 => Self::Completed,
            _ => Self::Aborted,
        }
    }
}

#[derive(Debug, Default)]
struct RunStateCell(AtomicU8);

impl RunStateCell {
    fn load(&self) -> RunState {
        RunState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn store(&self, state: RunState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Cloneable handle for requesting early termination from outside the run.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    signal: Arc<AbortSignal>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.signal.abort();
    }

    pub fn is_aborted(&self) -> bool {
        self.signal.is_aborted()
    }
}

/// Top-level orchestrator: validates the profile, drives the reconcile tick
/// against the schedule, owns the abort signal, and finalizes the run into a
/// summary with a final metric snapshot.
pub struct Runner {
    profile: RunProfile,
    config: EngineConfig,
    checks: CheckSet,
    progress: Option<ProgressFn>,

    registry: Arc<Registry>,
    abort: Arc<AbortSignal>,
    state: Arc<RunStateCell>,
}

impl Runner {
    /// Fails fast on any configuration error; nothing is spawned until
    /// [`Runner::run`].
    pub fn new(profile: RunProfile, config: EngineConfig) -> Result<Self> {
        profile.validate()?;
        config.validate()?;

        Ok(Self {
            profile,
            config,
            checks: CheckSet::new(),
            progress: None,
            registry: Arc::new(Registry::new()),
            abort: Arc::new(AbortSignal::new()),
            state: Arc::new(RunStateCell::default()),
        })
    }

    #[must_use]
    pub fn with_checks(mut self, checks: CheckSet) -> Self {
        self.checks = checks;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            signal: self.abort.clone(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state.load()
    }

    /// Live view of the metrics registry; snapshots taken here are weakly
    /// consistent while the run is in flight.
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Runs the profile to completion (or abort) with a generic iteration
    /// body, returning the final summary.
    pub async fn run<F, Fut, E>(self, body: F, transport: Arc<dyn Transport>) -> Result<RunSummary>
    where
        F: Fn(IterationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Response, E>> + Send + 'static,
        E: Into<BodyError>,
    {
        self.run_boxed(iteration_fn(body), transport).await
    }

    /// As [`Runner::run`], for callers that already hold a boxed body.
    pub async fn run_boxed(
        self,
        body: IterationFn,
        transport: Arc<dyn Transport>,
    ) -> Result<RunSummary> {
        if self.state.load() != RunState::Configured {
            return Err(Error::AlreadyStarted);
        }

        let schedule = Arc::new(RampingSchedule::new(&self.profile, self.config.ramp_policy));
        let metrics = EngineMetrics::new(self.registry.clone());
        let bound_checks = Arc::new(self.checks.bind(&self.registry));

        let started = Instant::now();
        let deadline = started + schedule.total_duration();
        self.state.store(RunState::Running);

        let mut pool = PoolManager::new(
            self.config.max_vus,
            body,
            bound_checks,
            metrics.clone(),
            transport,
            self.abort.clone(),
            started,
            deadline,
        );

        let progress_handle = self.progress.as_ref().map(|progress| {
            spawn_progress_task(
                progress.clone(),
                self.config.progress_interval,
                schedule.clone(),
                metrics.clone(),
                started,
            )
        });

        let mut interval = tokio::time::interval(self.config.reconcile_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick fires immediately, so a constant profile reaches
        // its full population within one reconciliation tick.
        let mut aborted = loop {
            tokio::select! {
                _ = interval.tick() => {
                    // An abort that raced the tick wins over the schedule.
                    if self.abort.is_aborted() {
                        break true;
                    }
                    let elapsed = started.elapsed();
                    match schedule.desired_at(elapsed) {
                        Some(desired) => pool.reconcile(desired),
                        None => break false,
                    }
                }
                _ = self.abort.wait() => break true,
            }
        };

        // Two-phase shutdown: let in-flight iterations finish, then (only on
        // abort) force-stop whatever outlives the grace period.
        pool.drain_all();
        let forced = if aborted {
            pool.wait_all_with_grace(self.config.grace_period).await
        } else if pool.wait_all_or_abort(&self.abort).await {
            aborted = true;
            pool.wait_all_with_grace(self.config.grace_period).await
        } else {
            false
        };

        if let Some(handle) = progress_handle {
            handle.abort();
            let _ = handle.await;
        }

        let state = if aborted {
            RunState::Aborted
        } else {
            RunState::Completed
        };
        self.state.store(state);

        Ok(RunSummary::from_snapshot(
            state,
            started.elapsed(),
            forced,
            metrics.snapshot(),
        ))
    }
}

fn spawn_progress_task(
    progress: ProgressFn,
    interval: std::time::Duration,
    schedule: Arc<RampingSchedule>,
    metrics: EngineMetrics,
    started: Instant,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the immediate first tick; there is nothing to report at t=0.
        ticker.tick().await;

        let mut tick: u64 = 0;
        let mut last_at = Instant::now();
        let mut last_iterations = metrics.iterations_total();

        loop {
            ticker.tick().await;

            tick = tick.saturating_add(1);
            let now = Instant::now();
            let dt = now.duration_since(last_at).as_secs_f64().max(1e-9);
            last_at = now;

            let elapsed = started.elapsed();
            let iterations_total = metrics.iterations_total();
            let delta = iterations_total.saturating_sub(last_iterations);
            last_iterations = iterations_total;

            let snap = metrics.snapshot();
            let checks_failed_total = snap
                .rates
                .iter()
                .filter(|(name, _)| name.starts_with("check:"))
                .map(|(_, r)| r.total.saturating_sub(r.passed))
                .sum();

            progress(ProgressUpdate {
                tick,
                elapsed,
                total_duration: schedule.total_duration(),
                stage: schedule.stage_snapshot_at(elapsed).map(Into::into),
                desired_vus: schedule.desired_at(elapsed).unwrap_or(0),
                live_vus: metrics.active_vus().max(0) as u64,
                capacity_exceeded: snap.counter(metric::CAPACITY_EXCEEDED) > 0,
                iterations_total,
                iterations_per_sec: delta as f64 / dt,
                errors_total: snap.counter(metric::ITERATION_ERRORS),
                checks_failed_total,
            });
        }
    })
}
