use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::check::BoundCheckSet;
use crate::metrics_agg::EngineMetrics;
use crate::signal::AbortSignal;
use crate::transport::Transport;
use crate::vu::{IterationFn, VuRunArgs, VuStatus, VuStatusCell, run_vu};

/// One live VU record: created by the pool when it starts a VU, discarded by
/// the pool once the VU reaches Stopped.
pub(crate) struct VuHandle {
    pub id: u64,
    pub status: Arc<VuStatusCell>,
    pub iterations: Arc<AtomicU64>,
    pub join: JoinHandle<()>,
}

/// Single-writer owner of the VU pool. Reconciles the live population
/// against the schedule's desired value on every tick: spawn when below,
/// drain most-recently-started first when above, and never exceed the
/// concurrency ceiling regardless of what the profile asks for.
pub(crate) struct PoolManager {
    vus: Vec<VuHandle>,
    next_id: u64,
    max_vus: u64,
    capacity_latched: bool,

    body: IterationFn,
    checks: Arc<BoundCheckSet>,
    metrics: EngineMetrics,
    transport: Arc<dyn Transport>,
    abort: Arc<AbortSignal>,
    run_started: Instant,
    deadline: Instant,
}

impl PoolManager {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        max_vus: u64,
        body: IterationFn,
        checks: Arc<BoundCheckSet>,
        metrics: EngineMetrics,
        transport: Arc<dyn Transport>,
        abort: Arc<AbortSignal>,
        run_started: Instant,
        deadline: Instant,
    ) -> Self {
        Self {
            vus: Vec::new(),
            next_id: 1,
            max_vus,
            capacity_latched: false,
            body,
            checks,
            metrics,
            transport,
            abort,
            run_started,
            deadline,
        }
    }

    /// Live VUs: Starting + Running + Draining. A draining VU still occupies
    /// a slot until it stops.
    pub(crate) fn live_count(&self) -> u64 {
        self.vus
            .iter()
            .filter(|h| h.status.load() != VuStatus::Stopped)
            .count() as u64
    }

    fn draining_count(&self) -> u64 {
        self.vus
            .iter()
            .filter(|h| h.status.load() == VuStatus::Draining)
            .count() as u64
    }

    /// Whether the profile has requested more than the ceiling at least once.
    pub(crate) fn capacity_exceeded(&self) -> bool {
        self.capacity_latched
    }

    /// Adjust the pool toward `desired`. Idempotent: calling twice with the
    /// same value spawns and drains nothing the second time.
    pub(crate) fn reconcile(&mut self, desired: u64) {
        self.reap_stopped();

        if desired > self.max_vus && !self.capacity_latched {
            // Non-fatal: the run continues at the capped population.
            self.metrics.record_capacity_exceeded(1);
            self.capacity_latched = true;
        }
        let capped = desired.min(self.max_vus);

        let live = self.live_count();
        if live < capped {
            for _ in live..capped {
                self.spawn_vu();
            }
        } else if live > capped {
            let excess = live - capped;
            let mut to_drain = excess.saturating_sub(self.draining_count());

            // Most-recently-started first, so long-running VUs get to finish
            // naturally.
            for handle in self.vus.iter().rev() {
                if to_drain == 0 {
                    break;
                }
                if handle.status.mark_draining() {
                    to_drain -= 1;
                }
            }
        }
    }

    fn spawn_vu(&mut self) {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);

        let status = Arc::new(VuStatusCell::new());
        let iterations = Arc::new(AtomicU64::new(0));

        let join = tokio::spawn(run_vu(VuRunArgs {
            id,
            status: status.clone(),
            iterations: iterations.clone(),
            body: self.body.clone(),
            checks: self.checks.clone(),
            metrics: self.metrics.clone(),
            transport: self.transport.clone(),
            abort: self.abort.clone(),
            run_started: self.run_started,
            deadline: self.deadline,
        }));

        self.vus.push(VuHandle {
            id,
            status,
            iterations,
            join,
        });
    }

    fn reap_stopped(&mut self) {
        // A finished task whose status never reached Stopped means the body
        // panicked; its slot is freed so the next reconcile can replace it.
        self.vus
            .retain(|h| h.status.load() != VuStatus::Stopped && !h.join.is_finished());
    }

    /// Signal every live VU to finish its current iteration and stop.
    pub(crate) fn drain_all(&mut self) {
        for handle in &self.vus {
            handle.status.mark_draining();
        }
    }

    /// Wait for every VU to reach Stopped, or bail out as soon as the run is
    /// aborted. Returns true if the abort fired first; the undrained handles
    /// stay in the pool for the grace-period path.
    pub(crate) async fn wait_all_or_abort(&mut self, abort: &AbortSignal) -> bool {
        while !self.vus.is_empty() {
            let drained = {
                let join = &mut self.vus[0].join;
                tokio::select! {
                    res = join => {
                        let _ = res;
                        true
                    }
                    _ = abort.wait() => false,
                }
            };

            if !drained {
                return true;
            }
            let _ = self.vus.remove(0);
        }
        false
    }

    /// Wait up to `grace` for a graceful drain, then force-stop whatever is
    /// left. Returns true if any VU had to be force-stopped.
    pub(crate) async fn wait_all_with_grace(&mut self, grace: std::time::Duration) -> bool {
        let deadline = tokio::time::Instant::now() + grace;
        let mut forced = false;

        for handle in self.vus.drain(..) {
            let VuHandle {
                status, mut join, ..
            } = handle;

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if tokio::time::timeout(remaining, &mut join).await.is_err() {
                // The iteration body never returned; stop the task without
                // waiting for it.
                join.abort();
                let _ = join.await;
                status.store(VuStatus::Stopped);
                forced = true;
            }
        }

        forced
    }
}
