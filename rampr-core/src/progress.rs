use std::time::Duration;

use crate::schedule::StageSnapshot;

#[derive(Debug, Clone)]
pub struct StageProgress {
    /// 1-based stage index.
    pub stage: usize,
    pub stages: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

impl From<StageSnapshot> for StageProgress {
    fn from(s: StageSnapshot) -> Self {
        Self {
            stage: s.index + 1,
            stages: s.count,
            stage_elapsed: s.stage_elapsed,
            stage_remaining: s.stage_remaining,
            start_target: s.start_target,
            end_target: s.end_target,
            current_target: s.current_target,
        }
    }
}

/// Periodic live view of a run, emitted on the progress interval.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based) for progress emissions.
    pub tick: u64,
    pub elapsed: Duration,
    pub total_duration: Duration,
    pub stage: Option<StageProgress>,

    /// Desired population at this instant, before the ceiling is applied.
    pub desired_vus: u64,
    /// VUs currently occupying a pool slot (includes draining ones).
    pub live_vus: u64,
    pub capacity_exceeded: bool,

    pub iterations_total: u64,
    pub iterations_per_sec: f64,
    pub errors_total: u64,
    pub checks_failed_total: u64,
}

pub type ProgressFn = std::sync::Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;
