use std::time::Duration;

use crate::config::{RampPolicy, RunProfile, Stage};

#[derive(Debug, Clone)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// Desired VU population as a pure function of elapsed run time.
///
/// Holds only the immutable profile, so it is safe to query concurrently
/// from the pool, the progress task, and tests.
#[derive(Debug, Clone)]
pub struct RampingSchedule {
    start: u64,
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
    policy: RampPolicy,
}

impl RampingSchedule {
    /// The profile must already be validated; a constant profile becomes a
    /// single stage whose start and end targets are both `vus`.
    pub fn new(profile: &RunProfile, policy: RampPolicy) -> Self {
        let (start, stages) = match profile {
            RunProfile::Constant { vus, duration } => (
                *vus,
                vec![Stage {
                    duration: *duration,
                    target: *vus,
                }],
            ),
            RunProfile::Ramping { start_vus, stages } => (*start_vus, stages.clone()),
        };

        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }

        Self {
            start,
            stages,
            cumulative_ends,
            policy,
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    /// Desired population at `elapsed`, or `None` once the profile's total
    /// duration has passed (the completion sentinel).
    pub fn desired_at(&self, elapsed: Duration) -> Option<u64> {
        if self.is_done(elapsed) {
            return None;
        }
        Some(self.target_at(elapsed))
    }

    fn stage_window(&self, idx: usize) -> (Duration, Duration) {
        let end = self.cumulative_ends[idx];
        let start = if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        };
        (start, end)
    }

    fn start_target(&self, idx: usize) -> u64 {
        if idx == 0 {
            self.start
        } else {
            self.stages[idx - 1].target
        }
    }

    fn target_at(&self, elapsed: Duration) -> u64 {
        if elapsed == Duration::ZERO {
            return self.start;
        }

        let total = self.total_duration();
        if elapsed >= total {
            return self.stages.last().map(|s| s.target).unwrap_or(self.start);
        }

        let idx = match self
            .cumulative_ends
            .binary_search_by(|end| end.cmp(&elapsed))
        {
            Ok(i) => i,
            Err(i) => i,
        };

        let (stage_start, stage_end) = self.stage_window(idx);
        let stage_duration = stage_end.saturating_sub(stage_start);
        let stage_elapsed = elapsed.saturating_sub(stage_start);

        let start_target = self.start_target(idx);
        let end_target = self.stages[idx].target;

        if matches!(self.policy, RampPolicy::Step) || stage_duration.is_zero() {
            return end_target;
        }

        // Linear interpolation across the stage, in integer nanoseconds so
        // stage boundaries land exactly on the declared target.
        let start_i = start_target as i128;
        let end_i = end_target as i128;
        let delta = end_i - start_i;

        let num = stage_elapsed.as_nanos() as i128;
        let den = stage_duration.as_nanos() as i128;

        let cur = start_i + (delta.saturating_mul(num) / den.max(1));
        cur.clamp(0, u64::MAX as i128) as u64
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        if self.stages.is_empty() {
            return None;
        }

        let total = self.total_duration();
        let clamped = elapsed.min(total);

        let idx = if clamped >= total {
            self.stages.len().saturating_sub(1)
        } else {
            match self
                .cumulative_ends
                .binary_search_by(|end| end.cmp(&clamped))
            {
                Ok(i) => i,
                Err(i) => i,
            }
        };

        let (stage_start, stage_end) = self.stage_window(idx);
        let stage_duration = stage_end.saturating_sub(stage_start);
        let stage_elapsed = clamped.saturating_sub(stage_start);
        let stage_remaining = stage_duration.saturating_sub(stage_elapsed);

        Some(StageSnapshot {
            index: idx,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining,
            start_target: self.start_target(idx),
            end_target: self.stages[idx].target,
            current_target: self.target_at(clamped),
        })
    }
}
