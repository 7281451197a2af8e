use std::time::Duration;

use crate::error::{Error, Result};

/// One ramp segment: move the desired VU population to `target` over
/// `duration`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

/// How the desired population behaves inside a stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum RampPolicy {
    /// Interpolate linearly from the previous stage's target.
    #[default]
    Linear,
    /// Jump to the stage's target at the stage boundary.
    Step,
}

/// The shape of a run: either a fixed VU count held for a duration, or an
/// ordered list of ramp stages. Immutable once a run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunProfile {
    Constant {
        vus: u64,
        duration: Duration,
    },
    Ramping {
        /// Population at t=0, before the first stage starts interpolating.
        start_vus: u64,
        stages: Vec<Stage>,
    },
}

impl RunProfile {
    pub fn constant(vus: u64, duration: Duration) -> Self {
        Self::Constant { vus, duration }
    }

    pub fn ramping(start_vus: u64, stages: Vec<Stage>) -> Self {
        Self::Ramping { start_vus, stages }
    }

    /// Total scheduled run time: the fixed duration, or the sum of stage
    /// durations.
    pub fn total_duration(&self) -> Duration {
        match self {
            Self::Constant { duration, .. } => *duration,
            Self::Ramping { stages, .. } => stages
                .iter()
                .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration)),
        }
    }

    /// Largest population the profile can request.
    pub fn peak_target(&self) -> u64 {
        match self {
            Self::Constant { vus, .. } => *vus,
            Self::Ramping { start_vus, stages } => stages
                .iter()
                .map(|s| s.target)
                .max()
                .unwrap_or(0)
                .max(*start_vus),
        }
    }

    /// All configuration errors surface here, before any VU starts.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Constant { vus, duration } => {
                if *vus == 0 {
                    return Err(Error::InvalidVus);
                }
                if duration.is_zero() {
                    return Err(Error::InvalidDuration);
                }
            }
            Self::Ramping { stages, .. } => {
                if stages.is_empty() {
                    return Err(Error::InvalidStages);
                }
                for (index, stage) in stages.iter().enumerate() {
                    if stage.duration.is_zero() {
                        return Err(Error::InvalidStageDuration { index });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Engine knobs, independent of the run profile.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard cap on live VUs, protecting the host from a misconfigured
    /// profile. Exceeding it is non-fatal; the run continues at the cap.
    pub max_vus: u64,

    /// How often the pool reconciles live VUs against the schedule.
    pub reconcile_interval: Duration,

    /// How long an aborted run waits for in-flight iterations before
    /// force-stopping the remaining VUs.
    pub grace_period: Duration,

    /// How often progress updates are emitted (when a callback is set).
    pub progress_interval: Duration,

    pub ramp_policy: RampPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_vus: 10_000,
            reconcile_interval: Duration::from_millis(100),
            grace_period: Duration::from_secs(10),
            progress_interval: Duration::from_secs(1),
            ramp_policy: RampPolicy::Linear,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_vus == 0 {
            return Err(Error::InvalidMaxVus);
        }
        if self.reconcile_interval.is_zero() {
            return Err(Error::InvalidReconcileInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_profile_validates() {
        let p = RunProfile::constant(10, Duration::from_secs(30));
        assert!(p.validate().is_ok());
        assert_eq!(p.total_duration(), Duration::from_secs(30));
        assert_eq!(p.peak_target(), 10);
    }

    #[test]
    fn constant_profile_rejects_zero_vus_and_zero_duration() {
        assert!(matches!(
            RunProfile::constant(0, Duration::from_secs(1)).validate(),
            Err(Error::InvalidVus)
        ));
        assert!(matches!(
            RunProfile::constant(1, Duration::ZERO).validate(),
            Err(Error::InvalidDuration)
        ));
    }

    #[test]
    fn ramping_profile_rejects_empty_stages() {
        assert!(matches!(
            RunProfile::ramping(0, Vec::new()).validate(),
            Err(Error::InvalidStages)
        ));
    }

    #[test]
    fn ramping_profile_rejects_zero_length_stage() {
        let p = RunProfile::ramping(
            0,
            vec![
                Stage {
                    duration: Duration::from_secs(10),
                    target: 5,
                },
                Stage {
                    duration: Duration::ZERO,
                    target: 10,
                },
            ],
        );
        assert!(matches!(
            p.validate(),
            Err(Error::InvalidStageDuration { index: 1 })
        ));
    }

    #[test]
    fn ramping_profile_may_hold_a_zero_population() {
        // Targets are only required non-negative; a profile that never asks
        // for a VU just holds an empty pool for its duration.
        let p = RunProfile::ramping(
            0,
            vec![Stage {
                duration: Duration::from_secs(5),
                target: 0,
            }],
        );
        assert!(p.validate().is_ok());
        assert_eq!(p.peak_target(), 0);
    }

    #[test]
    fn ramping_profile_totals_and_peak() {
        let p = RunProfile::ramping(
            2,
            vec![
                Stage {
                    duration: Duration::from_secs(10),
                    target: 5,
                },
                Stage {
                    duration: Duration::from_secs(45),
                    target: 100,
                },
                Stage {
                    duration: Duration::from_secs(15),
                    target: 0,
                },
            ],
        );
        assert!(p.validate().is_ok());
        assert_eq!(p.total_duration(), Duration::from_secs(70));
        assert_eq!(p.peak_target(), 100);
    }

    #[test]
    fn engine_config_rejects_zero_knobs() {
        let mut cfg = EngineConfig::default();
        cfg.max_vus = 0;
        assert!(matches!(cfg.validate(), Err(Error::InvalidMaxVus)));

        let mut cfg = EngineConfig::default();
        cfg.reconcile_interval = Duration::ZERO;
        assert!(matches!(
            cfg.validate(),
            Err(Error::InvalidReconcileInterval)
        ));
    }
}
