pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("`duration` must be a positive duration")]
    InvalidDuration,

    #[error("`stages` must be a non-empty array of {{ duration, target }}")]
    InvalidStages,

    #[error("stage {index}: `duration` must be a positive duration")]
    InvalidStageDuration { index: usize },

    #[error("`max_vus` must be a positive integer")]
    InvalidMaxVus,

    #[error("`reconcile_interval` must be a positive duration")]
    InvalidReconcileInterval,

    #[error("run already started")]
    AlreadyStarted,
}
