mod check;
mod config;
mod error;
mod metrics_agg;
mod pool;
mod progress;
mod run;
mod schedule;
mod signal;
mod summary;
mod transport;
mod vu;

pub use check::{Check, CheckSet};
pub use config::{EngineConfig, RampPolicy, RunProfile, Stage};
pub use error::{Error, Result};
pub use metrics_agg::{EngineMetrics, metric};
pub use progress::{ProgressFn, ProgressUpdate, StageProgress};
pub use run::{AbortHandle, RunState, Runner};
pub use schedule::{RampingSchedule, StageSnapshot};
pub use signal::AbortSignal;
pub use summary::{CheckSummary, RunSummary};
pub use transport::{Request, Response, Transport, TransportError};
pub use vu::{
    BodyError, BodyFuture, IterationContext, IterationFn, IterationOutcome, IterationResult,
    VuStatus, iteration_fn,
};

pub use rampr_metrics::{HistogramSummary, MetricSnapshot, RateSnapshot};
