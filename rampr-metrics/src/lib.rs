mod metrics;
mod registry;

pub use metrics::{
    HistogramSummary, MetricHandle, MetricKind, MetricStorage, RateCounters, new_default_histogram,
    summarize_histogram,
};
pub use registry::{MetricSnapshot, RateSnapshot, Registry};
