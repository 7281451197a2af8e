use std::io::Write as _;

use serde::Serialize;

use rampr_core::{EngineConfig, ProgressFn, ProgressUpdate, RunProfile, RunSummary};

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _profile: &RunProfile, _config: &EngineConfig) {}

    fn progress(&self) -> Option<ProgressFn> {
        Some(std::sync::Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()> {
        let line = build_summary_line(summary);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub total_duration_secs: f64,

    pub desired_vus: u64,
    pub live_vus: u64,
    pub capacity_exceeded: bool,

    pub iterations_total: u64,
    pub iterations_per_sec: f64,
    pub errors_total: u64,
    pub checks_failed_total: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<JsonStageProgress>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonStageProgress {
    pub stage: usize,
    pub stages: usize,
    pub current_target: u64,
    pub stage_remaining_secs: f64,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),
        total_duration_secs: u.total_duration.as_secs_f64(),
        desired_vus: u.desired_vus,
        live_vus: u.live_vus,
        capacity_exceeded: u.capacity_exceeded,
        iterations_total: u.iterations_total,
        iterations_per_sec: u.iterations_per_sec,
        errors_total: u.errors_total,
        checks_failed_total: u.checks_failed_total,
        stage: u.stage.as_ref().map(|s| JsonStageProgress {
            stage: s.stage,
            stages: s.stages,
            current_target: s.current_target,
            stage_remaining_secs: s.stage_remaining.as_secs_f64(),
        }),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub state: String,
    pub elapsed_secs: f64,

    pub iterations_total: u64,
    pub iterations_failed: u64,
    pub iteration_errors: u64,
    pub iterations_per_sec: f64,

    pub peak_vus: u64,
    pub capacity_exceeded: bool,
    pub force_stopped: bool,

    pub checks: Vec<JsonCheckSummary>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration_duration: Option<JsonLatencySummary>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonCheckSummary {
    pub name: String,
    pub passed: u64,
    pub total: u64,
}

/// Percentiles in microseconds, matching the engine's histogram unit.
#[derive(Debug, Serialize)]
pub(crate) struct JsonLatencySummary {
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub count: u64,
}

fn build_summary_line(summary: &RunSummary) -> JsonSummaryLine {
    let checks = summary
        .checks
        .iter()
        .map(|c| JsonCheckSummary {
            name: c.name.clone(),
            passed: c.passed,
            total: c.total,
        })
        .collect();

    let iteration_duration = summary.iteration_duration_us.as_ref().map(|h| JsonLatencySummary {
        p50: h.p50,
        p75: h.p75,
        p90: h.p90,
        p95: h.p95,
        p99: h.p99,
        min: h.min,
        max: h.max,
        mean: h.mean,
        stdev: h.stdev,
        count: h.count,
    });

    JsonSummaryLine {
        kind: "summary",
        state: summary.state.to_string(),
        elapsed_secs: summary.elapsed.as_secs_f64(),
        iterations_total: summary.iterations_total,
        iterations_failed: summary.iterations_failed,
        iteration_errors: summary.iteration_errors,
        iterations_per_sec: summary.iterations_per_sec,
        peak_vus: summary.peak_vus,
        capacity_exceeded: summary.capacity_exceeded,
        force_stopped: summary.force_stopped,
        checks,
        iteration_duration,
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
