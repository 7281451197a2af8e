use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use rampr_core::{EngineConfig, ProgressFn, ProgressUpdate, RunProfile, RunState, RunSummary};

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    bar: Arc<Mutex<Option<ProgressBar>>>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            bar: Arc::new(Mutex::new(None)),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, profile: &RunProfile, config: &EngineConfig) {
        match profile {
            RunProfile::Constant { vus, duration } => {
                println!(
                    "profile: constant vus={vus} duration={}",
                    format_duration(*duration)
                );
            }
            RunProfile::Ramping { start_vus, stages } => {
                println!(
                    "profile: ramping start_vus={start_vus} stages={} total={}",
                    stages.len(),
                    format_duration(profile.total_duration())
                );
                for (i, s) in stages.iter().enumerate() {
                    println!(
                        "  stage {}: target={} over {}",
                        i + 1,
                        s.target,
                        format_duration(s.duration)
                    );
                }
            }
        }
        println!(
            "limits: max_vus={} grace_period={}",
            config.max_vus,
            format_duration(config.grace_period)
        );
        println!();
    }

    fn progress(&self) -> Option<ProgressFn> {
        let bar = self.bar.clone();

        Some(Arc::new(move |u: ProgressUpdate| {
            let mut guard = bar.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let pb = guard.get_or_insert_with(|| {
                let pb = ProgressBar::new(u.total_duration.as_millis() as u64);
                pb.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));
                pb.set_style(bar_style());
                pb.set_prefix("run");
                pb
            });

            pb.set_position((u.elapsed.as_millis() as u64).min(pb.length().unwrap_or(0)));
            pb.set_message(progress_message(&u));
        }))
    }

    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()> {
        {
            let mut guard = self
                .bar
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }

        print!("{}", render(summary));
        Ok(())
    }
}

fn progress_message(u: &ProgressUpdate) -> String {
    let mut msg = match &u.stage {
        Some(stage) => format!(
            "stage={}/{} target={} vus={} elapsed={}",
            stage.stage,
            stage.stages,
            stage.current_target,
            u.live_vus,
            format_duration(u.elapsed)
        ),
        None => format!(
            "target={} vus={} elapsed={}",
            u.desired_vus,
            u.live_vus,
            format_duration(u.elapsed)
        ),
    };

    msg.push_str(&format!(
        " iters/s={} errors={} checks_failed={}",
        format_rate(u.iterations_per_sec),
        u.errors_total,
        u.checks_failed_total
    ));
    if u.capacity_exceeded {
        msg.push_str(" (capped)");
    }
    msg
}

fn render(summary: &RunSummary) -> String {
    use std::fmt::Write as _;

    let mut out = String::new();

    let state = match summary.state {
        RunState::Completed => "completed",
        RunState::Aborted => "aborted",
        RunState::Configured | RunState::Running => "unfinished",
    };
    let _ = writeln!(
        out,
        "run: {state} in {}",
        format_duration(summary.elapsed)
    );

    let _ = writeln!(
        out,
        "iterations: {} ({}/s) failed={} errored={}",
        summary.iterations_total,
        format_rate(summary.iterations_per_sec),
        summary.iterations_failed,
        summary.iteration_errors
    );

    let _ = write!(out, "vus: peak={}", summary.peak_vus);
    if summary.capacity_exceeded {
        let _ = write!(out, " (profile exceeded max_vus; population was capped)");
    }
    let _ = writeln!(out);

    if let Some(h) = &summary.iteration_duration_us {
        let _ = writeln!(
            out,
            "iteration_duration: p50={} p90={} p95={} p99={} max={} mean={}",
            format_us(h.p50),
            format_us(h.p90),
            format_us(h.p95),
            format_us(h.p99),
            format_us(h.max),
            format_us(h.mean)
        );
    }

    if !summary.checks.is_empty() {
        let _ = writeln!(out, "checks:");
        for check in &summary.checks {
            let pct = check.pass_rate().map_or(0.0, |r| r * 100.0);
            let _ = writeln!(
                out,
                "  {}: {}/{} passed ({pct:.1}%)",
                check.name, check.passed, check.total
            );
        }
    }

    if summary.force_stopped {
        let _ = writeln!(out, "force-stopped: grace period expired with VUs still busy");
    }

    out
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} [ {bar:20.cyan/blue} ] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█░")
}

fn format_duration(d: Duration) -> String {
    // Round to whole milliseconds to keep the humantime rendering short.
    humantime::format_duration(Duration::from_millis(d.as_millis() as u64)).to_string()
}

fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.1}")
    } else {
        "0".to_string()
    }
}

fn format_us(v: Option<f64>) -> String {
    match v {
        Some(us) => format!("{:.1}ms", us / 1_000.0),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampr_core::{CheckSummary, MetricSnapshot};

    fn sample_summary() -> RunSummary {
        RunSummary {
            state: RunState::Completed,
            elapsed: Duration::from_secs(10),
            iterations_total: 200,
            iterations_failed: 10,
            iteration_errors: 0,
            iterations_per_sec: 20.0,
            peak_vus: 42,
            capacity_exceeded: false,
            force_stopped: false,
            checks: vec![CheckSummary {
                name: "status is 200".to_string(),
                passed: 190,
                total: 200,
            }],
            iteration_duration_us: None,
            snapshot: MetricSnapshot::default(),
        }
    }

    #[test]
    fn render_lists_core_lines() {
        let summary = sample_summary();
        let text = render(&summary);

        assert!(text.contains("run: completed"), "{text}");
        assert!(text.contains("iterations: 200"), "{text}");
        assert!(text.contains("vus: peak=42"), "{text}");
        assert!(text.contains("status is 200: 190/200 passed (95.0%)"), "{text}");
        assert!(!text.contains("force-stopped"), "{text}");
    }

    #[test]
    fn format_helpers() {
        assert_eq!(format_rate(176.44), "176.4");
        assert_eq!(format_us(Some(100_200.0)), "100.2ms");
        assert_eq!(format_us(None), "-");
        assert_eq!(format_duration(Duration::from_secs(70)), "1m 10s");
    }
}
