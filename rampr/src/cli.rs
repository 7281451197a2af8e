use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr as _;
use std::time::Duration;

use rampr_core::{RampPolicy, Stage};

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);

    if number_end == 0 {
        return Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        ));
    }

    let (number_str, unit_str) = s.split_at(number_end);
    let value: u64 = number_str
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"))?;

    match unit_str.trim() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Ok(Duration::from_secs(value)),
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => {
            Ok(Duration::from_millis(value))
        }
        "us" | "µs" | "usec" | "usecs" | "microsecond" | "microseconds" => {
            Ok(Duration::from_micros(value))
        }
        "m" | "min" | "mins" | "minute" | "minutes" => {
            let secs = value
                .checked_mul(60)
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        "h" | "hr" | "hrs" | "hour" | "hours" => {
            let secs = value
                .checked_mul(60)
                .and_then(|v| v.checked_mul(60))
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        _ => Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        )),
    }
}

/// `DURATION:TARGET`, e.g. `30s:100`.
fn parse_stage(input: &str) -> Result<Stage, String> {
    let (duration_str, target_str) = input
        .split_once(':')
        .ok_or_else(|| format!("invalid stage '{input}' (expected DURATION:TARGET, e.g. 30s:100)"))?;

    let duration = parse_duration(duration_str)?;
    let target: u64 = target_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid stage target '{target_str}' (expected an integer)"))?;

    Ok(Stage { duration, target })
}

fn parse_ramp_policy(input: &str) -> Result<RampPolicy, String> {
    RampPolicy::from_str(input.trim())
        .map_err(|_| format!("invalid ramp policy '{input}' (expected linear or step)"))
}

fn parse_error_rate(input: &str) -> Result<f64, String> {
    let v: f64 = input
        .parse()
        .map_err(|_| format!("invalid error rate '{input}' (expected a number in 0..=1)"))?;
    if !(0.0..=1.0).contains(&v) {
        return Err(format!("error rate {v} out of range (expected 0..=1)"));
    }
    Ok(v)
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable progress and summary.
    HumanReadable,
    /// Emit JSON progress lines (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "rampr",
    author,
    version,
    about = "Staged load generator with virtual-user ramping",
    long_about = "rampr drives a pool of virtual users against a synthetic workload, ramping the population through configured stages and reporting per-iteration metrics and check results.\n\nA run is shaped either by --vus/--duration (constant population) or by repeated --stage flags / a profile YAML (staged ramping).",
    after_help = "Examples:\n  rampr run --vus 50 --duration 30s\n  rampr run --stage 10s:5 --stage 45s:100 --stage 15s:0\n  rampr run profile.yaml --output json\n  rampr run --vus 100 --duration 1m --error-rate 0.05 --expect-status 200"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load profile
    #[command(
        long_about = "Run a load profile against the built-in synthetic workload.\n\nCLI flags override values from the profile YAML."
    )]
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to a profile YAML (optional; flags alone can shape the run)
    pub profile: Option<PathBuf>,

    /// Constant virtual-user population
    #[arg(long)]
    pub vus: Option<u64>,

    /// Run duration for a constant population (e.g. 10s, 1m)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Ramp stage, repeatable (DURATION:TARGET, e.g. 30s:100)
    #[arg(long = "stage", value_name = "DURATION:TARGET", value_parser = parse_stage)]
    pub stages: Vec<Stage>,

    /// Population at t=0 when ramping (defaults to 0)
    #[arg(long)]
    pub start_vus: Option<u64>,

    /// Hard cap on concurrently live virtual users
    #[arg(long)]
    pub max_vus: Option<u64>,

    /// How long an aborted run waits before force-stopping stuck iterations
    #[arg(long, value_parser = parse_duration)]
    pub grace_period: Option<Duration>,

    /// How the population moves within a stage (linear or step)
    #[arg(long, value_parser = parse_ramp_policy)]
    pub ramp_policy: Option<RampPolicy>,

    /// Simulated time per iteration
    #[arg(long, value_parser = parse_duration, default_value = "100ms")]
    pub iteration_time: Duration,

    /// Fraction of iterations that fail with a transport error (0..=1)
    #[arg(long, value_parser = parse_error_rate, default_value_t = 0.0)]
    pub error_rate: f64,

    /// Status code the synthetic workload responds with
    #[arg(long, default_value_t = 200)]
    pub status: u16,

    /// Status code the built-in check asserts
    #[arg(long, default_value_t = 200)]
    pub expect_status: u16,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(2 * 60 * 60)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn parse_stage_splits_duration_and_target() {
        assert_eq!(
            parse_stage("30s:100"),
            Ok(Stage {
                duration: Duration::from_secs(30),
                target: 100,
            })
        );
        assert!(parse_stage("30s").is_err());
        assert!(parse_stage("30s:lots").is_err());
        assert!(parse_stage(":5").is_err());
    }

    #[test]
    fn parse_ramp_policy_accepts_kebab_names() {
        assert_eq!(parse_ramp_policy("linear"), Ok(RampPolicy::Linear));
        assert_eq!(parse_ramp_policy("step"), Ok(RampPolicy::Step));
        assert!(parse_ramp_policy("cubic").is_err());
    }

    #[test]
    fn parse_error_rate_bounds() {
        assert_eq!(parse_error_rate("0"), Ok(0.0));
        assert_eq!(parse_error_rate("0.25"), Ok(0.25));
        assert_eq!(parse_error_rate("1"), Ok(1.0));
        assert!(parse_error_rate("1.5").is_err());
        assert!(parse_error_rate("-0.1").is_err());
        assert!(parse_error_rate("lots").is_err());
    }

    #[test]
    fn cli_parses_run_with_stages() {
        let parsed = Cli::try_parse_from([
            "rampr",
            "run",
            "--stage",
            "10s:5",
            "--stage",
            "45s:100",
            "--start-vus",
            "2",
            "--max-vus",
            "500",
            "--ramp-policy",
            "step",
            "--output",
            "json",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        let Command::Run(args) = cli.command;
        assert_eq!(args.profile, None);
        assert_eq!(args.stages.len(), 2);
        assert_eq!(args.stages[1].target, 100);
        assert_eq!(args.start_vus, Some(2));
        assert_eq!(args.max_vus, Some(500));
        assert_eq!(args.ramp_policy, Some(RampPolicy::Step));
        assert!(matches!(args.output, OutputFormat::Json));
    }

    #[test]
    fn cli_parses_run_with_constant_flags() {
        let parsed = Cli::try_parse_from([
            "rampr",
            "run",
            "profile.yaml",
            "--vus",
            "50",
            "--duration",
            "30s",
            "--error-rate",
            "0.1",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        let Command::Run(args) = cli.command;
        assert_eq!(args.profile, Some(PathBuf::from("profile.yaml")));
        assert_eq!(args.vus, Some(50));
        assert_eq!(args.duration, Some(Duration::from_secs(30)));
        assert!((args.error_rate - 0.1).abs() < 1e-12);
        assert_eq!(args.iteration_time, Duration::from_millis(100));
        assert_eq!(args.status, 200);
    }
}
