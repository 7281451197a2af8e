use anyhow::Context as _;

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::profile_yaml::{self, ProfileYaml};
use crate::run_error::RunError;
use crate::synthetic::{self, SyntheticWorkload};

use rampr_core::{EngineConfig, RunProfile, Runner};

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let doc = match &args.profile {
        Some(path) => Some(
            profile_yaml::load_profile(path)
                .await
                .map_err(RunError::InvalidInput)?,
        ),
        None => None,
    };

    let profile = resolve_profile(&args, doc.as_ref()).map_err(RunError::InvalidInput)?;
    let config = resolve_config(&args, doc.as_ref()).map_err(RunError::InvalidInput)?;

    let workload = SyntheticWorkload {
        iteration_time: args.iteration_time,
        error_rate: args.error_rate,
        status: args.status,
    };

    let mut runner = Runner::new(profile.clone(), config.clone())
        .map_err(|e| RunError::InvalidInput(e.into()))?
        .with_checks(synthetic::default_checks(args.expect_status));
    if let Some(progress) = out.progress() {
        runner = runner.with_progress(progress);
    }

    let abort = runner.abort_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("interrupt received; draining (interrupt again to quit immediately)");
        abort.abort();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(ExitCode::Aborted.as_i32());
        }
    });

    out.print_header(&profile, &config);

    let summary = runner
        .run(synthetic::iteration_body, workload.transport())
        .await
        .map_err(|e| RunError::RuntimeError(e.into()))?;

    ctrl_c.abort();

    out.print_summary(&summary).map_err(RunError::RuntimeError)?;

    Ok(ExitCode::from_summary(&summary))
}

/// CLI stages beat everything; `--vus`/`--duration` beat a profile file.
fn resolve_profile(args: &RunArgs, doc: Option<&ProfileYaml>) -> anyhow::Result<RunProfile> {
    if !args.stages.is_empty() {
        return Ok(RunProfile::ramping(
            args.start_vus.unwrap_or(0),
            args.stages.clone(),
        ));
    }

    let base = match doc {
        Some(doc) => Some(doc.run_profile()?),
        None => None,
    };

    match base {
        Some(RunProfile::Constant { vus, duration }) => Ok(RunProfile::constant(
            args.vus.unwrap_or(vus),
            args.duration.unwrap_or(duration),
        )),
        Some(RunProfile::Ramping { start_vus, stages }) => match (args.vus, args.duration) {
            // Both flags together replace the staged shape entirely.
            (Some(vus), Some(duration)) => Ok(RunProfile::constant(vus, duration)),
            (None, None) => Ok(RunProfile::ramping(
                args.start_vus.unwrap_or(start_vus),
                stages,
            )),
            _ => anyhow::bail!(
                "--vus and --duration must be given together to override a ramping profile"
            ),
        },
        None => {
            let vus = args
                .vus
                .context("no profile given; use --vus/--duration, --stage, or a profile YAML")?;
            let duration = args.duration.context("--duration is required with --vus")?;
            Ok(RunProfile::constant(vus, duration))
        }
    }
}

fn resolve_config(args: &RunArgs, doc: Option<&ProfileYaml>) -> anyhow::Result<EngineConfig> {
    let mut config = EngineConfig::default();

    if let Some(doc) = doc {
        if let Some(v) = doc.max_vus {
            config.max_vus = v;
        }
        if let Some(d) = doc.grace_period {
            config.grace_period = d.into_inner();
        }
        if let Some(p) = doc.ramp_policy()? {
            config.ramp_policy = p;
        }
    }

    if let Some(v) = args.max_vus {
        config.max_vus = v;
    }
    if let Some(d) = args.grace_period {
        config.grace_period = d;
    }
    if let Some(p) = args.ramp_policy {
        config.ramp_policy = p;
    }

    Ok(config)
}
