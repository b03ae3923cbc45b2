// src/lib.rs

pub mod cli;
pub mod cluster;
pub mod config;
pub mod deploy;
pub mod errors;
pub mod fs;
pub mod harvest;
pub mod logging;
pub mod logs;
pub mod runner;
pub mod types;
pub mod wait;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::cluster::KubeCluster;
use crate::config::{RunnerConfig, load_and_validate};
use crate::deploy::{Payload, build_pod_spec, deployer::PAYLOAD_PREFIX, render_script};
use crate::fs::{FileSystem, RealFileSystem};

pub use crate::errors::{HarvestError, RunnerError};
pub use crate::harvest::ResultSet;
pub use crate::runner::Runner;
pub use crate::types::RunStatus;

/// High-level entry point used by `main.rs`.
///
/// Loads the config, runs the workload, and writes its results to
/// `--results-dir`. Ctrl-C cancels whatever wait is in progress.
pub async fn run(args: CliArgs) -> Result<()> {
    let config = load_and_validate(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;

    if args.dry_run {
        return print_dry_run(&config);
    }

    let cluster = KubeCluster::try_default()
        .await
        .context("connecting to the cluster")?;
    let mut runner = Runner::new(config, Arc::new(cluster));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("interrupt received; cancelling run");
            cancel.cancel();
        });
    }

    let outcome = runner.run(Duration::from_secs(args.timeout), cancel).await;
    save_results(
        &runner,
        outcome,
        &RealFileSystem,
        &args.results_dir,
        args.junit,
    )
    .await
}

/// Harvest whatever the workload served into `results_dir`.
///
/// Results are retrieved even when `outcome` is a failure, as long as the
/// run got as far as creating the result service. The run error is
/// reported ahead of any harvest error.
pub async fn save_results(
    runner: &Runner,
    outcome: std::result::Result<(), RunnerError>,
    fs: &dyn FileSystem,
    results_dir: &Path,
    junit: bool,
) -> Result<()> {
    let run_failure = outcome.err();
    if runner.service().is_none() {
        return match run_failure {
            Some(err) => Err(anyhow::Error::from(err).context("running workload")),
            None => Ok(()),
        };
    }

    let harvested = if junit {
        runner.retrieve_test_results().await
    } else {
        runner.retrieve_results().await
    };

    let (results, harvest_failure) = match harvested {
        Ok(results) => (results, None),
        Err(HarvestError { partial, source }) => (partial, Some(source)),
    };

    let written = results
        .write_to(fs, results_dir)
        .with_context(|| format!("writing results to {}", results_dir.display()));
    if written.is_ok() {
        info!(
            files = results.len(),
            dir = %results_dir.display(),
            "wrote results"
        );
    }

    if let Some(err) = run_failure {
        if let Some(harvest_err) = &harvest_failure {
            warn!(error = %harvest_err, "retrieving results after a failed run");
        }
        if let Err(write_err) = &written {
            warn!(error = %write_err, "saving results after a failed run");
        }
        return Err(anyhow::Error::from(err).context("running workload"));
    }

    written?;
    match harvest_failure {
        Some(err) => Err(anyhow::Error::from(err).context("retrieving results")),
        None => Ok(()),
    }
}

/// Print the payload script and the pod spec the runner would submit.
fn print_dry_run(config: &RunnerConfig) -> Result<()> {
    println!("podrunner dry-run");
    println!("  runner = {}", config.name);
    println!("  namespace = {}", config.namespace);
    println!();

    let image = match (&config.image_name, &config.image_stream) {
        (Some(name), _) if !name.is_empty() => name.clone(),
        (_, Some(stream)) => format!("<latest tag of {}/{}>", stream.namespace, stream.name),
        _ => "<unresolved>".to_string(),
    };

    let config_map = config.has_command().then(|| format!("{PAYLOAD_PREFIX}-xxxxx"));
    if config_map.is_some() {
        let script = render_script(&Payload {
            output_dir: &config.output_dir,
            cmd: config.cmd.as_deref().unwrap_or_default(),
            name: &config.name,
            tarball: config.tarball,
        });
        println!("payload script:");
        println!("{script}");
    }

    let spec = build_pod_spec(config, &image, config_map.as_deref())?;
    println!("pod spec:");
    println!("{}", serde_json::to_string_pretty(&spec)?);

    debug!("dry-run complete (nothing submitted)");
    Ok(())
}
