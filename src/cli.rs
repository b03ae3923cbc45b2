// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `podrunner`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "podrunner",
    version,
    about = "Run a command in a Kubernetes pod and retrieve the files it produces.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the runner config file (TOML).
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Seconds to wait for the workload to finish or start serving results.
    #[arg(long, value_name = "SECS", default_value_t = 3600)]
    pub timeout: u64,

    /// Directory harvested results are written to.
    #[arg(long, value_name = "DIR", default_value = "results")]
    pub results_dir: PathBuf,

    /// Fail unless the results contain passing JUnit reports.
    #[arg(long)]
    pub junit: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PODRUNNER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate the config and print the payload script and pod spec without
    /// contacting the cluster.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = CliArgs::parse_from(["podrunner"]);
        assert_eq!(args.config, PathBuf::from("Runner.toml"));
        assert_eq!(args.timeout, 3600);
        assert!(!args.junit && !args.dry_run);
    }

    #[test]
    fn parses_every_flag() {
        let args = CliArgs::parse_from([
            "podrunner",
            "--config",
            "ci/Runner.toml",
            "--timeout",
            "120",
            "--results-dir",
            "/tmp/out",
            "--junit",
            "--log-level",
            "debug",
        ]);
        assert_eq!(args.timeout, 120);
        assert_eq!(args.results_dir, PathBuf::from("/tmp/out"));
        assert!(args.junit);
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    }
}
