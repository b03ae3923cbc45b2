// src/errors.rs

//! Crate-wide error type, result alias and the error accumulator.

use std::fmt;

use thiserror::Error;

use crate::harvest::ResultSet;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("cluster API error: {0}")]
    Cluster(String),

    #[error("failed to resolve image from image stream '{stream}': {reason}")]
    ImageResolution { stream: String, reason: String },

    #[error("timed out after {elapsed_secs}s waiting for {what}{}", last_reason(.last))]
    Timeout {
        what: String,
        elapsed_secs: u64,
        last: Option<String>,
    },

    #[error("expected exactly one pod for job '{job}', found {count}")]
    MultiplePods { job: String, count: usize },

    #[error("pod '{pod}' entered phase {phase}")]
    PodFailed { pod: String, phase: String },

    #[error("timed out waiting for pod '{pod}' to start: still pending after {polls} polls")]
    PendingTimeout { pod: String, polls: u32 },

    #[error("container {container} failed with exit code {exit_code}, please refer to artifacts for results")]
    ContainerFailed { container: String, exit_code: i32 },

    #[error("suite has not run yet")]
    NotRun,

    #[error("failed to parse result listing at '/{path}': {reason}")]
    MalformedListing { path: String, reason: String },

    #[error("failed to download '{path}': {reason}")]
    Download { path: String, reason: String },

    #[error("logs for container '{container}': {reason}")]
    LogCollection { container: String, reason: String },

    #[error("results are missing expected artifacts: {}", .0.join(", "))]
    MissingArtifacts(Vec<String>),

    #[error("test results: {0}")]
    TestFailure(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Aggregate(ErrorList),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn last_reason(last: &Option<String>) -> String {
    match last {
        Some(reason) => format!(" (last error: {reason})"),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, RunnerError>;

/// Append-only accumulator for independent failures.
///
/// Mutated in place through `&mut self`, so nothing pushed can be lost by
/// forgetting to reassign a returned value.
#[derive(Debug, Default)]
pub struct ErrorList {
    errors: Vec<RunnerError>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: RunnerError) {
        self.errors.push(err);
    }

    /// Append every error from another list.
    pub fn extend(&mut self, other: ErrorList) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RunnerError> {
        self.errors.iter()
    }

    /// `Ok(())` when nothing was pushed, otherwise `RunnerError::Aggregate`.
    pub fn into_result(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(RunnerError::Aggregate(self))
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s) occurred:", self.errors.len())?;
        for err in &self.errors {
            write!(f, "\n\t* {err}")?;
        }
        Ok(())
    }
}

impl IntoIterator for ErrorList {
    type Item = RunnerError;
    type IntoIter = std::vec::IntoIter<RunnerError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

/// A failed harvest, together with whatever results were gathered before
/// the failure. `partial` is empty unless the failure was a malformed
/// listing or a failed results check.
#[derive(Error, Debug)]
#[error("failed retrieving results: {source}")]
pub struct HarvestError {
    pub partial: ResultSet,
    #[source]
    pub source: RunnerError,
}

impl HarvestError {
    pub fn new(source: RunnerError) -> Self {
        Self {
            partial: ResultSet::new(),
            source,
        }
    }

    pub fn with_partial(partial: ResultSet, source: RunnerError) -> Self {
        Self { partial, source }
    }
}

impl From<RunnerError> for HarvestError {
    fn from(source: RunnerError) -> Self {
        Self::new(source)
    }
}
