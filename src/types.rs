use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a runner.
///
/// Ordered: `Setup < Running < Done`. Within one `run` the status only ever
/// moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum RunStatus {
    #[default]
    Setup,
    Running,
    Done,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Setup => "setup",
            RunStatus::Running => "running",
            RunStatus::Done => "done",
        };
        f.write_str(s)
    }
}

/// Pod phase as reported in `status.phase`.
///
/// An unrecognised phase string maps to `Unknown`; a pod with no reported
/// phase yet is treated as `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// Phases from which a pod never recovers.
    pub fn is_failure(self) -> bool {
        matches!(self, PodPhase::Failed | PodPhase::Unknown)
    }

    pub fn of(pod: &k8s_openapi::api::core::v1::Pod) -> PodPhase {
        pod.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .map(|p| p.parse().unwrap_or(PodPhase::Unknown))
            .unwrap_or(PodPhase::Pending)
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

impl FromStr for PodPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(PodPhase::Pending),
            "Running" => Ok(PodPhase::Running),
            "Succeeded" => Ok(PodPhase::Succeeded),
            "Failed" => Ok(PodPhase::Failed),
            "Unknown" => Ok(PodPhase::Unknown),
            other => Err(format!("invalid pod phase: {other}")),
        }
    }
}
