// src/logs.rs

//! Container log collection into the report directory.

use std::path::{Path, PathBuf};

use futures_util::io::AsyncReadExt;
use tracing::{info, warn};

use crate::cluster::ClusterApi;
use crate::deploy::WorkloadInstance;
use crate::errors::{ErrorList, Result, RunnerError};
use crate::fs::FileSystem;

pub const LOGS_DIR: &str = "containerLogs";

/// `report_dir/phase/containerLogs`.
pub fn logs_dir(report_dir: &Path, phase: &str) -> PathBuf {
    report_dir.join(phase).join(LOGS_DIR)
}

/// Save the log of every container reported in the pod's status.
///
/// Fetching the pod is the only fatal step. Each container is attempted
/// regardless of earlier failures; failures are returned together.
pub async fn collect_logs(
    cluster: &dyn ClusterApi,
    fs: &dyn FileSystem,
    instance: &WorkloadInstance,
    report_dir: &Path,
    phase: &str,
) -> Result<()> {
    let pod = cluster
        .get_pod(&instance.namespace, &instance.pod_name)
        .await?
        .ok_or_else(|| {
            RunnerError::Cluster(format!(
                "pod {}/{} not found while collecting logs",
                instance.namespace, instance.pod_name
            ))
        })?;

    let containers: Vec<String> = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .into_iter()
        .flatten()
        .map(|s| s.name.clone())
        .collect();

    let dir = logs_dir(report_dir, phase);
    let mut errors = ErrorList::new();

    for container in &containers {
        if let Err(reason) = save_container_log(cluster, fs, instance, &dir, container).await {
            warn!(pod = %instance.pod_name, %container, %reason, "failed to collect container log");
            errors.push(RunnerError::LogCollection {
                container: container.clone(),
                reason,
            });
        }
    }

    info!(
        pod = %instance.pod_name,
        containers = containers.len(),
        failed = errors.len(),
        dir = %dir.display(),
        "collected container logs"
    );
    errors.into_result()
}

async fn save_container_log(
    cluster: &dyn ClusterApi,
    fs: &dyn FileSystem,
    instance: &WorkloadInstance,
    dir: &Path,
    container: &str,
) -> std::result::Result<(), String> {
    let mut stream = cluster
        .container_logs(&instance.namespace, &instance.pod_name, container)
        .await
        .map_err(|e| format!("opening log stream: {e}"))?;

    let mut contents = Vec::new();
    stream
        .read_to_end(&mut contents)
        .await
        .map_err(|e| format!("reading log stream: {e}"))?;

    fs.create_dir_all(dir).map_err(|e| format!("{e:#}"))?;

    let path = dir.join(format!("{}-{container}.log", instance.pod_name));
    fs.write(&path, &contents).map_err(|e| format!("{e:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_dir_is_nested_under_the_phase() {
        assert_eq!(
            logs_dir(Path::new("/tmp/report"), "install"),
            PathBuf::from("/tmp/report/install/containerLogs")
        );
    }
}
