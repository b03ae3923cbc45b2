// src/wait/readiness.rs

//! Waits for the workload pod to start running.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cluster::ClusterApi;
use crate::deploy::WorkloadInstance;
use crate::errors::{Result, RunnerError};
use crate::types::PodPhase;
use crate::wait::poll::{Attempt, PendingBudget, PollPolicy, poll_until};

pub const READY_POLL: Duration = Duration::from_secs(5);
pub const READY_TIMEOUT: Duration = Duration::from_secs(180);

/// Poll the pod until it reaches `Running`.
///
/// `Failed`/`Unknown` abort at once. Every other observation (including the
/// pod not being visible yet) counts against the pending budget, which runs
/// out before the three-minute bound does.
pub async fn wait_running(
    cluster: &dyn ClusterApi,
    instance: &WorkloadInstance,
    cancel: &CancellationToken,
) -> Result<()> {
    let budget = PendingBudget::default();
    let budget = &budget;
    let namespace = instance.namespace.as_str();
    let pod_name = instance.pod_name.as_str();

    poll_until(
        PollPolicy::immediate(READY_POLL, READY_TIMEOUT),
        cancel,
        &format!("pod {namespace}/{pod_name} to start running"),
        || async move {
            let Some(pod) = cluster.get_pod(namespace, pod_name).await? else {
                budget.tick(pod_name)?;
                return Ok(Attempt::Pending("pod not found yet".to_string()));
            };

            match PodPhase::of(&pod) {
                PodPhase::Running => Ok(Attempt::Done(())),
                phase if phase.is_failure() => Err(RunnerError::PodFailed {
                    pod: pod_name.to_string(),
                    phase: phase.to_string(),
                }),
                phase => {
                    budget.tick(pod_name)?;
                    info!(pod = %pod_name, %namespace, %phase, "waiting for pod to start running");
                    Ok(Attempt::Pending(format!("pod is {phase}")))
                }
            }
        },
    )
    .await
}
