// src/wait/completion.rs

//! Waits until results are reachable or the workload has finished.

use std::time::Duration;

use k8s_openapi::api::core::v1::{Endpoints, Pod};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cluster::ClusterApi;
use crate::deploy::WorkloadInstance;
use crate::errors::{ErrorList, Result, RunnerError};
use crate::types::PodPhase;
use crate::wait::poll::{Attempt, PendingBudget, PollPolicy, poll_until};
use crate::wait::service::ServiceEndpoint;

pub const SLOW_POLL: Duration = Duration::from_secs(15);

/// How the wait ended successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The service has a ready address; results can be fetched while the
    /// workload keeps serving them.
    EndpointReady,
    /// The pod succeeded and every container exited with 0.
    Succeeded,
}

/// Poll every 15s until the result endpoint is ready or the pod is done.
///
/// A pod that succeeded with non-zero container exits yields an
/// [`RunnerError::Aggregate`] of one [`RunnerError::ContainerFailed`] per
/// failed container.
pub async fn wait_for_completion_or_endpoint(
    cluster: &dyn ClusterApi,
    instance: &WorkloadInstance,
    service: &ServiceEndpoint,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Completion> {
    let budget = PendingBudget::default();
    let budget = &budget;
    let namespace = instance.namespace.as_str();
    let pod_name = instance.pod_name.as_str();
    let service_name = service.name.as_str();

    poll_until(
        PollPolicy::delayed(SLOW_POLL, timeout),
        cancel,
        &format!("endpoints of service {namespace}/{service_name}"),
        || async move {
            match cluster.get_endpoints(namespace, service_name).await {
                Ok(Some(endpoints)) if has_ready_address(&endpoints) => {
                    info!(service = %service_name, "result endpoint is ready");
                    return Ok(Attempt::Done(Completion::EndpointReady));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(service = %service_name, error = %e, "unable to get endpoints");
                }
            }

            let pod = cluster.get_pod(namespace, pod_name).await?.ok_or_else(|| {
                RunnerError::Cluster(format!("pod {namespace}/{pod_name} no longer exists"))
            })?;

            let phase = PodPhase::of(&pod);
            match phase {
                PodPhase::Succeeded => {
                    container_failures(&pod).into_result()?;
                    info!(pod = %pod_name, "pod succeeded");
                    Ok(Attempt::Done(Completion::Succeeded))
                }
                p if p.is_failure() => {
                    warn!(pod = %pod_name, status = ?pod.status, "pod entered error state while waiting for endpoint");
                    Err(RunnerError::PodFailed {
                        pod: pod_name.to_string(),
                        phase: p.to_string(),
                    })
                }
                PodPhase::Pending => {
                    budget.tick(pod_name)?;
                    Ok(Attempt::Pending("pod is Pending".to_string()))
                }
                p => {
                    info!(pod = %pod_name, phase = %p, service = %service_name, "polling endpoint");
                    Ok(Attempt::Pending(format!("pod is {p}; endpoint has no ready address")))
                }
            }
        },
    )
    .await
}

/// True if any subset lists at least one ready address.
pub fn has_ready_address(endpoints: &Endpoints) -> bool {
    endpoints
        .subsets
        .iter()
        .flatten()
        .any(|subset| subset.addresses.as_ref().is_some_and(|a| !a.is_empty()))
}

/// One error per container whose last termination has a non-zero exit code.
pub fn container_failures(pod: &Pod) -> ErrorList {
    let mut errors = ErrorList::new();
    let statuses = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref());

    for status in statuses.into_iter().flatten() {
        let terminated = status
            .state
            .as_ref()
            .and_then(|s| s.terminated.as_ref())
            .or_else(|| status.last_state.as_ref().and_then(|s| s.terminated.as_ref()));

        if let Some(t) = terminated {
            if t.exit_code != 0 {
                errors.push(RunnerError::ContainerFailed {
                    container: status.name.clone(),
                    exit_code: t.exit_code,
                });
            }
        }
    }
    errors
}
