// src/deploy/deployer.rs

//! Creates the workload: payload ConfigMap, Job, and the Pod behind it.

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::ByteString;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, EnvVar, Pod, PodSpec, PodTemplateSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::ClusterApi;
use crate::config::RunnerConfig;
use crate::deploy::command::{Payload, render_script};
use crate::deploy::git::attach_repos;
use crate::errors::{Result, RunnerError};
use crate::wait::poll::{Attempt, PollPolicy, poll_until};

pub const PAYLOAD_PREFIX: &str = "osde2e-payload";
pub const PAYLOAD_MOUNT_PATH: &str = "/osde2e-payload";
pub const PAYLOAD_SCRIPT: &str = "payload.sh";

const FAST_POLL: Duration = Duration::from_secs(5);
const CONFIG_MAP_CREATE_TIMEOUT: Duration = Duration::from_secs(30);
const JOB_CREATE_TIMEOUT: Duration = Duration::from_secs(90);
const POD_CREATE_TIMEOUT: Duration = Duration::from_secs(90);

/// A deployed job and the single pod it created.
#[derive(Debug, Clone)]
pub struct WorkloadInstance {
    pub namespace: String,
    pub job_name: String,
    pub pod_name: String,
    /// Labels of the pod; the result service selects on these.
    pub labels: BTreeMap<String, String>,
    /// The pod as first observed.
    pub pod: Pod,
    pub config_map: Option<String>,
}

/// Five random lowercase alphanumerics, used to keep names unique across
/// concurrent runs sharing a namespace.
pub fn random_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..5].to_string()
}

/// Deploy the workload described by `config` and resolve its pod.
pub async fn deploy(
    cluster: &dyn ClusterApi,
    config: &RunnerConfig,
    cancel: &CancellationToken,
) -> Result<WorkloadInstance> {
    let image = resolve_image(cluster, config).await?;
    info!(runner = %config.name, %image, "using image for runner");

    let config_map = if config.has_command() {
        Some(create_payload_config_map(cluster, config, cancel).await?)
    } else {
        None
    };

    let job_name = format!("{}-{}", config.name, random_suffix());
    let spec = build_pod_spec(config, &image, config_map.as_deref())?;
    let job = build_job(config, &job_name, spec);

    info!(runner = %config.name, job = %job_name, "creating runner job");
    submit_job(cluster, &config.namespace, &job, cancel).await?;

    let pod = resolve_pod(cluster, &config.namespace, &job_name, cancel).await?;
    let pod_name = pod.name_any();
    info!(job = %job_name, pod = %pod_name, "runner pod created");

    Ok(WorkloadInstance {
        namespace: config.namespace.clone(),
        job_name,
        pod_name,
        labels: pod.labels().clone(),
        pod,
        config_map,
    })
}

async fn resolve_image(cluster: &dyn ClusterApi, config: &RunnerConfig) -> Result<String> {
    if let Some(image) = config.image_name.as_deref().filter(|i| !i.is_empty()) {
        return Ok(image.to_string());
    }

    let stream = config.image_stream.as_ref().ok_or_else(|| {
        RunnerError::Config("no image name or image stream configured".to_string())
    })?;

    debug!(namespace = %stream.namespace, stream = %stream.name, "resolving latest image stream tag");
    cluster
        .latest_image_stream_tag(&stream.namespace, &stream.name)
        .await
        .map_err(|e| match e {
            e @ RunnerError::ImageResolution { .. } => e,
            other => RunnerError::ImageResolution {
                stream: format!("{}/{}", stream.namespace, stream.name),
                reason: other.to_string(),
            },
        })
}

async fn create_payload_config_map(
    cluster: &dyn ClusterApi,
    config: &RunnerConfig,
    cancel: &CancellationToken,
) -> Result<String> {
    let script = render_script(&Payload {
        output_dir: &config.output_dir,
        cmd: config.cmd.as_deref().unwrap_or_default(),
        name: &config.name,
        tarball: config.tarball,
    });

    let name = format!("{}-{}", PAYLOAD_PREFIX, random_suffix());
    let config_map = ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            labels: Some(BTreeMap::from([("app".to_string(), config.name.clone())])),
            ..Default::default()
        },
        binary_data: Some(BTreeMap::from([(
            PAYLOAD_SCRIPT.to_string(),
            ByteString(script.into_bytes()),
        )])),
        ..Default::default()
    };

    cluster
        .create_config_map(&config.namespace, &config_map)
        .await?;
    debug!(config_map = %name, "payload config map created; waiting for it to be visible");

    let namespace = config.namespace.as_str();
    let cm_name = name.as_str();
    poll_until(
        PollPolicy::immediate(FAST_POLL, CONFIG_MAP_CREATE_TIMEOUT),
        cancel,
        &format!("config map {cm_name}"),
        || async move {
            match cluster.get_config_map(namespace, cm_name).await {
                Ok(Some(_)) => Ok(Attempt::Done(())),
                Ok(None) => Ok(Attempt::Pending("not visible yet".to_string())),
                Err(e) => {
                    warn!(config_map = %cm_name, error = %e, "error fetching payload config map");
                    Ok(Attempt::Pending(e.to_string()))
                }
            }
        },
    )
    .await?;

    Ok(name)
}

/// Build the pod spec for the workload from the configured template.
///
/// The target container gets the image, the `OSDE2E=true` marker, the
/// cluster identity env vars and, when a payload exists, the payload script
/// as its command. Git repos are attached last so their mounts reach every
/// container.
pub fn build_pod_spec(
    config: &RunnerConfig,
    image: &str,
    config_map: Option<&str>,
) -> Result<PodSpec> {
    let mut spec = config.pod_spec.clone();
    let container_count = spec.containers.len();

    let target = spec
        .containers
        .get_mut(config.target_container)
        .ok_or_else(|| {
            RunnerError::Config(format!(
                "target container {} out of range ({} container(s))",
                config.target_container, container_count
            ))
        })?;

    if target.name.is_empty() {
        target.name = config.name.clone();
    }
    target.image = Some(image.to_string());
    target.env.get_or_insert_with(Vec::new).extend([
        env("OSDE2E", "true"),
        env("KUBE_SERVER", &config.server),
        env("KUBE_CA_FILE", &config.ca),
        env("KUBE_TOKEN_FILE", &config.token_file),
    ]);

    if let Some(cm) = config_map {
        target.command = Some(vec![format!("{PAYLOAD_MOUNT_PATH}/{PAYLOAD_SCRIPT}")]);
        target
            .volume_mounts
            .get_or_insert_with(Vec::new)
            .push(VolumeMount {
                name: cm.to_string(),
                mount_path: PAYLOAD_MOUNT_PATH.to_string(),
                ..Default::default()
            });
        spec.volumes.get_or_insert_with(Vec::new).push(Volume {
            name: cm.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: cm.to_string(),
                default_mode: Some(0o755),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    attach_repos(&mut spec, &config.repos);
    Ok(spec)
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

/// Wrap `spec` in a single-attempt Job.
pub fn build_job(config: &RunnerConfig, job_name: &str, spec: PodSpec) -> Job {
    let labels = BTreeMap::from([
        ("app".to_string(), config.name.clone()),
        ("job-name".to_string(), job_name.to_string()),
    ]);

    Job {
        metadata: ObjectMeta {
            name: Some(job_name.to_string()),
            labels: Some(BTreeMap::from([("app".to_string(), config.name.clone())])),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(spec),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

async fn submit_job(
    cluster: &dyn ClusterApi,
    namespace: &str,
    job: &Job,
    cancel: &CancellationToken,
) -> Result<()> {
    let job_name = job.name_any();
    let what = format!("job {job_name} to be created");
    poll_until(
        PollPolicy::immediate(FAST_POLL, JOB_CREATE_TIMEOUT),
        cancel,
        &what,
        || async move {
            match cluster.create_job(namespace, job).await {
                Ok(_) => Ok(Attempt::Done(())),
                Err(e) => {
                    warn!(job = %job.name_any(), error = %e, "error creating runner job");
                    Ok(Attempt::Pending(e.to_string()))
                }
            }
        },
    )
    .await
}

async fn resolve_pod(
    cluster: &dyn ClusterApi,
    namespace: &str,
    job_name: &str,
    cancel: &CancellationToken,
) -> Result<Pod> {
    let selector = format!("job-name={job_name}");
    let selector = selector.as_str();
    poll_until(
        PollPolicy::immediate(FAST_POLL, POD_CREATE_TIMEOUT),
        cancel,
        &format!("pod of job {job_name}"),
        || async move {
            let mut pods = match cluster.list_pods(namespace, selector).await {
                Ok(pods) => pods,
                Err(e) => {
                    warn!(job = %job_name, error = %e, "error listing runner pods");
                    return Ok(Attempt::Pending(e.to_string()));
                }
            };
            match pods.len() {
                0 => Ok(Attempt::Pending("job has no pod yet".to_string())),
                1 => Ok(Attempt::Done(pods.remove(0))),
                count => Err(RunnerError::MultiplePods {
                    job: job_name.to_string(),
                    count,
                }),
            }
        },
    )
    .await
}
