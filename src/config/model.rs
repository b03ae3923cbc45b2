// src/config/model.rs

use std::path::PathBuf;

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HTTPGetAction, PodSpec, Probe, SecurityContext,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Deserialize;

/// Port the payload serves its results on.
pub const RESULTS_PORT: i32 = 8000;
/// Name of the results port on the container and the service.
pub const RESULTS_PORT_NAME: &str = "results";

const DEFAULT_NAME: &str = "osde2e-runner";
const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [runner]
/// name = "must-gather"
/// namespace = "osde2e-abc12"
/// cmd = "oc adm must-gather --dest-dir=/test-run-results"
/// tarball = true
///
/// [runner.image_stream]
/// name = "cli"
/// namespace = "openshift"
///
/// [[runner.repos]]
/// name = "e2e"
/// url = "https://github.com/example/e2e.git"
/// mount_path = "/e2e"
/// branch = "main"
///
/// [logs]
/// report_dir = "./report"
/// phase = "install"
/// ```
///
/// Every field is optional; missing values fall back to
/// [`RunnerConfig::base`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub runner: RunnerSection,

    #[serde(default)]
    pub logs: LogsSection,
}

/// `[runner]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerSection {
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub image_name: Option<String>,
    pub image_stream: Option<ImageStreamRef>,
    pub cmd: Option<String>,
    pub output_dir: Option<String>,
    pub tarball: Option<bool>,
    pub skip_logs_from_pod: Option<bool>,
    pub target_container: Option<usize>,
    pub server: Option<String>,
    pub ca: Option<String>,
    pub token_file: Option<String>,

    /// Replaces the default pod spec entirely (Kubernetes camelCase keys).
    pub pod_spec: Option<PodSpec>,

    #[serde(default)]
    pub repos: Vec<GitRepoSpec>,
}

/// `[logs]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogsSection {
    pub report_dir: Option<PathBuf>,
    pub phase: Option<String>,
}

/// Image stream the runner image is resolved from when no explicit image
/// name is configured.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageStreamRef {
    pub name: String,
    pub namespace: String,
}

/// A git repository cloned by an init container and mounted into every
/// container of the workload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GitRepoSpec {
    pub name: String,
    pub url: String,
    pub mount_path: String,
    #[serde(default)]
    pub branch: Option<String>,
}

/// Everything a single run needs to know.
///
/// Cloning yields a fully independent value: the pod spec, its containers
/// and env lists, and the repo list are all owned.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Base name for every resource the runner creates.
    pub name: String,
    pub namespace: String,

    /// Image for the target container. When `None` it is resolved from
    /// `image_stream` at deploy time.
    pub image_name: Option<String>,
    pub image_stream: Option<ImageStreamRef>,

    /// Shell payload. Without one the container runs its image entrypoint.
    pub cmd: Option<String>,
    /// Directory inside the pod that is served back as results.
    pub output_dir: String,
    /// Serve a single `.tgz` of `output_dir` instead of individual files.
    pub tarball: bool,

    pub repos: Vec<GitRepoSpec>,
    pub pod_spec: PodSpec,
    /// Index into `pod_spec.containers` of the container that runs the
    /// payload.
    pub target_container: usize,

    pub server: String,
    pub ca: String,
    pub token_file: String,

    pub skip_logs_from_pod: bool,
    /// Container logs land in `report_dir/phase/containerLogs`.
    pub report_dir: PathBuf,
    pub phase: String,
}

impl RunnerConfig {
    /// A fresh configuration with the commonly desired settings.
    pub fn base() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            namespace: "default".to_string(),
            image_name: None,
            image_stream: Some(ImageStreamRef {
                name: "cli".to_string(),
                namespace: "openshift".to_string(),
            }),
            cmd: None,
            output_dir: "/test-run-results".to_string(),
            tarball: false,
            repos: Vec::new(),
            pod_spec: PodSpec {
                containers: vec![default_container()],
                restart_policy: Some("Never".to_string()),
                ..Default::default()
            },
            target_container: 0,
            server: "https://kubernetes.default".to_string(),
            ca: format!("{SERVICE_ACCOUNT_DIR}/ca.crt"),
            token_file: format!("{SERVICE_ACCOUNT_DIR}/token"),
            skip_logs_from_pod: false,
            report_dir: PathBuf::from("./report"),
            phase: "install".to_string(),
        }
    }

    /// Copy of this configuration for another payload, keeping the pod
    /// template and repos.
    pub fn with_command(&self, name: impl Into<String>, cmd: impl Into<String>) -> Self {
        let mut cfg = self.clone();
        cfg.name = name.into();
        cfg.cmd = Some(cmd.into());
        cfg
    }

    pub fn has_command(&self) -> bool {
        self.cmd.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::base()
    }
}

/// Container used by the default pod spec: serves results on port 8000 and
/// only reports ready once the results server answers.
pub fn default_container() -> Container {
    Container {
        ports: Some(vec![ContainerPort {
            name: Some(RESULTS_PORT_NAME.to_string()),
            container_port: RESULTS_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        image_pull_policy: Some("Always".to_string()),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/".to_string()),
                port: IntOrString::Int(RESULTS_PORT),
                ..Default::default()
            }),
            period_seconds: Some(7),
            ..Default::default()
        }),
        security_context: Some(SecurityContext {
            run_as_user: Some(0),
            ..Default::default()
        }),
        ..Default::default()
    }
}
