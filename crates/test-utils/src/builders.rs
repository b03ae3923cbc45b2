#![allow(dead_code)]

use std::path::PathBuf;

use k8s_openapi::api::core::v1::Container;
use podrunner::config::{GitRepoSpec, RunnerConfig, validate_config};

/// Builder for `RunnerConfig` to simplify test setup.
///
/// Starts from [`RunnerConfig::base`] with a fixed image so no image stream
/// lookup happens unless a test asks for one.
pub struct RunnerConfigBuilder {
    config: RunnerConfig,
}

impl RunnerConfigBuilder {
    pub fn new() -> Self {
        let mut config = RunnerConfig::base();
        config.image_name = Some("quay.io/example/runner:latest".to_string());
        config.namespace = "osde2e".to_string();
        Self { config }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.config.name = name.to_string();
        self
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.config.namespace = namespace.to_string();
        self
    }

    pub fn cmd(mut self, cmd: &str) -> Self {
        self.config.cmd = Some(cmd.to_string());
        self
    }

    /// Resolve the image from the default image stream.
    pub fn from_image_stream(mut self) -> Self {
        self.config.image_name = None;
        self
    }

    pub fn tarball(mut self) -> Self {
        self.config.tarball = true;
        self
    }

    pub fn repo(mut self, name: &str, url: &str, mount_path: &str) -> Self {
        self.config.repos.push(GitRepoSpec {
            name: name.to_string(),
            url: url.to_string(),
            mount_path: mount_path.to_string(),
            branch: None,
        });
        self
    }

    /// Append a sidecar container to the pod template.
    pub fn sidecar(mut self, name: &str, image: &str) -> Self {
        self.config.pod_spec.containers.push(Container {
            name: name.to_string(),
            image: Some(image.to_string()),
            ..Default::default()
        });
        self
    }

    pub fn target_container(mut self, index: usize) -> Self {
        self.config.target_container = index;
        self
    }

    pub fn skip_logs(mut self) -> Self {
        self.config.skip_logs_from_pod = true;
        self
    }

    pub fn report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.report_dir = dir.into();
        self
    }

    pub fn phase(mut self, phase: &str) -> Self {
        self.config.phase = phase.to_string();
        self
    }

    pub fn build(self) -> RunnerConfig {
        validate_config(&self.config).expect("Failed to build valid config from builder");
        self.config
    }
}

impl Default for RunnerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
