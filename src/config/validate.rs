// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{RawConfigFile, RunnerConfig};
use crate::errors::{Result, RunnerError};

impl TryFrom<RawConfigFile> for RunnerConfig {
    type Error = RunnerError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let cfg = merge_with_base(raw);
        validate_config(&cfg)?;
        Ok(cfg)
    }
}

fn merge_with_base(raw: RawConfigFile) -> RunnerConfig {
    let mut cfg = RunnerConfig::base();
    let r = raw.runner;

    if let Some(name) = r.name {
        cfg.name = name;
    }
    if let Some(namespace) = r.namespace {
        cfg.namespace = namespace;
    }
    if r.image_name.is_some() {
        cfg.image_name = r.image_name;
    }
    if r.image_stream.is_some() {
        cfg.image_stream = r.image_stream;
    }
    cfg.cmd = r.cmd;
    if let Some(dir) = r.output_dir {
        cfg.output_dir = dir;
    }
    cfg.tarball = r.tarball.unwrap_or(cfg.tarball);
    cfg.skip_logs_from_pod = r.skip_logs_from_pod.unwrap_or(cfg.skip_logs_from_pod);
    cfg.target_container = r.target_container.unwrap_or(cfg.target_container);
    if let Some(server) = r.server {
        cfg.server = server;
    }
    if let Some(ca) = r.ca {
        cfg.ca = ca;
    }
    if let Some(token_file) = r.token_file {
        cfg.token_file = token_file;
    }
    if let Some(spec) = r.pod_spec {
        cfg.pod_spec = spec;
    }
    cfg.repos = r.repos;

    if let Some(dir) = raw.logs.report_dir {
        cfg.report_dir = dir;
    }
    if let Some(phase) = raw.logs.phase {
        cfg.phase = phase;
    }

    cfg
}

/// Check the invariants the deployer relies on.
pub fn validate_config(cfg: &RunnerConfig) -> Result<()> {
    validate_name(&cfg.name)?;
    validate_image(cfg)?;
    validate_output_dir(&cfg.output_dir)?;
    validate_target_container(cfg)?;
    validate_repos(cfg)?;
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    // Leaves room for the "-xxxxx" suffix within the 63-char label limit.
    if name.is_empty() || name.len() > 57 {
        return Err(RunnerError::Config(format!(
            "runner name must be 1-57 characters (got {:?})",
            name
        )));
    }
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid_chars || name.starts_with('-') || name.ends_with('-') {
        return Err(RunnerError::Config(format!(
            "runner name {:?} must consist of lowercase alphanumerics and '-'",
            name
        )));
    }
    Ok(())
}

fn validate_image(cfg: &RunnerConfig) -> Result<()> {
    let has_image = cfg.image_name.as_deref().is_some_and(|i| !i.is_empty());
    if !has_image && cfg.image_stream.is_none() {
        return Err(RunnerError::Config(
            "either runner.image_name or runner.image_stream must be set".to_string(),
        ));
    }
    Ok(())
}

fn validate_output_dir(dir: &str) -> Result<()> {
    if !dir.starts_with('/') {
        return Err(RunnerError::Config(format!(
            "runner.output_dir must be an absolute path (got {:?})",
            dir
        )));
    }
    Ok(())
}

fn validate_target_container(cfg: &RunnerConfig) -> Result<()> {
    let count = cfg.pod_spec.containers.len();
    if cfg.target_container >= count {
        return Err(RunnerError::Config(format!(
            "runner.target_container is {} but the pod spec has {} container(s)",
            cfg.target_container, count
        )));
    }
    Ok(())
}

fn validate_repos(cfg: &RunnerConfig) -> Result<()> {
    let mut seen = HashSet::new();
    for repo in &cfg.repos {
        if repo.name.is_empty() || repo.url.is_empty() || repo.mount_path.is_empty() {
            return Err(RunnerError::Config(format!(
                "repo {:?} must set name, url and mount_path",
                repo.name
            )));
        }
        if !seen.insert(repo.name.as_str()) {
            return Err(RunnerError::Config(format!(
                "repo name '{}' is used more than once",
                repo.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::GitRepoSpec;

    #[test]
    fn base_config_is_valid() {
        assert!(validate_config(&RunnerConfig::base()).is_ok());
    }

    #[test]
    fn rejects_uppercase_name() {
        let mut cfg = RunnerConfig::base();
        cfg.name = "Runner".into();
        assert!(matches!(validate_config(&cfg), Err(RunnerError::Config(_))));
    }

    #[test]
    fn rejects_missing_image_source() {
        let mut cfg = RunnerConfig::base();
        cfg.image_stream = None;
        cfg.image_name = None;
        let err = validate_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("image_stream"));
    }

    #[test]
    fn rejects_out_of_range_target_container() {
        let mut cfg = RunnerConfig::base();
        cfg.target_container = 1;
        let err = validate_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("target_container"));
    }

    #[test]
    fn rejects_duplicate_repo_names() {
        let mut cfg = RunnerConfig::base();
        let repo = GitRepoSpec {
            name: "e2e".into(),
            url: "https://example.com/e2e.git".into(),
            mount_path: "/e2e".into(),
            branch: None,
        };
        cfg.repos = vec![repo.clone(), repo];
        let err = validate_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }
}
