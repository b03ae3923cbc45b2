// src/runner.rs

//! The runner: deploy a workload, wait for it, collect its logs and serve
//! its results back to the caller.
//!
//! A [`Runner`] is a sequential control loop. It spawns no tasks; every
//! suspension point is a bounded wait in [`crate::wait`] that also stops as
//! soon as the run's cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cluster::ClusterApi;
use crate::config::RunnerConfig;
use crate::deploy::{WorkloadInstance, deploy};
use crate::errors::{HarvestError, Result, RunnerError};
use crate::fs::{FileSystem, RealFileSystem};
use crate::harvest::{ResultSet, ensure_passing_junit, harvest};
use crate::logs::collect_logs;
use crate::types::RunStatus;
use crate::wait::{ServiceEndpoint, create_service, wait_for_completion_or_endpoint, wait_running};

pub struct Runner {
    config: RunnerConfig,
    cluster: Arc<dyn ClusterApi>,
    fs: Arc<dyn FileSystem>,
    status: watch::Sender<RunStatus>,
    instance: Option<WorkloadInstance>,
    service: Option<ServiceEndpoint>,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(config: RunnerConfig, cluster: Arc<dyn ClusterApi>) -> Self {
        let (status, _) = watch::channel(RunStatus::Setup);
        Self {
            config,
            cluster,
            fs: Arc::new(RealFileSystem),
            status,
            instance: None,
            service: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Filesystem container logs are written to.
    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn status(&self) -> RunStatus {
        *self.status.borrow()
    }

    /// Receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.status.subscribe()
    }

    /// The workload deployed by the last run, if it got that far.
    pub fn instance(&self) -> Option<&WorkloadInstance> {
        self.instance.as_ref()
    }

    pub fn service(&self) -> Option<&ServiceEndpoint> {
        self.service.as_ref()
    }

    fn set_status(&self, status: RunStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            info!(runner = %self.config.name, from = %previous, to = %status, "runner status changed");
        }
    }

    /// Run the workload until its results are reachable or it has finished.
    ///
    /// `timeout` bounds the wait for completion; setup steps have their own
    /// fixed bounds. Container logs are collected even when the completion
    /// wait fails, and that failure takes precedence in the returned error.
    pub async fn run(&mut self, timeout: Duration, cancel: CancellationToken) -> Result<()> {
        self.set_status(RunStatus::Setup);
        self.instance = None;
        self.service = None;
        self.cancel = cancel.clone();

        let cluster = Arc::clone(&self.cluster);
        let cluster = cluster.as_ref();

        info!(runner = %self.config.name, namespace = %self.config.namespace, "starting runner");
        let instance = deploy(cluster, &self.config, &cancel).await?;
        self.instance = Some(instance.clone());

        wait_running(cluster, &instance, &cancel).await?;
        self.set_status(RunStatus::Running);

        let service = create_service(cluster, &self.config.name, &instance).await?;
        self.service = Some(service.clone());

        let completion =
            wait_for_completion_or_endpoint(cluster, &instance, &service, timeout, &cancel).await;

        let logs = if self.config.skip_logs_from_pod
            || matches!(completion, Err(RunnerError::Cancelled))
        {
            Ok(())
        } else {
            collect_logs(
                cluster,
                self.fs.as_ref(),
                &instance,
                &self.config.report_dir,
                &self.config.phase,
            )
            .await
        };

        match (completion, logs) {
            (Err(err), logs) => {
                if let Err(log_err) = logs {
                    warn!(runner = %self.config.name, error = %log_err, "log collection also failed");
                }
                Err(err)
            }
            (Ok(_), Err(log_err)) => Err(log_err),
            (Ok(how), Ok(())) => {
                info!(runner = %self.config.name, pod = %instance.pod_name, completion = ?how, "runner finished");
                self.set_status(RunStatus::Done);
                Ok(())
            }
        }
    }

    /// Download everything the workload wrote to its output directory.
    pub async fn retrieve_results(&self) -> std::result::Result<ResultSet, HarvestError> {
        let service = self.service.as_ref().ok_or(RunnerError::NotRun)?;
        harvest(self.cluster.as_ref(), service, &self.cancel).await
    }

    /// [`Runner::retrieve_results`], then require passing JUnit reports.
    /// On a failed check the full result set is returned with the error.
    pub async fn retrieve_test_results(&self) -> std::result::Result<ResultSet, HarvestError> {
        let results = self.retrieve_results().await?;
        match ensure_passing_junit(&results) {
            Ok(()) => Ok(results),
            Err(err) => Err(HarvestError::with_partial(results, err)),
        }
    }
}
