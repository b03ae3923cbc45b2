// src/cluster/mod.rs

//! Cluster capability surface.
//!
//! The runner talks to a `ClusterApi` instead of a raw `kube::Client`. This
//! keeps the lifecycle logic independent of the API server, and lets tests
//! provide a scripted fake.
//!
//! - [`ClusterApi`] lists exactly the operations the runner needs.
//! - [`KubeCluster`] implements them with `kube` / `k8s-openapi`.
//!
//! "Not found" is reported as `Ok(None)` by the getters so callers can
//! treat it as retryable inside their wait windows.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::io::AsyncRead;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Pod, Service};

use crate::errors::Result;

pub mod client;

pub use client::KubeCluster;

/// A container log as a byte stream.
pub type LogStream = Pin<Box<dyn AsyncRead + Send>>;

#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap)
    -> Result<ConfigMap>;

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job>;

    /// Pods matching a label selector such as `job-name=runner-abcde`.
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>>;

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<Service>;

    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Option<Endpoints>>;

    /// HTTP GET proxied through the API server to `service:port/path`.
    ///
    /// `path` is relative to the served root and has no leading slash; an
    /// empty path fetches the root listing.
    async fn proxy_get(
        &self,
        namespace: &str,
        service: &str,
        port: i32,
        path: &str,
    ) -> Result<Vec<u8>>;

    /// Open the log stream of one container of a pod.
    async fn container_logs(&self, namespace: &str, pod: &str, container: &str)
    -> Result<LogStream>;

    /// Pull spec of the most recently created tag of an image stream.
    async fn latest_image_stream_tag(&self, namespace: &str, stream: &str) -> Result<String>;
}
