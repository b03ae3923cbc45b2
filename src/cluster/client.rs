// src/cluster/client.rs

//! `ClusterApi` backed by a real API server.

use std::fmt;

use async_trait::async_trait;
use futures_util::io::{AsyncReadExt, Cursor};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Pod, Service};
use kube::api::{Api, DynamicObject, GroupVersionKind, ListParams, LogParams, PostParams};
use kube::discovery::ApiResource;
use kube::Client;
use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, RunnerError};

use super::{ClusterApi, LogStream};

/// Production implementation talking to the cluster through `kube`.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeCluster").finish_non_exhaustive()
    }
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the local kubeconfig or the in-cluster service account.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap> {
        let api: Api<ConfigMap> = self.api(namespace);
        Ok(api.create(&PostParams::default(), config_map).await?)
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        let api: Api<ConfigMap> = self.api(namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job> {
        let api: Api<Job> = self.api(namespace);
        Ok(api.create(&PostParams::default(), job).await?)
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = self.api(namespace);
        let pods = api.list(&ListParams::default().labels(label_selector)).await?;
        Ok(pods.items)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        let api: Api<Pod> = self.api(namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<Service> {
        let api: Api<Service> = self.api(namespace);
        Ok(api.create(&PostParams::default(), service).await?)
    }

    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Option<Endpoints>> {
        let api: Api<Endpoints> = self.api(namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn proxy_get(
        &self,
        namespace: &str,
        service: &str,
        port: i32,
        path: &str,
    ) -> Result<Vec<u8>> {
        let uri = proxy_uri(namespace, service, port, path);
        debug!(%uri, "proxying GET to service");

        let request = http::Request::get(&uri)
            .body(Vec::new())
            .map_err(|e| RunnerError::Cluster(format!("building proxy request {uri}: {e}")))?;

        let mut body = Box::pin(self.client.request_stream(request).await?);
        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;
        Ok(data)
    }

    async fn container_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
    ) -> Result<LogStream> {
        let api: Api<Pod> = self.api(namespace);
        let params = LogParams {
            container: Some(container.to_string()),
            ..Default::default()
        };
        // The stream borrows `api`, so drain it here. Bytes are kept as
        // written; logs are not required to be UTF-8.
        let mut stream = Box::pin(api.log_stream(pod, &params).await?);
        let mut data = Vec::new();
        stream.read_to_end(&mut data).await?;
        debug!(%pod, %container, bytes = data.len(), "fetched container log");
        Ok(Box::pin(Cursor::new(data)))
    }

    async fn latest_image_stream_tag(&self, namespace: &str, stream: &str) -> Result<String> {
        let gvk = GroupVersionKind::gvk("image.openshift.io", "v1", "ImageStream");
        let resource = ApiResource::from_gvk(&gvk);
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &resource);

        let image_stream = api.get(stream).await?;
        latest_tag_reference(&image_stream.data).ok_or_else(|| RunnerError::ImageResolution {
            stream: format!("{namespace}/{stream}"),
            reason: "image stream has no tagged images".to_string(),
        })
    }
}

/// Path of the API server's service proxy for `path` on `service:port`.
pub fn proxy_uri(namespace: &str, service: &str, port: i32, path: &str) -> String {
    format!(
        "/api/v1/namespaces/{namespace}/services/http:{service}:{port}/proxy/{}",
        path.trim_start_matches('/')
    )
}

/// Pick the `dockerImageReference` of the most recently created tag item.
///
/// `created` timestamps are RFC 3339 in UTC as written by the API server, so
/// they order correctly as strings.
fn latest_tag_reference(image_stream: &Value) -> Option<String> {
    image_stream
        .pointer("/status/tags")?
        .as_array()?
        .iter()
        .filter_map(|tag| {
            let newest = tag.pointer("/items/0")?;
            let created = newest.get("created")?.as_str()?;
            let reference = newest.get("dockerImageReference")?.as_str()?;
            Some((created, reference))
        })
        .max_by(|a, b| a.0.cmp(b.0))
        .map(|(_, reference)| reference.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn proxy_uri_targets_http_port() {
        assert_eq!(
            proxy_uri("ns", "runner-abcde", 8000, "/sub/a.txt"),
            "/api/v1/namespaces/ns/services/http:runner-abcde:8000/proxy/sub/a.txt"
        );
        assert_eq!(
            proxy_uri("ns", "svc", 8000, ""),
            "/api/v1/namespaces/ns/services/http:svc:8000/proxy/"
        );
    }

    #[test]
    fn picks_newest_tag() {
        let data = json!({
            "status": {
                "tags": [
                    { "tag": "4.12", "items": [
                        { "created": "2023-01-01T00:00:00Z", "dockerImageReference": "quay.io/cli@sha256:old" }
                    ]},
                    { "tag": "4.13", "items": [
                        { "created": "2023-06-01T00:00:00Z", "dockerImageReference": "quay.io/cli@sha256:new" },
                        { "created": "2023-02-01T00:00:00Z", "dockerImageReference": "quay.io/cli@sha256:older" }
                    ]},
                    { "tag": "empty", "items": [] }
                ]
            }
        });
        assert_eq!(
            latest_tag_reference(&data).as_deref(),
            Some("quay.io/cli@sha256:new")
        );
    }

    #[test]
    fn no_tags_means_no_reference() {
        assert_eq!(latest_tag_reference(&json!({ "status": {} })), None);
    }
}
