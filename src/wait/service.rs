// src/wait/service.rs

//! The service that exposes the workload's result port.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::info;

use crate::cluster::ClusterApi;
use crate::config::{RESULTS_PORT, RESULTS_PORT_NAME};
use crate::deploy::{WorkloadInstance, random_suffix};
use crate::errors::Result;

/// A created service in front of the workload pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub name: String,
    pub namespace: String,
    /// Port results are fetched from.
    pub port: i32,
}

/// Service selecting the pod's labels and exposing every declared container
/// port. The results port is added when no container declares it.
pub fn build_service(name: &str, app: &str, instance: &WorkloadInstance) -> Service {
    let mut ports: Vec<ServicePort> = instance
        .pod
        .spec
        .iter()
        .flat_map(|spec| spec.containers.iter())
        .flat_map(|c| c.ports.iter().flatten())
        .map(|p| ServicePort {
            name: p.name.clone(),
            protocol: p.protocol.clone(),
            port: p.container_port,
            ..Default::default()
        })
        .collect();

    let serves_results = ports
        .iter()
        .any(|p| p.name.as_deref() == Some(RESULTS_PORT_NAME) || p.port == RESULTS_PORT);
    if !serves_results {
        ports.push(ServicePort {
            name: Some(RESULTS_PORT_NAME.to_string()),
            protocol: Some("TCP".to_string()),
            port: RESULTS_PORT,
            ..Default::default()
        });
    }

    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([("app".to_string(), app.to_string())])),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(instance.labels.clone()),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Port named `results` on the service, or the default results port.
fn results_port(service: &Service) -> i32 {
    service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .and_then(|ports| {
            ports
                .iter()
                .find(|p| p.name.as_deref() == Some(RESULTS_PORT_NAME))
        })
        .map_or(RESULTS_PORT, |p| p.port)
}

/// Create the result service for `instance`.
pub async fn create_service(
    cluster: &dyn ClusterApi,
    app: &str,
    instance: &WorkloadInstance,
) -> Result<ServiceEndpoint> {
    let name = format!("{app}-{}", random_suffix());
    let service = build_service(&name, app, instance);
    let port = results_port(&service);

    cluster.create_service(&instance.namespace, &service).await?;
    info!(service = %name, pod = %instance.pod_name, port, "created result service");

    Ok(ServiceEndpoint {
        name,
        namespace: instance.namespace.clone(),
        port,
    })
}
