use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::io::Cursor;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{
    ConfigMap, ContainerState, ContainerStateRunning, ContainerStateTerminated,
    ContainerStateWaiting, ContainerStatus, EndpointAddress, EndpointSubset, Endpoints, Pod,
    PodStatus, Service,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use podrunner::cluster::{ClusterApi, LogStream};
use podrunner::errors::{Result, RunnerError};
use podrunner::types::PodPhase;

pub const FAKE_IMAGE: &str = "registry.example.com/openshift/cli@sha256:feed";

#[derive(Debug)]
struct State {
    config_maps: BTreeMap<String, ConfigMap>,
    /// `get_config_map` misses before a created map becomes visible.
    config_map_lag: usize,
    jobs: Vec<Job>,
    /// `create_job` calls that fail before one succeeds.
    job_failures: usize,
    pods: BTreeMap<String, Pod>,
    pods_per_job: usize,
    /// `list_pods` calls that see nothing before pods appear.
    pod_lag: usize,
    /// Phases returned by successive `get_pod` calls; the last one sticks.
    phases: VecDeque<PodPhase>,
    exit_codes: BTreeMap<String, i32>,
    services: Vec<Service>,
    /// `get_endpoints` calls before an address shows up; `None` never.
    endpoints_ready_after: Option<usize>,
    endpoint_polls: usize,
    endpoints_fail: bool,
    files: BTreeMap<String, Vec<u8>>,
    listings: BTreeMap<String, String>,
    /// Root listing fetches that fail before the server answers.
    listing_failures: usize,
    failing_paths: BTreeSet<String>,
    logs: BTreeMap<String, Vec<u8>>,
    failing_logs: BTreeSet<String>,
    image: std::result::Result<String, String>,
    calls: Vec<String>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            config_maps: BTreeMap::new(),
            config_map_lag: 0,
            jobs: Vec::new(),
            job_failures: 0,
            pods: BTreeMap::new(),
            pods_per_job: 1,
            pod_lag: 0,
            phases: VecDeque::from([PodPhase::Running]),
            exit_codes: BTreeMap::new(),
            services: Vec::new(),
            endpoints_ready_after: Some(0),
            endpoint_polls: 0,
            endpoints_fail: false,
            files: BTreeMap::new(),
            listings: BTreeMap::new(),
            listing_failures: 0,
            failing_paths: BTreeSet::new(),
            logs: BTreeMap::new(),
            failing_logs: BTreeSet::new(),
            image: Ok(FAKE_IMAGE.to_string()),
            calls: Vec::new(),
        }
    }
}

/// In-memory cluster with a scriptable workload.
///
/// By default the pod is `Running` on first look, the service endpoint is
/// ready at once and the result server serves whatever was added with
/// [`FakeCluster::with_file`]. Clones share state, so a test can keep a
/// handle for assertions after giving one to the runner.
#[derive(Debug, Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<State>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    // ---- scripting -------------------------------------------------------

    /// Phases the pod reports on successive `get_pod` calls.
    pub fn with_phases(self, phases: impl IntoIterator<Item = PodPhase>) -> Self {
        let phases: VecDeque<_> = phases.into_iter().collect();
        assert!(!phases.is_empty(), "at least one phase is required");
        self.lock().phases = phases;
        self
    }

    pub fn with_exit_code(self, container: &str, code: i32) -> Self {
        self.lock().exit_codes.insert(container.to_string(), code);
        self
    }

    pub fn with_pods_per_job(self, count: usize) -> Self {
        self.lock().pods_per_job = count;
        self
    }

    pub fn with_pod_lag(self, polls: usize) -> Self {
        self.lock().pod_lag = polls;
        self
    }

    pub fn with_config_map_lag(self, polls: usize) -> Self {
        self.lock().config_map_lag = polls;
        self
    }

    pub fn with_job_failures(self, count: usize) -> Self {
        self.lock().job_failures = count;
        self
    }

    pub fn with_endpoints_ready_after(self, polls: Option<usize>) -> Self {
        self.lock().endpoints_ready_after = polls;
        self
    }

    pub fn with_failing_endpoints(self) -> Self {
        self.lock().endpoints_fail = true;
        self
    }

    pub fn with_file(self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.lock().files.insert(path.to_string(), contents.into());
        self
    }

    /// Serve `html` as the listing of `dir` (`""` is the root) instead of
    /// the generated one.
    pub fn with_listing(self, dir: &str, html: &str) -> Self {
        self.lock().listings.insert(dir.to_string(), html.to_string());
        self
    }

    pub fn with_listing_failures(self, count: usize) -> Self {
        self.lock().listing_failures = count;
        self
    }

    pub fn with_failing_download(self, path: &str) -> Self {
        self.lock().failing_paths.insert(path.to_string());
        self
    }

    pub fn with_log(self, container: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.lock().logs.insert(container.to_string(), contents.into());
        self
    }

    pub fn with_failing_log(self, container: &str) -> Self {
        self.lock().failing_logs.insert(container.to_string());
        self
    }

    pub fn with_image_error(self, reason: &str) -> Self {
        self.lock().image = Err(reason.to_string());
        self
    }

    // ---- inspection ------------------------------------------------------

    /// Every API call made so far, e.g. `"create_job default/runner-ab12c"`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of calls whose description starts with `op`.
    pub fn count(&self, op: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.starts_with(op)).count()
    }

    pub fn config_maps(&self) -> Vec<ConfigMap> {
        self.lock().config_maps.values().cloned().collect()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.lock().jobs.clone()
    }

    pub fn services(&self) -> Vec<Service> {
        self.lock().services.clone()
    }

    // ---- helpers ---------------------------------------------------------

    fn record(state: &mut State, call: String) {
        state.calls.push(call);
    }

    fn listing_for(state: &State, dir: &str) -> String {
        if let Some(html) = state.listings.get(dir) {
            return html.clone();
        }

        let mut entries = BTreeSet::new();
        for path in state.files.keys() {
            if let Some(rest) = path.strip_prefix(dir) {
                match rest.split_once('/') {
                    Some((sub, _)) => entries.insert(format!("{sub}/")),
                    None => entries.insert(rest.to_string()),
                };
            }
        }

        let items: String = entries
            .iter()
            .map(|e| format!("<li><a href=\"{e}\">{e}</a></li>\n"))
            .collect();
        format!(
            "<!DOCTYPE HTML>\n<html>\n<head>\n<title>Directory listing for /{dir}</title>\n</head>\n\
             <body>\n<h1>Directory listing for /{dir}</h1>\n<hr>\n<ul>\n{items}</ul>\n<hr>\n</body>\n</html>\n"
        )
    }

    fn observe(state: &mut State, mut pod: Pod) -> Pod {
        let phase = if state.phases.len() > 1 {
            state.phases.pop_front().unwrap_or(PodPhase::Running)
        } else {
            state.phases.front().copied().unwrap_or(PodPhase::Running)
        };

        let containers: Vec<String> = pod
            .spec
            .iter()
            .flat_map(|s| s.containers.iter())
            .map(|c| c.name.clone())
            .collect();

        let statuses = containers
            .into_iter()
            .map(|name| {
                let container_state = match phase {
                    PodPhase::Succeeded | PodPhase::Failed => ContainerState {
                        terminated: Some(ContainerStateTerminated {
                            exit_code: state.exit_codes.get(&name).copied().unwrap_or(0),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                    PodPhase::Running => ContainerState {
                        running: Some(ContainerStateRunning::default()),
                        ..Default::default()
                    },
                    _ => ContainerState {
                        waiting: Some(ContainerStateWaiting {
                            reason: Some("ContainerCreating".to_string()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                };
                ContainerStatus {
                    name,
                    state: Some(container_state),
                    ..Default::default()
                }
            })
            .collect();

        pod.status = Some(PodStatus {
            phase: Some(phase.to_string()),
            container_statuses: Some(statuses),
            ..Default::default()
        });
        pod
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap> {
        let mut state = self.lock();
        let name = config_map.metadata.name.clone().unwrap_or_default();
        Self::record(&mut state, format!("create_config_map {namespace}/{name}"));
        state.config_maps.insert(name, config_map.clone());
        Ok(config_map.clone())
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        let mut state = self.lock();
        Self::record(&mut state, format!("get_config_map {namespace}/{name}"));
        if state.config_map_lag > 0 {
            state.config_map_lag -= 1;
            return Ok(None);
        }
        Ok(state.config_maps.get(name).cloned())
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job> {
        let mut state = self.lock();
        let job_name = job.metadata.name.clone().unwrap_or_default();
        Self::record(&mut state, format!("create_job {namespace}/{job_name}"));

        if state.job_failures > 0 {
            state.job_failures -= 1;
            return Err(RunnerError::Cluster("admission webhook unavailable".to_string()));
        }

        let template = job.spec.as_ref().map(|s| s.template.clone()).unwrap_or_default();
        for i in 0..state.pods_per_job {
            let pod_name = format!("{job_name}-pod{i}");
            let pod = Pod {
                metadata: ObjectMeta {
                    name: Some(pod_name.clone()),
                    namespace: Some(namespace.to_string()),
                    labels: template.metadata.as_ref().and_then(|m| m.labels.clone()),
                    ..Default::default()
                },
                spec: template.spec.clone(),
                status: None,
            };
            state.pods.insert(pod_name, pod);
        }
        state.jobs.push(job.clone());
        Ok(job.clone())
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        let mut state = self.lock();
        Self::record(&mut state, format!("list_pods {namespace} {label_selector}"));
        if state.pod_lag > 0 {
            state.pod_lag -= 1;
            return Ok(Vec::new());
        }

        let (key, value) = label_selector.split_once('=').unwrap_or((label_selector, ""));
        Ok(state
            .pods
            .values()
            .filter(|p| {
                p.metadata
                    .labels
                    .as_ref()
                    .and_then(|l| l.get(key))
                    .is_some_and(|v| v == value)
            })
            .cloned()
            .collect())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        let mut state = self.lock();
        Self::record(&mut state, format!("get_pod {namespace}/{name}"));
        match state.pods.get(name).cloned() {
            Some(pod) => Ok(Some(Self::observe(&mut state, pod))),
            None => Ok(None),
        }
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<Service> {
        let mut state = self.lock();
        let name = service.metadata.name.clone().unwrap_or_default();
        Self::record(&mut state, format!("create_service {namespace}/{name}"));
        state.services.push(service.clone());
        Ok(service.clone())
    }

    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Option<Endpoints>> {
        let mut state = self.lock();
        Self::record(&mut state, format!("get_endpoints {namespace}/{name}"));
        if state.endpoints_fail {
            return Err(RunnerError::Cluster("endpoints are forbidden".to_string()));
        }

        let polls = state.endpoint_polls;
        state.endpoint_polls += 1;
        let ready = state.endpoints_ready_after.is_some_and(|after| polls >= after);
        let addresses = ready.then(|| {
            vec![EndpointAddress {
                ip: "10.128.0.15".to_string(),
                ..Default::default()
            }]
        });

        Ok(Some(Endpoints {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            subsets: Some(vec![EndpointSubset {
                addresses,
                ..Default::default()
            }]),
        }))
    }

    async fn proxy_get(
        &self,
        namespace: &str,
        service: &str,
        port: i32,
        path: &str,
    ) -> Result<Vec<u8>> {
        let mut state = self.lock();
        Self::record(&mut state, format!("proxy_get {namespace}/{service}:{port}/{path}"));

        let known = state
            .services
            .iter()
            .any(|s| s.metadata.name.as_deref() == Some(service));
        if !known {
            return Err(RunnerError::Cluster(format!("service {service} not found")));
        }

        if path.is_empty() && state.listing_failures > 0 {
            state.listing_failures -= 1;
            return Err(RunnerError::Cluster("connection refused".to_string()));
        }
        if state.failing_paths.contains(path) {
            return Err(RunnerError::Cluster(format!("stream reset while reading /{path}")));
        }
        if path.is_empty() || path.ends_with('/') {
            return Ok(Self::listing_for(&state, path).into_bytes());
        }
        state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| RunnerError::Cluster(format!("404 Not Found: /{path}")))
    }

    async fn container_logs(&self, namespace: &str, pod: &str, container: &str) -> Result<LogStream> {
        let mut state = self.lock();
        Self::record(&mut state, format!("container_logs {namespace}/{pod}/{container}"));
        if state.failing_logs.contains(container) {
            return Err(RunnerError::Cluster(format!(
                "container {container} has no logs available"
            )));
        }
        let contents = state.logs.get(container).cloned().unwrap_or_default();
        Ok(Box::pin(Cursor::new(contents)))
    }

    async fn latest_image_stream_tag(&self, namespace: &str, stream: &str) -> Result<String> {
        let mut state = self.lock();
        Self::record(&mut state, format!("latest_image_stream_tag {namespace}/{stream}"));
        state.image.clone().map_err(|reason| RunnerError::ImageResolution {
            stream: format!("{namespace}/{stream}"),
            reason,
        })
    }
}
