mod common;

use std::path::Path;
use std::time::Duration;

use common::{RUN_TIMEOUT, RunnerConfigBuilder, init_tracing, runner, serving_letters, with_timeout};
use podrunner::errors::RunnerError;
use podrunner::fs::FileSystem;
use podrunner::types::PodPhase;
use podrunner::RunStatus;
use podrunner_test_utils::FakeCluster;
use podrunner_test_utils::fake_cluster::FAKE_IMAGE;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn run_deploys_waits_and_finishes() {
    init_tracing();
    let cluster = serving_letters("osde2e-runner");
    let config = RunnerConfigBuilder::new().cmd("./run-tests.sh").build();
    let (mut runner, _fs) = runner(config, &cluster);

    assert_eq!(runner.status(), RunStatus::Setup);
    with_timeout(runner.run(RUN_TIMEOUT, CancellationToken::new()))
        .await
        .unwrap();
    assert_eq!(runner.status(), RunStatus::Done);

    let calls = cluster.calls();
    let position = |op: &str| calls.iter().position(|c| c.starts_with(op)).unwrap();
    assert!(position("create_config_map") < position("create_job"));
    assert!(position("create_job") < position("create_service"));
    assert!(position("create_service") < position("get_endpoints"));

    let jobs = cluster.jobs();
    assert_eq!(jobs.len(), 1);
    let pod_spec = jobs[0].spec.as_ref().unwrap().template.spec.as_ref().unwrap();
    assert_eq!(pod_spec.containers[0].name, "osde2e-runner");
    assert_eq!(
        pod_spec.containers[0].command.as_deref().unwrap(),
        ["/osde2e-payload/payload.sh"]
    );

    let services = cluster.services();
    assert_eq!(services.len(), 1);
    let selector = services[0].spec.as_ref().unwrap().selector.as_ref().unwrap();
    assert_eq!(selector["job-name"], runner.instance().unwrap().job_name);
}

#[tokio::test(start_paused = true)]
async fn status_is_stable_without_run() {
    let cluster = FakeCluster::new();
    let (runner, _fs) = runner(RunnerConfigBuilder::new().build(), &cluster);

    assert_eq!(runner.status(), RunStatus::Setup);
    assert_eq!(runner.status(), RunStatus::Setup);
    assert!(cluster.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn status_only_moves_forward_within_a_run() {
    let cluster = FakeCluster::new()
        .with_phases([PodPhase::Pending, PodPhase::Running])
        .with_endpoints_ready_after(Some(2));
    let (mut runner, _fs) = runner(RunnerConfigBuilder::new().cmd("true").build(), &cluster);

    let mut rx = runner.subscribe();
    let observer = tokio::spawn(async move {
        let mut seen = vec![*rx.borrow_and_update()];
        while rx.changed().await.is_ok() {
            seen.push(*rx.borrow_and_update());
        }
        seen
    });

    runner.run(RUN_TIMEOUT, CancellationToken::new()).await.unwrap();
    assert_eq!(runner.status(), RunStatus::Done);
    assert_eq!(runner.status(), RunStatus::Done);
    drop(runner);

    let seen = observer.await.unwrap();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    assert!(seen.contains(&RunStatus::Running), "{seen:?}");
    assert_eq!(seen.last(), Some(&RunStatus::Done));
}

#[tokio::test(start_paused = true)]
async fn failed_pod_stops_before_creating_a_service() {
    let cluster = FakeCluster::new().with_phases([PodPhase::Failed]);
    let (mut runner, _fs) = runner(RunnerConfigBuilder::new().cmd("exit 1").build(), &cluster);

    let err = runner
        .run(RUN_TIMEOUT, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::PodFailed { ref phase, .. } if phase == "Failed"));
    assert_eq!(cluster.count("create_service"), 0);
    assert_ne!(runner.status(), RunStatus::Done);

    let harvest = runner.retrieve_results().await.unwrap_err();
    assert!(matches!(harvest.source, RunnerError::NotRun));
    assert!(harvest.partial.is_empty());
}

#[tokio::test(start_paused = true)]
async fn pod_stuck_pending_gives_up_after_twenty_polls() {
    let cluster = FakeCluster::new().with_phases([PodPhase::Pending]);
    let (mut runner, _fs) = runner(RunnerConfigBuilder::new().build(), &cluster);

    let start = Instant::now();
    let err = runner
        .run(RUN_TIMEOUT, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::PendingTimeout { polls: 21, .. }), "{err:?}");
    assert!(Instant::now() - start < Duration::from_secs(180));
}

#[tokio::test(start_paused = true)]
async fn pod_falling_back_to_pending_exhausts_the_completion_budget() {
    let cluster = FakeCluster::new()
        .with_phases([PodPhase::Running, PodPhase::Pending])
        .with_endpoints_ready_after(None);
    let (mut runner, _fs) = runner(RunnerConfigBuilder::new().build(), &cluster);

    let start = Instant::now();
    let err = runner
        .run(Duration::from_secs(3600), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::PendingTimeout { polls: 21, .. }), "{err:?}");
    assert_eq!(cluster.count("create_service"), 1);
    // 21 polls at 15s, well inside the run timeout.
    assert!(Instant::now() - start <= Duration::from_secs(21 * 15 + 60));
    assert_eq!(runner.status(), RunStatus::Running);
}

#[tokio::test(start_paused = true)]
async fn unknown_phase_is_fatal_while_starting() {
    let cluster = FakeCluster::new().with_phases([PodPhase::Unknown]);
    let (mut runner, _fs) = runner(RunnerConfigBuilder::new().build(), &cluster);

    let err = runner
        .run(RUN_TIMEOUT, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::PodFailed { ref phase, .. } if phase == "Unknown"), "{err:?}");
    assert_eq!(cluster.count("create_service"), 0);
}

#[tokio::test(start_paused = true)]
async fn unknown_phase_is_fatal_while_waiting_for_completion() {
    let cluster = FakeCluster::new()
        .with_phases([PodPhase::Running, PodPhase::Unknown])
        .with_endpoints_ready_after(None);
    let (mut runner, _fs) = runner(RunnerConfigBuilder::new().build(), &cluster);

    let start = Instant::now();
    let err = runner
        .run(RUN_TIMEOUT, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::PodFailed { ref phase, .. } if phase == "Unknown"), "{err:?}");
    assert_eq!(cluster.count("create_service"), 1);
    assert!(Instant::now() - start < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn more_than_one_pod_per_job_is_rejected() {
    let cluster = FakeCluster::new().with_pods_per_job(2);
    let (mut runner, _fs) = runner(RunnerConfigBuilder::new().build(), &cluster);

    let err = runner
        .run(RUN_TIMEOUT, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::MultiplePods { count: 2, .. }));
}

#[tokio::test(start_paused = true)]
async fn transient_setup_failures_are_retried() {
    let cluster = FakeCluster::new()
        .with_config_map_lag(2)
        .with_job_failures(2)
        .with_pod_lag(3);
    let (mut runner, _fs) = runner(RunnerConfigBuilder::new().cmd("true").build(), &cluster);

    runner.run(RUN_TIMEOUT, CancellationToken::new()).await.unwrap();

    assert_eq!(cluster.count("get_config_map"), 3);
    assert_eq!(cluster.count("create_job"), 3);
    assert_eq!(cluster.count("list_pods"), 4);
    assert_eq!(cluster.jobs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn config_map_that_never_appears_times_out() {
    let cluster = FakeCluster::new().with_config_map_lag(usize::MAX);
    let (mut runner, _fs) = runner(RunnerConfigBuilder::new().cmd("true").build(), &cluster);

    let err = runner
        .run(RUN_TIMEOUT, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::Timeout { ref what, .. } if what.contains("config map")));
    assert_eq!(cluster.count("create_job"), 0);
}

#[tokio::test(start_paused = true)]
async fn image_is_resolved_from_the_image_stream() {
    let cluster = FakeCluster::new();
    let config = RunnerConfigBuilder::new().from_image_stream().build();
    let (mut runner, _fs) = runner(config, &cluster);

    runner.run(RUN_TIMEOUT, CancellationToken::new()).await.unwrap();

    assert_eq!(cluster.count("latest_image_stream_tag openshift/cli"), 1);
    let job = &cluster.jobs()[0];
    let container = &job.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0];
    assert_eq!(container.image.as_deref(), Some(FAKE_IMAGE));
}

#[tokio::test(start_paused = true)]
async fn image_resolution_failure_is_fatal() {
    let cluster = FakeCluster::new().with_image_error("no tags");
    let config = RunnerConfigBuilder::new().from_image_stream().build();
    let (mut runner, _fs) = runner(config, &cluster);

    let err = runner
        .run(RUN_TIMEOUT, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::ImageResolution { .. }));
    assert!(cluster.jobs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn succeeded_pod_with_failed_container_reports_it_and_keeps_logs() {
    let cluster = FakeCluster::new()
        .with_phases([PodPhase::Running, PodPhase::Succeeded])
        .with_endpoints_ready_after(None)
        .with_exit_code("osde2e-runner", 3)
        .with_log("osde2e-runner", "FAIL: cluster health\n");
    let config = RunnerConfigBuilder::new().report_dir("/report").build();
    let (mut runner, fs) = runner(config, &cluster);

    let err = runner
        .run(RUN_TIMEOUT, CancellationToken::new())
        .await
        .unwrap_err();

    let RunnerError::Aggregate(errors) = err else {
        panic!("expected aggregate error");
    };
    assert_eq!(errors.len(), 1);
    assert!(errors.to_string().contains("container osde2e-runner failed with exit code 3"));

    let pod = &runner.instance().unwrap().pod_name;
    let log = format!("/report/install/containerLogs/{pod}-osde2e-runner.log");
    assert_eq!(
        fs.read(Path::new(&log)).unwrap(),
        b"FAIL: cluster health\n"
    );
    assert_eq!(runner.status(), RunStatus::Running);
}

#[tokio::test(start_paused = true)]
async fn succeeded_pod_without_endpoint_is_done() {
    let cluster = FakeCluster::new()
        .with_phases([PodPhase::Running, PodPhase::Running, PodPhase::Succeeded])
        .with_endpoints_ready_after(None);
    let (mut runner, _fs) = runner(RunnerConfigBuilder::new().skip_logs().build(), &cluster);

    runner.run(RUN_TIMEOUT, CancellationToken::new()).await.unwrap();

    assert_eq!(runner.status(), RunStatus::Done);
    assert_eq!(cluster.count("container_logs"), 0);
}

#[tokio::test(start_paused = true)]
async fn endpoint_errors_are_not_fatal() {
    let cluster = FakeCluster::new()
        .with_phases([PodPhase::Running, PodPhase::Running, PodPhase::Succeeded])
        .with_failing_endpoints();
    let (mut runner, _fs) = runner(RunnerConfigBuilder::new().build(), &cluster);

    runner.run(RUN_TIMEOUT, CancellationToken::new()).await.unwrap();
    assert!(cluster.count("get_endpoints") >= 2);
}

#[tokio::test(start_paused = true)]
async fn workload_that_never_finishes_hits_the_run_timeout() {
    let cluster = FakeCluster::new().with_endpoints_ready_after(None);
    let (mut runner, _fs) = runner(RunnerConfigBuilder::new().build(), &cluster);

    let err = runner
        .run(Duration::from_secs(120), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::Timeout { .. }), "{err:?}");
    // Logs are still gathered after the wait fails.
    assert_eq!(cluster.count("container_logs"), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_the_wait_promptly() {
    let cluster = FakeCluster::new().with_endpoints_ready_after(None);
    let (mut runner, _fs) = runner(RunnerConfigBuilder::new().build(), &cluster);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(40)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let err = runner.run(RUN_TIMEOUT, cancel).await.unwrap_err();

    assert!(matches!(err, RunnerError::Cancelled));
    assert!(Instant::now() - start < Duration::from_secs(45));
    assert_eq!(cluster.count("container_logs"), 0);
}

#[tokio::test(start_paused = true)]
async fn a_second_run_starts_from_setup() {
    let cluster = FakeCluster::new();
    let (mut runner, _fs) = runner(RunnerConfigBuilder::new().build(), &cluster);

    runner.run(RUN_TIMEOUT, CancellationToken::new()).await.unwrap();
    let first = runner.service().unwrap().name.clone();
    let mut rx = runner.subscribe();

    runner.run(RUN_TIMEOUT, CancellationToken::new()).await.unwrap();

    assert!(rx.has_changed().unwrap());
    assert_ne!(runner.service().unwrap().name, first);
    assert_eq!(cluster.jobs().len(), 2);
}
