#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use podrunner::Runner;
use podrunner::config::RunnerConfig;
use podrunner::fs::mock::MockFileSystem;

pub use podrunner_test_utils::{FakeCluster, RunnerConfigBuilder, init_tracing, with_timeout};

pub const RUN_TIMEOUT: Duration = Duration::from_secs(600);

/// Files `A` through `O`, each containing its own name.
pub fn letter_files() -> Vec<(String, Vec<u8>)> {
    ('A'..='O')
        .map(|c| (c.to_string(), c.to_string().into_bytes()))
        .collect()
}

/// A cluster serving the letter files plus the payload's captured stdout and
/// stderr for a runner named `name`.
pub fn serving_letters(name: &str) -> FakeCluster {
    letter_files()
        .into_iter()
        .fold(FakeCluster::new(), |cluster, (path, contents)| {
            cluster.with_file(&path, contents)
        })
        .with_file(&format!("{name}-out.txt"), "stdout line\n")
        .with_file(&format!("{name}-err.txt"), "stderr line\n")
}

/// Runner wired to `cluster` and an in-memory filesystem.
pub fn runner(config: RunnerConfig, cluster: &FakeCluster) -> (Runner, MockFileSystem) {
    let fs = MockFileSystem::new();
    let runner = Runner::new(config, Arc::new(cluster.clone())).with_fs(Arc::new(fs.clone()));
    (runner, fs)
}
