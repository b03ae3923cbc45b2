use std::io::Write;
use std::path::PathBuf;

use podrunner::config::{RunnerConfig, load_and_validate, load_from_path};
use podrunner::errors::RunnerError;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn empty_file_yields_the_base_config() {
    let file = write_config("");
    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg, RunnerConfig::base());
}

#[test]
fn full_config_overrides_the_base() {
    let file = write_config(
        r#"
[runner]
name = "must-gather"
namespace = "osde2e-abc12"
image_name = "quay.io/openshift/origin-cli:4.16"
cmd = "oc adm must-gather --dest-dir=/test-run-results"
tarball = true
skip_logs_from_pod = true

[[runner.repos]]
name = "e2e"
url = "https://github.com/example/e2e.git"
mount_path = "/e2e"
branch = "main"

[logs]
report_dir = "/tmp/report"
phase = "upgrade"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.name, "must-gather");
    assert_eq!(cfg.namespace, "osde2e-abc12");
    assert_eq!(cfg.image_name.as_deref(), Some("quay.io/openshift/origin-cli:4.16"));
    assert!(cfg.has_command());
    assert!(cfg.tarball && cfg.skip_logs_from_pod);
    assert_eq!(cfg.repos.len(), 1);
    assert_eq!(cfg.repos[0].branch.as_deref(), Some("main"));
    assert_eq!(cfg.report_dir, PathBuf::from("/tmp/report"));
    assert_eq!(cfg.phase, "upgrade");
    assert_eq!(cfg.output_dir, "/test-run-results");
}

#[test]
fn pod_spec_uses_kubernetes_field_names() {
    let file = write_config(
        r#"
[runner]
target_container = 1

[runner.pod_spec]
restartPolicy = "Never"

[[runner.pod_spec.containers]]
name = "proxy"
image = "quay.io/example/proxy:1"

[[runner.pod_spec.containers]]
name = "suite"

[[runner.pod_spec.containers.ports]]
name = "results"
containerPort = 8000
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.pod_spec.containers.len(), 2);
    assert_eq!(cfg.target_container, 1);
    let ports = cfg.pod_spec.containers[1].ports.as_ref().unwrap();
    assert_eq!(ports[0].container_port, 8000);
}

#[test]
fn unknown_keys_are_rejected() {
    let file = write_config("[runner]\nimage = \"typo\"\n");
    assert!(matches!(load_from_path(file.path()), Err(RunnerError::Toml(_))));
}

#[test]
fn invalid_values_are_config_errors() {
    let cases = [
        "[runner]\nname = \"Has_Upper\"\n",
        "[runner]\noutput_dir = \"relative/dir\"\n",
        "[runner]\ntarget_container = 4\n",
        r#"
[[runner.repos]]
name = "e2e"
url = "https://example.com/a.git"
mount_path = "/a"

[[runner.repos]]
name = "e2e"
url = "https://example.com/b.git"
mount_path = "/b"
"#,
    ];

    for case in cases {
        let file = write_config(case);
        match load_and_validate(file.path()) {
            Err(RunnerError::Config(_)) => {}
            other => panic!("expected config error for {case:?}, got {other:?}"),
        }
    }
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_and_validate("/nonexistent/Runner.toml").unwrap_err();
    assert!(matches!(err, RunnerError::Io(_)));
}
