// src/harvest/junit.rs

//! Pass/fail check over JUnit reports found in a result set.

use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use crate::errors::{ErrorList, Result, RunnerError};
use crate::harvest::results::ResultSet;

static SUITE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<testsuites?[\s/>]").expect("suite pattern is valid"));

static SUITE_CLOSED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</testsuites?\s*>|<testsuites?\b[^>]*/>").expect("suite close pattern is valid")
});

static TESTCASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<testcase[\s/>]").expect("testcase pattern is valid"));

static FAILURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(failure|error)[\s/>]").expect("failure pattern is valid"));

/// True for `junit*.xml` at any depth.
pub fn is_junit_report(path: &str) -> bool {
    let file = path.rsplit('/').next().unwrap_or(path);
    file.starts_with("junit") && file.ends_with(".xml")
}

/// Require at least one JUnit report, each well formed and free of failed
/// or errored test cases.
pub fn ensure_passing_junit(results: &ResultSet) -> Result<()> {
    let reports: Vec<(&str, &[u8])> = results
        .iter()
        .filter(|(path, _)| is_junit_report(path))
        .collect();

    if reports.is_empty() {
        return Err(RunnerError::MissingArtifacts(vec!["junit*.xml".to_string()]));
    }

    let mut errors = ErrorList::new();
    for (path, contents) in reports {
        let Ok(xml) = std::str::from_utf8(contents) else {
            errors.push(RunnerError::TestFailure(format!("{path} is not valid UTF-8")));
            continue;
        };

        if !SUITE_OPEN.is_match(xml) || !SUITE_CLOSED.is_match(xml) {
            errors.push(RunnerError::TestFailure(format!(
                "{path} is not a complete JUnit report"
            )));
            continue;
        }

        let cases = TESTCASE.find_iter(xml).count();
        let failed = FAILURE.find_iter(xml).count();
        info!(report = %path, cases, failed, "checked JUnit report");

        if failed > 0 {
            errors.push(RunnerError::TestFailure(format!(
                "{path}: {failed} of {cases} test case(s) failed"
            )));
        }
    }
    errors.into_result()
}
