// src/deploy/command.rs

//! Renders the shell payload that runs inside the workload container.

use std::fmt::Write as _;

use crate::config::RESULTS_PORT;

/// Where the tarball is written and served from when `tarball` is set.
pub const TARBALL_DIR: &str = "/tmp/out";

/// Inputs of the rendered script.
#[derive(Debug, Clone, Copy)]
pub struct Payload<'a> {
    pub output_dir: &'a str,
    pub cmd: &'a str,
    pub name: &'a str,
    pub tarball: bool,
}

/// Render the payload script.
///
/// The script:
/// 1. creates `output_dir`,
/// 2. runs `cmd`, appending stdout to `{name}-out.txt` and stderr to
///    `{name}-err.txt` in `output_dir` while still echoing both,
/// 3. optionally packs `output_dir` into `/tmp/out/{name}.tgz`,
/// 4. serves the resulting directory over HTTP on the results port.
pub fn render_script(payload: &Payload<'_>) -> String {
    let out_dir = quote(payload.output_dir);
    let stdout_file = quote(&format!("{}/{}-out.txt", payload.output_dir, payload.name));
    let stderr_file = quote(&format!("{}/{}-err.txt", payload.output_dir, payload.name));

    let mut script = String::new();
    script.push_str("#!/usr/bin/env bash\n");
    script.push_str("set -o pipefail\n\n");
    let _ = writeln!(script, "mkdir -p {out_dir}");
    script.push('\n');
    script.push_str("{\n");
    script.push_str(payload.cmd.trim_end());
    script.push('\n');
    let _ = writeln!(
        script,
        "}} 2> >(tee -a {stderr_file} >&2) | tee -a {stdout_file}"
    );
    script.push('\n');

    let serve_dir = if payload.tarball {
        let tar_dir = quote(TARBALL_DIR);
        let tarball = quote(&format!("{}/{}.tgz", TARBALL_DIR, payload.name));
        script.push_str("# pack the whole output directory into one file\n");
        let _ = writeln!(script, "mkdir -p {tar_dir}");
        let _ = writeln!(script, "tar cvfz {tarball} {out_dir}");
        script.push('\n');
        tar_dir
    } else {
        out_dir
    };

    script.push_str("# make results available using HTTP\n");
    let _ = writeln!(script, "cd {serve_dir}");
    script.push_str("echo \"Starting server\"\n");
    script.push_str("if command -v python3 >/dev/null 2>&1; then\n");
    let _ = writeln!(script, "  exec python3 -m http.server {RESULTS_PORT}");
    script.push_str("else\n");
    let _ = writeln!(script, "  exec python -m SimpleHTTPServer {RESULTS_PORT}");
    script.push_str("fi\n");

    script
}

/// Single-quote a word for POSIX shells.
fn quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}
