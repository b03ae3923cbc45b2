// src/deploy/mod.rs

//! Workload deployment.
//!
//! - [`command`] renders the shell payload.
//! - [`git`] attaches cloned repositories to the pod spec.
//! - [`deployer`] creates the payload ConfigMap and the Job, and resolves
//!   the pod backing it.

pub mod command;
pub mod deployer;
pub mod git;

pub use command::{Payload, render_script};
pub use deployer::{WorkloadInstance, build_job, build_pod_spec, deploy, random_suffix};
pub use git::attach_repos;
