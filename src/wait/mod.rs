// src/wait/mod.rs

//! Lifecycle waits.
//!
//! - [`poll`] is the bounded, cancellable retry primitive all waits use.
//! - [`readiness`] waits for the pod to run.
//! - [`service`] creates the result service.
//! - [`completion`] waits for a ready endpoint or a finished pod.

pub mod completion;
pub mod poll;
pub mod readiness;
pub mod service;

pub use completion::{Completion, wait_for_completion_or_endpoint};
pub use poll::{Attempt, PendingBudget, PollPolicy, poll_until};
pub use readiness::wait_running;
pub use service::{ServiceEndpoint, create_service};
