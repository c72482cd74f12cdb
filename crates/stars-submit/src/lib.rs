//! Submission supervisor and submitter-side heartbeat bookkeeping (C5 + C6,
//! spec.md §4.5-4.6).
//!
//! - [`supervisor`] -- [`supervisor::SubmissionSupervisor`], the stateful
//!   per-node component driving `submit`/`sendRequest`/`Accept`/
//!   `TaskMonitor`/`requestTimeout`/`heartbeatDeadline`.
//! - [`error`] -- [`error::SubmitError`].

pub mod error;
pub mod supervisor;

pub use error::SubmitError;
pub use supervisor::{SubmissionSupervisor, SupervisorEffect};
