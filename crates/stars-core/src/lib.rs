//! STaRS core data model.
//!
//! This crate provides the foundational types shared by every other crate
//! in the workspace:
//!
//! - **[`address`]** -- opaque, totally-ordered node addresses.
//! - **[`task`]** -- [`TaskDescription`], [`TaskBag`], and the worker-local
//!   [`Task`] record with its monotonic state machine.
//! - **[`submission`]** -- the submitter-side [`SubmissionRecord`] and its
//!   task/request bookkeeping.
//! - **[`message`]** -- wire payloads that do not depend on availability
//!   summaries (`Accept`, `TaskMonitor`, `AbortRequest`, `Reject`).
//! - **[`config`]** -- the flat [`Config`] struct recognised by every
//!   component, loaded from TOML.
//! - **[`timer`]** -- [`timer::TimerWheel`], the min-heap timer primitive
//!   backing every `reschedule`/`monitor`/timeout in the workspace.
//! - **[`error`]** -- the unified [`CoreError`] type.

pub mod address;
pub mod config;
pub mod error;
pub mod message;
pub mod submission;
pub mod task;
pub mod timer;

pub use address::Address;
pub use config::Config;
pub use error::{CoreError, Result};
pub use message::{AbortRequest, Accept, MonitorEntry, Reject, TaskMonitor};
pub use submission::{RequestState, SubmissionRecord, SubmissionTask, SubmissionTaskState};
pub use task::{Task, TaskBag, TaskDescription, TaskState};
pub use timer::{secs_to_millis, Millis, TimerWheel};
