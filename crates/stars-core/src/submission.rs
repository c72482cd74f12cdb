//! Submitter-side bookkeeping: per-application submission records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::task::TaskDescription;

/// Lifecycle state of a task from the submitter's point of view.
///
/// `Ready -> Searching -> Executing -> {Finished | Aborted}`. `Aborted`
/// returns to `Ready` if retry budget remains (handled by the submission
/// supervisor, not encoded in the state itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubmissionTaskState {
    Ready,
    Searching,
    Executing,
    Finished,
    Aborted,
}

/// Submitter-side view of one task within an app instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionTask {
    pub state: SubmissionTaskState,
    pub assigned_worker: Option<Address>,
}

impl SubmissionTask {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SubmissionTaskState::Ready,
            assigned_worker: None,
        }
    }
}

impl Default for SubmissionTask {
    fn default() -> Self {
        Self::new()
    }
}

/// Bookkeeping for one outstanding `sendRequest` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestState {
    pub first_task_id: u64,
    pub last_task_id: u64,
    pub issued_at: DateTime<Utc>,
    pub retries: u32,
}

/// Per-application-instance submission record.
///
/// Survives until every task reaches `Finished` or is permanently `Aborted`
/// (retry budget exhausted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub app_id: u64,
    pub requirements: TaskDescription,
    pub tasks: BTreeMap<u64, SubmissionTask>,
    pub pending_requests: BTreeMap<i64, RequestState>,
}

impl SubmissionRecord {
    #[must_use]
    pub fn new(app_id: u64, requirements: TaskDescription, num_tasks: u64) -> Self {
        let tasks = (0..num_tasks).map(|id| (id, SubmissionTask::new())).collect();
        Self {
            app_id,
            requirements,
            tasks,
            pending_requests: BTreeMap::new(),
        }
    }

    /// Task ids currently in the `Ready` state, in id order.
    #[must_use]
    pub fn ready_task_ids(&self) -> Vec<u64> {
        self.tasks
            .iter()
            .filter(|(_, t)| t.state == SubmissionTaskState::Ready)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Number of tasks still in `{Ready, Searching, Executing}` -- the
    /// quantity the submission-progress invariant (spec.md §8, item 7)
    /// requires to be non-increasing absent aborts.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| {
                matches!(
                    t.state,
                    SubmissionTaskState::Ready
                        | SubmissionTaskState::Searching
                        | SubmissionTaskState::Executing
                )
            })
            .count()
    }

    /// Whether every task has reached a final outcome (the instance can be
    /// dropped by its owner).
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.tasks.values().all(|t| {
            matches!(
                t.state,
                SubmissionTaskState::Finished | SubmissionTaskState::Aborted
            )
        })
    }
}
