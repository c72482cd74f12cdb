//! Wire payloads that do not depend on the availability-summary types.
//!
//! Summary traffic is defined in `stars-summary` and folded into the
//! top-level tagged `Message` envelope in `stars-node`, which is the first
//! crate able to see every payload type. The payloads here are the ones
//! owned directly by the data model: requests, acceptance, abort, and
//! monitor traffic (spec.md §3, §4.5, §4.6).

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::task::{TaskBag, TaskState};

/// Sent by a leaf worker's local scheduler back to the requester after
/// admitting a prefix of a bag (spec.md §4.2). The heartbeat interval is
/// always advertised so asymmetric client/worker configurations converge on
/// the worker's value (spec.md §4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accept {
    pub request_id: i64,
    pub first_task_id: u64,
    pub last_task_id: u64,
    pub heartbeat_interval_secs: f64,
}

/// One task's reported state within a `TaskMonitor` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorEntry {
    pub client_task_id: u64,
    pub state: TaskState,
}

/// Periodic liveness/progress report sent by a worker to a task owner while
/// its queue is non-empty (spec.md §4.2, §4.6). One message per distinct
/// owner, listing every task of that owner's currently held at the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMonitor {
    pub owner: Address,
    pub heartbeat_interval_secs: f64,
    pub entries: Vec<MonitorEntry>,
}

/// Requester-initiated abort of specific tasks at a worker (spec.md §4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbortRequest {
    pub request_id: i64,
    pub task_ids: Vec<u64>,
}

/// A task bag routed toward a worker, carrying the originating request id so
/// the eventual `Accept`/`TaskMonitor` traffic can be correlated back to the
/// submitter's pending request.
pub type RoutedBag = TaskBag;

/// Sent by the root dispatcher back to a bag's requester when a descent
/// step cannot place every task (spec.md §4.4, step 5: "If the dispatcher
/// is the root and tasks remain unplaced, return them to the requester
/// (IBP/DP)"). Covers only the still-unplaced sub-range of the original
/// request; the requester re-readies those tasks and retries immediately
/// rather than waiting out the full `requestTimeout`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reject {
    pub request_id: i64,
    pub first_task_id: u64,
    pub last_task_id: u64,
}
