//! Task descriptions, in-flight bags, and the worker-local task record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::{CoreError, Result};

/// Resource and timing requirements shared by every task in a bag.
///
/// `length` is work in abstract units; `app_length` is the total work of the
/// enclosing application (used by the fair-slowness policy to compute
/// `stretch`); `deadline` is an absolute time, or `None` for best-effort
/// tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescription {
    pub length: u64,
    pub max_memory: u64,
    pub max_disk: u64,
    pub input_size: u64,
    pub output_size: u64,
    pub num_tasks: u32,
    pub deadline: Option<DateTime<Utc>>,
    pub app_length: u64,
}

impl TaskDescription {
    /// A description fulfils `self` if a resource budget `(memory, disk)`
    /// meets or exceeds this description's maxima. Used by cluster
    /// fulfilment checks in `stars-summary`.
    #[must_use]
    pub fn fits_resources(&self, memory: u64, disk: u64) -> bool {
        memory >= self.max_memory && disk >= self.max_disk
    }
}

/// A task bag in flight between a submitter and a worker.
///
/// `for_worker = true` marks the final assignment hop; otherwise the bag is
/// still being routed downward. A routing node may split a bag into
/// sub-bags that share `requester`/`request_id` but carry disjoint
/// `[first_task_id, last_task_id]` subranges; per spec, split sub-bags always
/// have `from_worker` forced to `false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskBag {
    pub requester: Address,
    pub request_id: i64,
    pub first_task_id: u64,
    pub last_task_id: u64,
    pub min_requirements: TaskDescription,
    pub for_worker: bool,
    pub from_worker: bool,
}

impl TaskBag {
    /// Number of tasks carried by this bag (inclusive range).
    #[must_use]
    pub fn len(&self) -> u64 {
        self.last_task_id - self.first_task_id + 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.first_task_id > self.last_task_id
    }

    /// Split off the first `count` tasks into a sub-bag suitable for
    /// forwarding down a single child. The remainder (if any) stays in
    /// `self`. Per spec §3, sub-bags always carry `from_worker = false`.
    ///
    /// Returns `None` if `count` is zero or exceeds the bag's length.
    pub fn split_prefix(&mut self, count: u64) -> Option<TaskBag> {
        if count == 0 || count > self.len() {
            return None;
        }
        let sub = TaskBag {
            requester: self.requester,
            request_id: self.request_id,
            first_task_id: self.first_task_id,
            last_task_id: self.first_task_id + count - 1,
            min_requirements: self.min_requirements.clone(),
            for_worker: false,
            from_worker: false,
        };
        self.first_task_id += count;
        Some(sub)
    }
}

/// Lifecycle state of a task at a worker.
///
/// Monotonic: once `Finished` or `Aborted`, no further transitions are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    Inactive,
    Prepared,
    Running,
    Finished,
    Aborted,
}

impl TaskState {
    /// Whether this state is terminal (no further transitions are legal).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Aborted)
    }
}

/// A task as tracked by a worker's local scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: u64,
    pub owner: Address,
    pub client_request_id: i64,
    pub client_task_id: u64,
    pub description: TaskDescription,
    pub creation_time: DateTime<Utc>,
    state: TaskState,
}

impl Task {
    #[must_use]
    pub fn new(
        task_id: u64,
        owner: Address,
        client_request_id: i64,
        client_task_id: u64,
        description: TaskDescription,
        creation_time: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            owner,
            client_request_id,
            client_task_id,
            description,
            creation_time,
            state: TaskState::Inactive,
        }
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Attempt to move this task to `new_state`. Rejects any transition out
    /// of a terminal state, per the monotonic state rule in spec.md §3.
    pub fn transition(&mut self, new_state: TaskState) -> Result<()> {
        if self.state.is_terminal() {
            return Err(CoreError::InvalidTransition {
                task_id: self.task_id,
                reason: format!("task already {:?}, cannot move to {:?}", self.state, new_state),
            });
        }
        tracing::debug!(
            task_id = self.task_id,
            from = ?self.state,
            to = ?new_state,
            "task state transition"
        );
        self.state = new_state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc() -> TaskDescription {
        TaskDescription {
            length: 1000,
            max_memory: 512,
            max_disk: 100,
            input_size: 0,
            output_size: 0,
            num_tasks: 1,
            deadline: None,
            app_length: 1000,
        }
    }

    #[test]
    fn bag_len_and_split() {
        let mut bag = TaskBag {
            requester: Address::new(1),
            request_id: 1,
            first_task_id: 0,
            last_task_id: 9,
            min_requirements: desc(),
            for_worker: false,
            from_worker: true,
        };
        assert_eq!(bag.len(), 10);

        let sub = bag.split_prefix(4).unwrap();
        assert_eq!(sub.first_task_id, 0);
        assert_eq!(sub.last_task_id, 3);
        assert!(!sub.from_worker);
        assert_eq!(bag.first_task_id, 4);
        assert_eq!(bag.len(), 6);
    }

    #[test]
    fn split_rejects_over_count() {
        let mut bag = TaskBag {
            requester: Address::new(1),
            request_id: 1,
            first_task_id: 0,
            last_task_id: 2,
            min_requirements: desc(),
            for_worker: false,
            from_worker: true,
        };
        assert!(bag.split_prefix(10).is_none());
        assert!(bag.split_prefix(0).is_none());
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let mut task = Task::new(1, Address::new(1), 1, 0, desc(), Utc::now());
        task.transition(TaskState::Prepared).unwrap();
        task.transition(TaskState::Running).unwrap();
        task.transition(TaskState::Finished).unwrap();

        let err = task.transition(TaskState::Running).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }
}
