//! The top-level wire envelope (spec.md §6: "self-describing tagged
//! records"). [`stars-core`] and [`stars-summary`] each own the payload
//! types; this is the first crate able to see every one of them, so the
//! tagged union lives here.

use serde::{Deserialize, Serialize};

use stars_core::{AbortRequest, Accept, Reject, TaskBag, TaskMonitor};
use stars_summary::AvailabilitySummary;

/// Every message type exchanged between nodes (spec.md §3, §4.2-§4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// A reduced availability summary flowing along a dispatcher link.
    Summary(AvailabilitySummary),
    /// A task bag routed downward, or a `sendRequest` bag routed upward.
    Bag(TaskBag),
    /// A local scheduler's admission response to a bag.
    Accept(Accept),
    /// A worker's periodic liveness/progress report to an owner.
    Monitor(TaskMonitor),
    /// A requester-initiated abort of specific tasks at a worker.
    Abort(AbortRequest),
    /// The root dispatcher bouncing an unplaced IBP/DP sub-range back to its
    /// requester (spec.md §4.4, step 5).
    Reject(Reject),
}

#[cfg(test)]
mod tests {
    use super::*;
    use stars_core::Address;
    use stars_summary::{BasicSummary, BasicWorkerState};

    #[test]
    fn summary_message_round_trips_through_json() {
        let msg = Message::Summary(AvailabilitySummary::Basic(BasicSummary::from_worker(
            BasicWorkerState { free: true },
        )));
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn accept_message_round_trips_through_json() {
        let msg = Message::Accept(Accept {
            request_id: 1,
            first_task_id: 0,
            last_task_id: 4,
            heartbeat_interval_secs: 30.0,
        });
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn abort_message_round_trips_through_json() {
        let msg = Message::Abort(AbortRequest {
            request_id: 1,
            task_ids: vec![0, 1, 2],
        });
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn reject_message_round_trips_through_json() {
        let msg = Message::Reject(Reject {
            request_id: 1,
            first_task_id: 2,
            last_task_id: 4,
        });
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn bag_message_round_trips_through_json() {
        let msg = Message::Bag(TaskBag {
            requester: Address::new(1),
            request_id: 1,
            first_task_id: 0,
            last_task_id: 2,
            min_requirements: stars_core::TaskDescription {
                length: 1,
                max_memory: 1,
                max_disk: 1,
                input_size: 0,
                output_size: 0,
                num_tasks: 1,
                deadline: None,
                app_length: 1,
            },
            for_worker: true,
            from_worker: true,
        });
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }
}
