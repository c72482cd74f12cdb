//! `Basic` availability summary (IBP policy).
//!
//! Equivalent to a free/busy bitmask: the subtree is summarised as a count
//! of currently-free worker slots out of the total slots known. There is no
//! clustering vector for this variant -- a single free/busy count is already
//! bounded in size, so `reduce` is a no-op.

use serde::{Deserialize, Serialize};

use stars_core::TaskDescription;

/// The state a leaf worker reports when running the IBP policy: whether it
/// is currently free to accept a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicWorkerState {
    pub free: bool,
}

/// Free/busy summary of a subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicSummary {
    pub seq: u32,
    pub from_scheduler: bool,
    pub free_slots: u32,
    pub total_nodes: u32,
}

impl BasicSummary {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            seq: 0,
            from_scheduler: false,
            free_slots: 0,
            total_nodes: 0,
        }
    }

    #[must_use]
    pub fn from_worker(state: BasicWorkerState) -> Self {
        Self {
            seq: 0,
            from_scheduler: true,
            free_slots: u32::from(state.free),
            total_nodes: 1,
        }
    }

    /// Concatenative join: sums free and total slot counts. Associative and
    /// commutative, and a no-op when joined with [`BasicSummary::empty`].
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        Self {
            seq: self.seq.max(other.seq),
            from_scheduler: false,
            free_slots: self.free_slots + other.free_slots,
            total_nodes: self.total_nodes + other.total_nodes,
        }
    }

    /// Already `O(1)` in size; nothing to compress.
    #[must_use]
    pub fn reduce(&self, _max_size: usize) -> Self {
        self.clone()
    }

    /// The IBP dispatch score for a candidate child: its free-slot count
    /// (spec.md §4.4).
    #[must_use]
    pub fn query(&self, _req: &TaskDescription) -> u32 {
        self.free_slots
    }
}
