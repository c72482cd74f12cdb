//! Admission policies (spec.md §4.2).
//!
//! Each policy answers two questions for [`crate::scheduler::LocalScheduler`]:
//! how many tasks at the head of an incoming bag to admit, and in what order
//! the queue should sit once they are. The functions here are pure so the
//! scheduler can unit-test admission decisions without a timer or executor.

use chrono::{DateTime, Utc};

use stars_core::TaskDescription;

/// Which admission rule a node's local scheduler is configured to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPolicy {
    /// IBP: accept at most one task, only into an empty queue.
    Immediate,
    /// MMP: accept the whole bag, FCFS order.
    Fcfs,
    /// DP: accept the whole bag only if every task (existing and new) still
    /// meets its deadline once inserted in deadline order.
    Deadline,
    /// FSP: accept the whole bag, then reorder by pairwise break-even
    /// slowness.
    FairSlowness,
}

/// Whether `desc` fits the node's static capacities (spec.md §4.2 rule 1,
/// shared by every policy).
#[must_use]
pub fn fits_static(desc: &TaskDescription, memory: f64, disk: f64) -> bool {
    desc.fits_resources(memory as u64, disk as u64)
}

/// The break-even ratio used to order two applications under FSP: the task
/// whose own length is a smaller fraction of its application's total length
/// runs first without increasing either task's slowness at the other's
/// expense (spec.md §4.2: "pairwise break-even slowness values").
#[must_use]
pub fn break_even_key(desc: &TaskDescription) -> f64 {
    let app_length = desc.app_length.max(1) as f64;
    desc.length as f64 / app_length
}

/// Ascending-deadline sort key; best-effort tasks (`deadline = None`) sort
/// last.
#[must_use]
pub fn deadline_key(desc: &TaskDescription) -> f64 {
    desc.deadline.map(|d| d.timestamp() as f64).unwrap_or(f64::MAX)
}

/// Whether every task in `queue` (processed strictly in the given order,
/// starting from `now` at rate `power`) would finish by its own deadline.
/// `queue` is `(length, deadline)`; a `None` deadline always passes.
#[must_use]
pub fn all_deadlines_met(
    power: f64,
    now: DateTime<Utc>,
    queue: &[(u64, Option<DateTime<Utc>>)],
) -> bool {
    let power = power.max(f64::EPSILON);
    let mut elapsed_secs = 0.0_f64;
    for &(length, deadline) in queue {
        elapsed_secs += length as f64 / power;
        if let Some(deadline) = deadline {
            let finish = now + chrono::Duration::milliseconds((elapsed_secs * 1000.0) as i64);
            if finish > deadline {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(length: u64, app_length: u64, deadline: Option<DateTime<Utc>>) -> TaskDescription {
        TaskDescription {
            length,
            max_memory: 1,
            max_disk: 1,
            input_size: 0,
            output_size: 0,
            num_tasks: 1,
            deadline,
            app_length,
        }
    }

    #[test]
    fn break_even_key_favours_smaller_relative_length() {
        let big_app_small_task = desc(100, 1000, None);
        let small_app_big_task = desc(900, 1000, None);
        assert!(break_even_key(&big_app_small_task) < break_even_key(&small_app_big_task));
    }

    #[test]
    fn deadline_key_sorts_best_effort_last() {
        let now = Utc::now();
        let with_deadline = desc(1, 1, Some(now));
        let best_effort = desc(1, 1, None);
        assert!(deadline_key(&with_deadline) < deadline_key(&best_effort));
    }

    #[test]
    fn all_deadlines_met_detects_overrun() {
        let now = Utc::now();
        let tight = now + chrono::Duration::seconds(100);
        let queue = vec![(1000, Some(tight))];
        assert!(!all_deadlines_met(1.0, now, &queue));
        assert!(all_deadlines_met(100.0, now, &queue));
    }

    #[test]
    fn all_deadlines_met_ignores_best_effort() {
        let now = Utc::now();
        let queue = vec![(1_000_000, None)];
        assert!(all_deadlines_met(1.0, now, &queue));
    }
}
