//! A min-heap timer wheel with idempotent cancellation.
//!
//! Every node in the system is a single-threaded cooperative event loop
//! (spec.md §5): a handler may only *schedule* follow-up work -- a timer, a
//! message send, or a local enqueue -- never block. [`TimerWheel`] is the
//! shared primitive behind every `reschedule`, `monitor`, `requestTimeout`,
//! and `heartbeatDeadline` timer in the workspace, so the ordering and
//! cancellation guarantees only need proving once.
//!
//! Timers fire in non-decreasing order of their scheduled time; ties break
//! by insertion order (spec.md §5). Cancelling a timer is idempotent, and
//! cancelling an already-fired timer is a no-op, via tombstoning rather than
//! heap removal (removing an arbitrary element from a binary heap is O(n);
//! tombstoning keeps `cancel` O(log n) amortized).
//!
//! `Time` is a type parameter rather than hard-coded to
//! [`std::time::Instant`] so tests can drive the wheel with a logical clock
//! (plain integers, matching the literal millisecond/second values used in
//! spec.md §8's end-to-end scenarios) instead of real wall-clock time.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

pub type TimerId = u64;

/// Milliseconds since an arbitrary node-local epoch. The canonical `Time`
/// parameter for every [`TimerWheel`] in the workspace: an integer so it is
/// `Ord`, fine-grained enough for the ±10% jitter spec.md §4.2/§4.6 require,
/// and trivially driven by a logical clock in tests.
pub type Millis = i64;

/// Convert a duration in seconds (as used throughout spec.md's configuration
/// keys) to [`Millis`].
#[must_use]
pub fn secs_to_millis(secs: f64) -> Millis {
    (secs * 1000.0).round() as Millis
}

struct Entry<Time> {
    at: Time,
    seq: u64,
    id: TimerId,
}

impl<Time: Ord> PartialEq for Entry<Time> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}
impl<Time: Ord> Eq for Entry<Time> {}
impl<Time: Ord> PartialOrd for Entry<Time> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<Time: Ord> Ord for Entry<Time> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.at, self.seq).cmp(&(&other.at, other.seq))
    }
}

/// A min-heap of pending timers keyed by absolute (or logical) time.
pub struct TimerWheel<Time: Ord + Copy, T> {
    heap: BinaryHeap<Reverse<Entry<Time>>>,
    payloads: HashMap<TimerId, T>,
    cancelled: HashSet<TimerId>,
    next_id: TimerId,
    next_seq: u64,
}

impl<Time: Ord + Copy, T> TimerWheel<Time, T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            payloads: HashMap::new(),
            cancelled: HashSet::new(),
            next_id: 1,
            next_seq: 0,
        }
    }

    /// Schedule `payload` to fire at `at`. Returns a handle that can be
    /// passed to [`TimerWheel::cancel`].
    pub fn schedule(&mut self, at: Time, payload: T) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        let seq = self.next_seq;
        self.next_seq += 1;

        self.heap.push(Reverse(Entry { at, seq, id }));
        self.payloads.insert(id, payload);
        id
    }

    /// Cancel a previously scheduled timer. Idempotent: cancelling an
    /// unknown, already-cancelled, or already-fired id is a no-op.
    pub fn cancel(&mut self, id: TimerId) {
        self.cancelled.insert(id);
        self.payloads.remove(&id);
    }

    /// The time of the next live (non-cancelled) timer, if any.
    pub fn next_fire_time(&mut self) -> Option<Time> {
        self.drop_stale_heads();
        self.heap.peek().map(|Reverse(e)| e.at)
    }

    /// Pop and return every live timer due at or before `now`, in
    /// non-decreasing fire order.
    pub fn pop_due(&mut self, now: Time) -> Vec<(TimerId, T)> {
        let mut due = Vec::new();
        loop {
            self.drop_stale_heads();
            match self.heap.peek() {
                Some(Reverse(e)) if e.at <= now => {
                    let Reverse(entry) = self.heap.pop().unwrap();
                    if let Some(payload) = self.payloads.remove(&entry.id) {
                        due.push((entry.id, payload));
                    }
                }
                _ => break,
            }
        }
        due
    }

    /// Drop cancelled/fired entries sitting at the top of the heap so that
    /// `peek` reflects a live timer.
    fn drop_stale_heads(&mut self) {
        while let Some(Reverse(e)) = self.heap.peek() {
            if self.cancelled.contains(&e.id) || !self.payloads.contains_key(&e.id) {
                self.heap.pop();
                self.cancelled.remove(&e.id);
            } else {
                break;
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}

impl<Time: Ord + Copy, T> Default for TimerWheel<Time, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_time_order_with_tie_break_on_insertion() {
        let mut wheel: TimerWheel<u64, &'static str> = TimerWheel::new();
        wheel.schedule(10, "b-first-at-10");
        wheel.schedule(5, "a-at-5");
        wheel.schedule(10, "c-second-at-10");

        let due = wheel.pop_due(10);
        let payloads: Vec<_> = due.iter().map(|(_, p)| *p).collect();
        assert_eq!(payloads, vec!["a-at-5", "b-first-at-10", "c-second-at-10"]);
    }

    #[test]
    fn cancel_is_idempotent_and_skips_fired_timer() {
        let mut wheel: TimerWheel<u64, &'static str> = TimerWheel::new();
        let id = wheel.schedule(5, "only");
        wheel.cancel(id);
        wheel.cancel(id); // idempotent, no panic

        assert!(wheel.pop_due(100).is_empty());
        assert!(wheel.next_fire_time().is_none());
    }

    #[test]
    fn cancel_after_fire_is_noop() {
        let mut wheel: TimerWheel<u64, &'static str> = TimerWheel::new();
        let id = wheel.schedule(1, "fires");
        let due = wheel.pop_due(1);
        assert_eq!(due.len(), 1);
        wheel.cancel(id); // no-op, already fired
        assert!(wheel.pop_due(100).is_empty());
    }

    #[test]
    fn pop_due_respects_horizon() {
        let mut wheel: TimerWheel<u64, u32> = TimerWheel::new();
        wheel.schedule(100, 1);
        wheel.schedule(200, 2);

        assert!(wheel.pop_due(50).is_empty());
        let due = wheel.pop_due(150);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1, 1);
        assert_eq!(wheel.next_fire_time(), Some(200));
    }
}
