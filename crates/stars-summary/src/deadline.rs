//! `Deadline` availability summary (DP policy) and its `LDeltaFunction`
//! payload.
//!
//! # A note on monotonicity
//!
//! spec.md describes `LDeltaFunction` as "a non-increasing piecewise-linear
//! function `a(t)`". Taken literally that conflicts with its own use in
//! dispatch descent (§4.4): "largest number of tasks fittable before
//! `deadline` per child, computed from `LDeltaFunction` inversion" only
//! makes sense if more distant deadlines admit *more* work, i.e. `a` is
//! non-decreasing. This implementation takes `a(t)` to be the cumulative
//! free capacity available to a task whose own deadline is `t`, which is
//! non-decreasing in `t` by construction; the wording is treated as
//! terminology drift rather than a behavioural requirement (see
//! `DESIGN.md`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stars_core::TaskDescription;

use crate::cluster::{merge_clusters, reduce_clusters, Cluster};

/// Piecewise-linear cumulative free-capacity function.
///
/// Breakpoints are sorted by `t` ascending; `value` is non-decreasing.
/// Evaluation before the first breakpoint returns `0`; evaluation past the
/// last breakpoint extrapolates linearly using `power` (all capacity is
/// free once every committed deadline has passed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LDeltaFunction {
    points: Vec<(f64, f64)>,
    /// Power used to extrapolate past the last breakpoint.
    tail_power: f64,
}

impl LDeltaFunction {
    #[must_use]
    pub fn zero() -> Self {
        Self {
            points: vec![(0.0, 0.0)],
            tail_power: 0.0,
        }
    }

    /// Build `a(t)` from a worker's queue: `power` is the node's processing
    /// rate, `committed` is `(deadline, length)` for every queued/running
    /// task, in any order.
    #[must_use]
    pub fn from_queue(power: f64, committed: &[(f64, f64)]) -> Self {
        let mut sorted: Vec<(f64, f64)> = committed.to_vec();
        sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut points = vec![(0.0, 0.0)];
        let mut prev_deadline = 0.0_f64;
        let mut cumulative_free = 0.0_f64;

        for (deadline, length) in sorted {
            let span = (deadline - prev_deadline).max(0.0);
            let capacity = power * span;
            let free_in_span = (capacity - length).max(0.0);
            cumulative_free += free_in_span;
            points.push((deadline, cumulative_free));
            prev_deadline = deadline;
        }

        Self {
            points,
            tail_power: power,
        }
    }

    /// `a(t)`: cumulative free capacity available to a task with deadline
    /// `t`.
    #[must_use]
    pub fn eval(&self, t: f64) -> f64 {
        if t <= self.points[0].0 {
            return self.points[0].1;
        }
        let last = *self.points.last().unwrap();
        if t >= last.0 {
            return last.1 + self.tail_power * (t - last.0);
        }
        // Linear interpolation between the two bracketing breakpoints.
        let idx = self.points.partition_point(|&(pt, _)| pt <= t);
        let (t0, v0) = self.points[idx - 1];
        let (t1, v1) = self.points[idx];
        let frac = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
        v0 + frac * (v1 - v0)
    }

    fn union_times(&self, other: &Self) -> Vec<f64> {
        let mut times: Vec<f64> = self
            .points
            .iter()
            .chain(other.points.iter())
            .map(|&(t, _)| t)
            .collect();
        times.sort_by(|a, b| a.partial_cmp(b).unwrap());
        times.dedup_by(|a, b| (*a - *b).abs() < f64::EPSILON);
        times
    }

    /// Pointwise minimum of two availability profiles.
    #[must_use]
    pub fn min(&self, other: &Self) -> Self {
        self.combine(other, f64::min, self.tail_power.min(other.tail_power))
    }

    /// Pointwise maximum of two availability profiles.
    #[must_use]
    pub fn max(&self, other: &Self) -> Self {
        self.combine(other, f64::max, self.tail_power.max(other.tail_power))
    }

    /// Pointwise sum, used to join two nodes' capacity into one cluster's.
    #[must_use]
    pub fn sum(&self, other: &Self) -> Self {
        self.combine(
            other,
            |a, b| a + b,
            self.tail_power + other.tail_power,
        )
    }

    fn combine(&self, other: &Self, op: impl Fn(f64, f64) -> f64, tail_power: f64) -> Self {
        let times = self.union_times(other);
        let points = times
            .into_iter()
            .map(|t| (t, op(self.eval(t), other.eval(t))))
            .collect();
        Self { points, tail_power }
    }

    /// Simplify to at most `max_pieces` breakpoints by repeatedly dropping
    /// the interior point with the smallest linear-interpolation error
    /// (a bounded-piece reducer, spec.md §4.1).
    #[must_use]
    pub fn reduce(&self, max_pieces: usize) -> Self {
        let mut points = self.points.clone();
        let max_pieces = max_pieces.max(2);
        while points.len() > max_pieces {
            let mut best_idx = 1;
            let mut best_err = f64::MAX;
            for i in 1..points.len() - 1 {
                let (t0, v0) = points[i - 1];
                let (t1, v1) = points[i];
                let (t2, v2) = points[i + 1];
                let frac = if t2 > t0 { (t1 - t0) / (t2 - t0) } else { 0.0 };
                let interpolated = v0 + frac * (v2 - v0);
                let err = (interpolated - v1).abs();
                if err < best_err {
                    best_err = err;
                    best_idx = i;
                }
            }
            points.remove(best_idx);
        }
        Self {
            points,
            tail_power: self.tail_power,
        }
    }

    #[must_use]
    pub fn piece_count(&self) -> usize {
        self.points.len()
    }
}

/// Clustered deadline-availability summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadlineSummary {
    pub seq: u32,
    pub from_scheduler: bool,
    pub clusters: Vec<Cluster<LDeltaFunction>>,
}

/// The state a leaf worker reports when running the DP policy.
#[derive(Debug, Clone)]
pub struct DeadlineWorkerState {
    pub memory: f64,
    pub disk: f64,
    pub power: f64,
    /// `(deadline, length)` for every queued/running task.
    pub committed: Vec<(f64, f64)>,
    /// Horizon used as the cluster's conservative bound: the latest
    /// deadline among committed tasks (or `0` if idle).
    pub horizon: f64,
}

impl DeadlineSummary {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            seq: 0,
            from_scheduler: false,
            clusters: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_worker(state: DeadlineWorkerState) -> Self {
        let payload = LDeltaFunction::from_queue(state.power, &state.committed);
        Self {
            seq: 0,
            from_scheduler: true,
            clusters: vec![Cluster::singleton(
                state.memory,
                state.disk,
                state.power,
                state.horizon,
                payload,
            )],
        }
    }

    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        let mut clusters = self.clusters.clone();
        clusters.extend(other.clusters.iter().cloned());
        Self {
            seq: self.seq.max(other.seq),
            from_scheduler: false,
            clusters,
        }
    }

    #[must_use]
    pub fn reduce(&self, max_size: usize, piece_budget: usize) -> Self {
        let reduced = reduce_clusters(self.clusters.clone(), max_size, |a, b| a.sum(b));
        let reduced = reduced
            .into_iter()
            .map(|mut c| {
                c.payload = c.payload.reduce(piece_budget);
                c
            })
            .collect();
        Self {
            seq: self.seq,
            from_scheduler: self.from_scheduler,
            clusters: reduced,
        }
    }

    /// Indices of clusters fulfilling `req`, ordered by largest deadline
    /// slack first (spec.md §4.1's natural priority order for DP). `now` is
    /// the caller's clock, used to translate `req.deadline` into the same
    /// seconds-from-now basis as the clusters' `LDeltaFunction`s (built from
    /// each worker's own `now` at snapshot time).
    #[must_use]
    pub fn query(&self, req: &TaskDescription, now: DateTime<Utc>) -> Vec<usize> {
        let mut candidates: Vec<usize> = self
            .clusters
            .iter()
            .enumerate()
            .filter(|(_, c)| c.fulfils(req))
            .map(|(i, _)| i)
            .collect();
        candidates.sort_by(|&a, &b| {
            let slack_a = self.max_tasks_before(a, req, now);
            let slack_b = self.max_tasks_before(b, req, now);
            slack_b.cmp(&slack_a)
        });
        candidates
    }

    /// Largest number of tasks of `req`'s size fittable before `req`'s
    /// deadline at cluster `idx`, inverting its `LDeltaFunction` (spec.md
    /// §4.4's DP score). A best-effort (`deadline = None`) request is
    /// treated as fitting the tail of the horizon.
    #[must_use]
    pub fn max_tasks_before(&self, idx: usize, req: &TaskDescription, now: DateTime<Utc>) -> u32 {
        if req.length == 0 {
            return 0;
        }
        let deadline_secs = req
            .deadline
            .map(|d| (d - now).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(f64::MAX)
            .max(0.0);
        let available = self.clusters[idx].payload.eval(deadline_secs);
        (available / req.length as f64).floor().max(0.0) as u32
    }
}

/// Re-export at the module boundary for callers that only need the merge
/// helper during cross-crate testing.
pub use merge_clusters as merge_deadline_clusters;
