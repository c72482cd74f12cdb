//! `Slowness` availability summary (FSP policy) and its `ZAFunction`
//! payload.
//!
//! spec.md §4.1: "Slowness (FSP) carries `ZAFunction`: a piecewise-linear
//! function `H(S, w)` estimating, for a candidate stretch bound `S`, the
//! total weighted slowness `w` incurred by admitting the request at this
//! cluster. Built by integrating the squared difference between a task's
//! wait time and `S * length` across the queue. Operations: `min`, `max`,
//! and a quality-parameterised piece-count reducer."

use serde::{Deserialize, Serialize};

use stars_core::TaskDescription;

use crate::cluster::{merge_clusters, reduce_clusters, Cluster};

/// Piecewise-linear `H(S, w)`: breakpoints are `(stretch_bound, slowness)`
/// sorted by `stretch_bound` ascending, with `slowness` non-increasing (a
/// more generous stretch bound can only reduce the incurred weighted
/// slowness).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZAFunction {
    points: Vec<(f64, f64)>,
}

impl ZAFunction {
    #[must_use]
    pub fn zero() -> Self {
        Self {
            points: vec![(0.0, 0.0)],
        }
    }

    /// Build `H(S, w)` from a worker's queue: `queue` is `(wait_time,
    /// length, weight)` for every queued/running task, in any order.
    /// `H` is sampled at `samples` evenly spaced stretch bounds between `0`
    /// and `max_stretch`.
    #[must_use]
    pub fn from_queue(queue: &[(f64, f64, f64)], max_stretch: f64, samples: usize) -> Self {
        let samples = samples.max(2);
        let mut points = Vec::with_capacity(samples);
        for i in 0..samples {
            let stretch_bound = max_stretch * (i as f64) / (samples - 1) as f64;
            let slowness: f64 = queue
                .iter()
                .map(|&(wait, length, weight)| {
                    let target = stretch_bound * length;
                    let diff = (wait - target).max(0.0);
                    weight * diff * diff
                })
                .sum();
            points.push((stretch_bound, slowness));
        }
        Self { points }
    }

    /// `H(S)`: total weighted slowness incurred at stretch bound `S`.
    #[must_use]
    pub fn eval(&self, stretch_bound: f64) -> f64 {
        if stretch_bound <= self.points[0].0 {
            return self.points[0].1;
        }
        let last = *self.points.last().unwrap();
        if stretch_bound >= last.0 {
            return last.1;
        }
        let idx = self
            .points
            .partition_point(|&(s, _)| s <= stretch_bound);
        let (s0, v0) = self.points[idx - 1];
        let (s1, v1) = self.points[idx];
        let frac = if s1 > s0 {
            (stretch_bound - s0) / (s1 - s0)
        } else {
            0.0
        };
        v0 + frac * (v1 - v0)
    }

    /// Smallest stretch bound achieving `H(S) <= max_slowness`, via
    /// bisection (the FSP dispatch score in spec.md §4.4 is "minimise the
    /// max slowness across candidate children").
    #[must_use]
    pub fn min_stretch_for(&self, max_slowness: f64) -> f64 {
        let (mut lo, mut hi) = (self.points[0].0, self.points.last().unwrap().0);
        if self.eval(hi) > max_slowness {
            return f64::INFINITY;
        }
        for _ in 0..64 {
            let mid = (lo + hi) / 2.0;
            if self.eval(mid) <= max_slowness {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        hi
    }

    fn union_times(&self, other: &Self) -> Vec<f64> {
        let mut times: Vec<f64> = self
            .points
            .iter()
            .chain(other.points.iter())
            .map(|&(s, _)| s)
            .collect();
        times.sort_by(|a, b| a.partial_cmp(b).unwrap());
        times.dedup_by(|a, b| (*a - *b).abs() < f64::EPSILON);
        times
    }

    /// Pointwise minimum of two slowness profiles (the more favourable of
    /// two candidates at every stretch bound).
    #[must_use]
    pub fn min(&self, other: &Self) -> Self {
        let times = self.union_times(other);
        let points = times
            .into_iter()
            .map(|s| (s, self.eval(s).min(other.eval(s))))
            .collect();
        Self { points }
    }

    /// Pointwise maximum.
    #[must_use]
    pub fn max(&self, other: &Self) -> Self {
        let times = self.union_times(other);
        let points = times
            .into_iter()
            .map(|s| (s, self.eval(s).max(other.eval(s))))
            .collect();
        Self { points }
    }

    /// Sum two nodes' slowness profiles into a cluster's (used by `reduce`'s
    /// payload merge).
    #[must_use]
    pub fn sum(&self, other: &Self) -> Self {
        let times = self.union_times(other);
        let points = times
            .into_iter()
            .map(|s| (s, self.eval(s) + other.eval(s)))
            .collect();
        Self { points }
    }

    /// Quality-parameterised piece-count reducer: `quality` in `[0, 1]`
    /// selects how many breakpoints survive, from `2` (quality `0`) up to
    /// the function's current piece count (quality `1`).
    #[must_use]
    pub fn reduce(&self, quality: f64) -> Self {
        let quality = quality.clamp(0.0, 1.0);
        let target = (2.0 + quality * (self.points.len() as f64 - 2.0)).round() as usize;
        let target = target.clamp(2, self.points.len());
        let mut points = self.points.clone();
        while points.len() > target {
            let mut best_idx = 1;
            let mut best_err = f64::MAX;
            for i in 1..points.len() - 1 {
                let (s0, v0) = points[i - 1];
                let (s1, v1) = points[i];
                let (s2, v2) = points[i + 1];
                let frac = if s2 > s0 { (s1 - s0) / (s2 - s0) } else { 0.0 };
                let interpolated = v0 + frac * (v2 - v0);
                let err = (interpolated - v1).abs();
                if err < best_err {
                    best_err = err;
                    best_idx = i;
                }
            }
            points.remove(best_idx);
        }
        Self { points }
    }

    #[must_use]
    pub fn piece_count(&self) -> usize {
        self.points.len()
    }
}

/// Clustered slowness-availability summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlownessSummary {
    pub seq: u32,
    pub from_scheduler: bool,
    pub clusters: Vec<Cluster<ZAFunction>>,
}

/// The state a leaf worker reports when running the FSP policy.
#[derive(Debug, Clone)]
pub struct SlownessWorkerState {
    pub memory: f64,
    pub disk: f64,
    pub power: f64,
    /// `(wait_time, length, weight)` for every queued/running task.
    pub queue: Vec<(f64, f64, f64)>,
    pub max_stretch_horizon: f64,
}

impl SlownessSummary {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            seq: 0,
            from_scheduler: false,
            clusters: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_worker(state: SlownessWorkerState, samples: usize) -> Self {
        let payload =
            ZAFunction::from_queue(&state.queue, state.max_stretch_horizon, samples);
        Self {
            seq: 0,
            from_scheduler: true,
            clusters: vec![Cluster::singleton(
                state.memory,
                state.disk,
                state.power,
                state.max_stretch_horizon,
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
    pub fn reduce(&self, max_size: usize, quality: f64) -> Self {
        let reduced = reduce_clusters(self.clusters.clone(), max_size, |a, b| a.sum(b));
        let reduced = reduced
            .into_iter()
            .map(|mut c| {
                c.payload = c.payload.reduce(quality);
                c
            })
            .collect();
        Self {
            seq: self.seq,
            from_scheduler: self.from_scheduler,
            clusters: reduced,
        }
    }

    /// Indices of clusters fulfilling `req`, ordered by smallest achievable
    /// stretch bound first (spec.md §4.4's FSP score: minimise max
    /// slowness).
    #[must_use]
    pub fn query(&self, req: &TaskDescription, max_slowness: f64) -> Vec<usize> {
        let mut candidates: Vec<usize> = self
            .clusters
            .iter()
            .enumerate()
            .filter(|(_, c)| c.fulfils(req))
            .map(|(i, _)| i)
            .collect();
        candidates.sort_by(|&a, &b| {
            let stretch_a = self.clusters[a].payload.min_stretch_for(max_slowness);
            let stretch_b = self.clusters[b].payload.min_stretch_for(max_slowness);
            stretch_a
                .partial_cmp(&stretch_b)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_is_nonincreasing() {
        let func = ZAFunction::from_queue(&[(100.0, 10.0, 1.0)], 20.0, 11);
        assert!(func.eval(0.0) >= func.eval(10.0));
        assert!(func.eval(10.0) >= func.eval(20.0));
    }

    #[test]
    fn large_enough_stretch_drives_slowness_to_zero() {
        let func = ZAFunction::from_queue(&[(100.0, 10.0, 1.0)], 50.0, 26);
        assert!(func.eval(50.0) < 1e-6);
    }

    #[test]
    fn min_stretch_for_respects_bound() {
        let func = ZAFunction::from_queue(&[(100.0, 10.0, 1.0)], 50.0, 51);
        let stretch = func.min_stretch_for(0.0);
        assert!(func.eval(stretch) <= 1e-3);
    }

    #[test]
    fn reduce_quality_zero_collapses_to_two_points() {
        let func = ZAFunction::from_queue(&[(100.0, 10.0, 1.0)], 50.0, 20);
        let reduced = func.reduce(0.0);
        assert_eq!(reduced.piece_count(), 2);
    }

    #[test]
    fn reduce_quality_one_is_lossless() {
        let func = ZAFunction::from_queue(&[(100.0, 10.0, 1.0)], 50.0, 20);
        let reduced = func.reduce(1.0);
        assert_eq!(reduced.piece_count(), func.piece_count());
    }
}
