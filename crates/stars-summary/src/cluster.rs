//! Shared clustering vector used by the `QueueBalancing`, `Deadline`, and
//! `Slowness` summary variants (spec.md §4.1).
//!
//! Each cluster aggregates one or more physical nodes along four dimensions:
//! `memory`, `disk`, and `power` (tracked as a conservative **minimum**, the
//! worst case across the aggregated points) and a time horizon -- queue-end
//! time or deadline slack -- tracked as a conservative **maximum**. Every
//! dimension also carries an **accumulated loss**: the sum, over the
//! points folded into the cluster, of how far that point's true value is
//! from the cluster's bound. Loss is always stored positive and is what
//! makes `cluster.fulfils(req)` a safe (never over-optimistic) check.
//!
//! Per the design notes in spec.md §9, a cluster does **not** hold a
//! back-pointer to its owning summary for normalisation ranges; callers pass
//! a [`DimRanges`] into the distance/merge methods instead.

use serde::{Deserialize, Serialize};

use stars_core::TaskDescription;

/// Per-dimension accumulated loss, always non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ClusterLoss {
    pub memory: f64,
    pub disk: f64,
    pub power: f64,
    pub horizon: f64,
}

impl ClusterLoss {
    #[must_use]
    pub fn total(&self) -> f64 {
        self.memory + self.disk + self.power + self.horizon
    }
}

/// The min/max range of each dimension across an entire summary, used to
/// normalise losses and compute coarse buckets for the distance function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimRanges {
    pub memory: (f64, f64),
    pub disk: (f64, f64),
    pub power: (f64, f64),
    pub horizon: (f64, f64),
}

impl DimRanges {
    /// Compute the tightest ranges spanning every cluster in `clusters`.
    #[must_use]
    pub fn from_clusters<P>(clusters: &[Cluster<P>]) -> Self {
        let mut ranges = DimRanges {
            memory: (f64::MAX, f64::MIN),
            disk: (f64::MAX, f64::MIN),
            power: (f64::MAX, f64::MIN),
            horizon: (f64::MAX, f64::MIN),
        };
        for c in clusters {
            ranges.memory.0 = ranges.memory.0.min(c.memory_min);
            ranges.memory.1 = ranges.memory.1.max(c.memory_min);
            ranges.disk.0 = ranges.disk.0.min(c.disk_min);
            ranges.disk.1 = ranges.disk.1.max(c.disk_min);
            ranges.power.0 = ranges.power.0.min(c.power_min);
            ranges.power.1 = ranges.power.1.max(c.power_min);
            ranges.horizon.0 = ranges.horizon.0.min(c.horizon_max);
            ranges.horizon.1 = ranges.horizon.1.max(c.horizon_max);
        }
        if clusters.is_empty() {
            ranges = DimRanges {
                memory: (0.0, 0.0),
                disk: (0.0, 0.0),
                power: (0.0, 0.0),
                horizon: (0.0, 0.0),
            };
        }
        ranges
    }

    fn normalize(value: f64, range: (f64, f64)) -> f64 {
        let span = range.1 - range.0;
        if span <= f64::EPSILON {
            0.0
        } else {
            (value - range.0) / span
        }
    }

    fn bucket(value: f64, range: (f64, f64), buckets: usize) -> usize {
        if buckets <= 1 {
            return 0;
        }
        let normalized = Self::normalize(value, range).clamp(0.0, 1.0);
        ((normalized * buckets as f64) as usize).min(buckets - 1)
    }
}

/// Number of dimensions tracked by every cluster (memory, disk, power,
/// horizon). Used to derive the per-dimension bucket count
/// `floor(N^(1/D))` from the cluster budget `N` (spec.md §4.1).
pub const CLUSTER_DIMS: u32 = 4;

/// `floor(N^(1/D))`, at least 1.
#[must_use]
pub fn buckets_per_dim(max_size: usize) -> usize {
    if max_size == 0 {
        return 1;
    }
    let root = (max_size as f64).powf(1.0 / f64::from(CLUSTER_DIMS));
    (root.floor() as usize).max(1)
}

/// Per-crossed-bucket penalty added to cluster distance, keeping the
/// k-means-like reducer from fusing clusters that differ sharply along a
/// single dimension (spec.md §4.1).
pub const BUCKET_CROSS_PENALTY: f64 = 100.0;

/// One entry of a clustered availability summary.
///
/// `Payload` carries variant-specific data: `()` for `QueueBalancing`,
/// [`crate::deadline::LDeltaFunction`] for `Deadline`, and
/// [`crate::slowness::ZAFunction`] for `Slowness`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster<Payload> {
    pub memory_min: f64,
    pub disk_min: f64,
    pub power_min: f64,
    /// Queue-end time or deadline horizon: a conservative **maximum** bound.
    pub horizon_max: f64,
    pub loss: ClusterLoss,
    pub count: u32,
    pub payload: Payload,
}

impl<Payload: Clone> Cluster<Payload> {
    /// A single physical point with no aggregation loss.
    #[must_use]
    pub fn singleton(memory: f64, disk: f64, power: f64, horizon: f64, payload: Payload) -> Self {
        Self {
            memory_min: memory,
            disk_min: disk,
            power_min: power,
            horizon_max: horizon,
            loss: ClusterLoss::default(),
            count: 1,
            payload,
        }
    }

    /// Conservative fulfilment check (spec.md §8, invariant 4): true only
    /// when every dimension's bound already meets the request, which implies
    /// every constituent point satisfies the request too, since `memory_min`
    /// /`disk_min`/`power_min` are true minima and `horizon_max` is a true
    /// maximum over the aggregated points.
    #[must_use]
    pub fn fulfils(&self, req: &TaskDescription) -> bool {
        self.memory_min >= req.max_memory as f64 && self.disk_min >= req.max_disk as f64
    }

    fn bucket_tuple(&self, ranges: &DimRanges, buckets: usize) -> (usize, usize, usize, usize) {
        (
            DimRanges::bucket(self.memory_min, ranges.memory, buckets),
            DimRanges::bucket(self.disk_min, ranges.disk, buckets),
            DimRanges::bucket(self.power_min, ranges.power, buckets),
            DimRanges::bucket(self.horizon_max, ranges.horizon, buckets),
        )
    }

    /// Distance used to pick the closest pair during [`reduce`]: the sum of
    /// per-dimension normalised losses the merge would incur, plus
    /// `BUCKET_CROSS_PENALTY` for every dimension whose coarse bucket
    /// differs between the two clusters.
    #[must_use]
    pub fn distance(&self, other: &Self, ranges: &DimRanges, buckets: usize) -> f64 {
        let a = self.bucket_tuple(ranges, buckets);
        let b = other.bucket_tuple(ranges, buckets);
        let mut penalty = 0.0;
        if a.0 != b.0 {
            penalty += BUCKET_CROSS_PENALTY;
        }
        if a.1 != b.1 {
            penalty += BUCKET_CROSS_PENALTY;
        }
        if a.2 != b.2 {
            penalty += BUCKET_CROSS_PENALTY;
        }
        if a.3 != b.3 {
            penalty += BUCKET_CROSS_PENALTY;
        }

        let merged_memory_min = self.memory_min.min(other.memory_min);
        let merged_disk_min = self.disk_min.min(other.disk_min);
        let merged_power_min = self.power_min.min(other.power_min);
        let merged_horizon_max = self.horizon_max.max(other.horizon_max);

        let memory_cost = Self::normalized_cost(
            self.memory_min,
            other.memory_min,
            merged_memory_min,
            ranges.memory,
        );
        let disk_cost =
            Self::normalized_cost(self.disk_min, other.disk_min, merged_disk_min, ranges.disk);
        let power_cost = Self::normalized_cost(
            self.power_min,
            other.power_min,
            merged_power_min,
            ranges.power,
        );
        let horizon_cost = Self::normalized_cost_max(
            self.horizon_max,
            other.horizon_max,
            merged_horizon_max,
            ranges.horizon,
        );

        penalty + memory_cost + disk_cost + power_cost + horizon_cost
    }

    fn normalized_cost(a: f64, b: f64, merged: f64, range: (f64, f64)) -> f64 {
        let span = (range.1 - range.0).max(f64::EPSILON);
        ((a - merged).abs() + (b - merged).abs()) / span
    }

    fn normalized_cost_max(a: f64, b: f64, merged: f64, range: (f64, f64)) -> f64 {
        Self::normalized_cost(a, b, merged, range)
    }
}

/// Merge two clusters into one, combining `payload` with `merge_payload`.
/// Loss is updated to reflect the true worst case implied by tightening
/// `memory_min`/`disk_min`/`power_min` and loosening `horizon_max`
/// (spec.md §4.1: "accumulated loss ... sum over the aggregated points of
/// `min - point`"). This is the *only* place clusters are approximated --
/// `join` never merges (spec.md §4.1).
pub fn merge_clusters<Payload, F>(
    a: &Cluster<Payload>,
    b: &Cluster<Payload>,
    merge_payload: F,
) -> Cluster<Payload>
where
    F: FnOnce(&Payload, &Payload) -> Payload,
{
    let memory_min = a.memory_min.min(b.memory_min);
    let disk_min = a.disk_min.min(b.disk_min);
    let power_min = a.power_min.min(b.power_min);
    let horizon_max = a.horizon_max.max(b.horizon_max);

    let loss = ClusterLoss {
        memory: a.loss.memory
            + b.loss.memory
            + f64::from(a.count) * (a.memory_min - memory_min)
            + f64::from(b.count) * (b.memory_min - memory_min),
        disk: a.loss.disk
            + b.loss.disk
            + f64::from(a.count) * (a.disk_min - disk_min)
            + f64::from(b.count) * (b.disk_min - disk_min),
        power: a.loss.power
            + b.loss.power
            + f64::from(a.count) * (a.power_min - power_min)
            + f64::from(b.count) * (b.power_min - power_min),
        horizon: a.loss.horizon
            + b.loss.horizon
            + f64::from(a.count) * (horizon_max - a.horizon_max)
            + f64::from(b.count) * (horizon_max - b.horizon_max),
    };

    Cluster {
        memory_min,
        disk_min,
        power_min,
        horizon_max,
        loss,
        count: a.count + b.count,
        payload: merge_payload(&a.payload, &b.payload),
    }
}

/// Repeatedly merge the globally closest pair of clusters until at most
/// `max_size` remain (spec.md §4.1's `reduce(N)`).
pub fn reduce_clusters<Payload, F>(
    mut clusters: Vec<Cluster<Payload>>,
    max_size: usize,
    mut merge_payload: F,
) -> Vec<Cluster<Payload>>
where
    Payload: Clone,
    F: FnMut(&Payload, &Payload) -> Payload,
{
    if max_size == 0 {
        return Vec::new();
    }
    while clusters.len() > max_size {
        let ranges = DimRanges::from_clusters(&clusters);
        let buckets = buckets_per_dim(max_size);

        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..clusters.len() {
            for j in (i + 1)..clusters.len() {
                let d = clusters[i].distance(&clusters[j], &ranges, buckets);
                if best.is_none_or(|(_, _, best_d)| d < best_d) {
                    best = Some((i, j, d));
                }
            }
        }

        let (i, j, _) = best.expect("len > max_size >= 1 implies at least one pair");
        let merged = merge_clusters(&clusters[i], &clusters[j], |a, b| merge_payload(a, b));
        // Remove the higher index first so the lower index stays valid.
        clusters.remove(j);
        clusters.remove(i);
        clusters.push(merged);
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(memory: f64, disk: f64, power: f64, horizon: f64) -> Cluster<()> {
        Cluster::singleton(memory, disk, power, horizon, ())
    }

    #[test]
    fn reduce_shrinks_to_budget() {
        let clusters = vec![c(1.0, 1.0, 1.0, 1.0), c(2.0, 2.0, 2.0, 2.0), c(3.0, 3.0, 3.0, 3.0)];
        let reduced = reduce_clusters(clusters, 2, |_, _| ());
        assert!(reduced.len() <= 2);
    }

    #[test]
    fn reduce_is_noop_under_budget() {
        let clusters = vec![c(1.0, 1.0, 1.0, 1.0)];
        let reduced = reduce_clusters(clusters.clone(), 5, |_, _| ());
        assert_eq!(reduced, clusters);
    }

    #[test]
    fn merge_loss_is_conservative_and_nonnegative() {
        let a = c(10.0, 10.0, 10.0, 5.0);
        let b = c(4.0, 20.0, 10.0, 9.0);
        let merged = merge_clusters(&a, &b, |_, _| ());
        assert_eq!(merged.memory_min, 4.0);
        assert_eq!(merged.horizon_max, 9.0);
        assert!(merged.loss.memory >= 0.0);
        assert!(merged.loss.horizon >= 0.0);
        assert_eq!(merged.count, 2);
    }

    #[test]
    fn fulfils_is_conservative() {
        use stars_core::TaskDescription;
        let req = TaskDescription {
            length: 1,
            max_memory: 8,
            max_disk: 8,
            input_size: 0,
            output_size: 0,
            num_tasks: 1,
            deadline: None,
            app_length: 1,
        };
        let cluster = c(8.0, 8.0, 1.0, 1.0);
        assert!(cluster.fulfils(&req));

        let too_small = c(4.0, 8.0, 1.0, 1.0);
        assert!(!too_small.fulfils(&req));
    }
}
