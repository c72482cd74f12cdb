//! `QueueBalancing` availability summary (MMP policy).
//!
//! Each cluster carries a `(memory, disk, power, queueEnd)` tuple with no
//! extra payload -- the four tracked dimensions already are the cluster's
//! content. `getAvailability` answers "if I handed this cluster `numTasks`
//! more tasks matching `req`, when would the last of them finish?" via
//! binary search over a candidate time horizon, as spec.md §4.1 describes.

use serde::{Deserialize, Serialize};

use stars_core::TaskDescription;

use crate::cluster::{buckets_per_dim, merge_clusters, reduce_clusters, Cluster, DimRanges};

/// The state a leaf worker reports when running the MMP policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MmpWorkerState {
    pub memory: f64,
    pub disk: f64,
    pub power: f64,
    pub queue_end: f64,
}

/// Clustered `(memory, disk, power, queueEnd)` availability summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueBalancingSummary {
    pub seq: u32,
    pub from_scheduler: bool,
    pub clusters: Vec<Cluster<()>>,
}

impl QueueBalancingSummary {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            seq: 0,
            from_scheduler: false,
            clusters: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_worker(state: MmpWorkerState) -> Self {
        Self {
            seq: 0,
            from_scheduler: true,
            clusters: vec![Cluster::singleton(
                state.memory,
                state.disk,
                state.power,
                state.queue_end,
                (),
            )],
        }
    }

    /// Concatenates cluster lists; never merges (merging is `reduce`'s job
    /// alone, per spec.md §4.1).
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
    pub fn reduce(&self, max_size: usize) -> Self {
        Self {
            seq: self.seq,
            from_scheduler: self.from_scheduler,
            clusters: reduce_clusters(self.clusters.clone(), max_size, |_, _| ()),
        }
    }

    /// Indices of clusters that fulfil `req`, ordered by earliest
    /// `queue_end` first (spec.md §4.1's "natural priority order").
    #[must_use]
    pub fn query(&self, req: &TaskDescription) -> Vec<usize> {
        let mut candidates: Vec<usize> = self
            .clusters
            .iter()
            .enumerate()
            .filter(|(_, c)| c.fulfils(req))
            .map(|(i, _)| i)
            .collect();
        candidates.sort_by(|&a, &b| {
            self.clusters[a]
                .horizon_max
                .partial_cmp(&self.clusters[b].horizon_max)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates
    }

    /// Earliest time at which `num_tasks` more tasks matching `req` would
    /// all be finished at cluster `idx`, found via bisection over a
    /// candidate horizon `[queue_end, queue_end + worst_case_span]`.
    #[must_use]
    pub fn get_availability(&self, idx: usize, req: &TaskDescription, num_tasks: u32) -> f64 {
        let cluster = &self.clusters[idx];
        let power = cluster.power_min.max(f64::EPSILON);
        let work = req.length as f64 * f64::from(num_tasks);

        let mut lo = cluster.horizon_max;
        let mut hi = cluster.horizon_max + (work / power) * 2.0 + 1.0;

        // `capacity(t) = (t - queue_end) * power` is monotonic in `t`, so
        // bisection converges to the smallest `t` with `capacity(t) >= work`.
        for _ in 0..64 {
            let mid = (lo + hi) / 2.0;
            let capacity = (mid - cluster.horizon_max) * power;
            if capacity >= work {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        hi
    }
}
