//! Dispatch descent (C4, spec.md §4.4): given an incoming bag and the
//! summaries currently held for each child, pick children under the active
//! policy's scoring rule and split the bag across them.
//!
//! This is a pure function of `(bag, candidates, config, now)` -- no node
//! state is touched here. The caller ([`stars-node`]) is responsible for
//! pulling the current `received` summary off each [`crate::link::DispatcherLink`]
//! and feeding the result's sub-bags back into the event loop.

use chrono::{DateTime, Utc};

use stars_core::{Address, Config, TaskBag, TaskDescription};
use stars_summary::{AvailabilitySummary, ZAFunction};

/// One child the descent may route tasks to.
#[derive(Debug, Clone)]
pub struct ChildCandidate {
    pub address: Address,
    pub summary: AvailabilitySummary,
    /// Whether the overlay reports this child as a leaf worker (spec.md §9,
    /// open question (c)): the dispatcher one hop above a leaf is the one
    /// that must set `forWorker = true` on the final sub-bag.
    pub is_leaf: bool,
}

/// Outcome of one descent step.
#[derive(Debug, Clone, Default)]
pub struct DescentResult {
    /// Sub-bags to forward, one per child that received at least one task.
    pub forwards: Vec<(Address, TaskBag)>,
    /// Tasks that could not be placed at any candidate.
    pub unplaced: u64,
    /// The still-unplaced sub-range to bounce back to the requester, set
    /// only at the root under the IBP/DP policies (spec.md §4.4, step 5).
    /// `None` whenever `unplaced == 0`, and always `None` for MMP/FSP, which
    /// instead rely on the requester's own `requestTimeout` to retry.
    pub rejected: Option<TaskBag>,
}

/// Run one descent step (spec.md §4.4, steps 1-5).
///
/// `is_root` controls step 5's unplaced-task handling: IBP/DP bounce
/// unplaced tasks back to the requester via [`DescentResult::rejected`],
/// while MMP/FSP simply drop them and rely on the requester's own timeout
/// to retry. A non-root dispatcher always drops unplaced tasks regardless
/// of policy, leaving `rejected` unset.
#[must_use]
pub fn descend(
    bag: &TaskBag,
    candidates: &[ChildCandidate],
    config: &Config,
    is_root: bool,
    now: DateTime<Utc>,
) -> DescentResult {
    let total = bag.len();
    if total == 0 || candidates.is_empty() {
        // No known children to classify a policy from; fall back to the
        // pre-existing drop-and-let-the-requester-time-out behavior rather
        // than guess whether IBP/DP bounce-back would apply.
        return DescentResult {
            forwards: Vec::new(),
            unplaced: total,
            rejected: None,
        };
    }

    let bounces_to_requester = matches!(
        &candidates[0].summary,
        AvailabilitySummary::Basic(_) | AvailabilitySummary::Deadline(_)
    );

    let assignments = match &candidates[0].summary {
        AvailabilitySummary::Basic(_) => allocate_ibp(bag, candidates, total),
        AvailabilitySummary::QueueBalancing(_) => allocate_mmp(bag, candidates, total),
        AvailabilitySummary::Deadline(_) => allocate_dp(bag, candidates, total, now),
        AvailabilitySummary::Slowness(_) => allocate_fsp(bag, candidates, config, total),
    };

    let mut remainder = bag.clone();
    let mut forwards = Vec::new();
    let mut placed_total = 0u64;

    for (idx, count) in assignments {
        if count == 0 {
            continue;
        }
        let Some(mut sub) = remainder.split_prefix(count) else {
            continue;
        };
        sub.for_worker = candidates[idx].is_leaf;
        placed_total += count;
        forwards.push((candidates[idx].address, sub));
    }

    let unplaced = total - placed_total;
    let rejected = (is_root && bounces_to_requester && unplaced > 0).then_some(remainder);
    DescentResult {
        forwards,
        unplaced,
        rejected,
    }
}

/// IBP score: count of free slots in the child's subtree. Greedily hand one
/// task at a time to whichever eligible child currently has the most free
/// slots, decrementing as we go (spec.md §4.4 steps 2-3).
fn allocate_ibp(bag: &TaskBag, candidates: &[ChildCandidate], total: u64) -> Vec<(usize, u64)> {
    let mut remaining: Vec<(usize, u32)> = candidates
        .iter()
        .enumerate()
        .filter_map(|(i, c)| match &c.summary {
            AvailabilitySummary::Basic(s) => {
                let free = s.query(&bag.min_requirements);
                (free > 0).then_some((i, free))
            }
            _ => None,
        })
        .collect();

    let mut assigned = vec![0u64; candidates.len()];
    let mut placed = 0u64;
    while placed < total {
        let Some(best) = remaining
            .iter_mut()
            .filter(|(_, slots)| *slots > 0)
            .max_by_key(|(_, slots)| *slots)
        else {
            break;
        };
        assigned[best.0] += 1;
        best.1 -= 1;
        placed += 1;
    }
    assigned.into_iter().enumerate().collect()
}

/// MMP score: earliest aggregate queue-end time after hypothetically placing
/// one more task at the child's best-fitting cluster (spec.md §4.1's
/// `getAvailability`). Lower is better.
fn allocate_mmp(bag: &TaskBag, candidates: &[ChildCandidate], total: u64) -> Vec<(usize, u64)> {
    let req = &bag.min_requirements;
    let mut state: Vec<Option<(usize, u64)>> = candidates
        .iter()
        .map(|c| match &c.summary {
            AvailabilitySummary::QueueBalancing(s) => {
                s.query(req).first().map(|&best_idx| (best_idx, 0u64))
            }
            _ => None,
        })
        .collect();

    let mut assigned = vec![0u64; candidates.len()];
    let mut placed = 0u64;
    while placed < total {
        let mut best: Option<(usize, f64)> = None;
        for (i, entry) in state.iter().enumerate() {
            let Some((cluster_idx, already)) = entry else { continue };
            let AvailabilitySummary::QueueBalancing(s) = &candidates[i].summary else { continue };
            let score = s.get_availability(*cluster_idx, req, (*already + 1) as u32);
            if best.is_none_or(|(_, best_score)| score < best_score) {
                best = Some((i, score));
            }
        }
        let Some((i, _)) = best else { break };
        assigned[i] += 1;
        if let Some((_, already)) = &mut state[i] {
            *already += 1;
        }
        placed += 1;
    }
    assigned.into_iter().enumerate().collect()
}

/// DP score: largest number of tasks fittable before `bag`'s deadline at the
/// child's best cluster, inverting its `LDeltaFunction` (spec.md §4.4).
/// Decrements as capacity is consumed.
fn allocate_dp(
    bag: &TaskBag,
    candidates: &[ChildCandidate],
    total: u64,
    now: DateTime<Utc>,
) -> Vec<(usize, u64)> {
    let req = &bag.min_requirements;
    let mut room: Vec<Option<(usize, u32)>> = candidates
        .iter()
        .map(|c| match &c.summary {
            AvailabilitySummary::Deadline(s) => s.query(req, now).first().map(|&best_idx| {
                let capacity = s.max_tasks_before(best_idx, req, now);
                (best_idx, capacity)
            }),
            _ => None,
        })
        .collect();

    let mut assigned = vec![0u64; candidates.len()];
    let mut placed = 0u64;
    while placed < total {
        let Some((i, (_, capacity))) = room
            .iter_mut()
            .enumerate()
            .filter_map(|(i, r)| r.as_mut().map(|entry| (i, entry)))
            .filter(|(_, (_, capacity))| *capacity > 0)
            .max_by_key(|(_, (_, capacity))| *capacity)
        else {
            break;
        };
        assigned[i] += 1;
        *capacity -= 1;
        placed += 1;
    }
    assigned.into_iter().enumerate().collect()
}

/// FSP score: the stretch bound `S` needed to admit one more task of `req`'s
/// size at the child's best cluster, computed by summing a single-task delta
/// profile onto the cluster's `ZAFunction` and inverting at `max_slowness =
/// 0` (spec.md §4.4: "minimise the maximum S across allocated children").
///
/// `config.fsp_discard`/`fsp_discard_ratio`: once the best remaining
/// candidate's score exceeds `fsp_discard_ratio * branch_min` (the cheapest
/// score observed before any assignment), remaining tasks are left unplaced
/// rather than forced onto an increasingly expensive branch.
fn allocate_fsp(
    bag: &TaskBag,
    candidates: &[ChildCandidate],
    config: &Config,
    total: u64,
) -> Vec<(usize, u64)> {
    let req = &bag.min_requirements;
    let weight = 1.0 / (req.app_length.max(1) as f64);

    let mut best_cluster: Vec<Option<(usize, f64)>> = candidates
        .iter()
        .map(|c| match &c.summary {
            AvailabilitySummary::Slowness(s) => s
                .query(req, 0.0)
                .first()
                .map(|&idx| (idx, s.clusters[idx].horizon_max)),
            _ => None,
        })
        .collect();

    let mut load: Vec<ZAFunction> = vec![ZAFunction::zero(); candidates.len()];
    let mut assigned = vec![0u64; candidates.len()];

    let branch_min = best_cluster
        .iter()
        .enumerate()
        .filter_map(|(i, e)| e.map(|_| fsp_score(candidates, i, &best_cluster, &load)))
        .fold(f64::INFINITY, f64::min);

    let mut placed = 0u64;
    while placed < total {
        let mut best: Option<(usize, f64)> = None;
        for i in 0..candidates.len() {
            if best_cluster[i].is_none() {
                continue;
            }
            let score = fsp_score(candidates, i, &best_cluster, &load);
            if best.is_none_or(|(_, best_score)| score < best_score) {
                best = Some((i, score));
            }
        }
        let Some((i, score)) = best else { break };
        if config.fsp_discard && branch_min.is_finite() && score > config.fsp_discard_ratio * branch_min
        {
            break;
        }
        if !score.is_finite() {
            break;
        }
        let delta = ZAFunction::from_queue(
            &[(0.0, req.length as f64, weight)],
            best_cluster[i].map_or(1.0, |(_, horizon)| horizon.max(1.0)),
            9,
        );
        load[i] = load[i].sum(&delta);
        assigned[i] += 1;
        placed += 1;
    }
    assigned.into_iter().enumerate().collect()
}

fn fsp_score(
    candidates: &[ChildCandidate],
    i: usize,
    best_cluster: &[Option<(usize, f64)>],
    load: &[ZAFunction],
) -> f64 {
    let AvailabilitySummary::Slowness(s) = &candidates[i].summary else {
        return f64::INFINITY;
    };
    let Some((idx, _)) = best_cluster[i] else {
        return f64::INFINITY;
    };
    let combined = s.clusters[idx].payload.sum(&load[i]);
    combined.min_stretch_for(0.0)
}
