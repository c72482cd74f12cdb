//! The top-level, policy-tagged availability summary (spec.md §4).
//!
//! A node's chosen admission policy determines which variant it produces
//! and accepts; `AvailabilitySummary` exists so `stars-dispatch` and
//! `stars-node` can hold, route, and sequence-gate a summary without
//! knowing which variant is in play until it actually needs to `query` one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::basic::BasicSummary;
use crate::deadline::DeadlineSummary;
use crate::mmp::QueueBalancingSummary;
use crate::slowness::SlownessSummary;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SummaryError {
    #[error("cannot join summaries of different policies ({0} vs {1})")]
    PolicyMismatch(&'static str, &'static str),
}

/// A policy-tagged availability summary, as exchanged between neighbours
/// (spec.md §4). `seq` and `from_scheduler` are common to every variant;
/// everything else is policy-specific.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy")]
pub enum AvailabilitySummary {
    Basic(BasicSummary),
    QueueBalancing(QueueBalancingSummary),
    Deadline(DeadlineSummary),
    Slowness(SlownessSummary),
}

impl AvailabilitySummary {
    #[must_use]
    pub fn policy_name(&self) -> &'static str {
        match self {
            Self::Basic(_) => "Basic",
            Self::QueueBalancing(_) => "QueueBalancing",
            Self::Deadline(_) => "Deadline",
            Self::Slowness(_) => "Slowness",
        }
    }

    #[must_use]
    pub fn seq(&self) -> u32 {
        match self {
            Self::Basic(s) => s.seq,
            Self::QueueBalancing(s) => s.seq,
            Self::Deadline(s) => s.seq,
            Self::Slowness(s) => s.seq,
        }
    }

    pub fn set_seq(&mut self, seq: u32) {
        match self {
            Self::Basic(s) => s.seq = seq,
            Self::QueueBalancing(s) => s.seq = seq,
            Self::Deadline(s) => s.seq = seq,
            Self::Slowness(s) => s.seq = seq,
        }
    }

    #[must_use]
    pub fn from_scheduler(&self) -> bool {
        match self {
            Self::Basic(s) => s.from_scheduler,
            Self::QueueBalancing(s) => s.from_scheduler,
            Self::Deadline(s) => s.from_scheduler,
            Self::Slowness(s) => s.from_scheduler,
        }
    }

    /// Clear or set the `fromScheduler` flag (spec.md §4.3: a dispatcher's
    /// re-emission always clears it, distinguishing it from a worker's own).
    pub fn set_from_scheduler(&mut self, value: bool) {
        match self {
            Self::Basic(s) => s.from_scheduler = value,
            Self::QueueBalancing(s) => s.from_scheduler = value,
            Self::Deadline(s) => s.from_scheduler = value,
            Self::Slowness(s) => s.from_scheduler = value,
        }
    }

    /// Join two summaries of the same policy. Fails if the policies differ,
    /// which spec.md §8 (invariant 6) forbids a correctly configured
    /// deployment from ever attempting.
    pub fn join(&self, other: &Self) -> Result<Self, SummaryError> {
        match (self, other) {
            (Self::Basic(a), Self::Basic(b)) => Ok(Self::Basic(a.join(b))),
            (Self::QueueBalancing(a), Self::QueueBalancing(b)) => {
                Ok(Self::QueueBalancing(a.join(b)))
            }
            (Self::Deadline(a), Self::Deadline(b)) => Ok(Self::Deadline(a.join(b))),
            (Self::Slowness(a), Self::Slowness(b)) => Ok(Self::Slowness(a.join(b))),
            (a, b) => Err(SummaryError::PolicyMismatch(a.policy_name(), b.policy_name())),
        }
    }

    /// Reduce to a cluster-count/piece budget. `cluster_budget` bounds the
    /// number of clusters for every clustering variant; `detail` is a
    /// `[0, 1]` quality knob the `Deadline` and `Slowness` variants spend on
    /// their own piecewise-function reducers (`Basic`/`QueueBalancing`
    /// ignore it).
    #[must_use]
    pub fn reduce(&self, cluster_budget: usize, detail: f64) -> Self {
        match self {
            Self::Basic(s) => Self::Basic(s.reduce(cluster_budget)),
            Self::QueueBalancing(s) => Self::QueueBalancing(s.reduce(cluster_budget)),
            Self::Deadline(s) => {
                let piece_budget = (2.0 + detail.clamp(0.0, 1.0) * 6.0).round() as usize;
                Self::Deadline(s.reduce(cluster_budget, piece_budget))
            }
            Self::Slowness(s) => Self::Slowness(s.reduce(cluster_budget, detail)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_rejects_mismatched_policies() {
        let basic = AvailabilitySummary::Basic(BasicSummary::empty());
        let mmp = AvailabilitySummary::QueueBalancing(QueueBalancingSummary::empty());
        let err = basic.join(&mmp).unwrap_err();
        assert_eq!(err, SummaryError::PolicyMismatch("Basic", "QueueBalancing"));
    }

    #[test]
    fn join_same_policy_succeeds() {
        let a = AvailabilitySummary::Basic(BasicSummary::empty());
        let b = AvailabilitySummary::Basic(BasicSummary::empty());
        assert!(a.join(&b).is_ok());
    }

    #[test]
    fn seq_round_trips_through_set_seq() {
        let mut s = AvailabilitySummary::Basic(BasicSummary::empty());
        s.set_seq(7);
        assert_eq!(s.seq(), 7);
    }

    #[test]
    fn serde_round_trip_preserves_variant() {
        let s = AvailabilitySummary::QueueBalancing(QueueBalancingSummary::empty());
        let json = serde_json::to_string(&s).unwrap();
        let back: AvailabilitySummary = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }
}
