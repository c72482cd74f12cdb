//! Availability summary algebra (C1, spec.md §4): the lossy, size-bounded
//! digests nodes exchange to describe downstream capacity.
//!
//! - [`cluster`] -- the clustering vector shared by `QueueBalancing`,
//!   `Deadline`, and `Slowness`.
//! - [`basic`] -- the `Basic`/IBP free-slot-count variant.
//! - [`mmp`] -- the `QueueBalancing`/MMP variant.
//! - [`deadline`] -- the `Deadline`/DP variant and its `LDeltaFunction`.
//! - [`slowness`] -- the `Slowness`/FSP variant and its `ZAFunction`.
//! - [`summary`] -- [`AvailabilitySummary`], the policy-tagged envelope
//!   every variant is wrapped in for transport and storage.

pub mod basic;
pub mod cluster;
pub mod deadline;
pub mod mmp;
pub mod slowness;
pub mod summary;

pub use basic::{BasicSummary, BasicWorkerState};
pub use cluster::{Cluster, ClusterLoss, DimRanges};
pub use deadline::{DeadlineSummary, DeadlineWorkerState, LDeltaFunction};
pub use mmp::{MmpWorkerState, QueueBalancingSummary};
pub use slowness::{SlownessSummary, SlownessWorkerState, ZAFunction};
pub use summary::{AvailabilitySummary, SummaryError};
