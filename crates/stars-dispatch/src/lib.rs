//! Aggregating dispatcher and dispatch descent (C3 + C4, spec.md §4.3-4.4).
//!
//! - [`link`] -- [`link::DispatcherLink`], the per-neighbour three-summary
//!   window (`received`/`pending`/`notified`).
//! - [`dispatcher`] -- [`dispatcher::AggregatingDispatcher`], leave-one-out
//!   recomputation and the bandwidth-capped sender.
//! - [`descent`] -- [`descent::descend`], per-policy scoring and greedy
//!   sub-bag allocation across a node's children.
//! - [`dedup`] -- [`dedup::RequestDedupCache`], the request-id dedup window.
//! - [`error`] -- [`error::DispatchError`].

pub mod dedup;
pub mod descent;
pub mod dispatcher;
pub mod error;
pub mod link;

pub use dedup::RequestDedupCache;
pub use descent::{descend, ChildCandidate, DescentResult};
pub use dispatcher::{estimate_bytes, AggregatingDispatcher, ChildDiff, DispatchEffect};
pub use error::DispatchError;
pub use link::{DispatcherLink, LinkKind};
