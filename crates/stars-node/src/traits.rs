//! The three external collaborators a node is wired against (spec.md §6).
//!
//! None of these are implemented for real here (spec.md's non-goals: real
//! executor, real transport, overlay reshape protocol) -- [`crate::testkit`]
//! provides the in-process stand-ins used by this crate's own tests.
//!
//! A node is single-threaded and cooperative (spec.md §5): these traits are
//! `?Send` rather than requiring thread-safety, since nothing here ever
//! crosses a thread boundary.

use async_trait::async_trait;

use stars_core::Address;

use crate::message::Message;

/// A reliable, in-order unicast transport to a `(nodeAddress, port)` pair.
#[async_trait(?Send)]
pub trait Transport {
    /// Send `msg` from `src` to `dst`, returning the number of bytes
    /// accounted against the sender's bandwidth cap.
    async fn send_message(&self, src: Address, dst: Address, msg: Message) -> u64;
}

/// The aggregation-tree topology a node sits in.
pub trait Overlay {
    /// This node's current father, or `None` at the root.
    fn father_address(&self) -> Option<Address>;
    /// This node's current children, each paired with whether the overlay
    /// reports it as a leaf worker -- needed by dispatch descent's
    /// `forWorker` rule (spec.md §9, open question c). The literal spec
    /// text only asks for `children()`; pairing in leaf-ness here is this
    /// workspace's resolution of that question (see `DESIGN.md`).
    fn children(&self) -> Vec<(Address, bool)>;
    /// Whether this node itself is a leaf (has an executor, no children).
    fn is_leaf(&self) -> bool;
}

/// The task execution backend. Task creation and state-machine bookkeeping
/// live in [`stars_worker::LocalScheduler`]; this trait is only the
/// fire-and-forget run/abort half the spec's `createTask`/`run`/`abort`
/// triad describes as external.
#[async_trait(?Send)]
pub trait Executor {
    /// Begin executing `task_id`. Completion is reported out-of-band via
    /// [`crate::node::Node::on_executor_state_change`], not a return value.
    async fn run(&self, task_id: u64);
    /// Abort `task_id` if it is still running.
    async fn abort(&self, task_id: u64);
}
