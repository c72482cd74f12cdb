//! In-process test doubles for [`crate::traits::Transport`],
//! [`crate::traits::Overlay`], and [`crate::traits::Executor`].
//!
//! None of these are meant for production use; they exist so this crate's
//! own integration tests can drive a handful of [`crate::node::Node`]s
//! against each other without a real network or process scheduler.

use std::cell::RefCell;
use std::collections::HashMap;

use async_trait::async_trait;

use stars_core::Address;

use crate::message::Message;
use crate::traits::{Executor, Overlay, Transport};

/// A fixed overlay topology: one father, a fixed child list, computed once
/// at construction. Real reshape events are out of scope (spec.md's
/// non-goals), so this never changes after creation.
#[derive(Debug, Clone)]
pub struct StaticOverlay {
    father: Option<Address>,
    children: Vec<(Address, bool)>,
    is_leaf: bool,
}

impl StaticOverlay {
    #[must_use]
    pub fn new(father: Option<Address>, children: Vec<(Address, bool)>, is_leaf: bool) -> Self {
        Self {
            father,
            children,
            is_leaf,
        }
    }

    #[must_use]
    pub fn leaf(father: Address) -> Self {
        Self::new(Some(father), Vec::new(), true)
    }

    #[must_use]
    pub fn root(children: Vec<(Address, bool)>) -> Self {
        Self::new(None, children, false)
    }
}

impl Overlay for StaticOverlay {
    fn father_address(&self) -> Option<Address> {
        self.father
    }

    fn children(&self) -> Vec<(Address, bool)> {
        self.children.clone()
    }

    fn is_leaf(&self) -> bool {
        self.is_leaf
    }
}

/// A mailbox-per-address transport. `send_message` enqueues rather than
/// delivers; a test drains each destination's queue explicitly between
/// event-loop turns, mirroring how [`crate::node::Node::on_message`] is only
/// ever called by the driving loop, never by the transport itself.
#[derive(Debug, Default)]
pub struct InProcessTransport {
    mailboxes: RefCell<HashMap<Address, Vec<(Address, Message)>>>,
}

impl InProcessTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every message queued for `dst`, oldest first.
    #[must_use]
    pub fn drain(&self, dst: Address) -> Vec<(Address, Message)> {
        self.mailboxes
            .borrow_mut()
            .get_mut(&dst)
            .map(std::mem::take)
            .unwrap_or_default()
    }
}

#[async_trait(?Send)]
impl Transport for InProcessTransport {
    async fn send_message(&self, src: Address, dst: Address, msg: Message) -> u64 {
        let size = serde_json::to_vec(&msg).map(|v| v.len() as u64).unwrap_or(0);
        self.mailboxes.borrow_mut().entry(dst).or_default().push((src, msg));
        size
    }
}

/// An executor that records which tasks it was asked to run or abort, and
/// otherwise does nothing -- completion is driven manually by a test calling
/// [`crate::node::Node::on_executor_state_change`].
#[derive(Debug, Default)]
pub struct NoopExecutor {
    ran: RefCell<Vec<u64>>,
    aborted: RefCell<Vec<u64>>,
}

impl NoopExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn ran(&self) -> Vec<u64> {
        self.ran.borrow().clone()
    }

    #[must_use]
    pub fn aborted(&self) -> Vec<u64> {
        self.aborted.borrow().clone()
    }
}

#[async_trait(?Send)]
impl Executor for NoopExecutor {
    async fn run(&self, task_id: u64) {
        self.ran.borrow_mut().push(task_id);
    }

    async fn abort(&self, task_id: u64) {
        self.aborted.borrow_mut().push(task_id);
    }
}
