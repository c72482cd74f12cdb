//! Wiring C1-C6 into one node (spec.md §2's component table, §5's
//! single-threaded cooperative event loop).
//!
//! [`Node`] owns a [`LocalScheduler`] (present only if this node runs a
//! worker), an [`AggregatingDispatcher`], and a [`SubmissionSupervisor`],
//! and translates each component's effects into [`NodeEffect`]s -- message
//! sends, executor run/abort requests, and app-completion notices -- for an
//! external driving loop to carry out via its own [`crate::traits::Transport`]
//! and [`crate::traits::Executor`] implementations. Like its constituent
//! components, `Node` itself never performs I/O.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use stars_core::{Address, Config, Millis, Reject, TaskBag};
use stars_dispatch::{
    descend, AggregatingDispatcher, ChildCandidate, ChildDiff, DispatchEffect, RequestDedupCache,
};
use stars_submit::{SubmissionSupervisor, SupervisorEffect};
use stars_worker::{LocalScheduler, WorkerEffect};

use crate::message::Message;
use crate::traits::Overlay;

/// Follow-up action the driving loop must perform on the node's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEffect {
    /// Hand `msg` to the node's [`crate::traits::Transport`] for delivery.
    Send(Address, Message),
    /// Invoke the node's [`crate::traits::Executor`] to run a task.
    RunTask(u64),
    /// Invoke the node's [`crate::traits::Executor`] to abort a task.
    AbortTask(u64),
    /// An app instance submitted through this node has reached a terminal
    /// state.
    AppFinished(u64),
}

/// A single node in the aggregation tree. `scheduler` is `Some` only for
/// nodes that also run a local worker (spec.md §4.2's "this node also runs
/// a local scheduler" case); a pure interior dispatcher leaves it `None`.
pub struct Node<O: Overlay> {
    address: Address,
    overlay: O,
    scheduler: Option<LocalScheduler>,
    dispatcher: AggregatingDispatcher,
    supervisor: SubmissionSupervisor,
    children: Vec<Address>,
    leaf_children: HashSet<Address>,
    config: Config,
    pending_send_timer: Option<Millis>,
    dedup: RequestDedupCache,
}

impl<O: Overlay> Node<O> {
    #[must_use]
    pub fn new(address: Address, overlay: O, scheduler: Option<LocalScheduler>, config: Config) -> Self {
        let father = overlay.father_address();
        let child_pairs = overlay.children();
        let children: Vec<Address> = child_pairs.iter().map(|&(addr, _)| addr).collect();
        let leaf_children: HashSet<Address> = child_pairs
            .into_iter()
            .filter(|&(_, is_leaf)| is_leaf)
            .map(|(addr, _)| addr)
            .collect();

        let dedup = RequestDedupCache::new(config.dedup_cache_size);
        Self {
            address,
            dispatcher: AggregatingDispatcher::new(address, father, children.clone(), config.clone()),
            supervisor: SubmissionSupervisor::new(address, father, config.clone()),
            scheduler,
            overlay,
            children,
            leaf_children,
            config,
            pending_send_timer: None,
            dedup,
        }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    #[must_use]
    pub fn overlay(&self) -> &O {
        &self.overlay
    }

    #[must_use]
    pub fn scheduler(&self) -> Option<&LocalScheduler> {
        self.scheduler.as_ref()
    }

    #[must_use]
    pub fn supervisor(&self) -> &SubmissionSupervisor {
        &self.supervisor
    }

    #[must_use]
    pub fn dispatcher(&self) -> &AggregatingDispatcher {
        &self.dispatcher
    }

    /// Inbound message handling: routes by tag to the owning component and
    /// translates its effects.
    pub fn on_message(&mut self, src: Address, msg: Message, now: DateTime<Utc>) -> Vec<NodeEffect> {
        match msg {
            Message::Summary(summary) => {
                let effects = self.dispatcher.on_summary(src, summary, now);
                self.handle_dispatch_effects(effects)
            }
            Message::Bag(bag) => self.handle_incoming_bag(bag, now),
            Message::Accept(accept) => {
                let effects = self.supervisor.on_accept(src, accept, now);
                self.handle_supervisor_effects(effects)
            }
            Message::Monitor(monitor) => {
                let effects = self.supervisor.on_task_monitor(src, monitor, now);
                self.handle_supervisor_effects(effects)
            }
            Message::Abort(abort) => {
                if let Some(scheduler) = self.scheduler.as_mut() {
                    let effects = scheduler.on_abort(abort.request_id, &abort.task_ids, now);
                    self.handle_worker_effects(effects, now)
                } else {
                    tracing::debug!(%src, "abort delivered to a node with no local scheduler");
                    Vec::new()
                }
            }
            Message::Reject(reject) => {
                let effects = self.supervisor.on_reject(reject, now);
                self.handle_supervisor_effects(effects)
            }
        }
    }

    /// `submit(app)` (spec.md §4.5, step 1): register a new app instance
    /// submitted through this node and issue its first request.
    pub fn submit(
        &mut self,
        app_id: u64,
        requirements: stars_core::TaskDescription,
        num_tasks: u64,
        now: DateTime<Utc>,
    ) -> Vec<NodeEffect> {
        let effects = self.supervisor.submit(app_id, requirements, num_tasks, now);
        self.handle_supervisor_effects(effects)
    }

    /// The executor's notification path (spec.md §6): `Prepared -> Running
    /// -> Finished`, or `Aborted`.
    pub fn on_executor_state_change(
        &mut self,
        task_id: u64,
        new_state: stars_core::TaskState,
        now: DateTime<Utc>,
    ) -> Vec<NodeEffect> {
        let Some(scheduler) = self.scheduler.as_mut() else {
            return Vec::new();
        };
        match scheduler.on_state_change(task_id, new_state, now) {
            Ok(effects) => self.handle_worker_effects(effects, now),
            Err(err) => {
                tracing::warn!(task_id, error = %err, "executor reported state change for unknown task");
                Vec::new()
            }
        }
    }

    /// Pop and act on every timer due across the scheduler, supervisor, and
    /// dispatcher send-rate limiter.
    pub fn drive_timers(&mut self, now: DateTime<Utc>) -> Vec<NodeEffect> {
        let mut effects = Vec::new();

        if let Some(scheduler) = self.scheduler.as_mut() {
            let worker_effects = scheduler.drive_timers(now);
            effects.extend(self.handle_worker_effects(worker_effects, now));
        }

        let supervisor_effects = self.supervisor.drive_timers(now);
        effects.extend(self.handle_supervisor_effects(supervisor_effects));

        if self.pending_send_timer.is_some_and(|at| at <= now.timestamp_millis()) {
            self.pending_send_timer = None;
            let dispatch_effects = self.dispatcher.on_send_timer(now);
            effects.extend(self.handle_dispatch_effects(dispatch_effects));
        }

        effects
    }

    pub fn on_father_changing(&mut self) {
        self.dispatcher.on_structure_changing();
        self.supervisor.on_structure_changing();
    }

    /// Overlay structure commit (spec.md §4.3, §4.5): re-query the overlay,
    /// diff the child set, and replay whatever each component buffered
    /// while the structure was changing.
    pub fn on_structure_changing(&mut self) {
        self.dispatcher.on_structure_changing();
        self.supervisor.on_structure_changing();
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.set_father_changing(true);
        }
    }

    pub fn on_structure_changed(&mut self, now: DateTime<Utc>) -> Vec<NodeEffect> {
        let new_father = self.overlay.father_address();
        let child_pairs = self.overlay.children();
        let new_children: Vec<Address> = child_pairs.iter().map(|&(addr, _)| addr).collect();

        let diff = ChildDiff {
            added: new_children
                .iter()
                .copied()
                .filter(|a| !self.children.contains(a))
                .collect(),
            removed: self
                .children
                .iter()
                .copied()
                .filter(|a| !new_children.contains(a))
                .collect(),
        };
        self.children = new_children;
        self.leaf_children = child_pairs
            .into_iter()
            .filter(|&(_, is_leaf)| is_leaf)
            .map(|(addr, _)| addr)
            .collect();

        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.set_father_changing(false);
        }

        let mut effects =
            self.handle_dispatch_effects(self.dispatcher.on_structure_changed(new_father, diff, now));
        effects.extend(self.handle_supervisor_effects(self.supervisor.on_structure_changed(new_father, now)));
        effects
    }

    fn handle_incoming_bag(&mut self, bag: TaskBag, now: DateTime<Utc>) -> Vec<NodeEffect> {
        if bag.for_worker {
            let Some(scheduler) = self.scheduler.as_mut() else {
                tracing::warn!("bag marked for_worker arrived at a node with no local scheduler");
                return Vec::new();
            };
            let (_, effects) = scheduler.offer(&bag, now);
            return self.handle_worker_effects(effects, now);
        }

        if !self.dedup.check_and_insert(bag.requester, bag.request_id) {
            tracing::trace!(
                requester = %bag.requester,
                request_id = bag.request_id,
                "duplicate request id swallowed by dedup cache"
            );
            return Vec::new();
        }

        let candidates: Vec<ChildCandidate> = self
            .children
            .iter()
            .filter_map(|&addr| {
                self.dispatcher.received_from(addr).cloned().map(|summary| ChildCandidate {
                    address: addr,
                    summary,
                    is_leaf: self.leaf_children.contains(&addr),
                })
            })
            .collect();

        let is_root = self.dispatcher.is_root();
        let result = descend(&bag, &candidates, &self.config, is_root, now);
        if result.unplaced > 0 {
            tracing::debug!(
                unplaced = result.unplaced,
                request_id = bag.request_id,
                "descent could not place every task among known children"
            );
        }

        let mut effects: Vec<NodeEffect> = result
            .forwards
            .into_iter()
            .map(|(addr, sub)| NodeEffect::Send(addr, Message::Bag(sub)))
            .collect();
        if let Some(rejected) = result.rejected {
            effects.push(NodeEffect::Send(
                rejected.requester,
                Message::Reject(Reject {
                    request_id: rejected.request_id,
                    first_task_id: rejected.first_task_id,
                    last_task_id: rejected.last_task_id,
                }),
            ));
        }
        effects
    }

    fn handle_worker_effects(&mut self, effects: Vec<WorkerEffect>, now: DateTime<Utc>) -> Vec<NodeEffect> {
        let mut out = Vec::new();
        for effect in effects {
            match effect {
                WorkerEffect::RunTask(id) => out.push(NodeEffect::RunTask(id)),
                WorkerEffect::AbortExecutorTask(id) => out.push(NodeEffect::AbortTask(id)),
                WorkerEffect::SendAccept(addr, accept) => {
                    out.push(NodeEffect::Send(addr, Message::Accept(accept)));
                }
                WorkerEffect::SendMonitor(addr, monitor) => {
                    out.push(NodeEffect::Send(addr, Message::Monitor(monitor)));
                }
                WorkerEffect::ForwardSnapshot(summary) => {
                    self.dispatcher.set_local(Some(summary));
                    self.dispatcher.recompute();
                    out.extend(self.handle_dispatch_effects(self.dispatcher.maybe_notify(now)));
                }
            }
        }
        out
    }

    fn handle_supervisor_effects(&mut self, effects: Vec<SupervisorEffect>) -> Vec<NodeEffect> {
        effects
            .into_iter()
            .map(|effect| match effect {
                SupervisorEffect::SendBag(addr, bag) => NodeEffect::Send(addr, Message::Bag(bag)),
                SupervisorEffect::AppFinished(app_id) => NodeEffect::AppFinished(app_id),
            })
            .collect()
    }

    fn handle_dispatch_effects(&mut self, effects: Vec<DispatchEffect>) -> Vec<NodeEffect> {
        let mut out = Vec::new();
        for effect in effects {
            match effect {
                DispatchEffect::Send(addr, summary) => {
                    out.push(NodeEffect::Send(addr, Message::Summary(summary)));
                }
                DispatchEffect::ArmSendTimer(at) => {
                    self.pending_send_timer = Some(at);
                }
            }
        }
        out
    }
}
