//! The submission supervisor (C5, spec.md §4.5) and the submitter side of
//! heartbeat/monitor bookkeeping (C6, spec.md §4.6).
//!
//! Like every other component in this workspace, [`SubmissionSupervisor`] is
//! driven cooperatively (spec.md §5): its methods mutate local state and
//! return [`SupervisorEffect`]s for the node event loop to carry out -- a bag
//! to send upward, or notice that an app instance has reached a terminal
//! state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use stars_core::{
    secs_to_millis, Accept, Address, Config, Millis, Reject, RequestState, SubmissionRecord,
    SubmissionTaskState, TaskBag, TaskDescription, TaskMonitor, TaskState, TimerId, TimerWheel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    RequestTimeout { request_id: i64 },
    Heartbeat { worker: Address },
}

/// Follow-up action the node event loop must perform on the supervisor's
/// behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEffect {
    /// Send a freshly minted bag to this node's father.
    SendBag(Address, TaskBag),
    /// Every task of this app instance reached a final state; it has been
    /// dropped from the supervisor's bookkeeping.
    AppFinished(u64),
}

/// Per-node submission supervisor, tracking every app instance submitted
/// through this node plus the heartbeat liveness window for every worker it
/// currently has tasks at.
pub struct SubmissionSupervisor {
    address: Address,
    father: Option<Address>,
    config: Config,
    apps: HashMap<u64, SubmissionRecord>,
    /// `requestId -> appId`, since request ids are unique per requester but
    /// app ids are the caller's own namespace (spec.md §6).
    request_owner: HashMap<i64, u64>,
    request_timers: HashMap<i64, TimerId>,
    /// `workerAddr -> appId -> count`, spec.md §4.5's `remoteTasksPerWorker`.
    remote_tasks_per_worker: HashMap<Address, HashMap<u64, u64>>,
    heartbeat_timers: HashMap<Address, TimerId>,
    structure_changing: bool,
    replay_buffer: Vec<(u64, u32)>,
    timers: TimerWheel<Millis, TimerKind>,
    next_request_id: i64,
}

impl SubmissionSupervisor {
    #[must_use]
    pub fn new(address: Address, father: Option<Address>, config: Config) -> Self {
        Self {
            address,
            father,
            config,
            apps: HashMap::new(),
            request_owner: HashMap::new(),
            request_timers: HashMap::new(),
            remote_tasks_per_worker: HashMap::new(),
            heartbeat_timers: HashMap::new(),
            structure_changing: false,
            replay_buffer: Vec::new(),
            timers: TimerWheel::new(),
            next_request_id: 1,
        }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    #[must_use]
    pub fn father(&self) -> Option<Address> {
        self.father
    }

    #[must_use]
    pub fn app(&self, app_id: u64) -> Option<&SubmissionRecord> {
        self.apps.get(&app_id)
    }

    #[must_use]
    pub fn has_heartbeat_timer(&self, worker: Address) -> bool {
        self.heartbeat_timers.contains_key(&worker)
    }

    #[must_use]
    pub fn remote_task_count(&self, worker: Address, app_id: u64) -> u64 {
        self.remote_tasks_per_worker
            .get(&worker)
            .and_then(|m| m.get(&app_id))
            .copied()
            .unwrap_or(0)
    }

    fn mint_request_id(&mut self) -> i64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    /// Register a new app instance and issue its first request (spec.md
    /// §4.5, step 1).
    pub fn submit(
        &mut self,
        app_id: u64,
        requirements: TaskDescription,
        num_tasks: u64,
        now: DateTime<Utc>,
    ) -> Vec<SupervisorEffect> {
        let record = SubmissionRecord::new(app_id, requirements, num_tasks);
        self.apps.insert(app_id, record);
        self.send_request(app_id, 0, now)
    }

    /// Collect the longest contiguous prefix of `Ready` task ids, mark them
    /// `Searching`, and send them upward in a fresh bag (spec.md §4.5, step
    /// 2). Buffers instead while the overlay is mid-change. A contiguous
    /// prefix is used rather than "up to N tasks" verbatim because
    /// [`TaskBag`] only carries a single `[first, last]` range; see
    /// `DESIGN.md` for the rationale.
    fn send_request(&mut self, app_id: u64, retries: u32, now: DateTime<Utc>) -> Vec<SupervisorEffect> {
        if self.structure_changing {
            self.replay_buffer.push((app_id, retries));
            return Vec::new();
        }

        let range = match self.apps.get(&app_id) {
            Some(record) => ready_contiguous_range(record),
            None => return Vec::new(),
        };

        let Some((first, last)) = range else {
            return self.finalize_if_complete(app_id).into_iter().collect();
        };

        let request_id = self.mint_request_id();
        let requirements = {
            let record = self.apps.get_mut(&app_id).expect("app exists, checked above");
            for id in first..=last {
                if let Some(task) = record.tasks.get_mut(&id) {
                    task.state = SubmissionTaskState::Searching;
                }
            }
            record.pending_requests.insert(
                request_id,
                RequestState {
                    first_task_id: first,
                    last_task_id: last,
                    issued_at: now,
                    retries,
                },
            );
            record.requirements.clone()
        };
        self.request_owner.insert(request_id, app_id);

        let at = now.timestamp_millis() + secs_to_millis(self.config.request_timeout);
        let timer_id = self.timers.schedule(at, TimerKind::RequestTimeout { request_id });
        self.request_timers.insert(request_id, timer_id);

        let bag = TaskBag {
            requester: self.address,
            request_id,
            first_task_id: first,
            last_task_id: last,
            min_requirements: requirements,
            for_worker: false,
            from_worker: true,
        };
        match self.father {
            Some(father) => vec![SupervisorEffect::SendBag(father, bag)],
            None => Vec::new(),
        }
    }

    /// `Accept(requestId, [first..last], heartbeatInterval)` from `src`
    /// (spec.md §4.5, step 3): move the accepted range to `Executing`,
    /// resolve the owning request once every task it covers has left
    /// `Searching`, and (re)arm `src`'s heartbeat deadline at the worker's
    /// own advertised interval.
    pub fn on_accept(&mut self, src: Address, accept: Accept, now: DateTime<Utc>) -> Vec<SupervisorEffect> {
        let Some(&app_id) = self.request_owner.get(&accept.request_id) else {
            tracing::trace!(request_id = accept.request_id, "accept for unknown request dropped");
            return Vec::new();
        };

        let mut resolved = false;
        if let Some(record) = self.apps.get_mut(&app_id) {
            for id in accept.first_task_id..=accept.last_task_id {
                if let Some(task) = record.tasks.get_mut(&id) {
                    task.state = SubmissionTaskState::Executing;
                    task.assigned_worker = Some(src);
                }
            }
            if let Some(req_state) = record.pending_requests.get(&accept.request_id) {
                let still_searching = (req_state.first_task_id..=req_state.last_task_id).any(|id| {
                    record
                        .tasks
                        .get(&id)
                        .is_some_and(|t| t.state == SubmissionTaskState::Searching)
                });
                if !still_searching {
                    record.pending_requests.remove(&accept.request_id);
                    resolved = true;
                }
            }
        }

        if resolved {
            self.request_owner.remove(&accept.request_id);
            if let Some(timer_id) = self.request_timers.remove(&accept.request_id) {
                self.timers.cancel(timer_id);
            }
        }

        let count = accept.last_task_id - accept.first_task_id + 1;
        let per_app = self.remote_tasks_per_worker.entry(src).or_default();
        *per_app.entry(app_id).or_insert(0) += count;

        self.arm_heartbeat(src, accept.heartbeat_interval_secs, now);
        Vec::new()
    }

    /// `Reject(requestId, [first..last])` from the root dispatcher (spec.md
    /// §4.4, step 5): the root could not place this sub-range of tasks
    /// anywhere. Re-ready the rejected tasks and, if the owning request has
    /// no task left `Searching`, retry immediately rather than waiting out
    /// `requestTimeout` -- this is strictly a latency optimisation over the
    /// timeout path, not a separate retry budget.
    pub fn on_reject(&mut self, reject: Reject, now: DateTime<Utc>) -> Vec<SupervisorEffect> {
        let Some(&app_id) = self.request_owner.get(&reject.request_id) else {
            tracing::trace!(request_id = reject.request_id, "reject for unknown request dropped");
            return Vec::new();
        };
        let Some(record) = self.apps.get_mut(&app_id) else {
            return Vec::new();
        };
        let Some(req_state) = record.pending_requests.get(&reject.request_id).cloned() else {
            return Vec::new();
        };

        for id in reject.first_task_id..=reject.last_task_id {
            if let Some(task) = record.tasks.get_mut(&id) {
                if task.state == SubmissionTaskState::Searching {
                    task.state = SubmissionTaskState::Ready;
                }
            }
        }

        let still_searching = (req_state.first_task_id..=req_state.last_task_id).any(|id| {
            record
                .tasks
                .get(&id)
                .is_some_and(|t| t.state == SubmissionTaskState::Searching)
        });
        if !still_searching {
            record.pending_requests.remove(&reject.request_id);
            self.request_owner.remove(&reject.request_id);
            if let Some(timer_id) = self.request_timers.remove(&reject.request_id) {
                self.timers.cancel(timer_id);
            }
        }

        let has_ready = !record.ready_task_ids().is_empty();
        let retries = req_state.retries;
        if has_ready && retries < self.config.submit_retries {
            self.send_request(app_id, retries + 1, now)
        } else {
            self.finalize_if_complete(app_id).into_iter().collect()
        }
    }

    /// `TaskMonitor` from `src` (spec.md §4.5, step 5): apply
    /// Finished/Aborted transitions, retry aborted tasks immediately, and
    /// refresh or drop `src`'s heartbeat timer depending on whether it still
    /// holds anything.
    pub fn on_task_monitor(
        &mut self,
        src: Address,
        monitor: TaskMonitor,
        now: DateTime<Utc>,
    ) -> Vec<SupervisorEffect> {
        let mut effects = Vec::new();
        let mut finished_apps = Vec::new();
        let mut retry_apps = Vec::new();

        for entry in &monitor.entries {
            let Some(app_id) = self.owning_app(src, entry.client_task_id) else {
                tracing::trace!(
                    client_task_id = entry.client_task_id,
                    "monitor entry for unknown task dropped"
                );
                continue;
            };

            match entry.state {
                TaskState::Finished => {
                    if let Some(record) = self.apps.get_mut(&app_id) {
                        if let Some(task) = record.tasks.get_mut(&entry.client_task_id) {
                            task.state = SubmissionTaskState::Finished;
                        }
                    }
                    self.release_from_worker(src, app_id, 1);
                    finished_apps.push(app_id);
                }
                TaskState::Aborted => {
                    if let Some(record) = self.apps.get_mut(&app_id) {
                        if let Some(task) = record.tasks.get_mut(&entry.client_task_id) {
                            task.state = SubmissionTaskState::Ready;
                            task.assigned_worker = None;
                        }
                    }
                    self.release_from_worker(src, app_id, 1);
                    retry_apps.push(app_id);
                }
                TaskState::Inactive | TaskState::Prepared | TaskState::Running => {}
            }
        }

        let still_holds_tasks = self
            .remote_tasks_per_worker
            .get(&src)
            .is_some_and(|per_app| per_app.values().sum::<u64>() > 0);
        if still_holds_tasks {
            self.arm_heartbeat(src, monitor.heartbeat_interval_secs, now);
        } else {
            self.cancel_heartbeat(src);
            self.remote_tasks_per_worker.remove(&src);
        }

        for app_id in retry_apps {
            effects.extend(self.send_request(app_id, 0, now));
        }
        for app_id in finished_apps {
            effects.extend(self.finalize_if_complete(app_id));
        }
        effects
    }

    /// Pop and act on every timer due at or before `now`.
    pub fn drive_timers(&mut self, now: DateTime<Utc>) -> Vec<SupervisorEffect> {
        let due = self.timers.pop_due(now.timestamp_millis());
        let mut effects = Vec::new();
        for (_, kind) in due {
            match kind {
                TimerKind::RequestTimeout { request_id } => {
                    effects.extend(self.handle_request_timeout(request_id, now));
                }
                TimerKind::Heartbeat { worker } => {
                    effects.extend(self.handle_heartbeat_deadline(worker, now));
                }
            }
        }
        effects
    }

    /// `requestTimeout` (spec.md §4.5, step 4): move still-`Searching` tasks
    /// back to `Ready`, then either retry (if budget remains) or finalise.
    fn handle_request_timeout(&mut self, request_id: i64, now: DateTime<Utc>) -> Vec<SupervisorEffect> {
        self.request_timers.remove(&request_id);
        let Some(app_id) = self.request_owner.remove(&request_id) else {
            return Vec::new();
        };
        let Some(record) = self.apps.get_mut(&app_id) else {
            return Vec::new();
        };
        let Some(req_state) = record.pending_requests.remove(&request_id) else {
            return Vec::new();
        };

        for id in req_state.first_task_id..=req_state.last_task_id {
            if let Some(task) = record.tasks.get_mut(&id) {
                if task.state == SubmissionTaskState::Searching {
                    task.state = SubmissionTaskState::Ready;
                }
            }
        }
        let has_ready = !record.ready_task_ids().is_empty();
        let retries = req_state.retries;

        if has_ready && retries < self.config.submit_retries {
            self.send_request(app_id, retries + 1, now)
        } else {
            self.finalize_if_complete(app_id).into_iter().collect()
        }
    }

    /// `heartbeatDeadline` (spec.md §4.5, step 6, and §4.6): treat every
    /// task still `Executing` at `worker` as lost, re-ready it, and retry
    /// the affected app instances. Purges `worker` from the heartbeat map
    /// regardless of whether any task needed re-readying.
    fn handle_heartbeat_deadline(&mut self, worker: Address, now: DateTime<Utc>) -> Vec<SupervisorEffect> {
        self.heartbeat_timers.remove(&worker);
        let Some(per_app) = self.remote_tasks_per_worker.remove(&worker) else {
            return Vec::new();
        };

        let mut effects = Vec::new();
        for app_id in per_app.into_keys() {
            let any_reset = if let Some(record) = self.apps.get_mut(&app_id) {
                let mut any = false;
                for task in record.tasks.values_mut() {
                    if task.assigned_worker == Some(worker)
                        && task.state == SubmissionTaskState::Executing
                    {
                        task.state = SubmissionTaskState::Ready;
                        task.assigned_worker = None;
                        any = true;
                    }
                }
                any
            } else {
                false
            };
            if any_reset {
                effects.extend(self.send_request(app_id, 0, now));
            }
        }
        effects
    }

    fn arm_heartbeat(&mut self, worker: Address, heartbeat_interval_secs: f64, now: DateTime<Utc>) {
        if let Some(timer_id) = self.heartbeat_timers.remove(&worker) {
            self.timers.cancel(timer_id);
        }
        let at = now.timestamp_millis() + secs_to_millis(2.5 * heartbeat_interval_secs);
        let timer_id = self.timers.schedule(at, TimerKind::Heartbeat { worker });
        self.heartbeat_timers.insert(worker, timer_id);
    }

    fn cancel_heartbeat(&mut self, worker: Address) {
        if let Some(timer_id) = self.heartbeat_timers.remove(&worker) {
            self.timers.cancel(timer_id);
        }
    }

    fn release_from_worker(&mut self, worker: Address, app_id: u64, n: u64) {
        if let Some(per_app) = self.remote_tasks_per_worker.get_mut(&worker) {
            if let Some(count) = per_app.get_mut(&app_id) {
                *count = count.saturating_sub(n);
                if *count == 0 {
                    per_app.remove(&app_id);
                }
            }
        }
    }

    fn finalize_if_complete(&mut self, app_id: u64) -> Option<SupervisorEffect> {
        let done = self.apps.get(&app_id).is_some_and(SubmissionRecord::is_complete);
        if done {
            self.apps.remove(&app_id);
            Some(SupervisorEffect::AppFinished(app_id))
        } else {
            None
        }
    }

    /// Find which app instance has a task assigned to `worker` under
    /// `client_task_id`. Client task ids are only unique within one app's
    /// own bag (spec.md's ids restart at 0 per submission), so this scans
    /// every tracked app; see `DESIGN.md` for why that's an acceptable
    /// resolution here.
    fn owning_app(&self, worker: Address, client_task_id: u64) -> Option<u64> {
        self.apps.iter().find_map(|(app_id, record)| {
            record
                .tasks
                .get(&client_task_id)
                .filter(|t| t.assigned_worker == Some(worker))
                .map(|_| *app_id)
        })
    }

    pub fn on_structure_changing(&mut self) {
        self.structure_changing = true;
    }

    /// Overlay commit (spec.md §4.5): replay every buffered `sendRequest`
    /// call as if freshly issued.
    pub fn on_structure_changed(
        &mut self,
        new_father: Option<Address>,
        now: DateTime<Utc>,
    ) -> Vec<SupervisorEffect> {
        self.structure_changing = false;
        self.father = new_father;
        let buffered: Vec<(u64, u32)> = self.replay_buffer.drain(..).collect();
        let mut effects = Vec::new();
        for (app_id, retries) in buffered {
            effects.extend(self.send_request(app_id, retries, now));
        }
        effects
    }
}

fn ready_contiguous_range(record: &SubmissionRecord) -> Option<(u64, u64)> {
    let ready = record.ready_task_ids();
    let first = *ready.first()?;
    let mut last = first;
    for &id in ready.iter().skip(1) {
        if id == last + 1 {
            last = id;
        } else {
            break;
        }
    }
    Some((first, last))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(deadline: Option<DateTime<Utc>>) -> TaskDescription {
        TaskDescription {
            length: 1000,
            max_memory: 1,
            max_disk: 1,
            input_size: 0,
            output_size: 0,
            num_tasks: 3,
            deadline,
            app_length: 1000,
        }
    }

    fn accept_for(bag: &TaskBag, heartbeat: f64) -> Accept {
        Accept {
            request_id: bag.request_id,
            first_task_id: bag.first_task_id,
            last_task_id: bag.last_task_id,
            heartbeat_interval_secs: heartbeat,
        }
    }

    fn send_bag(effects: &[SupervisorEffect]) -> Option<TaskBag> {
        effects.iter().find_map(|e| match e {
            SupervisorEffect::SendBag(_, bag) => Some(bag.clone()),
            _ => None,
        })
    }

    #[test]
    fn submit_sends_a_bag_spanning_all_ready_tasks() {
        let father = Address::new(1);
        let mut sup = SubmissionSupervisor::new(Address::new(2), Some(father), Config::default());
        let now = Utc::now();
        let effects = sup.submit(7, desc(None), 3, now);
        let bag = send_bag(&effects).expect("submit must send a bag");
        assert_eq!((bag.first_task_id, bag.last_task_id), (0, 2));
        assert_eq!(bag.requester, Address::new(2));
        assert!(bag.from_worker);
    }

    #[test]
    fn accept_moves_tasks_to_executing_and_arms_heartbeat() {
        let worker = Address::new(5);
        let mut sup = SubmissionSupervisor::new(Address::new(2), Some(Address::new(1)), Config::default());
        let now = Utc::now();
        let effects = sup.submit(1, desc(None), 3, now);
        let bag = send_bag(&effects).unwrap();

        sup.on_accept(worker, accept_for(&bag, 30.0), now);
        assert!(sup.has_heartbeat_timer(worker));
        assert_eq!(sup.remote_task_count(worker, 1), 3);

        let record = sup.app(1).unwrap();
        for id in 0..3 {
            assert_eq!(
                record.tasks.get(&id).unwrap().state,
                SubmissionTaskState::Executing
            );
        }
    }

    #[test]
    fn request_timeout_without_retry_budget_finalises_empty_ready_instance() {
        let config = Config {
            submit_retries: 0,
            ..Config::default()
        };
        let mut sup = SubmissionSupervisor::new(Address::new(2), Some(Address::new(1)), config);
        let now = Utc::now();
        sup.submit(1, desc(None), 1, now);

        let later = now + chrono::Duration::seconds(60);
        let effects = sup.drive_timers(later);
        assert!(effects.contains(&SupervisorEffect::AppFinished(1)));
        assert!(sup.app(1).is_none());
    }

    #[test]
    fn finished_monitor_entry_completes_app_once_all_tasks_done() {
        let worker = Address::new(5);
        let mut sup = SubmissionSupervisor::new(Address::new(2), Some(Address::new(1)), Config::default());
        let now = Utc::now();
        let effects = sup.submit(1, desc(None), 1, now);
        let bag = send_bag(&effects).unwrap();
        sup.on_accept(worker, accept_for(&bag, 30.0), now);

        let monitor = TaskMonitor {
            owner: Address::new(2),
            heartbeat_interval_secs: 30.0,
            entries: vec![stars_core::MonitorEntry {
                client_task_id: 0,
                state: TaskState::Finished,
            }],
        };
        let effects = sup.on_task_monitor(worker, monitor, now);
        assert!(effects.contains(&SupervisorEffect::AppFinished(1)));
        assert!(!sup.has_heartbeat_timer(worker));
    }

    #[test]
    fn aborted_monitor_entry_retries_immediately() {
        let worker = Address::new(5);
        let mut sup = SubmissionSupervisor::new(Address::new(2), Some(Address::new(1)), Config::default());
        let now = Utc::now();
        let effects = sup.submit(1, desc(None), 1, now);
        let bag = send_bag(&effects).unwrap();
        sup.on_accept(worker, accept_for(&bag, 30.0), now);

        let monitor = TaskMonitor {
            owner: Address::new(2),
            heartbeat_interval_secs: 30.0,
            entries: vec![stars_core::MonitorEntry {
                client_task_id: 0,
                state: TaskState::Aborted,
            }],
        };
        let effects = sup.on_task_monitor(worker, monitor, now);
        let retry_bag = send_bag(&effects).expect("aborted task must be resubmitted");
        assert_ne!(retry_bag.request_id, bag.request_id, "retry must mint a fresh request id");
        assert_eq!((retry_bag.first_task_id, retry_bag.last_task_id), (0, 0));
    }

    #[test]
    fn reject_re_readies_range_and_retries_with_a_fresh_request_id() {
        let mut sup = SubmissionSupervisor::new(Address::new(2), Some(Address::new(1)), Config::default());
        let now = Utc::now();
        let effects = sup.submit(1, desc(None), 3, now);
        let bag = send_bag(&effects).unwrap();

        let effects = sup.on_reject(
            Reject {
                request_id: bag.request_id,
                first_task_id: bag.first_task_id,
                last_task_id: bag.last_task_id,
            },
            now,
        );
        let retry_bag = send_bag(&effects).expect("rejected range must be retried immediately");
        assert_ne!(retry_bag.request_id, bag.request_id, "retry must mint a fresh request id");
        assert_eq!((retry_bag.first_task_id, retry_bag.last_task_id), (0, 2));

        let record = sup.app(1).unwrap();
        assert!(record.pending_requests.is_empty(), "original request must be cleared");
    }

    #[test]
    fn reject_for_unknown_request_is_dropped() {
        let mut sup = SubmissionSupervisor::new(Address::new(2), Some(Address::new(1)), Config::default());
        let now = Utc::now();
        let effects = sup.on_reject(
            Reject {
                request_id: 999,
                first_task_id: 0,
                last_task_id: 0,
            },
            now,
        );
        assert!(effects.is_empty());
    }

    #[test]
    fn structure_changing_buffers_requests_until_commit() {
        let mut sup = SubmissionSupervisor::new(Address::new(2), Some(Address::new(1)), Config::default());
        sup.on_structure_changing();
        let now = Utc::now();
        let effects = sup.submit(1, desc(None), 1, now);
        assert!(effects.is_empty(), "nothing sent while structure-changing");

        let effects = sup.on_structure_changed(Some(Address::new(9)), now);
        let bag = send_bag(&effects).expect("buffered request replays on commit");
        assert_eq!(bag.first_task_id, 0);
        assert_eq!(sup.father(), Some(Address::new(9)));
    }
}
