//! The local scheduler (C2, spec.md §4.2): per-node admission, queueing, and
//! the `reschedule`/`monitor` timers.
//!
//! Like every component in this workspace the scheduler is driven
//! cooperatively (spec.md §5): its methods never block, they only mutate
//! local state and return [`WorkerEffect`]s for the caller (the node event
//! loop) to act on -- arming a timer, invoking the executor, or sending a
//! message.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use stars_core::{
    secs_to_millis, Accept, Address, Millis, MonitorEntry, Task, TaskBag, TaskMonitor, TaskState,
    TimerId, TimerWheel,
};
use stars_summary::{
    AvailabilitySummary, BasicSummary, BasicWorkerState, DeadlineSummary, DeadlineWorkerState,
    MmpWorkerState, QueueBalancingSummary, SlownessSummary, SlownessWorkerState,
};

use crate::error::{Result, WorkerError};
use crate::policy::{all_deadlines_met, break_even_key, deadline_key, fits_static, AdmissionPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Reschedule,
    Monitor,
}

/// Follow-up action the node event loop must perform on the scheduler's
/// behalf. Never executed synchronously inside a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEffect {
    /// Invoke `executor.run()` for a task that just became the running head.
    RunTask(u64),
    /// Invoke `executor.abort()` for a task removed by an abort request.
    AbortExecutorTask(u64),
    /// Send an `Accept` back to the bag's requester.
    SendAccept(Address, Accept),
    /// Send a `TaskMonitor` to a distinct owner.
    SendMonitor(Address, TaskMonitor),
    /// Hand the freshly recomputed snapshot to C3 for upward forwarding.
    ForwardSnapshot(AvailabilitySummary),
}

/// Per-node local scheduler.
pub struct LocalScheduler {
    address: Address,
    policy: AdmissionPolicy,
    memory: f64,
    disk: f64,
    power: f64,
    queue: Vec<Task>,
    config: stars_core::Config,
    timers: TimerWheel<Millis, TimerKind>,
    reschedule_timer: Option<TimerId>,
    monitor_timer: Option<TimerId>,
    next_task_id: u64,
    father_changing: bool,
    rng: StdRng,
}

impl LocalScheduler {
    #[must_use]
    pub fn new(
        address: Address,
        policy: AdmissionPolicy,
        memory: f64,
        disk: f64,
        power: f64,
        config: stars_core::Config,
    ) -> Self {
        Self {
            address,
            policy,
            memory,
            disk,
            power,
            queue: Vec::new(),
            config,
            timers: TimerWheel::new(),
            reschedule_timer: None,
            monitor_timer: None,
            next_task_id: 1,
            father_changing: false,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic-jitter constructor for tests.
    #[must_use]
    pub fn with_seed(
        address: Address,
        policy: AdmissionPolicy,
        memory: f64,
        disk: f64,
        power: f64,
        config: stars_core::Config,
        seed: u64,
    ) -> Self {
        let mut s = Self::new(address, policy, memory, disk, power, config);
        s.rng = StdRng::seed_from_u64(seed);
        s
    }

    #[must_use]
    pub fn queue(&self) -> &[Task] {
        &self.queue
    }

    pub fn set_father_changing(&mut self, changing: bool) {
        self.father_changing = changing;
    }

    fn jittered_millis(&mut self, base_secs: f64) -> Millis {
        let frac = self.rng.gen_range(-0.1..=0.1_f64);
        secs_to_millis((base_secs * (1.0 + frac)).max(0.0))
    }

    fn arm_reschedule(&mut self, now: DateTime<Utc>) {
        if let Some(id) = self.reschedule_timer.take() {
            self.timers.cancel(id);
        }
        let delay = self.jittered_millis(self.config.reschedule_timeout);
        let at = now.timestamp_millis() + delay;
        self.reschedule_timer = Some(self.timers.schedule(at, TimerKind::Reschedule));
    }

    fn arm_monitor_if_needed(&mut self, now: DateTime<Utc>) {
        if self.queue.is_empty() {
            if let Some(id) = self.monitor_timer.take() {
                self.timers.cancel(id);
            }
            return;
        }
        if self.monitor_timer.is_some() {
            return;
        }
        let delay = self.jittered_millis(self.config.heartbeat);
        let at = now.timestamp_millis() + delay;
        self.monitor_timer = Some(self.timers.schedule(at, TimerKind::Monitor));
    }

    /// Pop and act on every timer due at or before `now`.
    pub fn drive_timers(&mut self, now: DateTime<Utc>) -> Vec<WorkerEffect> {
        let due = self.timers.pop_due(now.timestamp_millis());
        let mut effects = Vec::new();
        for (id, kind) in due {
            match kind {
                TimerKind::Reschedule => {
                    if self.reschedule_timer == Some(id) {
                        self.reschedule_timer = None;
                    }
                    self.arm_reschedule(now);
                    if !self.father_changing {
                        effects.push(WorkerEffect::ForwardSnapshot(self.snapshot()));
                    }
                }
                TimerKind::Monitor => {
                    if self.monitor_timer == Some(id) {
                        self.monitor_timer = None;
                    }
                    effects.extend(self.monitor_effects());
                    self.arm_monitor_if_needed(now);
                }
            }
        }
        effects
    }

    fn monitor_effects(&self) -> Vec<WorkerEffect> {
        let mut by_owner: HashMap<Address, Vec<MonitorEntry>> = HashMap::new();
        for task in &self.queue {
            by_owner.entry(task.owner).or_default().push(MonitorEntry {
                client_task_id: task.client_task_id,
                state: task.state(),
            });
        }
        by_owner
            .into_iter()
            .map(|(owner, entries)| {
                WorkerEffect::SendMonitor(
                    owner,
                    TaskMonitor {
                        owner,
                        heartbeat_interval_secs: self.config.heartbeat,
                        entries,
                    },
                )
            })
            .collect()
    }

    /// Admit a prefix of `bag`, per spec.md §4.2's per-policy rules. Returns
    /// the number of tasks accepted (from the head of the bag) and the
    /// effects the caller must perform.
    pub fn offer(&mut self, bag: &TaskBag, now: DateTime<Utc>) -> (u64, Vec<WorkerEffect>) {
        let mut effects = Vec::new();

        if !fits_static(&bag.min_requirements, self.memory, self.disk) {
            return (0, effects);
        }

        let accepted = match self.policy {
            AdmissionPolicy::Immediate => u64::from(self.queue.is_empty()),
            AdmissionPolicy::Fcfs => bag.len(),
            AdmissionPolicy::Deadline => {
                if self.deadline_bag_is_feasible(bag, now) {
                    bag.len()
                } else {
                    0
                }
            }
            AdmissionPolicy::FairSlowness => bag.len(),
        };

        if accepted == 0 {
            return (0, effects);
        }

        let first_client_id = bag.first_task_id;
        let last_client_id = bag.first_task_id + accepted - 1;

        for client_task_id in first_client_id..=last_client_id {
            let task_id = self.next_task_id;
            self.next_task_id += 1;
            let mut task = Task::new(
                task_id,
                bag.requester,
                bag.request_id,
                client_task_id,
                bag.min_requirements.clone(),
                now,
            );
            task.transition(TaskState::Prepared)
                .expect("freshly created task is never terminal");
            self.insert_by_policy(task);
        }

        if matches!(self.policy, AdmissionPolicy::FairSlowness) {
            self.fsp_reorder();
        }

        if let Some(run_id) = self.promote_head_if_idle() {
            effects.push(WorkerEffect::RunTask(run_id));
        }

        effects.push(WorkerEffect::SendAccept(
            bag.requester,
            Accept {
                request_id: bag.request_id,
                first_task_id: first_client_id,
                last_task_id: last_client_id,
                heartbeat_interval_secs: self.config.heartbeat,
            },
        ));

        self.arm_reschedule(now);
        self.arm_monitor_if_needed(now);
        if !self.father_changing {
            effects.push(WorkerEffect::ForwardSnapshot(self.snapshot()));
        }

        (accepted, effects)
    }

    fn deadline_bag_is_feasible(&self, bag: &TaskBag, now: DateTime<Utc>) -> bool {
        let running_len = usize::from(
            self.queue.first().is_some_and(|t| t.state() == TaskState::Running),
        );
        let (running, movable) = self.queue.split_at(running_len);

        let mut candidates: Vec<(u64, Option<DateTime<Utc>>)> = movable
            .iter()
            .map(|t| (t.description.length, t.description.deadline))
            .collect();
        for _ in bag.first_task_id..=bag.last_task_id {
            candidates.push((bag.min_requirements.length, bag.min_requirements.deadline));
        }
        candidates.sort_by(|a, b| {
            deadline_key_of(a.1)
                .partial_cmp(&deadline_key_of(b.1))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut full_order: Vec<(u64, Option<DateTime<Utc>>)> = running
            .iter()
            .map(|t| (t.description.length, t.description.deadline))
            .collect();
        full_order.extend(candidates);

        all_deadlines_met(self.power, now, &full_order)
    }

    /// Insert a freshly admitted task into the queue per the active policy's
    /// ordering rule. FCFS and FSP append (FSP's order is finalised by a
    /// separate full reorder); Deadline inserts at its sorted position among
    /// the non-running tail.
    fn insert_by_policy(&mut self, task: Task) {
        match self.policy {
            AdmissionPolicy::Deadline => {
                let running_len = usize::from(
                    self.queue
                        .first()
                        .is_some_and(|t| t.state() == TaskState::Running),
                );
                let key = deadline_key(&task.description);
                let pos = self.queue[running_len..]
                    .iter()
                    .position(|t| deadline_key(&t.description) > key)
                    .map_or(self.queue.len(), |i| running_len + i);
                self.queue.insert(pos, task);
            }
            _ => self.queue.push(task),
        }
    }

    /// Reorder the non-running tail by ascending break-even key (spec.md
    /// §4.2's FSP rule). Stable, so ties preserve arrival order.
    fn fsp_reorder(&mut self) {
        let running_len = usize::from(
            self.queue.first().is_some_and(|t| t.state() == TaskState::Running),
        );
        if !self.config.fsp_preemptive {
            return;
        }
        self.queue[running_len..].sort_by(|a, b| {
            break_even_key(&a.description)
                .partial_cmp(&break_even_key(&b.description))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// If the head is `Prepared` (queued but not yet running), promote it to
    /// `Running` and report it for execution.
    fn promote_head_if_idle(&mut self) -> Option<u64> {
        let head = self.queue.first_mut()?;
        if head.state() == TaskState::Prepared {
            head.transition(TaskState::Running).ok()?;
            Some(head.task_id)
        } else {
            None
        }
    }

    /// The executor's notification path (spec.md §6): `Prepared → Running →
    /// Finished`, or `Aborted` on failure.
    pub fn on_state_change(
        &mut self,
        task_id: u64,
        new_state: TaskState,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkerEffect>> {
        let idx = self
            .queue
            .iter()
            .position(|t| t.task_id == task_id)
            .ok_or(WorkerError::UnknownTask { task_id })?;

        self.queue[idx].transition(new_state)?;
        let mut effects = Vec::new();

        if new_state == TaskState::Aborted {
            let task = &self.queue[idx];
            effects.push(WorkerEffect::SendMonitor(
                task.owner,
                TaskMonitor {
                    owner: task.owner,
                    heartbeat_interval_secs: self.config.heartbeat,
                    entries: vec![MonitorEntry {
                        client_task_id: task.client_task_id,
                        state: TaskState::Aborted,
                    }],
                },
            ));
        }

        if new_state.is_terminal() {
            self.queue.remove(idx);
            if let Some(run_id) = self.promote_head_if_idle() {
                effects.push(WorkerEffect::RunTask(run_id));
            }
            self.arm_reschedule(now);
            self.arm_monitor_if_needed(now);
            if !self.father_changing {
                effects.push(WorkerEffect::ForwardSnapshot(self.snapshot()));
            }
        }

        Ok(effects)
    }

    /// Requester-initiated abort (spec.md §4.2). Unknown ids are silently
    /// skipped (spec.md §7: stale references are dropped, not errors).
    pub fn on_abort(
        &mut self,
        _request_id: i64,
        task_ids: &[u64],
        now: DateTime<Utc>,
    ) -> Vec<WorkerEffect> {
        let mut effects = Vec::new();
        for &task_id in task_ids {
            if let Ok(sub_effects) = self.on_state_change(task_id, TaskState::Aborted, now) {
                effects.push(WorkerEffect::AbortExecutorTask(task_id));
                effects.extend(sub_effects);
            } else {
                tracing::debug!(task_id, "abort of unknown or already-terminal task dropped");
            }
        }
        effects
    }

    /// Current availability in the node's active variant (spec.md §4.2).
    #[must_use]
    pub fn snapshot(&self) -> AvailabilitySummary {
        match self.policy {
            AdmissionPolicy::Immediate => AvailabilitySummary::Basic(BasicSummary::from_worker(
                BasicWorkerState {
                    free: self.queue.is_empty(),
                },
            )),
            AdmissionPolicy::Fcfs => {
                let total_remaining: u64 = self.queue.iter().map(|t| t.description.length).sum();
                AvailabilitySummary::QueueBalancing(QueueBalancingSummary::from_worker(
                    MmpWorkerState {
                        memory: self.memory,
                        disk: self.disk,
                        power: self.power,
                        queue_end: total_remaining as f64 / self.power.max(f64::EPSILON),
                    },
                ))
            }
            AdmissionPolicy::Deadline => {
                let now = Utc::now();
                let committed: Vec<(f64, f64)> = self
                    .queue
                    .iter()
                    .filter_map(|t| {
                        t.description.deadline.map(|d| {
                            let secs = (d - now).num_milliseconds() as f64 / 1000.0;
                            (secs.max(0.0), t.description.length as f64)
                        })
                    })
                    .collect();
                let horizon = committed.iter().fold(0.0_f64, |acc, &(d, _)| acc.max(d));
                AvailabilitySummary::Deadline(DeadlineSummary::from_worker(DeadlineWorkerState {
                    memory: self.memory,
                    disk: self.disk,
                    power: self.power,
                    committed,
                    horizon,
                }))
            }
            AdmissionPolicy::FairSlowness => {
                let now = Utc::now();
                let queue: Vec<(f64, f64, f64)> = self
                    .queue
                    .iter()
                    .map(|t| {
                        let wait = (now - t.creation_time).num_milliseconds() as f64 / 1000.0;
                        let weight = 1.0 / (t.description.app_length.max(1) as f64);
                        (wait.max(0.0), t.description.length as f64, weight)
                    })
                    .collect();
                let max_stretch_horizon = self
                    .queue
                    .iter()
                    .map(|t| t.description.app_length as f64 / self.power.max(f64::EPSILON))
                    .fold(1.0_f64, f64::max)
                    * 2.0;
                AvailabilitySummary::Slowness(SlownessSummary::from_worker(
                    SlownessWorkerState {
                        memory: self.memory,
                        disk: self.disk,
                        power: self.power,
                        queue,
                        max_stretch_horizon,
                    },
                    self.config.fsp_pieces,
                ))
            }
        }
    }

    /// Minimum achievable maximum slowness for the current queue order,
    /// projected from `now` at the configured `power` (spec.md §8's S2
    /// scenario): the value FSP's reorder step is minimising.
    #[must_use]
    pub fn minimum_slowness(&self, now: DateTime<Utc>) -> Option<f64> {
        if self.queue.is_empty() {
            return None;
        }
        let mut elapsed_secs = 0.0_f64;
        let mut max_slowness = 0.0_f64;
        for task in &self.queue {
            elapsed_secs += task.description.length as f64 / self.power.max(f64::EPSILON);
            let wait = (now - task.creation_time).num_milliseconds() as f64 / 1000.0;
            let slowness = (wait + elapsed_secs) / (task.description.app_length.max(1) as f64);
            max_slowness = max_slowness.max(slowness);
        }
        Some(max_slowness)
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }
}

fn deadline_key_of(deadline: Option<DateTime<Utc>>) -> f64 {
    deadline.map(|d| d.timestamp() as f64).unwrap_or(f64::MAX)
}
