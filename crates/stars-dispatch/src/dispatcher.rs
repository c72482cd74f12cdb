//! The aggregating dispatcher (C3, spec.md §4.3): leave-one-out recomputation
//! of each neighbour's view and a bandwidth-capped upward/downward sender.
//!
//! Like [`stars_worker::LocalScheduler`] this is driven cooperatively
//! (spec.md §5): every method mutates local state and returns
//! [`DispatchEffect`]s for the node event loop to act on.

use chrono::{DateTime, Utc};

use stars_core::{secs_to_millis, Address, Config, Millis, TimerId, TimerWheel};
use stars_summary::AvailabilitySummary;

use crate::link::{DispatcherLink, LinkKind};

/// Follow-up action the node event loop must perform on the dispatcher's
/// behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEffect {
    /// Send a freshly reduced summary to a neighbour.
    Send(Address, AvailabilitySummary),
    /// Arm (or re-arm) the rate-limit timer at an absolute time.
    ArmSendTimer(Millis),
}

/// A structural change to the child set, as reported by the overlay
/// (spec.md §4.3's "new children added at tail, vanished children removed").
#[derive(Debug, Clone, Default)]
pub struct ChildDiff {
    pub added: Vec<Address>,
    pub removed: Vec<Address>,
}

/// Per-node aggregating dispatcher.
pub struct AggregatingDispatcher {
    address: Address,
    father: Option<DispatcherLink>,
    father_address: Option<Address>,
    children: Vec<(Address, DispatcherLink)>,
    /// This node's own contribution, if it also runs a local scheduler
    /// (spec.md §4.2: "forwards it upward with the next sequence number via
    /// C3"). `None` for a pure interior dispatcher with no local worker.
    local: Option<AvailabilitySummary>,
    structure_changing: bool,
    replay_buffer: Vec<(Address, AvailabilitySummary)>,
    next_allowed_send_time: Millis,
    send_timer: Option<TimerId>,
    timers: TimerWheel<Millis, ()>,
    config: Config,
    recompute_count: u32,
}

impl AggregatingDispatcher {
    #[must_use]
    pub fn new(
        address: Address,
        father: Option<Address>,
        children: Vec<Address>,
        config: Config,
    ) -> Self {
        Self {
            address,
            father: father.map(|_| DispatcherLink::new(LinkKind::Father)),
            father_address: father,
            children: children
                .into_iter()
                .map(|a| (a, DispatcherLink::new(LinkKind::Child)))
                .collect(),
            local: None,
            structure_changing: false,
            replay_buffer: Vec::new(),
            next_allowed_send_time: 0,
            send_timer: None,
            timers: TimerWheel::new(),
            config,
            recompute_count: 0,
        }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.father_address.is_none()
    }

    /// Mutable access to the node's configuration, e.g. to apply a live
    /// `updateBandwidth` change.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Number of `recompute()` calls observed so far (test/diagnostic
    /// instrumentation for spec.md §8's S3 scenario).
    #[must_use]
    pub fn recompute_count(&self) -> u32 {
        self.recompute_count
    }

    /// The latest accepted summary from neighbour `src`, if any. Used by
    /// callers (and tests, spec.md §8's S6) to inspect post-replay state
    /// without reaching into private link fields.
    #[must_use]
    pub fn received_from(&self, src: Address) -> Option<&AvailabilitySummary> {
        if self.father_address == Some(src) {
            self.father.as_ref().and_then(|l| l.received.as_ref())
        } else {
            self.children
                .iter()
                .find(|(a, _)| *a == src)
                .and_then(|(_, l)| l.received.as_ref())
        }
    }

    /// Install or clear this node's own availability (it also runs a local
    /// scheduler). Does not itself trigger `recompute`/`maybeNotify`;
    /// callers should follow with a call that does, e.g. re-deliver through
    /// [`Self::on_summary`] is not appropriate here since there is no
    /// neighbour link for `local` -- call [`Self::recompute`] directly.
    pub fn set_local(&mut self, summary: Option<AvailabilitySummary>) {
        self.local = summary;
    }

    fn link_mut(&mut self, src: Address) -> Option<&mut DispatcherLink> {
        if self.father_address == Some(src) {
            return self.father.as_mut();
        }
        self.children.iter_mut().find(|(a, _)| *a == src).map(|(_, l)| l)
    }

    /// Received-summary entry point (spec.md §4.3's 4-step inbound
    /// handling). Buffers under `structureChanging`; drops stale or
    /// unmatched sources; otherwise accepts and runs `recompute`/
    /// `maybeNotify`.
    pub fn on_summary(
        &mut self,
        src: Address,
        summary: AvailabilitySummary,
        now: DateTime<Utc>,
    ) -> Vec<DispatchEffect> {
        if self.structure_changing {
            self.replay_buffer.push((src, summary));
            return Vec::new();
        }
        self.accept_summary(src, summary, now)
    }

    fn accept_summary(
        &mut self,
        src: Address,
        summary: AvailabilitySummary,
        now: DateTime<Utc>,
    ) -> Vec<DispatchEffect> {
        let Some(link) = self.link_mut(src) else {
            tracing::debug!(%src, "summary from unmatched neighbour dropped as stale");
            return Vec::new();
        };
        if !link.accept(summary) {
            tracing::trace!(%src, "stale summary dropped");
            return Vec::new();
        }
        self.recompute();
        self.maybe_notify(now)
    }

    /// Leave-one-out aggregation (spec.md §4.3): every neighbour's `pending`
    /// becomes the join of every *other* neighbour's `received`, plus this
    /// node's own local contribution if any.
    pub fn recompute(&mut self) {
        self.recompute_count += 1;

        let father_received = self.father.as_ref().and_then(|l| l.received.clone());
        let child_received: Vec<(Address, AvailabilitySummary)> = self
            .children
            .iter()
            .filter_map(|(a, l)| l.received.clone().map(|s| (*a, s)))
            .collect();

        if let Some(father_link) = self.father.as_mut() {
            let mut joined = self.local.clone();
            for (_, s) in &child_received {
                joined = join_opt(joined, s.clone());
            }
            father_link.pending = joined;
        }

        for (addr, link) in &mut self.children {
            let mut joined = self.local.clone();
            if let Some(f) = &father_received {
                joined = join_opt(joined, f.clone());
            }
            for (other_addr, s) in &child_received {
                if other_addr != addr {
                    joined = join_opt(joined, s.clone());
                }
            }
            link.pending = joined;
        }
    }

    /// Rate-limited sender (spec.md §4.3). Sends every neighbour whose
    /// `pending` differs from `notified`, reduced to the configured cluster
    /// budget, if `now >= nextAllowedSendTime`; otherwise arms a timer for
    /// that time (idempotently) and defers.
    pub fn maybe_notify(&mut self, now: DateTime<Utc>) -> Vec<DispatchEffect> {
        if self.structure_changing {
            return Vec::new();
        }
        let now_millis = now.timestamp_millis();
        if now_millis < self.next_allowed_send_time {
            return self.arm_send_timer_if_needed();
        }

        let mut effects = Vec::new();
        let mut sent_bytes: u64 = 0;
        let detail = 1.0;
        let budget = self.config.avail_clusters;

        if let Some(link) = &mut self.father {
            if link.has_unsent() {
                if let Some(mut summary) = link.pending.clone() {
                    summary = summary.reduce(budget, detail);
                    summary.set_seq(link.next_seq());
                    summary.set_from_scheduler(false);
                    sent_bytes += estimate_bytes(&summary);
                    link.pending = Some(summary.clone());
                    link.mark_sent();
                    let father = self
                        .father_address
                        .expect("father link exists only when father_address is set");
                    effects.push(DispatchEffect::Send(father, summary));
                }
            }
        }
        for (addr, link) in &mut self.children {
            if link.has_unsent() {
                if let Some(mut summary) = link.pending.clone() {
                    summary = summary.reduce(budget, detail);
                    summary.set_seq(link.next_seq());
                    summary.set_from_scheduler(false);
                    sent_bytes += estimate_bytes(&summary);
                    link.pending = Some(summary.clone());
                    link.mark_sent();
                    effects.push(DispatchEffect::Send(*addr, summary));
                }
            }
        }

        let bandwidth = self.config.update_bandwidth.max(1) as f64;
        let delay_secs = sent_bytes as f64 / bandwidth;
        self.next_allowed_send_time = now_millis + secs_to_millis(delay_secs);
        effects
    }

    fn arm_send_timer_if_needed(&mut self) -> Vec<DispatchEffect> {
        if self.send_timer.is_some() {
            return Vec::new();
        }
        self.send_timer = Some(self.timers.schedule(self.next_allowed_send_time, ()));
        vec![DispatchEffect::ArmSendTimer(self.next_allowed_send_time)]
    }

    /// Timer callback: the armed send timer fired, recall `maybeNotify`.
    pub fn on_send_timer(&mut self, now: DateTime<Utc>) -> Vec<DispatchEffect> {
        self.send_timer = None;
        self.timers.pop_due(now.timestamp_millis());
        self.maybe_notify(now)
    }

    pub fn on_structure_changing(&mut self) {
        self.structure_changing = true;
    }

    /// Structure commit (spec.md §4.3): resync the child list, replay
    /// buffered summaries as if newly arrived, then recompute/notify.
    pub fn on_structure_changed(
        &mut self,
        new_father: Option<Address>,
        diff: ChildDiff,
        now: DateTime<Utc>,
    ) -> Vec<DispatchEffect> {
        self.structure_changing = false;

        if new_father != self.father_address {
            self.father_address = new_father;
            self.father = new_father.map(|_| DispatcherLink::new(LinkKind::Father));
        }
        self.children.retain(|(a, _)| !diff.removed.contains(a));
        for added in diff.added {
            self.children.push((added, DispatcherLink::new(LinkKind::Child)));
        }

        let buffered: Vec<(Address, AvailabilitySummary)> = self.replay_buffer.drain(..).collect();
        let mut effects = Vec::new();
        for (src, summary) in buffered {
            effects.extend(self.accept_summary(src, summary, now));
        }
        effects
    }
}

fn join_opt(
    acc: Option<AvailabilitySummary>,
    next: AvailabilitySummary,
) -> Option<AvailabilitySummary> {
    match acc {
        None => Some(next),
        Some(a) => match a.join(&next) {
            Ok(joined) => Some(joined),
            Err(err) => {
                tracing::warn!(error = %err, "dropping mismatched-policy summary during join");
                Some(a)
            }
        },
    }
}

/// Wire size estimate used for the bandwidth cap (spec.md §4.3:
/// "accumulate the serialised size"). Uses the same JSON envelope
/// `stars-node` would actually put on the wire.
#[must_use]
pub fn estimate_bytes(summary: &AvailabilitySummary) -> u64 {
    serde_json::to_vec(summary).map(|v| v.len() as u64).unwrap_or(0)
}
