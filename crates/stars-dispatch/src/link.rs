//! A single neighbour's three-summary window (spec.md §3): `received` from
//! that neighbour, `pending` waiting to be sent, and `notified` last sent.

use stars_summary::AvailabilitySummary;

/// Whether a link is to the father or to a child (affects nothing about the
/// link's own state, but lets [`crate::dispatcher::AggregatingDispatcher`]
/// treat the two uniformly while still reporting which is which).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Father,
    Child,
}

/// Per-neighbour summary window. `received` is `None` until the first
/// summary arrives on this link; `pending`/`notified` likewise start empty.
#[derive(Debug, Clone)]
pub struct DispatcherLink {
    pub kind: LinkKind,
    pub received: Option<AvailabilitySummary>,
    pub pending: Option<AvailabilitySummary>,
    pub notified: Option<AvailabilitySummary>,
    next_seq: u32,
}

impl DispatcherLink {
    #[must_use]
    pub fn new(kind: LinkKind) -> Self {
        Self {
            kind,
            received: None,
            pending: None,
            notified: None,
            next_seq: 1,
        }
    }

    /// Accept `summary` if its sequence number is strictly greater than the
    /// stored `received.seq` (spec.md §3's overwrite rule, §8 invariant 2).
    /// Returns `false` if the summary was stale and therefore dropped.
    pub fn accept(&mut self, summary: AvailabilitySummary) -> bool {
        let stale = self
            .received
            .as_ref()
            .is_some_and(|r| summary.seq() <= r.seq());
        if stale {
            return false;
        }
        self.received = Some(summary);
        true
    }

    /// Whether `pending` differs from `notified` and is therefore worth
    /// sending (spec.md §3's send invariant).
    #[must_use]
    pub fn has_unsent(&self) -> bool {
        match (&self.pending, &self.notified) {
            (Some(p), Some(n)) => p != n,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Mint the next outgoing sequence number for this link.
    pub fn next_seq(&mut self) -> u32 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Mark `pending` as sent: it becomes `notified`, and `pending` clears
    /// (spec.md §3: "after sending, `notified := pending; pending := ∅`").
    pub fn mark_sent(&mut self) {
        if let Some(p) = self.pending.take() {
            self.notified = Some(p);
        }
    }
}
