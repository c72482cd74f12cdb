//! Integration tests exercising the S3 (sequence gating), S4 (bandwidth
//! cap), and S6 (structure replay) scenarios of spec.md §8.

use chrono::{DateTime, Duration, Utc};

use stars_core::{Address, Config};
use stars_dispatch::{estimate_bytes, AggregatingDispatcher, ChildDiff, DispatchEffect};
use stars_summary::{AvailabilitySummary, BasicSummary, BasicWorkerState};

fn basic(seq: u32, free: bool) -> AvailabilitySummary {
    let mut s = BasicSummary::from_worker(BasicWorkerState { free });
    s.seq = seq;
    AvailabilitySummary::Basic(s)
}

#[test]
fn s3_sequence_gating_drops_out_of_order_duplicate() {
    let child = Address::new(10);
    let mut dispatcher =
        AggregatingDispatcher::new(Address::new(1), None, vec![child], Config::default());
    let now = Utc::now();

    dispatcher.on_summary(child, basic(1, true), now);
    assert_eq!(dispatcher.recompute_count(), 1);

    dispatcher.on_summary(child, basic(3, true), now);
    assert_eq!(dispatcher.recompute_count(), 2);

    // seq=2 arrives after seq=3 was already accepted: stale, dropped.
    dispatcher.on_summary(child, basic(2, false), now);
    assert_eq!(
        dispatcher.recompute_count(),
        2,
        "stale seq=2 must not trigger a third recompute"
    );
    assert_eq!(dispatcher.received_from(child).unwrap().seq(), 3);
}

#[test]
fn s4_bandwidth_cap_defers_then_fires() {
    let father = Address::new(1);
    let mut dispatcher =
        AggregatingDispatcher::new(Address::new(2), Some(father), vec![], Config::default());
    dispatcher.config_mut().update_bandwidth = 1000;

    let t0: DateTime<Utc> = Utc::now();

    // First local summary: sent immediately, consuming the bandwidth window.
    let first = AvailabilitySummary::Basic(BasicSummary::from_worker(BasicWorkerState {
        free: true,
    }));
    let first_bytes = estimate_bytes(&first);
    dispatcher.set_local(Some(first));
    dispatcher.recompute();
    let effects = dispatcher.maybe_notify(t0);
    assert!(
        effects
            .iter()
            .any(|e| matches!(e, DispatchEffect::Send(_, _))),
        "first send must go out immediately with an empty window"
    );

    let window_ms = (first_bytes as f64 / 1000.0 * 1000.0).round() as i64;

    // A second local change becomes pending but the bandwidth window from
    // the first send hasn't elapsed: it must defer.
    let second = AvailabilitySummary::Basic(BasicSummary::from_worker(BasicWorkerState {
        free: false,
    }));
    dispatcher.set_local(Some(second));
    dispatcher.recompute();

    let before_window = t0 + Duration::milliseconds((window_ms - 1).max(0));
    let effects = dispatcher.maybe_notify(before_window);
    assert!(
        effects
            .iter()
            .all(|e| !matches!(e, DispatchEffect::Send(_, _))),
        "must defer before the bandwidth window elapses"
    );

    let after_window = t0 + Duration::milliseconds(window_ms + 10);
    let effects = dispatcher.maybe_notify(after_window);
    assert!(
        effects
            .iter()
            .any(|e| matches!(e, DispatchEffect::Send(_, _))),
        "must fire once the bandwidth window has elapsed"
    );
}

#[test]
fn s6_structure_replay_matches_post_commit_processing() {
    let a = Address::new(10);
    let b = Address::new(11);
    let c = Address::new(12);
    let now = Utc::now();

    // Dispatcher 1: buffers A, B, C while structure-changing, replays on commit.
    let mut buffered =
        AggregatingDispatcher::new(Address::new(1), None, vec![a, b, c], Config::default());
    buffered.on_structure_changing();
    buffered.on_summary(a, basic(1, true), now);
    buffered.on_summary(b, basic(1, false), now);
    buffered.on_summary(c, basic(1, true), now);
    // Still buffered: none of these should have been applied yet.
    assert_eq!(buffered.recompute_count(), 0);
    buffered.on_structure_changed(None, ChildDiff::default(), now);

    // Dispatcher 2: applies A, B, C directly, no intervening structure change.
    let mut direct =
        AggregatingDispatcher::new(Address::new(1), None, vec![a, b, c], Config::default());
    direct.on_summary(a, basic(1, true), now);
    direct.on_summary(b, basic(1, false), now);
    direct.on_summary(c, basic(1, true), now);

    assert_eq!(buffered.recompute_count(), direct.recompute_count());
    for addr in [a, b, c] {
        assert_eq!(
            buffered.received_from(addr).unwrap().seq(),
            direct.received_from(addr).unwrap().seq()
        );
    }
}
