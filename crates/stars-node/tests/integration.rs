//! End-to-end wiring: a submitter, a root dispatcher, and a leaf worker,
//! driven purely through [`stars_node::testkit`] doubles and manual calls
//! (no executor loop, no real clock) -- one pass over submit, descent,
//! admission, and the `Accept` flowing back.

use chrono::Utc;

use stars_core::{Address, Config, TaskBag, TaskDescription};
use stars_node::testkit::StaticOverlay;
use stars_node::{Message, Node, NodeEffect};
use stars_summary::{AvailabilitySummary, BasicSummary, BasicWorkerState};
use stars_worker::{AdmissionPolicy, LocalScheduler};

const SUBMITTER: Address = Address::new(3);
const ROOT: Address = Address::new(1);
const WORKER: Address = Address::new(2);

fn demo_requirements() -> TaskDescription {
    TaskDescription {
        length: 10,
        max_memory: 1,
        max_disk: 1,
        input_size: 0,
        output_size: 0,
        num_tasks: 3,
        deadline: None,
        app_length: 30,
    }
}

#[test]
fn submit_descends_through_root_and_is_accepted_by_the_leaf_worker() {
    let now = Utc::now();
    let config = Config::default();

    let mut submitter = Node::new(
        SUBMITTER,
        StaticOverlay::new(Some(ROOT), Vec::new(), false),
        None,
        config.clone(),
    );
    let mut root = Node::new(ROOT, StaticOverlay::root(vec![(WORKER, true)]), None, config.clone());
    let mut worker = Node::new(
        WORKER,
        StaticOverlay::leaf(ROOT),
        Some(LocalScheduler::with_seed(
            WORKER,
            AdmissionPolicy::Fcfs,
            64.0,
            64.0,
            1.0,
            config.clone(),
            7,
        )),
        config,
    );

    // Seed the root's view of the worker's availability, as if the
    // worker's startup snapshot had already propagated (spec.md §4.3).
    let snapshot = worker.scheduler().unwrap().snapshot();
    let seed_effects = root.on_message(WORKER, Message::Summary(snapshot), now);
    assert!(seed_effects.is_empty(), "a first summary from a known child triggers no reply here");

    // 1. submit -> sendRequest upward to the root.
    let submit_effects = submitter.submit(42, demo_requirements(), 3, now);
    assert_eq!(submit_effects.len(), 1);
    let NodeEffect::Send(dst, Message::Bag(bag)) = submit_effects.into_iter().next().unwrap() else {
        panic!("expected a bag sent to the root");
    };
    assert_eq!(dst, ROOT);
    assert_eq!((bag.first_task_id, bag.last_task_id), (0, 2));
    assert!(!bag.for_worker);
    assert_eq!(bag.requester, SUBMITTER);

    // 2. root receives the bag, descends it to its only (leaf) child.
    let root_effects = root.on_message(SUBMITTER, Message::Bag(bag), now);
    assert_eq!(root_effects.len(), 1);
    let NodeEffect::Send(dst, Message::Bag(sub_bag)) = root_effects.into_iter().next().unwrap() else {
        panic!("expected root to forward a bag to the worker");
    };
    assert_eq!(dst, WORKER);
    assert!(sub_bag.for_worker, "descent must mark the final hop for the worker");
    assert_eq!(sub_bag.requester, SUBMITTER);

    // 3. the worker admits the sub-bag, runs its head task, and replies
    //    with an Accept addressed directly to the original submitter.
    let worker_effects = worker.on_message(ROOT, Message::Bag(sub_bag), now);
    let accept = worker_effects
        .iter()
        .find_map(|effect| match effect {
            NodeEffect::Send(dst, Message::Accept(accept)) if *dst == SUBMITTER => Some(accept.clone()),
            _ => None,
        })
        .expect("worker must send an Accept back to the submitter");
    assert_eq!((accept.first_task_id, accept.last_task_id), (0, 2));
    assert!(worker_effects.iter().any(|e| matches!(e, NodeEffect::RunTask(_))));

    // 4. the submitter resolves its pending request and arms a heartbeat
    //    deadline for the worker.
    let accept_effects = submitter.on_message(WORKER, Message::Accept(accept), now);
    assert!(accept_effects.is_empty(), "a mid-flight Accept produces no immediate effect");
    assert!(submitter.supervisor().has_heartbeat_timer(WORKER));
    let record = submitter.supervisor().app(42).expect("app instance still tracked");
    assert!(record.pending_requests.is_empty(), "the request resolved once every task left Searching");
}

#[test]
fn duplicate_request_id_is_swallowed_by_the_dedup_cache() {
    let now = Utc::now();
    let config = Config::default();
    let mut root = Node::new(ROOT, StaticOverlay::root(vec![(WORKER, true)]), None, config.clone());

    let snapshot = AvailabilitySummary::Basic(BasicSummary::from_worker(BasicWorkerState { free: true }));
    root.on_message(WORKER, Message::Summary(snapshot), now);

    let bag = TaskBag {
        requester: SUBMITTER,
        request_id: 7,
        first_task_id: 0,
        last_task_id: 0,
        min_requirements: demo_requirements(),
        for_worker: false,
        from_worker: false,
    };

    let first = root.on_message(SUBMITTER, Message::Bag(bag.clone()), now);
    assert_eq!(first.len(), 1, "first delivery of a fresh request id must descend normally");

    let second = root.on_message(SUBMITTER, Message::Bag(bag), now);
    assert!(second.is_empty(), "a repeated request id within the cache window must be dropped");
}

#[test]
fn root_bounces_unplaced_ibp_tasks_back_to_the_requester() {
    let now = Utc::now();
    let config = Config::default();
    let mut root = Node::new(ROOT, StaticOverlay::root(vec![(WORKER, true)]), None, config);

    // The only child reports no free capacity anywhere in its subtree.
    let snapshot = AvailabilitySummary::Basic(BasicSummary::from_worker(BasicWorkerState { free: false }));
    root.on_message(WORKER, Message::Summary(snapshot), now);

    let bag = TaskBag {
        requester: SUBMITTER,
        request_id: 9,
        first_task_id: 0,
        last_task_id: 0,
        min_requirements: demo_requirements(),
        for_worker: false,
        from_worker: false,
    };

    let effects = root.on_message(SUBMITTER, Message::Bag(bag), now);
    let reject = effects
        .into_iter()
        .find_map(|effect| match effect {
            NodeEffect::Send(dst, Message::Reject(reject)) if dst == SUBMITTER => Some(reject),
            _ => None,
        })
        .expect("root IBP must bounce the unplaced bag back to its requester");
    assert_eq!(reject.request_id, 9);
    assert_eq!((reject.first_task_id, reject.last_task_id), (0, 0));
}
