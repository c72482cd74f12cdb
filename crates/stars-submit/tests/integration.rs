//! Integration test exercising the S5 (heartbeat failure) scenario of
//! spec.md §8.

use chrono::{Duration, Utc};

use stars_core::{Accept, Address, Config, TaskBag, TaskDescription};
use stars_submit::{SubmissionSupervisor, SupervisorEffect};

fn requirements() -> TaskDescription {
    TaskDescription {
        length: 1000,
        max_memory: 1,
        max_disk: 1,
        input_size: 0,
        output_size: 0,
        num_tasks: 3,
        deadline: None,
        app_length: 1000,
    }
}

fn sent_bag(effects: &[SupervisorEffect]) -> Option<TaskBag> {
    effects.iter().find_map(|e| match e {
        SupervisorEffect::SendBag(_, bag) => Some(bag.clone()),
        _ => None,
    })
}

#[test]
fn s5_heartbeat_failure_reissues_exactly_the_stranded_tasks() {
    let worker = Address::new(5);
    let father = Address::new(1);
    let config = Config {
        heartbeat: 300.0,
        ..Config::default()
    };
    let mut sup = SubmissionSupervisor::new(Address::new(2), Some(father), config);

    let t0 = Utc::now();
    let effects = sup.submit(1, requirements(), 3, t0);
    let bag = sent_bag(&effects).expect("submit must send a bag for 3 ready tasks");
    assert_eq!((bag.first_task_id, bag.last_task_id), (0, 2));

    let accept = Accept {
        request_id: bag.request_id,
        first_task_id: 0,
        last_task_id: 2,
        heartbeat_interval_secs: 300.0,
    };
    sup.on_accept(worker, accept, t0);
    assert!(sup.has_heartbeat_timer(worker));
    assert_eq!(sup.remote_task_count(worker, 1), 3);

    // Worker sends no monitor. At t=750s (2.5 x 300s) the deadline fires.
    let t_deadline = t0 + Duration::seconds(750);
    let effects = sup.drive_timers(t_deadline);

    let retry_bag = sent_bag(&effects).expect("heartbeat deadline must re-issue the stranded tasks");
    assert_eq!((retry_bag.first_task_id, retry_bag.last_task_id), (0, 2));
    assert_ne!(
        retry_bag.request_id, bag.request_id,
        "re-issue must mint a fresh request id"
    );
    assert!(!sup.has_heartbeat_timer(worker), "worker must be purged from the heartbeat map");
    assert_eq!(sup.remote_task_count(worker, 1), 0);
}
