//! CLI entry point for STaRS.
//!
//! Provides the `stars` command with two subcommands:
//! - [`cli::Commands::Run`] -- wire up a tiny three-node tree (submitter,
//!   root dispatcher, leaf worker) entirely in-process, submit a demo bag,
//!   and drive the event loop to completion.
//! - [`cli::Commands::Config`] -- print the effective configuration.

mod cli;
mod helpers;

use std::collections::VecDeque;
use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing::info;

use stars_core::{Address, Config, TaskDescription};
use stars_node::testkit::StaticOverlay;
use stars_node::{Message, Node, NodeEffect};
use stars_worker::{AdmissionPolicy, LocalScheduler};

use crate::cli::{Cli, Commands};
use crate::helpers::init_tracing;

const SUBMITTER: Address = Address::new(3);
const ROOT: Address = Address::new(1);
const WORKER: Address = Address::new(2);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, tasks } => cmd_run(config, tasks).await,
        Commands::Config { config } => cmd_config(config).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: run
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<PathBuf>, num_tasks: u32) -> Result<()> {
    init_tracing("info");

    let config = load_config(config_path.as_deref());
    info!(tasks = num_tasks, "starting STaRS demo run");

    let now = Utc::now();

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
        Some(LocalScheduler::new(
            WORKER,
            AdmissionPolicy::Fcfs,
            64.0,
            64.0,
            1.0,
            config.clone(),
        )),
        config,
    );

    // Seed the root's view of the worker's availability, as a real node
    // would have already received by the time an app is first submitted.
    let snapshot = worker.scheduler().expect("worker node carries a scheduler").snapshot();
    route(&mut root, WORKER, Message::Summary(snapshot), now);

    let requirements = TaskDescription {
        length: 10,
        max_memory: 1,
        max_disk: 1,
        input_size: 0,
        output_size: 0,
        num_tasks,
        deadline: None,
        app_length: u64::from(num_tasks) * 10,
    };

    println!();
    println!("  STaRS demo run");
    println!("  ==============");
    println!();
    println!("  submitting app 1 ({num_tasks} tasks) through {SUBMITTER:?}");

    let mut queue: VecDeque<(Address, Address, Message)> = VecDeque::new();
    for effect in submitter.submit(1, requirements, u64::from(num_tasks), now) {
        enqueue(&mut queue, SUBMITTER, effect);
    }

    let mut hops = 0;
    while let Some((src, dst, msg)) = queue.pop_front() {
        hops += 1;
        let effects = match dst {
            ROOT => root.on_message(src, msg, now),
            WORKER => worker.on_message(src, msg, now),
            SUBMITTER => submitter.on_message(src, msg, now),
            other => {
                tracing::warn!(?other, "message addressed to an unknown node, dropped");
                Vec::new()
            }
        };
        for effect in effects {
            enqueue(&mut queue, dst, effect);
        }
    }

    println!("  delivered {hops} message hop(s) across the tree");
    println!();
    println!(
        "  worker queue depth:        {}",
        worker.scheduler().expect("worker node carries a scheduler").queue().len()
    );
    println!(
        "  submitter heartbeat armed: {}",
        submitter.supervisor().has_heartbeat_timer(WORKER)
    );
    if let Some(record) = submitter.supervisor().app(1) {
        println!("  pending requests:         {}", record.pending_requests.len());
        println!("  app complete:             {}", record.is_complete());
    }
    println!();

    Ok(())
}

fn route(node: &mut Node<StaticOverlay>, src: Address, msg: Message, now: chrono::DateTime<Utc>) {
    node.on_message(src, msg, now);
}

fn enqueue(queue: &mut VecDeque<(Address, Address, Message)>, src: Address, effect: NodeEffect) {
    match effect {
        NodeEffect::Send(dst, msg) => queue.push_back((src, dst, msg)),
        NodeEffect::RunTask(task_id) => info!(task_id, "executor asked to run task"),
        NodeEffect::AbortTask(task_id) => info!(task_id, "executor asked to abort task"),
        NodeEffect::AppFinished(app_id) => info!(app_id, "app instance finished"),
    }
}

// ---------------------------------------------------------------------------
// Subcommand: config
// ---------------------------------------------------------------------------

async fn cmd_config(config_path: Option<PathBuf>) -> Result<()> {
    init_tracing("warn");

    let config = load_config(config_path.as_deref());

    println!();
    println!("  STaRS effective configuration");
    println!("  =============================");
    println!();
    println!("  update_bandwidth:      {}", config.update_bandwidth);
    println!("  heartbeat:             {}", config.heartbeat);
    println!("  heartbeat_deadline:    {}", config.heartbeat_deadline_secs());
    println!("  submit_retries:        {}", config.submit_retries);
    println!("  request_timeout:       {}", config.request_timeout);
    println!("  reschedule_timeout:    {}", config.reschedule_timeout);
    println!("  avail_clusters:        {}", config.avail_clusters);
    println!("  dp_pieces:             {}", config.dp_pieces);
    println!("  fsp_pieces:            {}", config.fsp_pieces);
    println!("  fsp_reduction_quality: {}", config.fsp_reduction_quality);
    println!("  mmp_beta:              {}", config.mmp_beta);
    println!("  fsp_beta:              {}", config.fsp_beta);
    println!("  fsp_discard:           {}", config.fsp_discard);
    println!("  fsp_discard_ratio:     {}", config.fsp_discard_ratio);
    println!("  fsp_preemptive:        {}", config.fsp_preemptive);
    println!();

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Config {
    match path {
        Some(path) => Config::from_file(path),
        None => Config::default(),
    }
}
