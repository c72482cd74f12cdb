//! CLI argument definitions for STaRS.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// STaRS -- a decentralized task-scheduling substrate.
#[derive(Parser)]
#[command(
    name = "stars",
    version,
    about = "STaRS -- decentralized task scheduling substrate",
    long_about = "Runs a small in-process aggregation tree (one submitter, \
                  one root dispatcher, one leaf worker), submits a demo bag \
                  of tasks through it, and reports how the tasks were placed."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the demo node topology end-to-end and print what happened.
    Run {
        /// Path to a TOML config file. Missing keys fall back to defaults.
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Number of tasks in the demo submission.
        #[arg(long, default_value_t = 5)]
        tasks: u32,
    },

    /// Print the effective configuration (defaults, or a file's overrides).
    Config {
        /// Path to a TOML config file. Missing keys fall back to defaults.
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}
