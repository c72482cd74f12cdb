//! Node configuration.
//!
//! Recognised keys and their effects are listed in spec.md §6. Every field
//! has a documented default so a node can start from an empty or partial
//! TOML file.

use serde::{Deserialize, Serialize};

/// Flat configuration shared by every component on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bytes/s cap on dispatcher upward traffic.
    pub update_bandwidth: u64,
    /// Monitor period and basis of failure-detection windows, in seconds.
    pub heartbeat: f64,
    /// Max retries per submitted bag.
    pub submit_retries: u32,
    /// Per-bag search deadline, in seconds.
    pub request_timeout: f64,
    /// Local-scheduler re-evaluation horizon, in seconds.
    pub reschedule_timeout: f64,
    /// Per-summary cluster budget.
    pub avail_clusters: usize,
    /// Deadline-policy piecewise-function budget.
    pub dp_pieces: usize,
    /// Fair-slowness piecewise-function budget.
    pub fsp_pieces: usize,
    /// FSP reducer effort (higher = more accurate, more work).
    pub fsp_reduction_quality: u32,
    /// MMP dispatcher tie-break weight, in `[0, 1]`.
    pub mmp_beta: f64,
    /// FSP dispatcher tie-break weight, in `[0, 1]`.
    pub fsp_beta: f64,
    /// Whether FSP admission discards tasks whose cheapest feasible
    /// slowness exceeds `fsp_discard_ratio * current_branch_min`.
    pub fsp_discard: bool,
    /// Discard ratio used when `fsp_discard` is set.
    pub fsp_discard_ratio: f64,
    /// Whether FSP sorting may reorder queued-but-not-running tasks.
    pub fsp_preemptive: bool,
    /// Capacity of the per-dispatcher request-id dedup cache (spec.md §4.4:
    /// "Cache size and retention are configuration").
    pub dedup_cache_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            update_bandwidth: 100_000,
            heartbeat: 30.0,
            submit_retries: 5,
            request_timeout: 30.0,
            reschedule_timeout: 600.0,
            avail_clusters: 8,
            dp_pieces: 16,
            fsp_pieces: 16,
            fsp_reduction_quality: 4,
            mmp_beta: 0.5,
            fsp_beta: 0.5,
            fsp_discard: false,
            fsp_discard_ratio: 2.0,
            fsp_preemptive: true,
            dedup_cache_size: 256,
        }
    }
}

impl Config {
    /// Parse a `[stars]`-sectioned TOML document, falling back to
    /// [`Config::default`] for any missing or malformed key -- the same
    /// tolerant-parse strategy the teacher's bot configuration loader uses.
    #[must_use]
    pub fn from_toml_str(contents: &str) -> Self {
        let defaults = Config::default();

        let table: toml::Table = match contents.parse() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse config, using defaults");
                return defaults;
            }
        };

        let section = match table.get("stars") {
            Some(toml::Value::Table(t)) => t,
            _ => return defaults,
        };

        let int = |key: &str, default: u64| -> u64 {
            section
                .get(key)
                .and_then(toml::Value::as_integer)
                .map(|v| v.max(0) as u64)
                .unwrap_or(default)
        };
        let usz = |key: &str, default: usize| -> usize {
            section
                .get(key)
                .and_then(toml::Value::as_integer)
                .map(|v| v.max(0) as usize)
                .unwrap_or(default)
        };
        let float = |key: &str, default: f64| -> f64 {
            section
                .get(key)
                .and_then(toml::Value::as_float)
                .unwrap_or(default)
        };
        let boolean = |key: &str, default: bool| -> bool {
            section
                .get(key)
                .and_then(toml::Value::as_bool)
                .unwrap_or(default)
        };

        Config {
            update_bandwidth: int("updateBandwidth", defaults.update_bandwidth),
            heartbeat: float("heartbeat", defaults.heartbeat),
            submit_retries: usz("submitRetries", defaults.submit_retries as usize) as u32,
            request_timeout: float("requestTimeout", defaults.request_timeout),
            reschedule_timeout: float("rescheduleTimeout", defaults.reschedule_timeout),
            avail_clusters: usz("availClusters", defaults.avail_clusters),
            dp_pieces: usz("dpPieces", defaults.dp_pieces),
            fsp_pieces: usz("fspPieces", defaults.fsp_pieces),
            fsp_reduction_quality: usz(
                "fspReductionQuality",
                defaults.fsp_reduction_quality as usize,
            ) as u32,
            mmp_beta: float("mmpBeta", defaults.mmp_beta),
            fsp_beta: float("fspBeta", defaults.fsp_beta),
            fsp_discard: boolean("fspDiscard", defaults.fsp_discard),
            fsp_discard_ratio: float("fspDiscardRatio", defaults.fsp_discard_ratio),
            fsp_preemptive: boolean("fspPreemptive", defaults.fsp_preemptive),
            dedup_cache_size: usz("dedupCacheSize", defaults.dedup_cache_size),
        }
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// file is missing.
    #[must_use]
    pub fn from_file(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(_) => Config::default(),
        }
    }

    /// `2.5 * heartbeat`, the liveness window used by both the worker's and
    /// the submitter's heartbeat monitors (spec.md §4.6).
    #[must_use]
    pub fn heartbeat_deadline_secs(&self) -> f64 {
        2.5 * self.heartbeat
    }
}
