//! Shared error type for the STaRS scheduling core.
//!
//! All crates in the workspace surface errors through [`CoreError`] (or a
//! crate-local enum that wraps it), following the single-error-type
//! convention used throughout this codebase. Each variant carries enough
//! context for a caller to decide how to react without inspecting opaque
//! strings.

use crate::address::Address;

/// Unified error type for the STaRS scheduling core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A task id referenced by a monitor, abort, or query was never created.
    #[error("unknown task id: {task_id}")]
    UnknownTask { task_id: u64 },

    /// A state transition violates the monotonic Finished/Aborted rule.
    #[error("invalid task state transition for {task_id}: {reason}")]
    InvalidTransition { task_id: u64, reason: String },

    /// A request id referenced by an accept/monitor/abort was never issued.
    #[error("unknown request id: {request_id}")]
    UnknownRequest { request_id: i64 },

    /// A neighbour address is not a known father or child link.
    #[error("unknown neighbour: {address}")]
    UnknownNeighbour { address: Address },

    /// A configuration key failed to parse into its expected type.
    #[error("invalid configuration value for `{key}`: {reason}")]
    InvalidConfig { key: String, reason: String },

    /// Catch-all for conditions that don't warrant a dedicated variant.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CoreError>;
