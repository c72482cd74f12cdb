//! Errors surfaced by the local scheduler.

use stars_core::Address;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("unknown task id: {task_id}")]
    UnknownTask { task_id: u64 },

    #[error("unknown request id: {request_id}")]
    UnknownRequest { request_id: i64 },

    #[error(transparent)]
    Core(#[from] stars_core::CoreError),

    #[error("owner {owner} unreachable")]
    UnknownOwner { owner: Address },
}

pub type Result<T> = std::result::Result<T, WorkerError>;
