//! Errors surfaced by the submission supervisor.

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("unknown app instance: {app_id}")]
    UnknownApp { app_id: u64 },

    #[error(transparent)]
    Core(#[from] stars_core::CoreError),
}

pub type Result<T> = std::result::Result<T, SubmitError>;
