//! Errors surfaced while wiring or driving a node.

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error(transparent)]
    Worker(#[from] stars_worker::WorkerError),

    #[error(transparent)]
    Dispatch(#[from] stars_dispatch::DispatchError),

    #[error(transparent)]
    Core(#[from] stars_core::CoreError),
}

pub type Result<T> = std::result::Result<T, NodeError>;
