//! Errors surfaced by the aggregating dispatcher and dispatch descent.

use stars_core::Address;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no link for neighbour {address}")]
    UnknownNeighbour { address: Address },

    #[error(transparent)]
    Summary(#[from] stars_summary::SummaryError),

    #[error(transparent)]
    Core(#[from] stars_core::CoreError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
