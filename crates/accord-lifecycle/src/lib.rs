pub mod engine;

pub use engine::LifecycleEngine;

use accord_types::models::RequestStatus;
use thiserror::Error;

/// The engine never guesses a transition: anything outside the graph is
/// rejected, not coerced.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("request not found")]
    NotFound,

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
