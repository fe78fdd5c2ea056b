//! Provisioning queue drain: works off businesses that were queued while number
//! capacity was exhausted.

pub mod drain;
pub mod router;

use serde::Serialize;

use crate::store::StoreError;

pub use drain::QueueDrainWorker;
pub use router::queue_router;

/// Summary of one drain run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Items that reached `done`.
    pub drained: usize,
    pub attempted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DrainError {
    #[error("a queue drain is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Store(#[from] StoreError),
}
