//! Engine error model.

use thiserror::Error;

use geobatch_core::DomainError;
use geobatch_grid::GridError;

use crate::checkpoint::StoreError;
use crate::scheduler::SchedulerError;

/// Errors surfaced by engine entry points.
///
/// Per-row lookup failures are never errors here; they are recorded in the
/// dataset and counted. These variants abort the current invocation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad selection or settings; raised before any job state is created.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl EngineError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        Self::Configuration(value.to_string())
    }
}
