//! Error types for Weft Core.

use std::fmt;

use thiserror::Error;
use weft_abstraction::ServiceError;

use crate::config::ConfigError;
use crate::models::ErrorKind;
use crate::planning::DagError;
use crate::storage::StorageError;

/// Core error type for registry, store and engine operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A record or definition is malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The referenced workflow, agent or execution does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation conflicts with existing state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage-related errors.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<DagError> for CoreError {
    fn from(err: DagError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Failure of a single step handler.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    /// The handler raised.
    #[error("{0}")]
    Execution(String),

    /// The step ran past its time bound.
    #[error("step timed out after {0}")]
    Timeout(TimeoutBound),

    /// A referenced agent does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An external collaborator failed.
    #[error("external service error: {0}")]
    ExternalService(#[from] ServiceError),
}

impl StepError {
    /// Returns the execution-level kind recorded for this failure.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Execution(_) => ErrorKind::Execution,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ExternalService(_) => ErrorKind::ExternalService,
        }
    }
}

/// Time bound reported by a step timeout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeoutBound(pub std::time::Duration);

impl fmt::Display for TimeoutBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0.as_millis())
    }
}
