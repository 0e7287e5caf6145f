// Error types for orchestration

use thiserror::Error;
use weft_abstraction::ServiceError;
use weft_core::{CoreError, StorageError};

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Orchestration errors
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Malformed orchestration record
    #[error("Invalid orchestration: {0}")]
    Validation(String),

    /// Unknown orchestration or agent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Record already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An agent is registered but switched off
    #[error("Agent '{0}' is inactive")]
    InactiveAgent(String),

    /// An agent's generation call failed
    #[error("Agent '{agent_id}' failed: {source}")]
    AgentFailed {
        /// Agent that failed
        agent_id: String,
        /// Collaborator error
        #[source]
        source: ServiceError,
    },

    /// Registry error
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
