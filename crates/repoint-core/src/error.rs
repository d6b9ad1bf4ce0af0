//! Error types for endpoint reconciliation

use thiserror::Error;

/// Errors that can occur while reconciling a floating endpoint
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Inbound notification could not be decoded
    #[error("Failed to decode failover event: {0}")]
    Decode(String),

    /// An expected member or endpoint is absent
    #[error("{kind} not found: {identity} in cluster {cluster}")]
    NotFound {
        kind: String,
        identity: String,
        cluster: String,
    },

    /// A directory or control-plane call failed
    #[error("Control plane call failed: {0}")]
    Transient(String),

    /// The endpoint did not reach the ready state before the deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// A component was called with unusable input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for reconciliation operations
pub type Result<T> = std::result::Result<T, ReconcileError>;

impl ReconcileError {
    /// Build a `NotFound` error for a resource kind within a cluster
    pub fn not_found(
        kind: impl Into<String>,
        identity: impl Into<String>,
        cluster: impl Into<String>,
    ) -> Self {
        ReconcileError::NotFound {
            kind: kind.into(),
            identity: identity.into(),
            cluster: cluster.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconcileError::Transient(_) | ReconcileError::Timeout(_)
        )
    }

    /// Check if this error reports a missing member or endpoint
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReconcileError::NotFound { .. })
    }

    /// Short stable label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileError::Decode(_) => "decode",
            ReconcileError::NotFound { .. } => "not_found",
            ReconcileError::Transient(_) => "transient",
            ReconcileError::Timeout(_) => "timeout",
            ReconcileError::InvalidInput(_) => "invalid_input",
            ReconcileError::InvalidConfig(_) => "invalid_config",
        }
    }
}
