//! Error types for the `DbCluster` handlers.

use reconcile_framework::{ErrorKind, FrameworkError, ProgressEvent};
use thiserror::Error;

/// Problems found in the declared model before any remote call is made.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClusterError {
    #[error("Engine is required")]
    MissingEngine,

    #[error("Unsupported engine: {0}")]
    UnsupportedEngine(String),

    #[error("Invalid instance count: {count} (expected 1 to {max})")]
    InvalidInstanceCount { count: u32, max: u32 },

    #[error("Invalid DBClusterIdentifier: {0}")]
    InvalidIdentifier(String),

    /// The model carries no identifier where one is required (read, update, delete).
    #[error("DBClusterIdentifier is missing")]
    MissingIdentifier,

    /// Engine is create-only.
    #[error("Engine cannot be changed from {from} to {to}")]
    EngineChanged { from: String, to: String },

    #[error("Invalid drift schema: {0}")]
    Schema(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<FrameworkError> for ClusterError {
    fn from(e: FrameworkError) -> Self {
        match e {
            FrameworkError::InvalidConfig(message) => ClusterError::Config(message),
            other => ClusterError::Schema(other.to_string()),
        }
    }
}

impl ClusterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClusterError::MissingIdentifier => ErrorKind::NotFound,
            ClusterError::Schema(_) | ClusterError::Config(_) => ErrorKind::InternalFault,
            _ => ErrorKind::InvalidRequest,
        }
    }

    /// The terminal event a handler returns for this error.
    pub fn into_event<M>(self) -> ProgressEvent<M> {
        ProgressEvent::failed(self.kind(), self.to_string())
    }
}
