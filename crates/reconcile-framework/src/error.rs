//! # Errors & Faults
//!
//! Three kinds of failure flow through the framework:
//!
//! - [`Fault`]: what the remote control plane answered with. Faults are *data*: every remote
//!   call returns `Result<T, Fault>` (or a [`FetchResult`](crate::FetchResult)) and the
//!   [`classifier`](crate::classifier) decides what they mean.
//! - [`ErrorKind`]: the stable, caller-visible taxonomy carried by a terminal
//!   [`ProgressEvent::Failed`](crate::ProgressEvent::Failed).
//! - [`FrameworkError`]: plumbing failures of the framework itself (a closed channel, a corrupt
//!   persisted context, an expression that does not parse).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error kinds surfaced to the end user with every terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    AlreadyExists,
    NotFound,
    /// The resource is in a state that does not allow the requested transition.
    ResourceConflict,
    ServiceLimitExceeded,
    Throttling,
    InvalidRequest,
    AccessDenied,
    /// Stabilization timed out or the resource reached a terminal status.
    NotStabilized,
    /// Anything no rule set claimed.
    InternalFault,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::ResourceConflict => "ResourceConflict",
            ErrorKind::ServiceLimitExceeded => "ServiceLimitExceeded",
            ErrorKind::Throttling => "Throttling",
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::AccessDenied => "AccessDenied",
            ErrorKind::NotStabilized => "NotStabilized",
            ErrorKind::InternalFault => "InternalFault",
        };
        f.write_str(name)
    }
}

/// A fault returned by the remote control plane.
///
/// `code` is the machine-readable fault type that rule sets match on; `message` is the
/// human-readable text that ends up in the failure event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Fault {
    pub code: String,
    pub message: String,
}

impl Fault {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

/// Fault codes understood by [`ErrorRuleSet::generic`](crate::ErrorRuleSet::generic) and
/// emitted by the simulated control plane.
pub mod codes {
    pub const NOT_FOUND: &str = "NotFound";
    pub const ALREADY_EXISTS: &str = "AlreadyExists";
    pub const INVALID_STATE: &str = "InvalidState";
    pub const THROTTLING: &str = "Throttling";
    pub const THROTTLING_EXCEPTION: &str = "ThrottlingException";
    pub const REQUEST_LIMIT_EXCEEDED: &str = "RequestLimitExceeded";
    pub const LIMIT_EXCEEDED: &str = "LimitExceeded";
    pub const QUOTA_EXCEEDED: &str = "QuotaExceeded";
    pub const INVALID_PARAMETER_VALUE: &str = "InvalidParameterValue";
    pub const INVALID_PARAMETER_COMBINATION: &str = "InvalidParameterCombination";
    pub const VALIDATION_ERROR: &str = "ValidationError";
    pub const ACCESS_DENIED: &str = "AccessDenied";
    pub const ACCESS_DENIED_EXCEPTION: &str = "AccessDeniedException";
    pub const NOT_AUTHORIZED: &str = "NotAuthorized";
    pub const INTERNAL_FAILURE: &str = "InternalFailure";
    pub const SERVICE_UNAVAILABLE: &str = "ServiceUnavailable";
}

/// Errors that can occur within the framework itself.
#[derive(Debug, thiserror::Error)]
pub enum FrameworkError {
    #[error("Control plane closed")]
    ControlPlaneClosed,
    #[error("Control plane dropped response channel")]
    ControlPlaneDropped,
    #[error("Invalid callback context: {0}")]
    InvalidContext(#[from] serde_json::Error),
    #[error("Invalid transform expression `{expression}`: {reason}")]
    InvalidExpression { expression: String, reason: String },
    #[error("Invalid schema document: {0}")]
    InvalidSchema(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Operation still in progress after {0} invocations")]
    InvocationLimit(u32),
}

impl From<FrameworkError> for Fault {
    fn from(e: FrameworkError) -> Self {
        Fault::new(codes::SERVICE_UNAVAILABLE, e.to_string())
    }
}
