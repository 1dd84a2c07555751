//! Fault classification for cluster calls.
//!
//! The cluster control plane reports some conditions with its own codes next to the shared
//! ones. [`cluster_rules`] layers those over the generic set and closes the chain with a
//! catch-all, so nothing a cluster call returns goes unclassified.

use reconcile_framework::{codes, ErrorKind, ErrorRuleSet, Outcome};

pub const DB_CLUSTER_ALREADY_EXISTS: &str = "DBClusterAlreadyExistsFault";
pub const DB_CLUSTER_NOT_FOUND: &str = "DBClusterNotFoundFault";
pub const INVALID_DB_CLUSTER_STATE: &str = "InvalidDBClusterStateFault";
pub const STORAGE_QUOTA_EXCEEDED: &str = "StorageQuotaExceeded";
pub const INSUFFICIENT_CAPACITY: &str = "InsufficientDBClusterCapacityFault";

pub fn cluster_rules() -> ErrorRuleSet {
    ErrorRuleSet::extend(&ErrorRuleSet::generic())
        .with_code(
            DB_CLUSTER_ALREADY_EXISTS,
            Outcome::FailWith(ErrorKind::AlreadyExists),
        )
        .with_code(DB_CLUSTER_NOT_FOUND, Outcome::FailWith(ErrorKind::NotFound))
        .with_code(
            INVALID_DB_CLUSTER_STATE,
            Outcome::FailWith(ErrorKind::ResourceConflict),
        )
        .with_code(
            STORAGE_QUOTA_EXCEEDED,
            Outcome::FailWith(ErrorKind::ServiceLimitExceeded),
        )
        .with_code(INSUFFICIENT_CAPACITY, Outcome::Retry)
        .or_else(ErrorRuleSet::new().with_any(Outcome::FailWith(ErrorKind::InternalFault)))
}

/// Mutating calls, and the describes that wait on them, retry throttling instead of failing on it.
pub fn mutation_rules() -> ErrorRuleSet {
    ErrorRuleSet::extend(&cluster_rules()).with_codes(
        [
            codes::THROTTLING,
            codes::THROTTLING_EXCEPTION,
            codes::REQUEST_LIMIT_EXCEEDED,
        ],
        Outcome::Retry,
    )
}

/// Modify calls also wait out a cluster that is busy with another change.
pub fn modify_rules() -> ErrorRuleSet {
    ErrorRuleSet::extend(&mutation_rules()).with_codes(
        [codes::INVALID_STATE, INVALID_DB_CLUSTER_STATE],
        Outcome::Retry,
    )
}
