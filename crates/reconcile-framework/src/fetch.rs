//! Explicit result type for remote reads where "not found" is an answer, not an error.

use crate::error::Fault;

/// Outcome of a describe-style remote call.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult<T> {
    Found(T),
    Absent,
    Error(Fault),
}

impl<T> FetchResult<T> {
    /// Folds a raw remote result into a `FetchResult`, turning faults accepted by
    /// `is_not_found` into [`FetchResult::Absent`].
    pub fn from_result(result: Result<T, Fault>, is_not_found: impl Fn(&Fault) -> bool) -> Self {
        match result {
            Ok(value) => FetchResult::Found(value),
            Err(fault) if is_not_found(&fault) => FetchResult::Absent,
            Err(fault) => FetchResult::Error(fault),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, FetchResult::Found(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, FetchResult::Absent)
    }

    pub fn found(self) -> Option<T> {
        match self {
            FetchResult::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_ref(&self) -> FetchResult<&T> {
        match self {
            FetchResult::Found(value) => FetchResult::Found(value),
            FetchResult::Absent => FetchResult::Absent,
            FetchResult::Error(fault) => FetchResult::Error(fault.clone()),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchResult<U> {
        match self {
            FetchResult::Found(value) => FetchResult::Found(f(value)),
            FetchResult::Absent => FetchResult::Absent,
            FetchResult::Error(fault) => FetchResult::Error(fault),
        }
    }

    /// `Ok(Some)` when found, `Ok(None)` when absent.
    pub fn into_result(self) -> Result<Option<T>, Fault> {
        match self {
            FetchResult::Found(value) => Ok(Some(value)),
            FetchResult::Absent => Ok(None),
            FetchResult::Error(fault) => Err(fault),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;

    #[test]
    fn test_not_found_fault_becomes_absent() {
        let result: Result<u32, Fault> = Err(Fault::new(codes::NOT_FOUND, "gone"));
        let fetched = FetchResult::from_result(result, |f| f.is(codes::NOT_FOUND));
        assert!(fetched.is_absent());
    }

    #[test]
    fn test_other_fault_is_kept() {
        let result: Result<u32, Fault> = Err(Fault::new(codes::THROTTLING, "slow down"));
        let fetched = FetchResult::from_result(result, |f| f.is(codes::NOT_FOUND));
        assert_eq!(
            fetched.into_result(),
            Err(Fault::new(codes::THROTTLING, "slow down"))
        );
    }
}
