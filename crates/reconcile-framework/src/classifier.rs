//! # Rule-Based Error Classifier
//!
//! An [`ErrorRuleSet`] is an ordered list of `(matcher, outcome)` rules. Sets are immutable
//! values composed in two ways:
//!
//! - [`ErrorRuleSet::extend`] starts a new set in front of a base set; rules added with
//!   [`ErrorRuleSet::with_rule`] are tried *before* every rule of the base (most specific first).
//! - [`ErrorRuleSet::or_else`] appends a less specific set that only sees faults nobody else
//!   claimed.
//!
//! The first matching rule wins. A fault that no rule claims classifies as
//! [`Outcome::Unhandled`], which [`resolve_fault`] reports as an `InternalFault` failure rather
//! than letting it through.
//!
//! ```rust
//! use reconcile_framework::{ErrorKind, ErrorRuleSet, Fault, Outcome};
//!
//! let rules = ErrorRuleSet::extend(&ErrorRuleSet::generic())
//!     .with_code("DBClusterAlreadyExistsFault", Outcome::FailWith(ErrorKind::AlreadyExists))
//!     .or_else(ErrorRuleSet::new().with_any(Outcome::FailWith(ErrorKind::InternalFault)));
//!
//! let fault = Fault::new("DBClusterAlreadyExistsFault", "cluster-1 exists");
//! assert_eq!(rules.classify(&fault), Outcome::FailWith(ErrorKind::AlreadyExists));
//! ```

use crate::context::CallbackContext;
use crate::error::{codes, ErrorKind, Fault};
use crate::progress::ProgressEvent;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// What to do about a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Terminal failure with the given kind.
    FailWith(ErrorKind),
    /// Transient; re-invoke after the retry delay.
    Retry,
    /// Swallow the fault and continue as if the step succeeded.
    Ignore,
    /// No rule claimed the fault.
    Unhandled,
}

/// Decides whether a rule applies to a fault.
#[derive(Clone)]
pub enum Matcher {
    Code(String),
    AnyOf(Vec<String>),
    Predicate(Arc<dyn Fn(&Fault) -> bool + Send + Sync>),
    Any,
}

impl Matcher {
    pub fn matches(&self, fault: &Fault) -> bool {
        match self {
            Matcher::Code(code) => fault.code == *code,
            Matcher::AnyOf(codes) => codes.iter().any(|code| fault.code == *code),
            Matcher::Predicate(predicate) => predicate(fault),
            Matcher::Any => true,
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Code(code) => write!(f, "Code({code})"),
            Matcher::AnyOf(codes) => write!(f, "AnyOf({codes:?})"),
            Matcher::Predicate(_) => f.write_str("Predicate(..)"),
            Matcher::Any => f.write_str("Any"),
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    matcher: Matcher,
    outcome: Outcome,
}

/// An immutable, ordered chain of fault rules.
#[derive(Debug, Clone, Default)]
pub struct ErrorRuleSet {
    rules: Vec<Rule>,
    next: Option<Arc<ErrorRuleSet>>,
}

impl ErrorRuleSet {
    /// An empty set: every fault is `Unhandled`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a set whose own rules take precedence over all of `base`.
    pub fn extend(base: &ErrorRuleSet) -> Self {
        Self {
            rules: Vec::new(),
            next: Some(Arc::new(base.clone())),
        }
    }

    pub fn with_rule(mut self, matcher: Matcher, outcome: Outcome) -> Self {
        self.rules.push(Rule { matcher, outcome });
        self
    }

    pub fn with_code(self, code: impl Into<String>, outcome: Outcome) -> Self {
        self.with_rule(Matcher::Code(code.into()), outcome)
    }

    pub fn with_codes<I, S>(self, codes: I, outcome: Outcome) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let codes = codes.into_iter().map(Into::into).collect();
        self.with_rule(Matcher::AnyOf(codes), outcome)
    }

    pub fn with_predicate(
        self,
        predicate: impl Fn(&Fault) -> bool + Send + Sync + 'static,
        outcome: Outcome,
    ) -> Self {
        self.with_rule(Matcher::Predicate(Arc::new(predicate)), outcome)
    }

    /// Catch-all rule; usually the single rule of a fallback set.
    pub fn with_any(self, outcome: Outcome) -> Self {
        self.with_rule(Matcher::Any, outcome)
    }

    /// Appends `fallback` to the very end of this chain.
    pub fn or_else(mut self, fallback: ErrorRuleSet) -> Self {
        self.next = Some(Arc::new(match self.next.take() {
            Some(next) => (*next).clone().or_else(fallback),
            None => fallback,
        }));
        self
    }

    /// Classifies `fault`, first matching rule wins.
    pub fn classify(&self, fault: &Fault) -> Outcome {
        let mut set = Some(self);
        while let Some(current) = set {
            if let Some(rule) = current.rules.iter().find(|r| r.matcher.matches(fault)) {
                debug!(code = %fault.code, matcher = ?rule.matcher, outcome = ?rule.outcome, "Fault classified");
                return rule.outcome;
            }
            set = current.next.as_deref();
        }
        Outcome::Unhandled
    }

    /// Rules for the standard fault codes every control plane shares.
    pub fn generic() -> Self {
        ErrorRuleSet::new()
            .with_code(codes::NOT_FOUND, Outcome::FailWith(ErrorKind::NotFound))
            .with_code(codes::ALREADY_EXISTS, Outcome::FailWith(ErrorKind::AlreadyExists))
            .with_code(
                codes::INVALID_STATE,
                Outcome::FailWith(ErrorKind::ResourceConflict),
            )
            .with_codes(
                [
                    codes::THROTTLING,
                    codes::THROTTLING_EXCEPTION,
                    codes::REQUEST_LIMIT_EXCEEDED,
                ],
                Outcome::FailWith(ErrorKind::Throttling),
            )
            .with_codes(
                [codes::LIMIT_EXCEEDED, codes::QUOTA_EXCEEDED],
                Outcome::FailWith(ErrorKind::ServiceLimitExceeded),
            )
            .with_codes(
                [
                    codes::INVALID_PARAMETER_VALUE,
                    codes::INVALID_PARAMETER_COMBINATION,
                    codes::VALIDATION_ERROR,
                ],
                Outcome::FailWith(ErrorKind::InvalidRequest),
            )
            .with_codes(
                [
                    codes::ACCESS_DENIED,
                    codes::ACCESS_DENIED_EXCEPTION,
                    codes::NOT_AUTHORIZED,
                ],
                Outcome::FailWith(ErrorKind::AccessDenied),
            )
            .with_codes(
                [codes::INTERNAL_FAILURE, codes::SERVICE_UNAVAILABLE],
                Outcome::Retry,
            )
    }
}

/// Turns a fault into the event the current step should return.
pub fn resolve_fault<M>(
    fault: &Fault,
    rules: &ErrorRuleSet,
    model: M,
    context: CallbackContext,
    retry_delay_seconds: u32,
) -> ProgressEvent<M> {
    match rules.classify(fault) {
        Outcome::FailWith(kind) => {
            warn!(code = %fault.code, %kind, "Remote call failed");
            ProgressEvent::failed(kind, fault.to_string())
        }
        Outcome::Retry => {
            warn!(code = %fault.code, delay = retry_delay_seconds, "Retrying remote call");
            ProgressEvent::defer(model, context, retry_delay_seconds.max(1))
        }
        Outcome::Ignore => {
            debug!(code = %fault.code, "Ignoring fault");
            ProgressEvent::progress(model, context)
        }
        Outcome::Unhandled => {
            warn!(code = %fault.code, "Unclassified fault");
            ProgressEvent::failed(ErrorKind::InternalFault, fault.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAULT_X: &str = "FaultX";

    #[test]
    fn test_extended_rule_wins_over_base() {
        let base = ErrorRuleSet::new().with_code(FAULT_X, Outcome::Retry);
        let rules = ErrorRuleSet::extend(&base)
            .with_code(FAULT_X, Outcome::FailWith(ErrorKind::ResourceConflict));

        let fault = Fault::new(FAULT_X, "boom");
        assert_eq!(base.classify(&fault), Outcome::Retry);
        assert_eq!(
            rules.classify(&fault),
            Outcome::FailWith(ErrorKind::ResourceConflict)
        );
    }

    #[test]
    fn test_base_still_applies_to_other_faults() {
        let rules = ErrorRuleSet::extend(&ErrorRuleSet::generic())
            .with_code(FAULT_X, Outcome::FailWith(ErrorKind::ResourceConflict));
        let throttled = Fault::new(codes::THROTTLING, "slow down");
        assert_eq!(
            rules.classify(&throttled),
            Outcome::FailWith(ErrorKind::Throttling)
        );
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let rules = ErrorRuleSet::new()
            .with_predicate(|f| f.message.contains("retry"), Outcome::Retry)
            .with_code(FAULT_X, Outcome::FailWith(ErrorKind::InvalidRequest));
        assert_eq!(
            rules.classify(&Fault::new(FAULT_X, "please retry")),
            Outcome::Retry
        );
        assert_eq!(
            rules.classify(&Fault::new(FAULT_X, "bad input")),
            Outcome::FailWith(ErrorKind::InvalidRequest)
        );
    }

    #[test]
    fn test_or_else_only_sees_unclaimed_faults() {
        let rules = ErrorRuleSet::generic()
            .or_else(ErrorRuleSet::new().with_any(Outcome::FailWith(ErrorKind::InternalFault)));
        assert_eq!(
            rules.classify(&Fault::new(codes::NOT_FOUND, "gone")),
            Outcome::FailWith(ErrorKind::NotFound)
        );
        assert_eq!(
            rules.classify(&Fault::new("Weird", "??")),
            Outcome::FailWith(ErrorKind::InternalFault)
        );
    }

    #[test]
    fn test_or_else_goes_after_extended_base() {
        let base = ErrorRuleSet::new().with_code(FAULT_X, Outcome::Retry);
        let rules = ErrorRuleSet::extend(&base)
            .or_else(ErrorRuleSet::new().with_any(Outcome::FailWith(ErrorKind::InternalFault)));
        assert_eq!(rules.classify(&Fault::new(FAULT_X, "x")), Outcome::Retry);
    }

    #[test]
    fn test_unmatched_fault_is_unhandled() {
        assert_eq!(
            ErrorRuleSet::generic().classify(&Fault::new("Mystery", "?")),
            Outcome::Unhandled
        );
    }

    #[test]
    fn test_resolve_unhandled_is_internal_fault() {
        let event = resolve_fault(
            &Fault::new("Mystery", "?"),
            &ErrorRuleSet::new(),
            (),
            CallbackContext::new(),
            10,
        );
        assert_eq!(event.error_kind(), Some(ErrorKind::InternalFault));
    }

    #[test]
    fn test_resolve_retry_defers() {
        let event = resolve_fault(
            &Fault::new(codes::SERVICE_UNAVAILABLE, "down"),
            &ErrorRuleSet::generic(),
            7,
            CallbackContext::new(),
            15,
        );
        assert_eq!(event.delay_seconds(), Some(15));
        assert_eq!(event.model(), Some(&7));
    }

    #[test]
    fn test_resolve_ignore_continues() {
        let rules = ErrorRuleSet::new().with_code(FAULT_X, Outcome::Ignore);
        let event = resolve_fault(&Fault::new(FAULT_X, "x"), &rules, 1, CallbackContext::new(), 5);
        assert!(event.is_continuation());
    }
}
