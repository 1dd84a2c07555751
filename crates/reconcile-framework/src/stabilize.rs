//! # Stabilization Poller
//!
//! After a mutating call returns, the resource keeps changing on the remote side. The
//! [`Stabilizer`] re-fetches it once per invocation and either:
//!
//! - fails immediately if the resource reached a terminal status (no delay can fix that);
//! - continues when the resource-type predicate holds;
//! - otherwise defers by the next backoff delay, accumulating the delay in the context under
//!   its label, and fails with `NotStabilized` once the accumulated delay reaches the timeout.
//!
//! A probe fault the rules classify as `Retry` draws on the same budget, so a describe that
//! keeps faulting still ends in `NotStabilized`. Other faults go through [`resolve_fault`].
//!
//! The last delay is clamped so the accumulated delay lands exactly on the timeout: the
//! failure never fires before the timeout and never overshoots it by more than one poll.

use crate::classifier::{resolve_fault, ErrorRuleSet, Outcome};
use crate::context::CallbackContext;
use crate::error::{ErrorKind, Fault, FrameworkError};
use crate::fetch::FetchResult;
use crate::progress::ProgressEvent;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, info, warn};

/// Status classification a resource type gives to an observed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceStatus {
    Stable,
    Transient,
    /// No amount of waiting will produce success.
    TerminalFailed,
}

/// What one poll saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Ready,
    Waiting,
    Terminal(String),
}

/// Builds a [`Probe`] from a describe result.
///
/// `predicate` receives `None` when the resource is absent; whether absence counts as settled
/// (delete) or not (create) is the resource type's call.
pub fn probe<R>(
    fetched: FetchResult<R>,
    status: impl Fn(&R) -> ResourceStatus,
    predicate: impl Fn(Option<&R>) -> bool,
) -> Result<Probe, Fault> {
    match fetched {
        FetchResult::Found(resource) => {
            if status(&resource) == ResourceStatus::TerminalFailed {
                return Ok(Probe::Terminal(
                    "resource reached a terminal failed status".into(),
                ));
            }
            Ok(if predicate(Some(&resource)) {
                Probe::Ready
            } else {
                Probe::Waiting
            })
        }
        FetchResult::Absent => Ok(if predicate(None) {
            Probe::Ready
        } else {
            Probe::Waiting
        }),
        FetchResult::Error(fault) => Err(fault),
    }
}

/// Poll schedule: a first delay, grown by `multiplier` per attempt up to `max_delay_seconds`,
/// bounded overall by `timeout_seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Backoff {
    pub delay_seconds: u32,
    pub max_delay_seconds: u32,
    pub multiplier: u32,
    pub timeout_seconds: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            delay_seconds: 10,
            max_delay_seconds: 60,
            multiplier: 2,
            timeout_seconds: 3_600,
        }
    }
}

impl Backoff {
    pub fn constant(delay_seconds: u32, timeout_seconds: u64) -> Self {
        Self {
            delay_seconds,
            max_delay_seconds: delay_seconds,
            multiplier: 1,
            timeout_seconds,
        }
    }

    pub fn exponential(delay_seconds: u32, max_delay_seconds: u32, timeout_seconds: u64) -> Self {
        Self {
            delay_seconds,
            max_delay_seconds,
            multiplier: 2,
            timeout_seconds,
        }
    }

    /// Delay before poll number `attempt + 1`; never zero.
    pub fn delay_for(&self, attempt: u32) -> u32 {
        let mut delay = self.delay_seconds.max(1);
        for _ in 0..attempt {
            delay = delay.saturating_mul(self.multiplier.max(1));
            if delay >= self.max_delay_seconds {
                break;
            }
        }
        delay.min(self.max_delay_seconds.max(self.delay_seconds)).max(1)
    }

    pub fn validate(&self) -> Result<(), FrameworkError> {
        if self.delay_seconds == 0 {
            return Err(FrameworkError::InvalidConfig(
                "stabilization delay_seconds must be at least 1".into(),
            ));
        }
        if self.max_delay_seconds < self.delay_seconds {
            return Err(FrameworkError::InvalidConfig(
                "stabilization max_delay_seconds is below delay_seconds".into(),
            ));
        }
        Ok(())
    }
}

/// Polls a resource under a label until it settles, fails terminally, or times out.
#[derive(Debug, Clone)]
pub struct Stabilizer {
    label: String,
    backoff: Backoff,
    rules: ErrorRuleSet,
    retry_delay_seconds: u32,
}

impl Stabilizer {
    pub fn new(label: impl Into<String>, backoff: Backoff) -> Self {
        Self {
            label: label.into(),
            backoff,
            rules: ErrorRuleSet::generic(),
            retry_delay_seconds: backoff.delay_seconds.max(1),
        }
    }

    /// Rules applied when the probe itself faults.
    pub fn with_rules(mut self, rules: ErrorRuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_retry_delay(mut self, seconds: u32) -> Self {
        self.retry_delay_seconds = seconds;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// One poll. Anything other than a continuation is returned untouched.
    pub async fn run<M, P, Fut>(&self, progress: ProgressEvent<M>, probe: P) -> ProgressEvent<M>
    where
        P: FnOnce(&M) -> Fut,
        Fut: Future<Output = Result<Probe, Fault>>,
    {
        let (model, mut context) = match progress {
            ProgressEvent::InProgress {
                delay_seconds: 0,
                model,
                context,
            } => (model, context),
            other => return other,
        };
        let label = self.label.as_str();

        let observed = match probe(&model).await {
            Ok(observed) => observed,
            Err(fault) if self.rules.classify(&fault) == Outcome::Retry => {
                return self.retry_after_fault(&fault, model, context);
            }
            Err(fault) => {
                return resolve_fault(
                    &fault,
                    &self.rules,
                    model,
                    context,
                    self.retry_delay_seconds,
                )
            }
        };

        match observed {
            Probe::Terminal(reason) => {
                warn!(label, %reason, "Resource failed terminally while stabilizing");
                ProgressEvent::failed(ErrorKind::NotStabilized, format!("{label}: {reason}"))
            }
            Probe::Ready => {
                info!(label, elapsed = context.elapsed(label).as_secs(), "Stabilized");
                context.clear_label(label);
                ProgressEvent::progress(model, context)
            }
            Probe::Waiting => {
                let elapsed = context.elapsed(label).as_secs();
                let timeout = self.backoff.timeout_seconds;
                if elapsed >= timeout {
                    warn!(label, elapsed, timeout, "Stabilization timed out");
                    return ProgressEvent::failed(
                        ErrorKind::NotStabilized,
                        format!("{label}: resource did not stabilize within {timeout} seconds"),
                    );
                }
                let attempt = context.attempts(label);
                let remaining = u32::try_from(timeout - elapsed).unwrap_or(u32::MAX);
                let delay = self.backoff.delay_for(attempt).min(remaining);

                context.timestamp_once(label, Utc::now());
                context.bump_attempts(label);
                context.add_elapsed(label, u64::from(delay));
                debug!(label, attempt, delay, elapsed, "Not stable yet");
                ProgressEvent::defer(model, context, delay)
            }
        }
    }

    /// A retryable probe fault spends the same budget as a wait.
    fn retry_after_fault<M>(
        &self,
        fault: &Fault,
        model: M,
        mut context: CallbackContext,
    ) -> ProgressEvent<M> {
        let label = self.label.as_str();
        let elapsed = context.elapsed(label).as_secs();
        let timeout = self.backoff.timeout_seconds;
        if elapsed >= timeout {
            warn!(label, code = %fault.code, elapsed, timeout, "Stabilization timed out on faults");
            return ProgressEvent::failed(
                ErrorKind::NotStabilized,
                format!("{label}: resource did not stabilize within {timeout} seconds: {fault}"),
            );
        }
        let remaining = u32::try_from(timeout - elapsed).unwrap_or(u32::MAX);
        let delay = self.retry_delay_seconds.max(1).min(remaining);

        context.timestamp_once(label, Utc::now());
        context.add_elapsed(label, u64::from(delay));
        warn!(label, code = %fault.code, delay, elapsed, "Probe failed, retrying");
        ProgressEvent::defer(model, context, delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;

    fn start() -> ProgressEvent<&'static str> {
        ProgressEvent::progress("db-1", CallbackContext::new())
    }

    #[test]
    fn test_exponential_delays_are_capped() {
        let backoff = Backoff::exponential(5, 30, 600);
        let delays: Vec<u32> = (0..5).map(|a| backoff.delay_for(a)).collect();
        assert_eq!(delays, vec![5, 10, 20, 30, 30]);
    }

    #[test]
    fn test_constant_delay() {
        let backoff = Backoff::constant(7, 100);
        assert_eq!(backoff.delay_for(0), 7);
        assert_eq!(backoff.delay_for(9), 7);
    }

    #[test]
    fn test_probe_helper_respects_terminal_status() {
        let observed = probe(
            FetchResult::Found("failed"),
            |s| {
                if *s == "failed" {
                    ResourceStatus::TerminalFailed
                } else {
                    ResourceStatus::Stable
                }
            },
            |_| true,
        );
        assert!(matches!(observed, Ok(Probe::Terminal(_))));
    }

    #[test]
    fn test_probe_helper_lets_predicate_judge_absence() {
        let deleted = probe(FetchResult::<()>::Absent, |_| ResourceStatus::Stable, |r| r.is_none());
        assert_eq!(deleted, Ok(Probe::Ready));
        let created = probe(FetchResult::<()>::Absent, |_| ResourceStatus::Stable, |r| r.is_some());
        assert_eq!(created, Ok(Probe::Waiting));
    }

    #[tokio::test]
    async fn test_ready_continues_and_clears_accounting() {
        let mut ctx = CallbackContext::new();
        ctx.add_elapsed("create", 30);
        let event = Stabilizer::new("create", Backoff::constant(10, 60))
            .run(ProgressEvent::progress("db-1", ctx), |_| async { Ok(Probe::Ready) })
            .await;
        assert!(event.is_continuation());
        assert_eq!(event.context().unwrap().elapsed("create").as_secs(), 0);
    }

    #[tokio::test]
    async fn test_terminal_status_fails_immediately() {
        let event = Stabilizer::new("create", Backoff::constant(10, 60))
            .run(start(), |_| async { Ok(Probe::Terminal("failed".into())) })
            .await;
        assert_eq!(event.error_kind(), Some(ErrorKind::NotStabilized));
    }

    #[tokio::test]
    async fn test_times_out_exactly_at_timeout() {
        let stabilizer = Stabilizer::new("modify", Backoff::constant(3, 10));
        let mut progress = start();
        let mut accumulated = 0u64;

        loop {
            let event = stabilizer.run(progress, |_| async { Ok(Probe::Waiting) }).await;
            match event {
                ProgressEvent::InProgress {
                    delay_seconds,
                    model,
                    context,
                } => {
                    assert!(delay_seconds > 0);
                    accumulated += u64::from(delay_seconds);
                    assert!(accumulated <= 10, "polled past the timeout");
                    progress = ProgressEvent::progress(model, context);
                }
                ProgressEvent::Failed { kind, .. } => {
                    assert_eq!(kind, ErrorKind::NotStabilized);
                    break;
                }
                ProgressEvent::Success { .. } => panic!("never stabilizes"),
            }
        }
        assert_eq!(accumulated, 10);
    }

    #[tokio::test]
    async fn test_zero_timeout_fails_on_first_wait() {
        let event = Stabilizer::new("create", Backoff::constant(3, 0))
            .run(start(), |_| async { Ok(Probe::Waiting) })
            .await;
        assert_eq!(event.error_kind(), Some(ErrorKind::NotStabilized));
    }

    #[tokio::test]
    async fn test_probe_fault_goes_through_rules() {
        let event = Stabilizer::new("create", Backoff::constant(3, 30))
            .with_retry_delay(9)
            .run(start(), |_| async { Err(Fault::new(codes::SERVICE_UNAVAILABLE, "blip")) })
            .await;
        assert_eq!(event.delay_seconds(), Some(9));
        assert_eq!(event.context().unwrap().elapsed("create").as_secs(), 9);
    }

    #[tokio::test]
    async fn test_repeated_retryable_faults_time_out() {
        let stabilizer = Stabilizer::new("create", Backoff::constant(5, 10));
        let mut progress = start();
        let mut polls = 0;

        let kind = loop {
            polls += 1;
            assert!(polls <= 20, "faults kept the poller alive past its timeout");
            let event = stabilizer
                .run(progress, |_| async { Err(Fault::new(codes::SERVICE_UNAVAILABLE, "down")) })
                .await;
            match event {
                ProgressEvent::InProgress { model, context, .. } => {
                    progress = ProgressEvent::progress(model, context);
                }
                ProgressEvent::Failed { kind, .. } => break kind,
                ProgressEvent::Success { .. } => panic!("never stabilizes"),
            }
        };
        assert_eq!(kind, ErrorKind::NotStabilized);
        assert_eq!(polls, 3);
    }

    #[tokio::test]
    async fn test_non_retryable_probe_fault_fails_at_once() {
        let event = Stabilizer::new("create", Backoff::constant(5, 10))
            .run(start(), |_| async { Err(Fault::new(codes::ACCESS_DENIED, "no describe")) })
            .await;
        assert_eq!(event.error_kind(), Some(ErrorKind::AccessDenied));
    }

    #[tokio::test]
    async fn test_waiting_records_attempts_and_first_poll() {
        let event = Stabilizer::new("create", Backoff::exponential(2, 8, 100))
            .run(start(), |_| async { Ok(Probe::Waiting) })
            .await;
        let ctx = event.context().unwrap();
        assert_eq!(ctx.attempts("create"), 1);
        assert_eq!(ctx.elapsed("create").as_secs(), 2);
        assert!(ctx.timestamp("create").is_some());
    }
}
