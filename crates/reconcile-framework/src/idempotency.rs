//! # Idempotency Guard
//!
//! Makes a non-idempotent create safe to invoke more than once.
//!
//! The first invocation only performs an existence check. A found resource is a genuine
//! conflict and fails with `AlreadyExists` before anything is mutated. Otherwise the guard
//! sets `pre_existence_check_done` and defers by one second, which forces the caller to
//! persist the context *before* the real create is attempted. A crash between the check and
//! the create therefore cannot replay the check.
//!
//! Later invocations call the create. If it fails with `AlreadyExists`, an earlier attempt
//! (whose response was lost) already succeeded, so the failure is downgraded to a
//! continuation and stabilization polling takes over.

use crate::classifier::{resolve_fault, ErrorRuleSet};
use crate::config::ReconcilerConfig;
use crate::context::CallbackContext;
use crate::error::ErrorKind;
use crate::fetch::FetchResult;
use crate::progress::ProgressEvent;
use std::future::Future;
use tracing::{debug, info, warn};

/// Delay that forces the context to be persisted between the check and the create.
pub const PERSIST_CONTEXT_DELAY_SECONDS: u32 = 1;

#[derive(Debug, Clone)]
pub struct IdempotencyGuard {
    skip_existence_check: bool,
    rules: ErrorRuleSet,
    retry_delay_seconds: u32,
}

impl Default for IdempotencyGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IdempotencyGuard {
    pub fn new() -> Self {
        Self {
            skip_existence_check: false,
            rules: ErrorRuleSet::generic(),
            retry_delay_seconds: ReconcilerConfig::default().retry_delay_seconds,
        }
    }

    pub fn from_config(config: &ReconcilerConfig) -> Self {
        Self {
            skip_existence_check: config.skip_existence_check,
            rules: ErrorRuleSet::generic(),
            retry_delay_seconds: config.retry_delay_seconds,
        }
    }

    /// Test harness switch: when set, `safe_create` is a plain pass-through to the create.
    pub fn with_skip_existence_check(mut self, skip: bool) -> Self {
        self.skip_existence_check = skip;
        self
    }

    /// Rules used when the existence check itself faults.
    pub fn with_rules(mut self, rules: ErrorRuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Runs `create` at most once per logical operation, guarded by `existence_check`.
    ///
    /// Anything other than a continuation is returned untouched.
    pub async fn safe_create<M, T, E, EFut, C, CFut>(
        &self,
        existence_check: E,
        create: C,
        progress: ProgressEvent<M>,
    ) -> ProgressEvent<M>
    where
        M: Clone,
        E: FnOnce(M) -> EFut,
        EFut: Future<Output = FetchResult<T>>,
        C: FnOnce(M, CallbackContext) -> CFut,
        CFut: Future<Output = ProgressEvent<M>>,
    {
        let (model, mut context) = match progress {
            ProgressEvent::InProgress {
                delay_seconds: 0,
                model,
                context,
            } => (model, context),
            other => return other,
        };

        if self.skip_existence_check {
            debug!("Existence check skipped");
            return create(model, context).await;
        }

        if !context.pre_existence_check_done() {
            match existence_check(model.clone()).await {
                FetchResult::Found(_) => {
                    warn!("Resource already exists, refusing to create");
                    return ProgressEvent::failed(
                        ErrorKind::AlreadyExists,
                        "Resource already exists",
                    );
                }
                FetchResult::Absent => {}
                FetchResult::Error(fault) => {
                    return resolve_fault(
                        &fault,
                        &self.rules,
                        model,
                        context,
                        self.retry_delay_seconds,
                    );
                }
            }
            context.set_pre_existence_check_done(true);
            debug!("Existence check passed, persisting context before create");
            return ProgressEvent::defer(model, context, PERSIST_CONTEXT_DELAY_SECONDS);
        }

        let result = create(model.clone(), context.clone()).await;
        match result {
            ProgressEvent::Failed {
                kind: ErrorKind::AlreadyExists,
                message,
            } => {
                info!(%message, "Create reported AlreadyExists after a clean check, assuming an earlier attempt succeeded");
                ProgressEvent::progress(model, context)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{codes, Fault};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn start() -> ProgressEvent<String> {
        ProgressEvent::progress("db-1".to_string(), CallbackContext::new())
    }

    async fn create_ok(model: String, ctx: CallbackContext) -> ProgressEvent<String> {
        ProgressEvent::progress(model, ctx)
    }

    #[tokio::test]
    async fn test_found_resource_fails_before_create() {
        let creates = AtomicU32::new(0);
        let event = IdempotencyGuard::new()
            .safe_create(
                |_| async { FetchResult::Found(()) },
                |m, c| {
                    creates.fetch_add(1, Ordering::SeqCst);
                    create_ok(m, c)
                },
                start(),
            )
            .await;
        assert_eq!(event.error_kind(), Some(ErrorKind::AlreadyExists));
        assert_eq!(creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_absent_resource_defers_with_flag_set() {
        let event = IdempotencyGuard::new()
            .safe_create(
                |_| async { FetchResult::<()>::Absent },
                |m, c| async move {
                    let _ = (m, c);
                    ProgressEvent::failed(ErrorKind::InternalFault, "create must wait")
                },
                start(),
            )
            .await;
        assert_eq!(event.delay_seconds(), Some(PERSIST_CONTEXT_DELAY_SECONDS));
        assert!(event.context().unwrap().pre_existence_check_done());
    }

    #[tokio::test]
    async fn test_second_invocation_creates() {
        let guard = IdempotencyGuard::new();
        let creates = AtomicU32::new(0);

        let first = guard
            .safe_create(
                |_| async { FetchResult::<()>::Absent },
                |m, c| {
                    creates.fetch_add(1, Ordering::SeqCst);
                    create_ok(m, c)
                },
                start(),
            )
            .await;
        let ProgressEvent::InProgress { model, context, .. } = first else {
            panic!("expected a deferral");
        };

        let second = guard
            .safe_create(
                |_| async { FetchResult::Found(()) },
                |m, c| {
                    creates.fetch_add(1, Ordering::SeqCst);
                    create_ok(m, c)
                },
                ProgressEvent::progress(model, context),
            )
            .await;
        assert!(second.is_continuation());
        assert_eq!(creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_already_exists_after_check_is_downgraded() {
        let mut ctx = CallbackContext::new();
        ctx.set_pre_existence_check_done(true);
        let event = IdempotencyGuard::new()
            .safe_create(
                |_| async { FetchResult::<()>::Absent },
                |_, _| async { ProgressEvent::failed(ErrorKind::AlreadyExists, "exists") },
                ProgressEvent::progress("db-1".to_string(), ctx),
            )
            .await;
        assert!(event.is_continuation());
        assert_eq!(event.model().map(String::as_str), Some("db-1"));
    }

    #[tokio::test]
    async fn test_other_create_failures_pass_through() {
        let mut ctx = CallbackContext::new();
        ctx.set_pre_existence_check_done(true);
        let event = IdempotencyGuard::new()
            .safe_create(
                |_| async { FetchResult::<()>::Absent },
                |_, _| async { ProgressEvent::failed(ErrorKind::InvalidRequest, "bad engine") },
                ProgressEvent::progress("db-1".to_string(), ctx),
            )
            .await;
        assert_eq!(event.error_kind(), Some(ErrorKind::InvalidRequest));
    }

    #[tokio::test]
    async fn test_existence_check_fault_is_classified() {
        let event = IdempotencyGuard::new()
            .safe_create(
                |_| async {
                    FetchResult::<()>::Error(Fault::new(codes::ACCESS_DENIED, "no describe"))
                },
                create_ok,
                start(),
            )
            .await;
        assert_eq!(event.error_kind(), Some(ErrorKind::AccessDenied));
    }

    #[tokio::test]
    async fn test_skip_switch_calls_create_directly() {
        let event = IdempotencyGuard::new()
            .with_skip_existence_check(true)
            .safe_create(
                |_| async { FetchResult::Found(()) },
                |_, _| async { ProgressEvent::failed(ErrorKind::AlreadyExists, "exists") },
                start(),
            )
            .await;
        assert_eq!(event.error_kind(), Some(ErrorKind::AlreadyExists));
    }

    #[test]
    fn test_guard_defaults_to_checking() {
        let guard = IdempotencyGuard::default();
        assert!(!guard.skip_existence_check);
        let configured = IdempotencyGuard::from_config(&ReconcilerConfig::default());
        assert!(!configured.skip_existence_check);
    }
}
