//! # Step-Once Guard
//!
//! A workflow is re-executed from its first step on every invocation. Wrapping a side-effecting
//! step in [`exec_once`] makes it fire at most once across all invocations that share a context:
//! the step's completion is recorded in the [`CallbackContext`] and checked on the way in.
//!
//! The flag is only recorded when the step hands back a continuation. A step that defers (for
//! example because its remote call was throttled and classified as `Retry`) runs again on the
//! next invocation.

use crate::context::CallbackContext;
use crate::progress::ProgressEvent;
use std::future::Future;
use tracing::debug;

/// Runs `step` unless `is_done` says it already ran, then marks it done on the result.
pub async fn exec_once<M, F, Fut, D, K>(
    progress: ProgressEvent<M>,
    step: F,
    is_done: D,
    mark_done: K,
) -> ProgressEvent<M>
where
    F: FnOnce(M, CallbackContext) -> Fut,
    Fut: Future<Output = ProgressEvent<M>>,
    D: FnOnce(&CallbackContext) -> bool,
    K: FnOnce(&mut CallbackContext, bool),
{
    let (model, context) = match progress {
        ProgressEvent::InProgress {
            delay_seconds: 0,
            model,
            context,
        } => (model, context),
        other => return other,
    };
    if is_done(&context) {
        return ProgressEvent::progress(model, context);
    }

    let mut result = step(model, context).await;
    if result.is_continuation() {
        if let Some(context) = result.context_mut() {
            mark_done(context, true);
        }
    }
    result
}

/// A named completion flag stored in the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepFlag(pub &'static str);

impl StepFlag {
    pub fn is_done(&self, context: &CallbackContext) -> bool {
        context.flag(self.0)
    }

    pub fn mark(&self, context: &mut CallbackContext, done: bool) {
        context.set_flag(self.0, done);
    }

    /// [`exec_once`] keyed by this flag.
    pub async fn exec<M, F, Fut>(&self, progress: ProgressEvent<M>, step: F) -> ProgressEvent<M>
    where
        F: FnOnce(M, CallbackContext) -> Fut,
        Fut: Future<Output = ProgressEvent<M>>,
    {
        let name = self.0;
        exec_once(
            progress,
            step,
            |ctx| {
                let done = self.is_done(ctx);
                if done {
                    debug!(step = name, "Step already done, skipping");
                }
                done
            },
            |ctx, done| self.mark(ctx, done),
        )
        .await
    }
}
