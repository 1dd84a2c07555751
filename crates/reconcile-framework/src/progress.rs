//! # Progress Events
//!
//! Every step returns a [`ProgressEvent`]. The delay on `InProgress` is the whole scheduling
//! contract:
//!
//! - `delay_seconds == 0`: keep going within this invocation (the event is a *continuation*);
//! - `delay_seconds > 0`: stop here, persist `context`, and re-invoke after the delay.
//!
//! Steps are chained with [`ProgressEvent::then`], which only runs the next step on a
//! continuation, so a deferral or a terminal outcome short-circuits the rest of the chain:
//!
//! ```rust
//! use reconcile_framework::{CallbackContext, ProgressEvent};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let event = ProgressEvent::progress(1u32, CallbackContext::new())
//!     .then(|n, ctx| async move { ProgressEvent::progress(n + 1, ctx) })
//!     .await
//!     .then(|n, ctx| async move { ProgressEvent::defer(n * 10, ctx, 30) })
//!     .await
//!     .then(|n, ctx| async move { ProgressEvent::progress(n + 1000, ctx) })
//!     .await;
//!
//! assert_eq!(event.delay_seconds(), Some(30));
//! assert_eq!(event.model(), Some(&20));
//! # }
//! ```

use crate::context::CallbackContext;
use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::future::Future;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ProgressEvent<M> {
    InProgress {
        delay_seconds: u32,
        model: M,
        context: CallbackContext,
    },
    Success {
        model: M,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

impl<M> ProgressEvent<M> {
    /// A continuation: proceed synchronously within the current invocation.
    pub fn progress(model: M, context: CallbackContext) -> Self {
        ProgressEvent::InProgress {
            delay_seconds: 0,
            model,
            context,
        }
    }

    /// Re-invoke me after `delay_seconds` with this exact context.
    pub fn defer(model: M, context: CallbackContext, delay_seconds: u32) -> Self {
        ProgressEvent::InProgress {
            delay_seconds,
            model,
            context,
        }
    }

    pub fn success(model: M) -> Self {
        ProgressEvent::Success { model }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        ProgressEvent::Failed {
            kind,
            message: message.into(),
        }
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, ProgressEvent::InProgress { .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProgressEvent::Success { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ProgressEvent::Failed { .. })
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_in_progress()
    }

    /// `true` for `InProgress` with a zero delay.
    pub fn is_continuation(&self) -> bool {
        matches!(
            self,
            ProgressEvent::InProgress {
                delay_seconds: 0,
                ..
            }
        )
    }

    pub fn delay_seconds(&self) -> Option<u32> {
        match self {
            ProgressEvent::InProgress { delay_seconds, .. } => Some(*delay_seconds),
            _ => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ProgressEvent::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn model(&self) -> Option<&M> {
        match self {
            ProgressEvent::InProgress { model, .. } | ProgressEvent::Success { model } => {
                Some(model)
            }
            ProgressEvent::Failed { .. } => None,
        }
    }

    pub fn context(&self) -> Option<&CallbackContext> {
        match self {
            ProgressEvent::InProgress { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn context_mut(&mut self) -> Option<&mut CallbackContext> {
        match self {
            ProgressEvent::InProgress { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Runs `step` when this event is a continuation; otherwise returns `self` untouched.
    pub async fn then<F, Fut>(self, step: F) -> Self
    where
        F: FnOnce(M, CallbackContext) -> Fut,
        Fut: Future<Output = ProgressEvent<M>>,
    {
        match self {
            ProgressEvent::InProgress {
                delay_seconds: 0,
                model,
                context,
            } => step(model, context).await,
            other => other,
        }
    }

    /// Turns a continuation into `Success`, leaving every other event as is.
    pub fn done(self) -> Self {
        match self {
            ProgressEvent::InProgress {
                delay_seconds: 0,
                model,
                ..
            } => ProgressEvent::Success { model },
            other => other,
        }
    }
}
