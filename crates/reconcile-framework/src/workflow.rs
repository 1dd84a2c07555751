//! # Handler Driver
//!
//! Handlers are written as if they ran once, top to bottom; the [`Driver`] plays the part of
//! the orchestrator that re-invokes them. After each invocation that ends `InProgress`, the
//! driver:
//!
//! 1. swaps the request's desired model for the one the handler returned,
//! 2. round-trips the [`Checkpoint`] through JSON, exactly what a real orchestrator persists,
//! 3. sleeps for the requested delay,
//! 4. invokes the handler again with the restored context.
//!
//! A `Success` or `Failed` event ends the run. `max_invocations` bounds runaway handlers.

use crate::config::ReconcilerConfig;
use crate::context::CallbackContext;
use crate::error::FrameworkError;
use crate::progress::ProgressEvent;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

/// Lifecycle operation a handler implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// What the orchestrator hands a handler on every invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerRequest<M> {
    pub desired: M,
    /// The last declared state, present on update.
    pub previous: Option<M>,
}

impl<M> HandlerRequest<M> {
    pub fn new(desired: M) -> Self {
        Self {
            desired,
            previous: None,
        }
    }

    pub fn with_previous(mut self, previous: M) -> Self {
        self.previous = Some(previous);
        self
    }
}

/// One lifecycle handler of a resource type.
#[async_trait]
pub trait Handler<M>: Send + Sync
where
    M: Send + Sync,
{
    fn action(&self) -> Action;

    async fn handle(&self, request: &HandlerRequest<M>, context: CallbackContext)
        -> ProgressEvent<M>;
}

/// Everything persisted between two invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint<M> {
    pub request: HandlerRequest<M>,
    pub context: CallbackContext,
    pub invocation: u32,
}

impl<M> Checkpoint<M> {
    pub fn new(request: HandlerRequest<M>) -> Self {
        Self {
            request,
            context: CallbackContext::new(),
            invocation: 0,
        }
    }
}

impl<M: Serialize + DeserializeOwned> Checkpoint<M> {
    pub fn to_json(&self) -> Result<String, FrameworkError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, FrameworkError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Result of a single invocation.
#[derive(Debug)]
pub enum Invocation<M> {
    /// Invoke again from `checkpoint` once `delay` has passed.
    Reinvoke {
        checkpoint: Checkpoint<M>,
        delay: Duration,
    },
    /// `Success` or `Failed`.
    Finished(ProgressEvent<M>),
}

#[derive(Debug, Clone, Copy)]
pub struct Driver {
    max_invocations: u32,
}

impl Default for Driver {
    fn default() -> Self {
        Self::from_config(&ReconcilerConfig::default())
    }
}

impl Driver {
    pub fn new(max_invocations: u32) -> Self {
        Self { max_invocations }
    }

    pub fn from_config(config: &ReconcilerConfig) -> Self {
        Self::new(config.max_invocations)
    }

    /// Performs one invocation of `handler` from `checkpoint`.
    pub async fn step<M, H>(
        &self,
        handler: &H,
        mut checkpoint: Checkpoint<M>,
    ) -> Result<Invocation<M>, FrameworkError>
    where
        M: Serialize + DeserializeOwned + Send + Sync,
        H: Handler<M> + ?Sized,
    {
        if checkpoint.invocation >= self.max_invocations {
            warn!(action = %handler.action(), limit = self.max_invocations, "Invocation limit reached");
            return Err(FrameworkError::InvocationLimit(self.max_invocations));
        }
        checkpoint.invocation += 1;
        let span = info_span!("invocation", action = %handler.action(), n = checkpoint.invocation);

        let context = checkpoint.context.clone();
        let event = handler
            .handle(&checkpoint.request, context)
            .instrument(span)
            .await;

        match event {
            ProgressEvent::InProgress {
                delay_seconds,
                model,
                context,
            } => {
                checkpoint.request.desired = model;
                checkpoint.context = context;
                let checkpoint = Checkpoint::from_json(&checkpoint.to_json()?)?;
                debug!(
                    action = %handler.action(),
                    invocation = checkpoint.invocation,
                    delay_seconds,
                    "Re-invoking"
                );
                Ok(Invocation::Reinvoke {
                    checkpoint,
                    delay: Duration::from_secs(u64::from(delay_seconds)),
                })
            }
            terminal => Ok(Invocation::Finished(terminal)),
        }
    }

    /// Drives `handler` from a fresh context until it finishes.
    pub async fn run<M, H>(
        &self,
        handler: &H,
        request: HandlerRequest<M>,
    ) -> Result<ProgressEvent<M>, FrameworkError>
    where
        M: Serialize + DeserializeOwned + Send + Sync,
        H: Handler<M> + ?Sized,
    {
        self.resume(handler, Checkpoint::new(request)).await
    }

    /// Drives `handler` from a persisted checkpoint until it finishes.
    pub async fn resume<M, H>(
        &self,
        handler: &H,
        mut checkpoint: Checkpoint<M>,
    ) -> Result<ProgressEvent<M>, FrameworkError>
    where
        M: Serialize + DeserializeOwned + Send + Sync,
        H: Handler<M> + ?Sized,
    {
        loop {
            match self.step(handler, checkpoint).await? {
                Invocation::Reinvoke {
                    checkpoint: next,
                    delay,
                } => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    checkpoint = next;
                }
                Invocation::Finished(event) => {
                    match &event {
                        ProgressEvent::Failed { kind, message } => {
                            warn!(action = %handler.action(), %kind, %message, "Operation failed")
                        }
                        _ => info!(action = %handler.action(), "Operation succeeded"),
                    }
                    return Ok(event);
                }
            }
        }
    }
}
