//! # Reconcile Framework
//!
//! Building blocks for resource handlers that drive a remote cloud resource (a database
//! cluster, an instance, a parameter group) from its current state to a declared state,
//! correctly, under retries and re-invocation.
//!
//! ## The Re-invocation Model
//!
//! A handler is invoked, does some work, and returns a [`ProgressEvent`]. If the work is not
//! finished the event is `InProgress` with a delay, and the orchestrator invokes the handler
//! again later, from the top, with the [`CallbackContext`] it returned. The context is the
//! only state that survives between invocations, so every guard in this crate keeps its
//! bookkeeping there.
//!
//! ```text
//!   invoke ──► handler ──► InProgress{delay > 0, ctx} ──► persist ctx ──► sleep ──┐
//!     ▲                                                                          │
//!     └──────────────────────────────────────────────────────────────────────────┘
//!              └──► Success / Failed (terminal)
//! ```
//!
//! ## Building Blocks
//!
//! | Block | Guarantees |
//! |-------|------------|
//! | [`IdempotencyGuard`] | a create is safe to replay; a pre-existing resource is a conflict |
//! | [`StepFlag`] / [`exec_once`] | a side-effecting step fires at most once per operation |
//! | [`Stabilizer`] | polls until settled, fails terminally or on timeout |
//! | [`TagReconciler`] | remote tags converge to the declared set |
//! | [`drift`] | reports properties that changed beyond what the remote explains |
//! | [`ErrorRuleSet`] | maps remote [`Fault`]s to outcomes, composable per resource type |
//!
//! Blocks compose with [`ProgressEvent::then`]: each only acts on a continuation and passes
//! deferrals and terminal events through untouched.
//!
//! ## Running Handlers
//!
//! [`Driver`] re-invokes a [`Handler`] the way an orchestrator would, persisting the
//! [`Checkpoint`] through JSON between invocations. [`sandbox`] provides an in-process
//! control plane to run handlers against.
//!
//! ## Configuration & Logging
//!
//! Tunables live in [`ReconcilerConfig`] (TOML plus `RECONCILER_*` overrides). Logging goes
//! through `tracing`; binaries call [`tracing::setup_tracing`].

pub mod classifier;
pub mod config;
pub mod context;
pub mod drift;
pub mod error;
pub mod fetch;
pub mod idempotency;
pub mod progress;
pub mod sandbox;
pub mod stabilize;
pub mod step_once;
pub mod tagging;
pub mod tracing;
pub mod workflow;

// Re-exports for convenience
pub use classifier::{resolve_fault, ErrorRuleSet, Matcher, Outcome};
pub use config::ReconcilerConfig;
pub use context::CallbackContext;
pub use drift::{detect_drift, DriftDetector, DriftReport, Mutation, Properties, Schema};
pub use error::{codes, ErrorKind, Fault, FrameworkError};
pub use fetch::FetchResult;
pub use idempotency::IdempotencyGuard;
pub use progress::ProgressEvent;
pub use stabilize::{probe, Backoff, Probe, ResourceStatus, Stabilizer};
pub use step_once::{exec_once, StepFlag};
pub use tagging::{Tag, TagDelta, TagReconciler, TagSet, TaggingApi};
pub use workflow::{Action, Checkpoint, Driver, Handler, HandlerRequest, Invocation};
