//! # System Lifecycle
//!
//! Starts the simulated control plane, wires the cluster handlers to it and shuts it down again.
//!
//! ## Startup
//!
//! [`ClusterSystem::new`] validates the [`ReconcilerConfig`](reconcile_framework::ReconcilerConfig),
//! creates the control plane and its client, builds the handlers from clones of that client and
//! spawns the control plane in its own task.
//!
//! ## Graceful Shutdown
//!
//! 1. **Drop all clients** - the system's own client and the clones inside the handlers
//! 2. **Control plane detects closure** - `receiver.recv()` returns `None`
//! 3. **Await completion** - the task logs its final store size and ends
//!
//! A clone of the client kept alive elsewhere (a test holding `system.client.clone()`) keeps
//! the control plane running; drop it before calling [`ClusterSystem::shutdown`].
//!
//! ## Observability
//!
//! Binaries call [`setup_tracing`](reconcile_framework::tracing::setup_tracing) once; the
//! handlers, guards and control plane all log through `tracing`.
//!
//! ```bash
//! RUST_LOG=info cargo run      # Lifecycle events
//! RUST_LOG=debug cargo run     # Every remote call and classification
//! ```

pub mod cluster_system;

pub use cluster_system::*;
