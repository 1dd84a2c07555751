//! # Observability
//!
//! The framework logs through `tracing` with structured fields rather than formatted text:
//!
//! - `resource` / `identifier`: the remote identifier a step works on
//! - `label`, `attempt`, `delay`, `elapsed`: stabilization accounting
//! - `action`, `n`: the driver's `invocation` span around every handler call
//! - `resource_type`: the simulated control plane's stored type
//!
//! Guards log transitions at `info` (a step fired, a resource stabilized, a create was found
//! to have already happened) and per-poll detail at `debug`.
//!
//! ```bash
//! RUST_LOG=info cargo run --bin reconcile-demo
//! RUST_LOG=reconcile_framework=debug cargo run --bin reconcile-demo
//! ```

/// Installs a compact fmt subscriber filtered by `RUST_LOG`.
///
/// Call once, from a binary. Tests never install a subscriber.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
