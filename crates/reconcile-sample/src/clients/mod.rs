//! Type-safe wrappers around [`ControlPlaneClient`](reconcile_framework::sandbox::ControlPlaneClient).

pub mod cluster_client;

pub use cluster_client::*;
