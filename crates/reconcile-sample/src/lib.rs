//! # Reconcile Sample
//!
//! A `DbCluster` resource type built on the reconcile framework, exposed for the demo binary and
//! integration tests.
//!
//! - **[model]**: the declared [`DbCluster`](model::DbCluster) and its remote counterpart.
//! - **[clients]**: [`ClusterClient`](clients::ClusterClient), the only way handlers reach the
//!   control plane.
//! - **[cluster]**: the create/read/update/delete handlers, fault rules and drift schema.
//! - **[lifecycle]**: [`ClusterSystem`](lifecycle::ClusterSystem), which starts and stops it all.

pub mod clients;
pub mod cluster;
pub mod lifecycle;
pub mod model;
