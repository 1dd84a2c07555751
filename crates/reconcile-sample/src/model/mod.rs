//! Data structures for the `DbCluster` resource type.
//!
//! - [`DbCluster`] is the declared model handlers receive and return.
//! - [`RemoteCluster`] is what the control plane stores, after its own normalization.

mod db_cluster;
mod remote;

pub use db_cluster::*;
pub use remote::*;
