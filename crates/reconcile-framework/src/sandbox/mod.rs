//! # Simulated Control Plane
//!
//! An in-process stand-in for a remote control plane, used by sample resource types, tests and
//! demos. It follows the server/client split of an actor: the [`ControlPlane`] owns the store and
//! processes one request at a time in its own task, while the cheap-to-clone
//! [`ControlPlaneClient`] sends requests over an mpsc channel and awaits oneshot replies.
//!
//! ## Behaviour
//!
//! - Creates and modifications are asynchronous: the resource enters `Creating` / `Modifying`
//!   and becomes `Available` on the `settle_ticks`-th describe call (the first one when
//!   `settle_ticks` is zero). Deletes go through `Deleting` the same way and then disappear.
//! - Calls answer with [`Fault`]s carrying the codes in [`codes`](crate::error::codes):
//!   `AlreadyExists` on a duplicate create, `NotFound` on a missing identifier, `InvalidState`
//!   when a resource is not `Available` for modification.
//! - Faults can be queued per [`Operation`] with [`ControlPlaneClient::inject_fault`]; the
//!   next call of that operation answers with the fault and changes nothing.
//!
//! ```rust
//! use reconcile_framework::sandbox::{ControlPlane, SimulatedResource};
//! use reconcile_framework::Fault;
//!
//! #[derive(Debug, Clone)]
//! struct Queue { name: String, retention: u32 }
//!
//! impl SimulatedResource for Queue {
//!     type Spec = (String, u32);
//!     type Patch = u32;
//!
//!     fn identifier(spec: &Self::Spec) -> String { spec.0.clone() }
//!     fn from_spec((name, retention): Self::Spec) -> Result<Self, Fault> { Ok(Queue { name, retention }) }
//!     fn apply_patch(&mut self, retention: u32) -> Result<(), Fault> {
//!         self.retention = retention;
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (plane, client) = ControlPlane::<Queue>::new(16, 0);
//! tokio::spawn(plane.run());
//!
//! client.create(("jobs".into(), 7)).await.unwrap();
//! let observed = client.describe("jobs").await.found().unwrap();
//! assert_eq!(observed.resource.retention, 7);
//! # }
//! ```

mod client;
mod message;
mod plane;
mod resource;

pub use client::ControlPlaneClient;
pub use message::{Response, SandboxRequest};
pub use plane::ControlPlane;
pub use resource::SimulatedResource;

use crate::stabilize::ResourceStatus;
use crate::tagging::Tag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle phase of a stored resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Creating,
    Modifying,
    Available,
    Deleting,
    Failed,
}

impl Phase {
    pub fn status(self) -> ResourceStatus {
        match self {
            Phase::Available => ResourceStatus::Stable,
            Phase::Creating | Phase::Modifying | Phase::Deleting => ResourceStatus::Transient,
            Phase::Failed => ResourceStatus::TerminalFailed,
        }
    }
}

/// Remote calls, as counted by [`Stats`] and targeted by fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Operation {
    Create,
    Describe,
    Modify,
    Delete,
    AddTags,
    RemoveTags,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A describe answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Observed<R> {
    pub identifier: String,
    pub resource: R,
    pub phase: Phase,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub resources: usize,
    pub calls: BTreeMap<Operation, u32>,
}

impl Stats {
    pub fn calls(&self, operation: Operation) -> u32 {
        self.calls.get(&operation).copied().unwrap_or(0)
    }
}
