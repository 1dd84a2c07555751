//! The contract a resource type satisfies to live in the simulated control plane.

use crate::error::Fault;
use std::fmt::Debug;

/// A resource the [`ControlPlane`](super::ControlPlane) can store.
///
/// The control plane owns identity, lifecycle phase and tags; the resource only knows how to
/// build itself from a create request and how to apply a modification.
pub trait SimulatedResource: Clone + Debug + Send + Sync + 'static {
    /// Payload of a create call.
    type Spec: Debug + Send + Sync;

    /// Payload of a modify call.
    type Patch: Debug + Send + Sync;

    /// Identifier the created resource will be stored under.
    fn identifier(spec: &Self::Spec) -> String;

    /// Validates a create request; an `Err` is returned to the caller as-is.
    fn from_spec(spec: Self::Spec) -> Result<Self, Fault>;

    fn apply_patch(&mut self, patch: Self::Patch) -> Result<(), Fault>;
}
