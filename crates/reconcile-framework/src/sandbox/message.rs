//! Messages between [`ControlPlaneClient`](super::ControlPlaneClient) and
//! [`ControlPlane`](super::ControlPlane).

use super::resource::SimulatedResource;
use super::{Observed, Operation, Phase, Stats};
use crate::error::Fault;
use crate::tagging::Tag;
use tokio::sync::oneshot;

/// One-shot reply carrying the remote answer.
pub type Response<T> = oneshot::Sender<Result<T, Fault>>;

#[derive(Debug)]
pub enum SandboxRequest<R: SimulatedResource> {
    Create {
        spec: R::Spec,
        respond_to: Response<()>,
    },
    Describe {
        identifier: String,
        respond_to: Response<Observed<R>>,
    },
    Modify {
        identifier: String,
        patch: R::Patch,
        respond_to: Response<()>,
    },
    Delete {
        identifier: String,
        respond_to: Response<()>,
    },
    AddTags {
        identifier: String,
        tags: Vec<Tag>,
        respond_to: Response<()>,
    },
    RemoveTags {
        identifier: String,
        tags: Vec<Tag>,
        respond_to: Response<()>,
    },
    /// Queues `fault` as the answer to the next call of `operation`.
    InjectFault {
        operation: Operation,
        fault: Fault,
        respond_to: oneshot::Sender<()>,
    },
    /// Forces a phase, e.g. to simulate a resource failing out of band.
    ForcePhase {
        identifier: String,
        phase: Phase,
        respond_to: Response<()>,
    },
    Stats {
        respond_to: oneshot::Sender<Stats>,
    },
}
