//! The client half: a cloneable handle that turns method calls into requests.

use super::message::SandboxRequest;
use super::resource::SimulatedResource;
use super::{Observed, Operation, Phase, Stats};
use crate::error::{codes, Fault, FrameworkError};
use crate::fetch::FetchResult;
use crate::tagging::{Tag, TaggingApi};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::instrument;

/// Handle to a running [`ControlPlane`](super::ControlPlane).
///
/// Remote calls answer with `Result<_, Fault>`; a closed control plane surfaces as a
/// `ServiceUnavailable` fault so callers classify it like any other remote failure.
pub struct ControlPlaneClient<R: SimulatedResource> {
    sender: mpsc::Sender<SandboxRequest<R>>,
}

impl<R: SimulatedResource> Clone for ControlPlaneClient<R> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<R: SimulatedResource> ControlPlaneClient<R> {
    pub fn new(sender: mpsc::Sender<SandboxRequest<R>>) -> Self {
        Self { sender }
    }

    async fn call<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<Result<T, Fault>>) -> SandboxRequest<R>,
    ) -> Result<T, Fault> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(request(respond_to))
            .await
            .map_err(|_| FrameworkError::ControlPlaneClosed)?;
        response
            .await
            .map_err(|_| FrameworkError::ControlPlaneDropped)?
    }

    #[instrument(skip(self, spec))]
    pub async fn create(&self, spec: R::Spec) -> Result<(), Fault> {
        self.call(|respond_to| SandboxRequest::Create { spec, respond_to })
            .await
    }

    /// `Absent` when the identifier is unknown; other faults come back as `Error`.
    #[instrument(skip(self))]
    pub async fn describe(&self, identifier: &str) -> FetchResult<Observed<R>> {
        let identifier = identifier.to_string();
        let result = self
            .call(|respond_to| SandboxRequest::Describe {
                identifier,
                respond_to,
            })
            .await;
        FetchResult::from_result(result, |fault| fault.is(codes::NOT_FOUND))
    }

    #[instrument(skip(self, patch))]
    pub async fn modify(&self, identifier: &str, patch: R::Patch) -> Result<(), Fault> {
        let identifier = identifier.to_string();
        self.call(|respond_to| SandboxRequest::Modify {
            identifier,
            patch,
            respond_to,
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, identifier: &str) -> Result<(), Fault> {
        let identifier = identifier.to_string();
        self.call(|respond_to| SandboxRequest::Delete {
            identifier,
            respond_to,
        })
        .await
    }

    /// The next call of `operation` answers with `fault`.
    pub async fn inject_fault(&self, operation: Operation, fault: Fault) -> Result<(), FrameworkError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(SandboxRequest::InjectFault {
                operation,
                fault,
                respond_to,
            })
            .await
            .map_err(|_| FrameworkError::ControlPlaneClosed)?;
        response
            .await
            .map_err(|_| FrameworkError::ControlPlaneDropped)
    }

    pub async fn force_phase(&self, identifier: &str, phase: Phase) -> Result<(), Fault> {
        let identifier = identifier.to_string();
        self.call(|respond_to| SandboxRequest::ForcePhase {
            identifier,
            phase,
            respond_to,
        })
        .await
    }

    pub async fn stats(&self) -> Result<Stats, FrameworkError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(SandboxRequest::Stats { respond_to })
            .await
            .map_err(|_| FrameworkError::ControlPlaneClosed)?;
        response
            .await
            .map_err(|_| FrameworkError::ControlPlaneDropped)
    }
}

#[async_trait]
impl<R: SimulatedResource> TaggingApi for ControlPlaneClient<R> {
    async fn add_tags(&self, identifier: &str, tags: &[Tag]) -> Result<(), Fault> {
        let identifier = identifier.to_string();
        let tags = tags.to_vec();
        self.call(|respond_to| SandboxRequest::AddTags {
            identifier,
            tags,
            respond_to,
        })
        .await
    }

    async fn remove_tags(&self, identifier: &str, tags: &[Tag]) -> Result<(), Fault> {
        let identifier = identifier.to_string();
        let tags = tags.to_vec();
        self.call(|respond_to| SandboxRequest::RemoveTags {
            identifier,
            tags,
            respond_to,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::ControlPlane;

    #[derive(Debug, Clone, PartialEq)]
    struct Volume {
        size: u32,
    }

    impl SimulatedResource for Volume {
        type Spec = (String, u32);
        type Patch = u32;

        fn identifier(spec: &Self::Spec) -> String {
            spec.0.clone()
        }

        fn from_spec((_, size): Self::Spec) -> Result<Self, Fault> {
            if size == 0 {
                return Err(Fault::new(codes::INVALID_PARAMETER_VALUE, "size must be positive"));
            }
            Ok(Volume { size })
        }

        fn apply_patch(&mut self, size: u32) -> Result<(), Fault> {
            self.size = size;
            Ok(())
        }
    }

    fn start(settle_ticks: u32) -> ControlPlaneClient<Volume> {
        let (plane, client) = ControlPlane::<Volume>::new(8, settle_ticks);
        tokio::spawn(plane.run());
        client
    }

    #[tokio::test]
    async fn test_create_settles_after_ticks() {
        let client = start(2);
        client.create(("vol-1".into(), 10)).await.unwrap();

        let first = client.describe("vol-1").await.found().unwrap();
        assert_eq!(first.phase, Phase::Creating);
        let second = client.describe("vol-1").await.found().unwrap();
        assert_eq!(second.phase, Phase::Available);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_already_exists() {
        let client = start(0);
        client.create(("vol-1".into(), 10)).await.unwrap();
        let err = client.create(("vol-1".into(), 20)).await.unwrap_err();
        assert!(err.is(codes::ALREADY_EXISTS));
    }

    #[tokio::test]
    async fn test_validation_fault_from_spec() {
        let client = start(0);
        let err = client.create(("vol-1".into(), 0)).await.unwrap_err();
        assert!(err.is(codes::INVALID_PARAMETER_VALUE));
        assert!(client.describe("vol-1").await.is_absent());
    }

    #[tokio::test]
    async fn test_modify_requires_available() {
        let client = start(1);
        client.create(("vol-1".into(), 10)).await.unwrap();
        let err = client.modify("vol-1", 20).await.unwrap_err();
        assert!(err.is(codes::INVALID_STATE));

        client.describe("vol-1").await;
        client.modify("vol-1", 20).await.unwrap();
        let observed = client.describe("vol-1").await.found().unwrap();
        assert_eq!(observed.resource.size, 20);
    }

    #[tokio::test]
    async fn test_delete_disappears_after_settling() {
        let client = start(2);
        client.create(("vol-1".into(), 10)).await.unwrap();
        client.delete("vol-1").await.unwrap();
        assert!(client.describe("vol-1").await.is_found());
        assert!(client.describe("vol-1").await.is_absent());
        assert!(client.delete("vol-1").await.unwrap_err().is(codes::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_injected_fault_answers_once_and_changes_nothing() {
        let client = start(0);
        client
            .inject_fault(Operation::Create, Fault::new(codes::THROTTLING, "slow down"))
            .await
            .unwrap();

        let err = client.create(("vol-1".into(), 10)).await.unwrap_err();
        assert!(err.is(codes::THROTTLING));
        assert!(client.describe("vol-1").await.is_absent());

        client.create(("vol-1".into(), 10)).await.unwrap();
        let stats = client.stats().await.unwrap();
        assert_eq!(stats.calls(Operation::Create), 2);
        assert_eq!(stats.resources, 1);
    }

    #[tokio::test]
    async fn test_tags_remove_by_key_then_add() {
        let client = start(0);
        client.create(("vol-1".into(), 10)).await.unwrap();
        client
            .add_tags("vol-1", &[Tag::new("env", "prod"), Tag::new("team", "data")])
            .await
            .unwrap();
        client
            .remove_tags("vol-1", &[Tag::new("env", "prod")])
            .await
            .unwrap();
        client
            .add_tags("vol-1", &[Tag::new("env", "staging")])
            .await
            .unwrap();

        let observed = client.describe("vol-1").await.found().unwrap();
        assert_eq!(
            observed.tags,
            vec![Tag::new("env", "staging"), Tag::new("team", "data")]
        );
    }

    #[tokio::test]
    async fn test_forced_failure_is_terminal() {
        let client = start(0);
        client.create(("vol-1".into(), 10)).await.unwrap();
        client.force_phase("vol-1", Phase::Failed).await.unwrap();
        let observed = client.describe("vol-1").await.found().unwrap();
        assert_eq!(observed.phase.status(), crate::stabilize::ResourceStatus::TerminalFailed);
    }

    #[tokio::test]
    async fn test_closed_plane_is_service_unavailable() {
        let (plane, client) = ControlPlane::<Volume>::new(8, 0);
        drop(plane);
        let err = client.create(("vol-1".into(), 10)).await.unwrap_err();
        assert!(err.is(codes::SERVICE_UNAVAILABLE));
    }
}
