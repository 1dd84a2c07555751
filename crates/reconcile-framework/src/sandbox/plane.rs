//! The server half: owns the store and answers requests sequentially.

use super::client::ControlPlaneClient;
use super::message::SandboxRequest;
use super::resource::SimulatedResource;
use super::{Observed, Operation, Phase, Stats};
use crate::error::{codes, Fault};
use crate::tagging::Tag;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

struct Record<R> {
    resource: R,
    phase: Phase,
    pending_ticks: u32,
    tags: BTreeMap<String, String>,
}

impl<R: Clone> Record<R> {
    fn observe(&self, identifier: &str) -> Observed<R> {
        Observed {
            identifier: identifier.to_string(),
            resource: self.resource.clone(),
            phase: self.phase,
            tags: self
                .tags
                .iter()
                .map(|(key, value)| Tag::new(key, value))
                .collect(),
        }
    }
}

/// Simulated control plane for resources of type `R`.
///
/// Store it with [`ControlPlane::new`] and spawn [`ControlPlane::run`]; the loop ends once
/// every [`ControlPlaneClient`] clone is dropped.
pub struct ControlPlane<R: SimulatedResource> {
    receiver: mpsc::Receiver<SandboxRequest<R>>,
    store: HashMap<String, Record<R>>,
    settle_ticks: u32,
    faults: HashMap<Operation, VecDeque<Fault>>,
    calls: BTreeMap<Operation, u32>,
}

impl<R: SimulatedResource> ControlPlane<R> {
    /// `settle_ticks` is the number of describe calls a transition takes to complete.
    pub fn new(buffer_size: usize, settle_ticks: u32) -> (Self, ControlPlaneClient<R>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let plane = Self {
            receiver,
            store: HashMap::new(),
            settle_ticks,
            faults: HashMap::new(),
            calls: BTreeMap::new(),
        };
        (plane, ControlPlaneClient::new(sender))
    }

    pub async fn run(mut self) {
        let resource_type = std::any::type_name::<R>()
            .split("::")
            .last()
            .unwrap_or("Unknown");
        info!(resource_type, settle_ticks = self.settle_ticks, "Control plane started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                SandboxRequest::Create { spec, respond_to } => {
                    debug!(resource_type, ?spec, "Create");
                    let result = self.create(spec);
                    let _ = respond_to.send(result);
                }
                SandboxRequest::Describe {
                    identifier,
                    respond_to,
                } => {
                    let result = self.describe(&identifier);
                    debug!(resource_type, %identifier, found = result.is_ok(), "Describe");
                    let _ = respond_to.send(result);
                }
                SandboxRequest::Modify {
                    identifier,
                    patch,
                    respond_to,
                } => {
                    debug!(resource_type, %identifier, ?patch, "Modify");
                    let result = self.modify(&identifier, patch);
                    let _ = respond_to.send(result);
                }
                SandboxRequest::Delete {
                    identifier,
                    respond_to,
                } => {
                    debug!(resource_type, %identifier, "Delete");
                    let result = self.delete(&identifier);
                    let _ = respond_to.send(result);
                }
                SandboxRequest::AddTags {
                    identifier,
                    tags,
                    respond_to,
                } => {
                    debug!(resource_type, %identifier, count = tags.len(), "AddTags");
                    let result = self.add_tags(&identifier, tags);
                    let _ = respond_to.send(result);
                }
                SandboxRequest::RemoveTags {
                    identifier,
                    tags,
                    respond_to,
                } => {
                    debug!(resource_type, %identifier, count = tags.len(), "RemoveTags");
                    let result = self.remove_tags(&identifier, &tags);
                    let _ = respond_to.send(result);
                }
                SandboxRequest::InjectFault {
                    operation,
                    fault,
                    respond_to,
                } => {
                    info!(resource_type, %operation, %fault, "Fault queued");
                    self.faults.entry(operation).or_default().push_back(fault);
                    let _ = respond_to.send(());
                }
                SandboxRequest::ForcePhase {
                    identifier,
                    phase,
                    respond_to,
                } => {
                    let result = match self.store.get_mut(&identifier) {
                        Some(record) => {
                            info!(resource_type, %identifier, ?phase, "Phase forced");
                            record.phase = phase;
                            record.pending_ticks = self.settle_ticks;
                            Ok(())
                        }
                        None => Err(not_found(&identifier)),
                    };
                    let _ = respond_to.send(result);
                }
                SandboxRequest::Stats { respond_to } => {
                    let _ = respond_to.send(Stats {
                        resources: self.store.len(),
                        calls: self.calls.clone(),
                    });
                }
            }
        }

        info!(resource_type, size = self.store.len(), "Shutdown");
    }

    /// Counts the call and pops an injected fault for it, if any.
    fn intercept(&mut self, operation: Operation) -> Result<(), Fault> {
        *self.calls.entry(operation).or_insert(0) += 1;
        match self.faults.get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(fault) => {
                warn!(%operation, %fault, "Answering with injected fault");
                Err(fault)
            }
            None => Ok(()),
        }
    }

    fn create(&mut self, spec: R::Spec) -> Result<(), Fault> {
        self.intercept(Operation::Create)?;
        let identifier = R::identifier(&spec);
        if self.store.contains_key(&identifier) {
            return Err(Fault::new(
                codes::ALREADY_EXISTS,
                format!("{identifier} already exists"),
            ));
        }
        let resource = R::from_spec(spec)?;
        self.store.insert(
            identifier.clone(),
            Record {
                resource,
                phase: Phase::Creating,
                pending_ticks: self.settle_ticks,
                tags: BTreeMap::new(),
            },
        );
        info!(%identifier, size = self.store.len(), "Created");
        Ok(())
    }

    /// Every describe advances pending transitions by one tick.
    fn describe(&mut self, identifier: &str) -> Result<Observed<R>, Fault> {
        self.intercept(Operation::Describe)?;
        let record = self
            .store
            .get_mut(identifier)
            .ok_or_else(|| not_found(identifier))?;

        if matches!(
            record.phase,
            Phase::Creating | Phase::Modifying | Phase::Deleting
        ) {
            record.pending_ticks = record.pending_ticks.saturating_sub(1);
            if record.pending_ticks == 0 {
                if record.phase == Phase::Deleting {
                    self.store.remove(identifier);
                    info!(%identifier, size = self.store.len(), "Deleted");
                    return Err(not_found(identifier));
                }
                record.phase = Phase::Available;
                debug!(%identifier, "Available");
            }
        }
        Ok(record.observe(identifier))
    }

    fn modify(&mut self, identifier: &str, patch: R::Patch) -> Result<(), Fault> {
        self.intercept(Operation::Modify)?;
        let settle_ticks = self.settle_ticks;
        let record = self
            .store
            .get_mut(identifier)
            .ok_or_else(|| not_found(identifier))?;
        if record.phase != Phase::Available {
            return Err(invalid_state(identifier, record.phase));
        }
        record.resource.apply_patch(patch)?;
        record.phase = Phase::Modifying;
        record.pending_ticks = settle_ticks;
        info!(%identifier, "Modifying");
        Ok(())
    }

    fn delete(&mut self, identifier: &str) -> Result<(), Fault> {
        self.intercept(Operation::Delete)?;
        let settle_ticks = self.settle_ticks;
        let record = self
            .store
            .get_mut(identifier)
            .ok_or_else(|| not_found(identifier))?;
        if record.phase == Phase::Deleting {
            return Err(invalid_state(identifier, record.phase));
        }
        record.phase = Phase::Deleting;
        record.pending_ticks = settle_ticks;
        info!(%identifier, "Deleting");
        Ok(())
    }

    fn add_tags(&mut self, identifier: &str, tags: Vec<Tag>) -> Result<(), Fault> {
        self.intercept(Operation::AddTags)?;
        let record = self
            .store
            .get_mut(identifier)
            .ok_or_else(|| not_found(identifier))?;
        for tag in tags {
            record.tags.insert(tag.key, tag.value);
        }
        Ok(())
    }

    /// Removes by key; the value of the removed tag is not checked.
    fn remove_tags(&mut self, identifier: &str, tags: &[Tag]) -> Result<(), Fault> {
        self.intercept(Operation::RemoveTags)?;
        let record = self
            .store
            .get_mut(identifier)
            .ok_or_else(|| not_found(identifier))?;
        for tag in tags {
            record.tags.remove(&tag.key);
        }
        Ok(())
    }
}

fn not_found(identifier: &str) -> Fault {
    Fault::new(codes::NOT_FOUND, format!("{identifier} not found"))
}

fn invalid_state(identifier: &str, phase: Phase) -> Fault {
    Fault::new(
        codes::INVALID_STATE,
        format!("{identifier} is {phase:?}"),
    )
}
