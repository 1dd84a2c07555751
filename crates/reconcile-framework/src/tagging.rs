//! # Tag Set Reconciler
//!
//! A [`TagSet`] keeps tags in three provenance buckets: `system` (injected by the orchestrator),
//! `stack` (inherited from a higher-level grouping) and `resource` (declared on the resource).
//!
//! Reconciliation compares the *flattened* `(key, value)` pairs of the desired and previous
//! sets. Changing a value is a remove of the old pair plus an add of the new one. Provenance is
//! kept only to pick the rule set for tagging faults: when the change touches no
//! resource-provenance tag, an access-denied fault is soft (the user never asked for those
//! tags) and is ignored; otherwise it fails the operation.

use crate::classifier::{resolve_fault, ErrorRuleSet, Outcome};
use crate::error::{codes, ErrorKind, Fault};
use crate::progress::ProgressEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet {
    #[serde(default)]
    pub system: BTreeSet<Tag>,
    #[serde(default)]
    pub stack: BTreeSet<Tag>,
    #[serde(default)]
    pub resource: BTreeSet<Tag>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(mut self, key: &str, value: &str) -> Self {
        self.system.insert(Tag::new(key, value));
        self
    }

    pub fn with_stack(mut self, key: &str, value: &str) -> Self {
        self.stack.insert(Tag::new(key, value));
        self
    }

    pub fn with_resource(mut self, key: &str, value: &str) -> Self {
        self.resource.insert(Tag::new(key, value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.system.is_empty() && self.stack.is_empty() && self.resource.is_empty()
    }

    /// All pairs regardless of provenance.
    pub fn flatten(&self) -> BTreeSet<Tag> {
        self.system
            .iter()
            .chain(&self.stack)
            .chain(&self.resource)
            .cloned()
            .collect()
    }

    /// Keeps only pairs contained in `pairs`, per bucket.
    fn retain(&self, pairs: &BTreeSet<Tag>) -> TagSet {
        let keep = |bucket: &BTreeSet<Tag>| bucket.intersection(pairs).cloned().collect();
        TagSet {
            system: keep(&self.system),
            stack: keep(&self.stack),
            resource: keep(&self.resource),
        }
    }
}

/// Pairs to remove from and add to the remote resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDelta {
    pub to_remove: TagSet,
    pub to_add: TagSet,
}

impl TagDelta {
    /// `to_add = desired − previous`, `to_remove = previous − desired`, by full pair identity.
    pub fn between(previous: &TagSet, desired: &TagSet) -> Self {
        let previous_pairs = previous.flatten();
        let desired_pairs = desired.flatten();
        let added: BTreeSet<Tag> = desired_pairs.difference(&previous_pairs).cloned().collect();
        let removed: BTreeSet<Tag> = previous_pairs.difference(&desired_pairs).cloned().collect();
        Self {
            to_remove: previous.retain(&removed),
            to_add: desired.retain(&added),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }

    pub fn touches_resource_tags(&self) -> bool {
        !self.to_add.resource.is_empty() || !self.to_remove.resource.is_empty()
    }

    /// Rules for faults raised by the tag calls of this delta.
    pub fn rules(&self) -> ErrorRuleSet {
        if self.touches_resource_tags() {
            hard_tagging_rules()
        } else {
            soft_tagging_rules()
        }
    }
}

/// Tagging faults that fail the whole operation.
pub fn hard_tagging_rules() -> ErrorRuleSet {
    ErrorRuleSet::extend(&ErrorRuleSet::generic()).with_codes(
        [
            codes::ACCESS_DENIED,
            codes::ACCESS_DENIED_EXCEPTION,
            codes::NOT_AUTHORIZED,
        ],
        Outcome::FailWith(ErrorKind::AccessDenied),
    )
}

/// Tagging faults on orchestrator-owned tags: permission problems are swallowed.
pub fn soft_tagging_rules() -> ErrorRuleSet {
    ErrorRuleSet::extend(&ErrorRuleSet::generic()).with_codes(
        [
            codes::ACCESS_DENIED,
            codes::ACCESS_DENIED_EXCEPTION,
            codes::NOT_AUTHORIZED,
        ],
        Outcome::Ignore,
    )
}

/// The remote tag add/remove calls.
#[async_trait]
pub trait TaggingApi: Send + Sync {
    async fn add_tags(&self, identifier: &str, tags: &[Tag]) -> Result<(), Fault>;
    async fn remove_tags(&self, identifier: &str, tags: &[Tag]) -> Result<(), Fault>;
}

/// Brings the remote tags of `identifier` from `previous` to `desired`.
#[derive(Debug, Clone)]
pub struct TagReconciler {
    retry_delay_seconds: u32,
}

impl TagReconciler {
    pub fn new(retry_delay_seconds: u32) -> Self {
        Self {
            retry_delay_seconds,
        }
    }

    /// Remove-then-add; a no-op continuation when nothing changed.
    pub async fn reconcile<M, A>(
        &self,
        api: &A,
        identifier: &str,
        previous: &TagSet,
        desired: &TagSet,
        progress: ProgressEvent<M>,
    ) -> ProgressEvent<M>
    where
        A: TaggingApi + ?Sized,
    {
        let (model, context) = match progress {
            ProgressEvent::InProgress {
                delay_seconds: 0,
                model,
                context,
            } => (model, context),
            other => return other,
        };

        let delta = TagDelta::between(previous, desired);
        if delta.is_empty() {
            debug!(resource = identifier, "Tags unchanged");
            return ProgressEvent::progress(model, context);
        }

        let to_remove: Vec<Tag> = delta.to_remove.flatten().into_iter().collect();
        let to_add: Vec<Tag> = delta.to_add.flatten().into_iter().collect();
        info!(
            resource = identifier,
            removing = to_remove.len(),
            adding = to_add.len(),
            "Updating tags"
        );

        let mut result = Ok(());
        if !to_remove.is_empty() {
            result = api.remove_tags(identifier, &to_remove).await;
        }
        if result.is_ok() && !to_add.is_empty() {
            result = api.add_tags(identifier, &to_add).await;
        }

        match result {
            Ok(()) => ProgressEvent::progress(model, context),
            Err(fault) => resolve_fault(
                &fault,
                &delta.rules(),
                model,
                context,
                self.retry_delay_seconds,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CallbackContext;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Add(Vec<Tag>),
        Remove(Vec<Tag>),
    }

    #[derive(Default)]
    struct RecordingApi {
        calls: Mutex<Vec<Call>>,
        fail_with: Option<Fault>,
    }

    #[async_trait]
    impl TaggingApi for RecordingApi {
        async fn add_tags(&self, _identifier: &str, tags: &[Tag]) -> Result<(), Fault> {
            self.calls.lock().unwrap().push(Call::Add(tags.to_vec()));
            self.fail_with.clone().map_or(Ok(()), Err)
        }

        async fn remove_tags(&self, _identifier: &str, tags: &[Tag]) -> Result<(), Fault> {
            self.calls.lock().unwrap().push(Call::Remove(tags.to_vec()));
            self.fail_with.clone().map_or(Ok(()), Err)
        }
    }

    fn sample() -> TagSet {
        TagSet::new()
            .with_system("aws:cloudformation:stack-name", "prod")
            .with_stack("team", "data")
            .with_resource("env", "prod")
    }

    async fn reconcile(api: &RecordingApi, previous: &TagSet, desired: &TagSet) -> ProgressEvent<()> {
        TagReconciler::new(5)
            .reconcile(
                api,
                "cluster-1",
                previous,
                desired,
                ProgressEvent::progress((), CallbackContext::new()),
            )
            .await
    }

    #[tokio::test]
    async fn test_same_tags_is_a_no_op() {
        let api = RecordingApi::default();
        let event = reconcile(&api, &sample(), &sample()).await;
        assert!(event.is_continuation());
        assert!(api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_from_empty_only_adds() {
        let api = RecordingApi::default();
        reconcile(&api, &TagSet::new(), &sample()).await;
        let calls = api.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], Call::Add(tags) if tags.len() == 3));
    }

    #[tokio::test]
    async fn test_to_empty_only_removes() {
        let api = RecordingApi::default();
        reconcile(&api, &sample(), &TagSet::new()).await;
        let calls = api.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], Call::Remove(tags) if tags.len() == 3));
    }

    #[tokio::test]
    async fn test_value_change_is_remove_then_add() {
        let api = RecordingApi::default();
        let desired = TagSet::new()
            .with_system("aws:cloudformation:stack-name", "prod")
            .with_stack("team", "data")
            .with_resource("env", "staging");
        reconcile(&api, &sample(), &desired).await;
        let calls = api.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                Call::Remove(vec![Tag::new("env", "prod")]),
                Call::Add(vec![Tag::new("env", "staging")]),
            ]
        );
    }

    #[test]
    fn test_moving_a_pair_between_buckets_is_no_change() {
        let previous = TagSet::new().with_stack("team", "data");
        let desired = TagSet::new().with_resource("team", "data");
        assert!(TagDelta::between(&previous, &desired).is_empty());
    }

    #[tokio::test]
    async fn test_access_denied_on_system_tags_is_soft() {
        let api = RecordingApi {
            fail_with: Some(Fault::new(codes::ACCESS_DENIED, "no tagging permission")),
            ..Default::default()
        };
        let previous = TagSet::new().with_resource("env", "prod");
        let desired = previous.clone().with_system("aws:cloudformation:stack-id", "abc");
        let event = reconcile(&api, &previous, &desired).await;
        assert!(event.is_continuation());
    }

    #[tokio::test]
    async fn test_access_denied_on_resource_tags_is_hard() {
        let api = RecordingApi {
            fail_with: Some(Fault::new(codes::ACCESS_DENIED, "no tagging permission")),
            ..Default::default()
        };
        let event = reconcile(&api, &TagSet::new(), &sample()).await;
        assert_eq!(event.error_kind(), Some(ErrorKind::AccessDenied));
    }

    #[tokio::test]
    async fn test_failed_remove_skips_add() {
        let api = RecordingApi {
            fail_with: Some(Fault::new(codes::INVALID_PARAMETER_VALUE, "bad key")),
            ..Default::default()
        };
        let desired = TagSet::new().with_resource("env", "staging");
        let event = reconcile(&api, &sample(), &desired).await;
        assert_eq!(event.error_kind(), Some(ErrorKind::InvalidRequest));
        assert_eq!(api.calls.lock().unwrap().len(), 1);
    }
}
