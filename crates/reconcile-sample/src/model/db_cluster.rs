use crate::cluster::ClusterError;
use crate::model::RemoteCluster;
use reconcile_framework::sandbox::Observed;
use reconcile_framework::{Properties, TagSet};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Engines the control plane accepts, compared case-insensitively.
pub const SUPPORTED_ENGINES: [&str; 2] = ["aurora-mysql", "aurora-postgresql"];

pub const MAX_INSTANCE_COUNT: u32 = 16;

/// A database cluster as declared by the user.
///
/// `identifier` is generated on create when left empty. `master_user_password` is write-only
/// and never read back; `endpoint` is assigned by the remote side and only ever read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DbCluster {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub engine: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    pub instance_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_encrypted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_user_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub tags: TagSet,
}

impl DbCluster {
    pub fn new(engine: impl Into<String>, instance_count: u32) -> Self {
        Self {
            engine: engine.into(),
            instance_count,
            ..Self::default()
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_engine_version(mut self, version: impl Into<String>) -> Self {
        self.engine_version = Some(version.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.master_user_password = Some(password.into());
        self
    }

    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }

    /// Checks the declared values before any remote call is made.
    pub fn validate(&self) -> Result<(), ClusterError> {
        if self.engine.trim().is_empty() {
            return Err(ClusterError::MissingEngine);
        }
        if !SUPPORTED_ENGINES
            .iter()
            .any(|engine| engine.eq_ignore_ascii_case(&self.engine))
        {
            return Err(ClusterError::UnsupportedEngine(self.engine.clone()));
        }
        if self.instance_count == 0 || self.instance_count > MAX_INSTANCE_COUNT {
            return Err(ClusterError::InvalidInstanceCount {
                count: self.instance_count,
                max: MAX_INSTANCE_COUNT,
            });
        }
        if let Some(identifier) = &self.identifier {
            let valid = identifier
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic())
                && identifier.len() <= 63
                && identifier
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-')
                && !identifier.ends_with('-')
                && !identifier.contains("--");
            if !valid {
                return Err(ClusterError::InvalidIdentifier(identifier.clone()));
            }
        }
        Ok(())
    }

    /// Rebuilds the model from a describe answer.
    ///
    /// The password is never reported, so it is carried over from `declared`. Remote tags come
    /// back without provenance: a pair `declared` has as a system or stack tag keeps that
    /// bucket, anything else is a resource tag.
    pub fn from_observed(observed: &Observed<RemoteCluster>, declared: &DbCluster) -> Self {
        let remote = &observed.resource;
        let mut tags = TagSet::new();
        for tag in &observed.tags {
            let bucket = if declared.tags.system.contains(tag) {
                &mut tags.system
            } else if declared.tags.stack.contains(tag) {
                &mut tags.stack
            } else {
                &mut tags.resource
            };
            bucket.insert(tag.clone());
        }
        Self {
            identifier: Some(observed.identifier.clone()),
            engine: remote.engine.clone(),
            engine_version: Some(remote.engine_version.clone()),
            instance_count: remote.instance_count,
            storage_encrypted: Some(remote.storage_encrypted),
            master_user_password: declared.master_user_password.clone(),
            endpoint: Some(remote.endpoint.clone()),
            tags,
        }
    }
}

impl Properties for DbCluster {
    fn fields(&self) -> Vec<(&'static str, Value)> {
        let mut fields = vec![
            ("Engine", json!(self.engine)),
            ("InstanceCount", json!(self.instance_count)),
        ];
        if let Some(identifier) = &self.identifier {
            fields.push(("DBClusterIdentifier", json!(identifier)));
        }
        if let Some(version) = &self.engine_version {
            fields.push(("EngineVersion", json!(version)));
        }
        if let Some(encrypted) = self.storage_encrypted {
            fields.push(("StorageEncrypted", json!(encrypted)));
        }
        if let Some(password) = &self.master_user_password {
            fields.push(("MasterUserPassword", json!(password)));
        }
        if let Some(endpoint) = &self.endpoint {
            fields.push(("Endpoint", json!(endpoint)));
        }
        if !self.tags.resource.is_empty() {
            let tags: Vec<Value> = self
                .tags
                .resource
                .iter()
                .map(|tag| json!({ "Key": tag.key, "Value": tag.value }))
                .collect();
            fields.push(("Tags", Value::Array(tags)));
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_mixed_case_engine() {
        let cluster = DbCluster::new("Aurora-MySQL", 2).with_identifier("orders-db");
        assert_eq!(cluster.validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert_eq!(
            DbCluster::new("", 1).validate(),
            Err(ClusterError::MissingEngine)
        );
        assert_eq!(
            DbCluster::new("oracle", 1).validate(),
            Err(ClusterError::UnsupportedEngine("oracle".into()))
        );
        assert!(matches!(
            DbCluster::new("aurora-mysql", 0).validate(),
            Err(ClusterError::InvalidInstanceCount { count: 0, .. })
        ));
        assert!(matches!(
            DbCluster::new("aurora-mysql", 1)
                .with_identifier("1-bad--name-")
                .validate(),
            Err(ClusterError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_properties_leave_out_unset_fields() {
        let cluster = DbCluster::new("aurora-mysql", 2)
            .with_tags(TagSet::new().with_resource("team", "data").with_system("sys", "1"));
        let properties = cluster.to_properties();

        assert_eq!(properties["Engine"], json!("aurora-mysql"));
        assert!(properties.get("EngineVersion").is_none());
        assert_eq!(properties["Tags"], json!([{ "Key": "team", "Value": "data" }]));
    }
}
