use crate::model::{DbCluster, SUPPORTED_ENGINES};
use reconcile_framework::sandbox::SimulatedResource;
use reconcile_framework::{codes, Fault};

/// Patch level the control plane picks when only a major (or major.minor) version is declared.
fn default_version(engine: &str) -> &'static str {
    match engine {
        "aurora-postgresql" => "15.4",
        _ => "8.0.mysql_aurora.3.05.2",
    }
}

/// A cluster as the control plane stores and reports it.
///
/// The remote side normalizes what it is given: the engine name is lowercased, a partial
/// engine version is completed, and storage encryption defaults to on.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCluster {
    pub engine: String,
    pub engine_version: String,
    pub instance_count: u32,
    pub storage_encrypted: bool,
    pub endpoint: String,
}

/// Fields a modify call may change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterPatch {
    pub engine_version: Option<String>,
    pub instance_count: Option<u32>,
    pub master_user_password: Option<String>,
}

impl ClusterPatch {
    /// What it takes to go from `previous` to `desired`.
    pub fn between(previous: &DbCluster, desired: &DbCluster) -> Self {
        Self {
            engine_version: desired
                .engine_version
                .clone()
                .filter(|v| previous.engine_version.as_ref() != Some(v)),
            instance_count: Some(desired.instance_count)
                .filter(|count| *count != previous.instance_count),
            master_user_password: desired
                .master_user_password
                .clone()
                .filter(|p| previous.master_user_password.as_ref() != Some(p)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.engine_version.is_none()
            && self.instance_count.is_none()
            && self.master_user_password.is_none()
    }
}

fn complete_version(engine: &str, requested: Option<&str>) -> String {
    let default = default_version(engine);
    match requested {
        None => default.to_string(),
        Some(requested) if default.starts_with(&format!("{requested}.")) => default.to_string(),
        Some(requested) => requested.to_string(),
    }
}

/// Leading numeric segments, so `9.6` sorts before `15.4`.
fn version_key(version: &str) -> Vec<u32> {
    version
        .split('.')
        .map_while(|segment| segment.parse().ok())
        .collect()
}

impl SimulatedResource for RemoteCluster {
    type Spec = DbCluster;
    type Patch = ClusterPatch;

    fn identifier(spec: &DbCluster) -> String {
        spec.identifier.clone().unwrap_or_default()
    }

    fn from_spec(spec: DbCluster) -> Result<Self, Fault> {
        let identifier = Self::identifier(&spec);
        if identifier.is_empty() {
            return Err(Fault::new(
                codes::INVALID_PARAMETER_VALUE,
                "DBClusterIdentifier is required",
            ));
        }
        let engine = spec.engine.to_ascii_lowercase();
        if !SUPPORTED_ENGINES.contains(&engine.as_str()) {
            return Err(Fault::new(
                codes::INVALID_PARAMETER_VALUE,
                format!("Invalid DB engine: {}", spec.engine),
            ));
        }
        if spec.master_user_password.as_deref().is_some_and(|p| p.len() < 8) {
            return Err(Fault::new(
                codes::INVALID_PARAMETER_VALUE,
                "MasterUserPassword must be at least 8 characters",
            ));
        }
        Ok(RemoteCluster {
            engine_version: complete_version(&engine, spec.engine_version.as_deref()),
            engine,
            instance_count: spec.instance_count,
            storage_encrypted: spec.storage_encrypted.unwrap_or(true),
            endpoint: format!("{}.cluster.sandbox.local", identifier.to_ascii_lowercase()),
        })
    }

    fn apply_patch(&mut self, patch: ClusterPatch) -> Result<(), Fault> {
        if let Some(version) = patch.engine_version {
            let version = complete_version(&self.engine, Some(&version));
            if version_key(&version) < version_key(&self.engine_version) {
                return Err(Fault::new(
                    codes::INVALID_PARAMETER_COMBINATION,
                    format!(
                        "Cannot downgrade from {} to {version}",
                        self.engine_version
                    ),
                ));
            }
            self.engine_version = version;
        }
        if let Some(count) = patch.instance_count {
            self.instance_count = count;
        }
        Ok(())
    }
}
