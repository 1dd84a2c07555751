//! Drift schema of the `DbCluster` resource type.

use crate::cluster::ClusterError;
use crate::model::DbCluster;
use reconcile_framework::{DriftDetector, DriftReport, Schema};
use serde_json::{json, Value};

/// The resource schema document, in the layout resource providers publish.
pub fn schema_document() -> Value {
    json!({
        "typeName": "Sandbox::RDS::DBCluster",
        "properties": {
            "DBClusterIdentifier": { "type": "string" },
            "Engine": { "type": "string" },
            "EngineVersion": { "type": "string" },
            "InstanceCount": { "type": "integer" },
            "StorageEncrypted": { "type": "boolean" },
            "MasterUserPassword": { "type": "string" },
            "Endpoint": { "type": "string" },
            "Tags": { "type": "array", "insertionOrder": false }
        },
        "propertyTransform": {
            "/properties/DBClusterIdentifier": "$lowercase(DBClusterIdentifier)",
            "/properties/Engine": "$lowercase(Engine)",
            "/properties/EngineVersion": "EngineVersion & \"\\\\..*\"",
            "/properties/StorageEncrypted": "StorageEncrypted or true"
        },
        "writeOnlyProperties": ["/properties/MasterUserPassword"],
        "readOnlyProperties": ["/properties/Endpoint"]
    })
}

pub fn drift_schema() -> Result<Schema, ClusterError> {
    Ok(Schema::from_document(&schema_document())?)
}

/// Drift between what was declared and what the cluster looks like now.
///
/// `Endpoint` is read-only: a declared model never carries it, so it only drifts when both
/// sides were read back.
pub fn cluster_drift(schema: &Schema, previous: &DbCluster, current: &DbCluster) -> DriftReport {
    DriftDetector::new(schema).detect_models(previous, current)
}
