//! # Drift Detector
//!
//! Compares a resource's *previous* declared properties with its *updated* ones and reports
//! each path whose value changed in a way the remote service would not explain away.
//!
//! ## Rules
//!
//! Applied at every path, first match wins:
//!
//! 1. No drift when the previous value is absent or null, when the values are equal, or when
//!    the path is write-only (the remote never reports it back).
//! 2. With transforms on the path and an updated value present: no drift when any transform,
//!    evaluated against the whole previous property object and cast to the updated value's
//!    type, equals the updated value, or (for strings) matches it as a regex anchored at both
//!    ends. Otherwise the path drifted.
//! 3. Arrays compare ordered, unordered (multiset) or as sets, per the schema. A null updated
//!    array counts as empty. Ordered arrays of different lengths drift as a whole; equal
//!    lengths recurse per index.
//! 4. Objects recurse per key of the previous object.
//! 5. Different primitives drift.
//!
//! ## Example
//!
//! ```
//! use reconcile_framework::drift::{detect_drift, Schema};
//! use serde_json::json;
//!
//! let schema = Schema::builder()
//!     .transform("/properties/BoolProperty", "BoolProperty or true")
//!     .build()
//!     .unwrap();
//!
//! let report = detect_drift(
//!     &json!({ "BoolProperty": false }),
//!     &json!({ "BoolProperty": true }),
//!     &schema,
//! );
//! assert!(report.is_empty());
//! ```

pub mod expr;
pub mod schema;

pub use expr::{values_equal, Transform};
pub use schema::{ArrayOrdering, PropertySchema, Schema, SchemaBuilder};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Path of the property object itself.
pub const ROOT_PATH: &str = "/properties";

/// One drifted path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    pub from: Value,
    pub to: Value,
}

/// Drifted paths, keyed by path.
pub type DriftReport = BTreeMap<String, Mutation>;

/// A model that can expose its declared properties to the detector.
pub trait Properties {
    /// `(property name, value)` pairs; absent optional properties may be left out.
    fn fields(&self) -> Vec<(&'static str, Value)>;

    fn to_properties(&self) -> Value {
        Value::Object(
            self.fields()
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        )
    }
}

/// Runs the detector over two property objects.
pub fn detect_drift(previous: &Value, updated: &Value, schema: &Schema) -> DriftReport {
    DriftDetector::new(schema).detect(previous, updated)
}

pub struct DriftDetector<'a> {
    schema: &'a Schema,
}

impl<'a> DriftDetector<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    pub fn detect(&self, previous: &Value, updated: &Value) -> DriftReport {
        let mut report = DriftReport::new();
        self.walk(ROOT_PATH, Some(previous), Some(updated), previous, &mut report);
        report
    }

    pub fn detect_models<P: Properties>(&self, previous: &P, updated: &P) -> DriftReport {
        self.detect(&previous.to_properties(), &updated.to_properties())
    }

    fn walk(
        &self,
        path: &str,
        previous: Option<&Value>,
        updated: Option<&Value>,
        root: &Value,
        report: &mut DriftReport,
    ) {
        let previous = match previous {
            None | Some(Value::Null) => return,
            Some(value) => value,
        };
        let property = self.schema.lookup(path);
        if property.is_some_and(|p| p.write_only) {
            return;
        }
        if updated.is_some_and(|u| values_equal(previous, u)) {
            return;
        }

        let present = updated.filter(|u| !u.is_null());
        if let (Some(updated), Some(property)) = (present, property) {
            if !property.transforms.is_empty() {
                if !transform_matches(&property.transforms, root, updated) {
                    record(report, path, previous, Some(updated));
                }
                return;
            }
        }

        match previous {
            Value::Array(items) => {
                let empty = Vec::new();
                let updated_items = match updated {
                    Some(Value::Array(u)) => u,
                    None | Some(Value::Null) => &empty,
                    Some(other) => return record(report, path, previous, Some(other)),
                };
                let ordering = property.map_or(ArrayOrdering::Ordered, |p| p.ordering);
                let drifted = match ordering {
                    ArrayOrdering::Ordered => {
                        if items.len() != updated_items.len() {
                            true
                        } else {
                            for (index, (p, u)) in items.iter().zip(updated_items).enumerate() {
                                let child = format!("{path}/{index}");
                                self.walk(&child, Some(p), Some(u), root, report);
                            }
                            false
                        }
                    }
                    ArrayOrdering::Unordered => multiset(items) != multiset(updated_items),
                    ArrayOrdering::Set => set(items) != set(updated_items),
                };
                if drifted {
                    record(report, path, previous, updated);
                }
            }
            Value::Object(fields) => match updated {
                Some(Value::Object(updated_fields)) => {
                    for (key, value) in fields {
                        let child = format!("{path}/{key}");
                        self.walk(&child, Some(value), updated_fields.get(key), root, report);
                    }
                }
                None | Some(Value::Null) => {
                    for (key, value) in fields {
                        let child = format!("{path}/{key}");
                        self.walk(&child, Some(value), None, root, report);
                    }
                }
                Some(other) => record(report, path, previous, Some(other)),
            },
            _ => record(report, path, previous, updated),
        }
    }
}

fn record(report: &mut DriftReport, path: &str, previous: &Value, updated: Option<&Value>) {
    trace!(path, "Drift");
    report.insert(
        path.to_string(),
        Mutation {
            from: previous.clone(),
            to: updated.cloned().unwrap_or(Value::Null),
        },
    );
}

fn transform_matches(transforms: &[Transform], root: &Value, updated: &Value) -> bool {
    transforms.iter().any(|transform| {
        let Some(result) = transform.evaluate(root) else {
            return false;
        };
        let cast = cast_like(result, updated);
        if values_equal(&cast, updated) {
            return true;
        }
        match (&cast, updated) {
            (Value::String(pattern), Value::String(actual)) => {
                Regex::new(&format!("^(?:{pattern})$")).is_ok_and(|re| re.is_match(actual))
            }
            _ => false,
        }
    })
}

fn cast_like(result: Value, updated: &Value) -> Value {
    match updated {
        Value::Bool(_) => Value::Bool(expr::to_boolean(Some(&result))),
        Value::Number(_) => match expr::to_number(&result) {
            Some(n) => expr::number_value(n),
            None => result,
        },
        Value::String(_) => Value::String(expr::to_string(&result)),
        _ => result,
    }
}

/// Order-independent text form; object keys sorted, numbers normalized.
fn canonical(value: &Value) -> String {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map_or_else(|| n.to_string(), |f| expr::to_string(&expr::number_value(f))),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Object(fields) => {
            let sorted: BTreeMap<&String, &Value> = fields.iter().collect();
            let parts: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical(v)))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        other => other.to_string(),
    }
}

fn multiset(items: &[Value]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for item in items {
        *counts.entry(canonical(item)).or_insert(0) += 1;
    }
    counts
}

fn set(items: &[Value]) -> BTreeSet<String> {
    items.iter().map(canonical).collect()
}
