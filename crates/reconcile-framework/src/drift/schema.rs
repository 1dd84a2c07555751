//! Per-path metadata consulted by the drift detector.
//!
//! Paths are JSON-pointer-like strings rooted at `/properties`, e.g. `/properties/Tags` or
//! `/properties/Endpoint/Port`. A `*` segment matches any array index:
//! `/properties/Rules/*/Priority`.

use super::expr::Transform;
use crate::error::FrameworkError;
use serde_json::Value;
use std::collections::BTreeMap;

/// How two arrays at the same path are compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArrayOrdering {
    /// Element by element.
    #[default]
    Ordered,
    /// As multisets.
    Unordered,
    /// As sets; duplicates collapse.
    Set,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertySchema {
    pub transforms: Vec<Transform>,
    pub write_only: bool,
    pub read_only: bool,
    pub ordering: ArrayOrdering,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    properties: BTreeMap<String, PropertySchema>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Metadata for a concrete path; exact entries win over wildcard entries.
    pub fn lookup(&self, path: &str) -> Option<&PropertySchema> {
        if let Some(exact) = self.properties.get(path) {
            return Some(exact);
        }
        self.properties
            .iter()
            .find(|(pattern, _)| pattern.contains('*') && matches_pattern(pattern, path))
            .map(|(_, property)| property)
    }

    pub fn is_write_only(&self, path: &str) -> bool {
        self.lookup(path).is_some_and(|p| p.write_only)
    }

    pub fn transforms(&self, path: &str) -> &[Transform] {
        self.lookup(path).map_or(&[][..], |p| p.transforms.as_slice())
    }

    pub fn ordering(&self, path: &str) -> ArrayOrdering {
        self.lookup(path).map_or(ArrayOrdering::Ordered, |p| p.ordering)
    }

    pub fn read_only_paths(&self) -> impl Iterator<Item = &str> {
        self.properties
            .iter()
            .filter(|(_, p)| p.read_only)
            .map(|(path, _)| path.as_str())
    }

    /// Reads a resource schema document.
    ///
    /// Recognized keys:
    ///
    /// - `propertyTransform`: path to expression; alternatives are separated by `$OR`.
    /// - `writeOnlyProperties` / `readOnlyProperties`: arrays of paths.
    /// - `properties.<Name>.insertionOrder` (default `true`) and `uniqueItems`: array
    ///   comparison mode of the top-level property.
    pub fn from_document(document: &Value) -> Result<Self, FrameworkError> {
        let mut builder = Schema::builder();

        if let Some(transforms) = document.get("propertyTransform") {
            let transforms = transforms.as_object().ok_or_else(|| {
                FrameworkError::InvalidSchema("propertyTransform must be an object".into())
            })?;
            for (path, expression) in transforms {
                let expression = expression.as_str().ok_or_else(|| {
                    FrameworkError::InvalidSchema(format!("transform for {path} is not a string"))
                })?;
                for alternative in expression.split("$OR") {
                    builder = builder.transform(path, alternative.trim());
                }
            }
        }

        for path in string_list(document, "writeOnlyProperties")? {
            builder = builder.write_only(&path);
        }
        for path in string_list(document, "readOnlyProperties")? {
            builder = builder.read_only(&path);
        }

        if let Some(properties) = document.get("properties").and_then(Value::as_object) {
            for (name, definition) in properties {
                let insertion_order = definition
                    .get("insertionOrder")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                let unique = definition
                    .get("uniqueItems")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let ordering = match (insertion_order, unique) {
                    (true, _) => continue,
                    (false, true) => ArrayOrdering::Set,
                    (false, false) => ArrayOrdering::Unordered,
                };
                builder = builder.ordering(&format!("{}/{name}", super::ROOT_PATH), ordering);
            }
        }

        builder.build()
    }
}

fn string_list(document: &Value, key: &str) -> Result<Vec<String>, FrameworkError> {
    let Some(list) = document.get(key) else {
        return Ok(Vec::new());
    };
    list.as_array()
        .ok_or_else(|| FrameworkError::InvalidSchema(format!("{key} must be an array")))?
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| FrameworkError::InvalidSchema(format!("{key} holds a non-string")))
        })
        .collect()
}

fn matches_pattern(pattern: &str, path: &str) -> bool {
    let mut pattern = pattern.split('/');
    let mut path = path.split('/');
    loop {
        match (pattern.next(), path.next()) {
            (None, None) => return true,
            (Some("*"), Some(segment)) if segment.parse::<usize>().is_ok() => {}
            (Some(expected), Some(segment)) if expected == segment => {}
            _ => return false,
        }
    }
}

/// Collects schema entries; expressions are compiled by [`SchemaBuilder::build`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    entries: BTreeMap<String, (Vec<String>, PropertySchema)>,
}

impl SchemaBuilder {
    fn entry(&mut self, path: &str) -> &mut (Vec<String>, PropertySchema) {
        self.entries.entry(path.to_string()).or_default()
    }

    /// Adds one alternative transform for `path`.
    pub fn transform(mut self, path: &str, expression: &str) -> Self {
        self.entry(path).0.push(expression.to_string());
        self
    }

    pub fn write_only(mut self, path: &str) -> Self {
        self.entry(path).1.write_only = true;
        self
    }

    pub fn read_only(mut self, path: &str) -> Self {
        self.entry(path).1.read_only = true;
        self
    }

    pub fn ordering(mut self, path: &str, ordering: ArrayOrdering) -> Self {
        self.entry(path).1.ordering = ordering;
        self
    }

    pub fn unordered(self, path: &str) -> Self {
        self.ordering(path, ArrayOrdering::Unordered)
    }

    pub fn build(self) -> Result<Schema, FrameworkError> {
        let mut properties = BTreeMap::new();
        for (path, (sources, mut property)) in self.entries {
            if !path.starts_with(super::ROOT_PATH) {
                return Err(FrameworkError::InvalidSchema(format!(
                    "{path} is not under {}",
                    super::ROOT_PATH
                )));
            }
            property.transforms = sources
                .iter()
                .map(|source| Transform::compile(source))
                .collect::<Result<_, _>>()?;
            properties.insert(path, property);
        }
        Ok(Schema { properties })
    }
}
