//! # Callback Context
//!
//! The only state that survives between two invocations of the same logical operation.
//! The caller persists it verbatim (see [`CallbackContext::to_json`]) and hands it back on the
//! next invocation; anything not stored here is lost.
//!
//! Core-owned fields:
//! - `pre_existence_check_done`: set by the [`IdempotencyGuard`](crate::IdempotencyGuard)
//! - step flags: set by the [`step_once`](crate::step_once) guard
//! - per-label timestamps, accumulated delay and attempt counters: owned by the
//!   [`Stabilizer`](crate::Stabilizer)
//!
//! Resource types may keep their own string values in the same bag.

use crate::error::FrameworkError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackContext {
    #[serde(default)]
    pre_existence_check_done: bool,
    #[serde(default)]
    flags: BTreeMap<String, bool>,
    #[serde(default)]
    timestamps: BTreeMap<String, DateTime<Utc>>,
    #[serde(default)]
    elapsed: BTreeMap<String, u64>,
    #[serde(default)]
    attempts: BTreeMap<String, u32>,
    #[serde(default)]
    values: BTreeMap<String, String>,
}

impl CallbackContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pre_existence_check_done(&self) -> bool {
        self.pre_existence_check_done
    }

    pub fn set_pre_existence_check_done(&mut self, done: bool) {
        self.pre_existence_check_done = done;
    }

    /// Reads a step flag. Unset flags are `false`.
    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    pub fn set_flag(&mut self, name: &str, value: bool) {
        self.flags.insert(name.to_string(), value);
    }

    pub fn timestamp(&self, label: &str) -> Option<DateTime<Utc>> {
        self.timestamps.get(label).copied()
    }

    /// Records `at` for `label` unless a timestamp is already present.
    pub fn timestamp_once(&mut self, label: &str, at: DateTime<Utc>) {
        self.timestamps.entry(label.to_string()).or_insert(at);
    }

    /// Delay accumulated so far under `label`.
    pub fn elapsed(&self, label: &str) -> Duration {
        Duration::from_secs(self.elapsed.get(label).copied().unwrap_or(0))
    }

    pub fn add_elapsed(&mut self, label: &str, seconds: u64) {
        *self.elapsed.entry(label.to_string()).or_insert(0) += seconds;
    }

    pub fn attempts(&self, label: &str) -> u32 {
        self.attempts.get(label).copied().unwrap_or(0)
    }

    pub fn bump_attempts(&mut self, label: &str) -> u32 {
        let attempts = self.attempts.entry(label.to_string()).or_insert(0);
        *attempts += 1;
        *attempts
    }

    /// Forgets all accounting kept under `label`.
    pub fn clear_label(&mut self, label: &str) {
        self.timestamps.remove(label);
        self.elapsed.remove(label);
        self.attempts.remove(label);
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set_value(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Serializes the context into the form the caller persists between invocations.
    pub fn to_json(&self) -> Result<String, FrameworkError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, FrameworkError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_is_empty() {
        let ctx = CallbackContext::new();
        assert!(!ctx.pre_existence_check_done());
        assert!(!ctx.flag("modified"));
        assert_eq!(ctx.elapsed("create"), Duration::ZERO);
        assert_eq!(ctx.attempts("create"), 0);
        assert!(ctx.timestamp("create").is_none());
    }

    #[test]
    fn test_timestamp_once_keeps_first_value() {
        let mut ctx = CallbackContext::new();
        let first = Utc::now();
        let later = first + chrono::Duration::seconds(30);
        ctx.timestamp_once("create", first);
        ctx.timestamp_once("create", later);
        assert_eq!(ctx.timestamp("create"), Some(first));
    }

    #[test]
    fn test_elapsed_accumulates_and_clears() {
        let mut ctx = CallbackContext::new();
        ctx.add_elapsed("modify", 5);
        ctx.add_elapsed("modify", 7);
        assert_eq!(ctx.bump_attempts("modify"), 1);
        assert_eq!(ctx.elapsed("modify"), Duration::from_secs(12));

        ctx.clear_label("modify");
        assert_eq!(ctx.elapsed("modify"), Duration::ZERO);
        assert_eq!(ctx.attempts("modify"), 0);
    }

    #[test]
    fn test_context_survives_persistence() {
        let mut ctx = CallbackContext::new();
        ctx.set_pre_existence_check_done(true);
        ctx.set_flag("tagged", true);
        ctx.add_elapsed("create", 10);
        ctx.timestamp_once("create", Utc::now());
        ctx.set_value("identifier", "cluster-1");

        let restored = CallbackContext::from_json(&ctx.to_json().unwrap()).unwrap();
        assert_eq!(restored, ctx);
    }

    #[test]
    fn test_missing_fields_default_when_restoring() {
        let ctx = CallbackContext::from_json(r#"{"flags":{"modified":true}}"#).unwrap();
        assert!(ctx.flag("modified"));
        assert!(!ctx.pre_existence_check_done());
    }

    #[test]
    fn test_corrupt_context_is_rejected() {
        let result = CallbackContext::from_json("not json");
        assert!(matches!(result, Err(FrameworkError::InvalidContext(_))));
    }
}
