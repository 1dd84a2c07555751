//! # Configuration
//!
//! Tunables for the guards and the driver. Values come from, in increasing precedence:
//! the built-in defaults, a TOML document, and `RECONCILER_*` environment variables.
//!
//! ```toml
//! retry_delay_seconds = 15
//! max_invocations = 500
//! skip_existence_check = false
//!
//! [stabilization]
//! delay_seconds = 10
//! max_delay_seconds = 60
//! multiplier = 2
//! timeout_seconds = 3600
//! ```

use crate::error::FrameworkError;
use crate::stabilize::Backoff;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of the environment variables read by [`ReconcilerConfig::with_env_overrides`].
pub const ENV_PREFIX: &str = "RECONCILER_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Poll schedule used while waiting for a resource to settle.
    pub stabilization: Backoff,
    /// Delay before re-invoking after a fault classified as `Retry`.
    pub retry_delay_seconds: u32,
    /// Upper bound on invocations the driver performs for one operation.
    pub max_invocations: u32,
    /// Test harness bypass for the idempotency existence check.
    pub skip_existence_check: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            stabilization: Backoff::default(),
            retry_delay_seconds: 10,
            max_invocations: 1_000,
            skip_existence_check: false,
        }
    }
}

impl ReconcilerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, FrameworkError> {
        let config: Self =
            toml::from_str(raw).map_err(|e| FrameworkError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FrameworkError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            FrameworkError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Applies `RECONCILER_*` variables from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, FrameworkError> {
        self.with_overrides(std::env::vars())
    }

    /// Applies overrides from any `(name, value)` source; unknown names are ignored.
    pub fn with_overrides<I>(mut self, vars: I) -> Result<Self, FrameworkError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(key) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match key {
                "RETRY_DELAY_SECONDS" => self.retry_delay_seconds = parse(&name, &value)?,
                "MAX_INVOCATIONS" => self.max_invocations = parse(&name, &value)?,
                "SKIP_EXISTENCE_CHECK" => self.skip_existence_check = parse(&name, &value)?,
                "STABILIZATION_DELAY_SECONDS" => {
                    self.stabilization.delay_seconds = parse(&name, &value)?
                }
                "STABILIZATION_TIMEOUT_SECONDS" => {
                    self.stabilization.timeout_seconds = parse(&name, &value)?
                }
                _ => {}
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), FrameworkError> {
        if self.max_invocations == 0 {
            return Err(FrameworkError::InvalidConfig(
                "max_invocations must be at least 1".into(),
            ));
        }
        self.stabilization.validate()
    }
}

fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, FrameworkError> {
    value
        .trim()
        .parse()
        .map_err(|_| FrameworkError::InvalidConfig(format!("{name}: cannot parse `{value}`")))
}
