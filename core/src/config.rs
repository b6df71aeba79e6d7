//! Client configuration.
//!
//! Defaults suit a local mock server. Values can come from a JSON document or
//! from `IZNIK_*` environment variables; anything unset keeps its default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::request::OPERATOR_FLAG_KEY;
use crate::retry::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: String, value: String },

    #[error("invalid config document: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Prefix for every request path, e.g. `https://api.example.org/api`.
    pub base_url: String,
    /// Wait before the single retry of a transient anomaly.
    pub retry_delay_ms: u64,
    /// Whole-request timeout enforced by the transport.
    pub timeout_secs: u64,
    /// Session flag read for operator mode, and the key it is sent under.
    pub operator_flag: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            retry_delay_ms: 2000,
            timeout_secs: 30,
            operator_flag: OPERATOR_FLAG_KEY.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(document)?)
    }

    /// Read `IZNIK_API`, `IZNIK_RETRY_DELAY_MS`, `IZNIK_TIMEOUT_SECS` and
    /// `IZNIK_OPERATOR_FLAG`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(url) = lookup("IZNIK_API") {
            config.base_url = url;
        }
        if let Some(ms) = lookup("IZNIK_RETRY_DELAY_MS") {
            config.retry_delay_ms = parse_number("IZNIK_RETRY_DELAY_MS", ms)?;
        }
        if let Some(secs) = lookup("IZNIK_TIMEOUT_SECS") {
            config.timeout_secs = parse_number("IZNIK_TIMEOUT_SECS", secs)?;
        }
        if let Some(flag) = lookup("IZNIK_OPERATOR_FLAG") {
            config.operator_flag = flag;
        }
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(self.retry_delay_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn parse_number(key: &str, value: String) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value,
    })
}
