//! Configuration of a [`Rendezvous`](crate::Rendezvous).

use std::{str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const ENV_PARTIES: &str = "RENDEZVOUS_PARTIES";
pub const ENV_WAIT_TIMEOUT_MS: &str = "RENDEZVOUS_WAIT_TIMEOUT_MS";
pub const ENV_THREAD_PREFIX: &str = "RENDEZVOUS_THREAD_PREFIX";

/// Party count and worker settings.
///
/// Missing fields fall back to [`Default`]: 5 parties, no wait timeout, threads named
/// `worker-<index>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendezvousConfig {
    /// Arrivals needed to trip the barrier.
    pub parties: usize,

    /// Break the barrier if a worker waits longer than this.
    pub wait_timeout_ms: Option<u64>,

    pub thread_name_prefix: String,
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            parties: 5,
            wait_timeout_ms: None,
            thread_name_prefix: "worker".to_string(),
        }
    }
}

impl RendezvousConfig {
    /// Reads `RENDEZVOUS_PARTIES`, `RENDEZVOUS_WAIT_TIMEOUT_MS` and `RENDEZVOUS_THREAD_PREFIX`
    /// over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_PARTIES) {
            config.parties = parse_value(ENV_PARTIES, &value)?;
        }
        if let Some(value) = lookup(ENV_WAIT_TIMEOUT_MS) {
            config.wait_timeout_ms = Some(parse_value(ENV_WAIT_TIMEOUT_MS, &value)?);
        }
        if let Some(value) = lookup(ENV_THREAD_PREFIX) {
            config.thread_name_prefix = value;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document such as
    ///
    /// ```toml
    /// parties = 3
    /// wait_timeout_ms = 500
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parties == 0 {
            return Err(ConfigError::InvalidParties);
        }
        if self.thread_name_prefix.is_empty() {
            return Err(ConfigError::EmptyThreadPrefix);
        }
        Ok(())
    }

    #[inline]
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }

    #[inline]
    pub fn thread_name(&self, index: usize) -> String {
        format!("{}-{}", self.thread_name_prefix, index)
    }
}

fn parse_value<V: FromStr>(key: &'static str, value: &str) -> Result<V, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}
