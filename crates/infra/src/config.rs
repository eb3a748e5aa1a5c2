//! Process configuration read from the environment.
//!
//! Scoring policy (weights, utilization ceiling) lives in the settings store and
//! is owned by `DistributionConfigStore`; this module only covers how the
//! process itself is wired.

use std::time::Duration;

use thiserror::Error;

pub const LOOKUP_TIMEOUT_VAR: &str = "TASKFORGE_LOOKUP_TIMEOUT_MS";
pub const DAILY_CAPACITY_VAR: &str = "TASKFORGE_DAILY_CAPACITY_MINUTES";
pub const DATABASE_URL_VAR: &str = "TASKFORGE_DATABASE_URL";

pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 2_000;
/// One eight-hour shift.
pub const DEFAULT_DAILY_CAPACITY_MINUTES: u32 = 480;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Upper bound for any single collaborator call.
    pub lookup_timeout: Duration,
    /// Minutes of work one employee can carry per day; utilization is measured
    /// against this.
    pub daily_capacity_minutes: u32,
    /// Enables the Postgres adapters when set.
    pub database_url: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            lookup_timeout: Duration::from_millis(DEFAULT_LOOKUP_TIMEOUT_MS),
            daily_capacity_minutes: DEFAULT_DAILY_CAPACITY_MINUTES,
            database_url: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Unset or blank variables fall
    /// back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(raw) = read(LOOKUP_TIMEOUT_VAR) {
            let ms = parse_positive(LOOKUP_TIMEOUT_VAR, &raw)?;
            config.lookup_timeout = Duration::from_millis(ms);
        }

        if let Some(raw) = read(DAILY_CAPACITY_VAR) {
            let minutes = parse_positive(DAILY_CAPACITY_VAR, &raw)?;
            config.daily_capacity_minutes = u32::try_from(minutes).map_err(|_| ConfigError::Invalid {
                key: DAILY_CAPACITY_VAR,
                value: raw.clone(),
                reason: "out of range",
            })?;
        }

        config.database_url = read(DATABASE_URL_VAR);
        Ok(config)
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    let invalid = |reason| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason,
    };

    match raw.parse::<u64>() {
        Ok(0) => Err(invalid("must be greater than zero")),
        Ok(value) => Ok(value),
        Err(_) => Err(invalid("not a positive integer")),
    }
}
