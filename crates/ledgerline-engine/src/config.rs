//! Engine configuration.

use std::str::FromStr;

use ledgerline_core::error::DomainError;
use serde::Deserialize;

/// What replay does with a record whose stored type cannot be bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedTypePolicy {
    /// Stop the replay with `DomainError::UnresolvableType`.
    #[default]
    Abort,
    /// Log the record and continue.
    Skip,
    /// Collect the record into the replay report and continue.
    Quarantine,
}

impl FromStr for UnresolvedTypePolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            "quarantine" => Ok(Self::Quarantine),
            other => Err(DomainError::Validation(format!(
                "unknown unresolved type policy: {other}"
            ))),
        }
    }
}

/// Tunables for the repository and replay orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Take a snapshot once this many events have accumulated since the
    /// last one. Zero disables snapshotting.
    pub snapshot_interval: i64,
    /// Reload-and-retry attempts after a concurrency conflict.
    pub max_concurrency_retries: u32,
    /// Events fetched per page when loading or replaying.
    pub replay_batch_size: usize,
    /// Handling of unbindable records during replay.
    pub unresolved_type_policy: UnresolvedTypePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: 50,
            max_concurrency_retries: 3,
            replay_batch_size: 500,
            unresolved_type_policy: UnresolvedTypePolicy::Abort,
        }
    }
}

impl EngineConfig {
    /// Reads overrides from `LEDGERLINE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, DomainError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from defaults plus whatever `lookup` returns.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if a value does not parse or the
    /// resulting configuration is invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DomainError> {
        let mut config = Self::default();
        if let Some(value) = lookup("LEDGERLINE_SNAPSHOT_INTERVAL") {
            config.snapshot_interval = parse("LEDGERLINE_SNAPSHOT_INTERVAL", &value)?;
        }
        if let Some(value) = lookup("LEDGERLINE_MAX_RETRIES") {
            config.max_concurrency_retries = parse("LEDGERLINE_MAX_RETRIES", &value)?;
        }
        if let Some(value) = lookup("LEDGERLINE_REPLAY_BATCH_SIZE") {
            config.replay_batch_size = parse("LEDGERLINE_REPLAY_BATCH_SIZE", &value)?;
        }
        if let Some(value) = lookup("LEDGERLINE_UNRESOLVED_TYPE_POLICY") {
            config.unresolved_type_policy = value.parse()?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for a negative snapshot interval or
    /// a zero batch size.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.snapshot_interval < 0 {
            return Err(DomainError::Validation(
                "snapshot interval must not be negative".into(),
            ));
        }
        if self.replay_batch_size == 0 {
            return Err(DomainError::Validation(
                "replay batch size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, DomainError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| DomainError::Validation(format!("{key} is invalid: {e}")))
}
