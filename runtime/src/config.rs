use serde::Deserialize;
use thiserror::Error;

/// Environment variable overriding [`DispatcherConfig::workers`].
pub const WORKERS_VAR: &str = "PLUGBOARD_WORKERS";

/// Environment variable overriding [`DispatcherConfig::queue_capacity`].
pub const QUEUE_CAPACITY_VAR: &str = "PLUGBOARD_QUEUE_CAPACITY";

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable was set but is not a valid number
    #[error("invalid value for {var}: '{value}' is not a non-negative integer")]
    InvalidNumber {
        /// Variable name
        var: &'static str,
        /// The rejected value
        value: String,
    },
}

/// Configuration for a [`Dispatcher`](crate::Dispatcher).
///
/// # Example
///
/// ```
/// use plugboard_runtime::DispatcherConfig;
///
/// let config = DispatcherConfig::default()
///     .with_workers(8)
///     .with_queue_capacity(64);
/// assert_eq!(config.workers, 8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Size of the worker pool.
    ///
    /// `0` disables the pool: every delivery runs on its own spawned task
    /// and nothing bounds concurrency.
    pub workers: usize,

    /// Deliveries that may wait for a free worker before publishers block.
    ///
    /// Values below 1 are treated as 1. Ignored when `workers` is 0.
    pub queue_capacity: usize,
}

impl DispatcherConfig {
    /// Default worker pool size.
    pub const DEFAULT_WORKERS: usize = 100;

    /// Default job queue capacity.
    pub const DEFAULT_QUEUE_CAPACITY: usize = 500;

    /// Set the worker pool size.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the job queue capacity.
    #[must_use]
    pub const fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Defaults overridden by `PLUGBOARD_WORKERS` and
    /// `PLUGBOARD_QUEUE_CAPACITY` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidNumber`] if a variable is set to
    /// something other than a non-negative integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidNumber`] for unparsable values.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(WORKERS_VAR) {
            config.workers = parse_count(WORKERS_VAR, &value)?;
        }
        if let Some(value) = lookup(QUEUE_CAPACITY_VAR) {
            config.queue_capacity = parse_count(QUEUE_CAPACITY_VAR, &value)?;
        }

        Ok(config)
    }

    /// Capacity actually used for the job channel.
    pub(crate) fn effective_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: Self::DEFAULT_WORKERS,
            queue_capacity: Self::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

fn parse_count(var: &'static str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: value.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn test_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.workers, 100);
        assert_eq!(config.queue_capacity, 500);
    }

    #[test]
    fn test_builders() {
        let config = DispatcherConfig::default().with_workers(0).with_queue_capacity(0);
        assert_eq!(config.workers, 0);
        assert_eq!(config.effective_capacity(), 1);
    }

    #[test]
    fn test_from_vars_overrides() {
        let env = vars(&[("PLUGBOARD_WORKERS", "4"), ("PLUGBOARD_QUEUE_CAPACITY", " 16 ")]);
        let config = DispatcherConfig::from_vars(|k| env.get(k).cloned()).unwrap();

        assert_eq!(config, DispatcherConfig::default().with_workers(4).with_queue_capacity(16));
    }

    #[test]
    fn test_from_vars_unset_keeps_defaults() {
        let config = DispatcherConfig::from_vars(|_| None).unwrap();
        assert_eq!(config, DispatcherConfig::default());
    }

    #[test]
    fn test_from_vars_rejects_garbage() {
        let env = vars(&[("PLUGBOARD_WORKERS", "-3")]);
        let err = DispatcherConfig::from_vars(|k| env.get(k).cloned()).unwrap_err();

        assert_eq!(
            err.to_string(),
            "invalid value for PLUGBOARD_WORKERS: '-3' is not a non-negative integer"
        );
    }
}
