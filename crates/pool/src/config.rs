//! Pool configuration types

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for a resource pool
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Name used in logs and error messages
    pub name: String,
    /// Number of resources the pool constructs and never exceeds
    pub capacity: usize,
    /// Upper bound on how long `acquire` waits; `None` waits until a
    /// resource frees up or the pool shuts down
    pub acquire_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "pool".to_string(),
            capacity: 10,
            acquire_timeout: None,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with the given capacity and default settings.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Set the pool name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Validate pool configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::invalid_config("capacity must be greater than 0"));
        }
        if self.name.is_empty() {
            return Err(Error::invalid_config("name cannot be empty"));
        }
        if self.acquire_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::invalid_config(
                "acquire_timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}
