//! Cache configuration

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Construction parameters for [`SnapCache`](crate::SnapCache)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of resident keys
    pub capacity: usize,

    /// Publish attempts allowed to `try_get` / `try_set`; `None` retries forever
    #[serde(default)]
    pub retry_limit: Option<usize>,
}

impl CacheConfig {
    /// Config with the given capacity and unbounded retries
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            retry_limit: None,
        }
    }

    /// Bound the publish attempts of the `try_*` operations
    pub fn with_retry_limit(mut self, limit: usize) -> Self {
        self.retry_limit = Some(limit);
        self
    }

    /// Reject a zero capacity or a zero retry limit
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidCapacity(self.capacity));
        }
        if let Some(limit) = self.retry_limit {
            if limit == 0 {
                return Err(Error::InvalidRetryLimit(limit));
            }
        }
        Ok(())
    }
}
