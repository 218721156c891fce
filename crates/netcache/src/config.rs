//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of cached networks
pub const DEFAULT_CAPACITY: usize = 1024;

/// How a fast-path hit moves its slot to the head of the recency list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Promotion {
    /// Wait for exclusive access after the read and always promote
    #[default]
    Blocking,
    /// Promote only if exclusive access is immediately available
    Opportunistic,
}

/// Cache configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Number of networks (not addresses) the cache holds
    pub capacity: usize,
    /// Recency update policy on the read path
    #[serde(default)]
    pub promotion: Promotion,
}

impl CacheConfig {
    /// Configuration with the given capacity and default promotion
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Reject unusable configurations
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::Config("cache capacity must be at least 1".to_string()));
        }
        if self.capacity > u32::MAX as usize {
            return Err(Error::Config(format!(
                "cache capacity {} exceeds maximum of {}",
                self.capacity,
                u32::MAX
            )));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            promotion: Promotion::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.promotion, Promotion::Blocking);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = CacheConfig::with_capacity(0).validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_oversized_capacity_rejected() {
        let config = CacheConfig::with_capacity(u32::MAX as usize + 1);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
