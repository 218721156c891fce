//! Error types for netcache

use std::net::IpAddr;

use thiserror::Error;

use crate::net::Network;

/// Result type alias for netcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the cache engine
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid engine configuration (e.g. zero capacity)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Prefix index bookkeeping failed
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    /// Resolver did not report an owning network, so the result was not cached
    #[error("Uncacheable result for {0}: resolver reported no network")]
    Uncacheable(IpAddr),
}

/// Prefix index failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// The exact network is already registered
    #[error("network {0} is already registered")]
    Conflict(Network),

    /// The exact network is not registered
    #[error("network {0} is not registered")]
    NotFound(Network),
}

/// Network construction and parsing failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// Prefix length exceeds the address width
    #[error("prefix length {prefix_len} exceeds maximum of {max}")]
    PrefixTooLong {
        /// Requested prefix length
        prefix_len: u8,
        /// Address width in bits
        max: u8,
    },

    /// CIDR text could not be parsed
    #[error("invalid network '{0}'")]
    Parse(String),
}
