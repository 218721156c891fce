//! # netcache
//!
//! Subnet-aware LRU cache for address classification lookups.
//!
//! One cached answer serves every address inside the network it was resolved
//! for, so a geo-IP, ASN or policy lookup costs one miss per subnet instead of
//! one miss per address.
//!
//! ## Architecture
//! - **PrefixTrie**: binary trie, longest-prefix-match in O(address bits)
//! - **RecencyList**: index-linked LRU order over a fixed slot pool (O(1) promote)
//! - **NetCache**: ties both to a [`Resolver`] behind one reader-writer lock
//! - **CacheStats**: lock-free hit/miss/eviction counters
//!
//! ```
//! use std::net::IpAddr;
//! use netcache::{NetCache, Network};
//!
//! fn resolve(addr: IpAddr) -> (String, Option<Network>) {
//!     (format!("owner of {}", addr), Network::new(addr, 24).ok())
//! }
//!
//! let cache = NetCache::new(resolve, 100).unwrap();
//! cache.lookup("10.0.0.1".parse().unwrap()); // miss
//! cache.lookup("10.0.0.2".parse().unwrap()); // hit: same /24
//! assert_eq!(cache.stats().hits(), 1);
//! ```

#![warn(missing_docs)]

mod cache;
mod config;
mod error;
mod lru;
mod net;
mod resolver;
mod stats;
mod trie;

pub use cache::NetCache;
pub use config::{CacheConfig, Promotion, DEFAULT_CAPACITY};
pub use error::{Error, IndexError, NetworkError, Result};
pub use lru::{RecencyList, Slot, SlotId, SlotPool};
pub use net::{address_key, Network};
pub use resolver::Resolver;
pub use stats::{CacheStats, StatsSnapshot};
pub use trie::PrefixTrie;
