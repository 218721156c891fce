//! NetCache: LRU cache keyed by the network an address belongs to

use std::net::IpAddr;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::{CacheConfig, Promotion};
use crate::error::{Error, IndexError, Result};
use crate::lru::{RecencyList, SlotId, SlotPool};
use crate::net::Network;
use crate::resolver::Resolver;
use crate::stats::CacheStats;
use crate::trie::PrefixTrie;

/// Index, recency order and slot contents; only ever observed together
struct Inner<V> {
    index: PrefixTrie<SlotId>,
    recency: RecencyList,
    slots: SlotPool<V>,
}

impl<V: Clone> Inner<V> {
    fn new(capacity: u32) -> Self {
        Self {
            index: PrefixTrie::new(),
            recency: RecencyList::new(capacity),
            slots: SlotPool::new(capacity),
        }
    }

    /// Slot, its generation and a copy of its value for the most specific match
    fn find(&self, addr: IpAddr) -> Option<(SlotId, u64, V)> {
        let (_, id) = self.index.longest_match(addr)?;
        let slot = self.slots.get(id);
        slot.value().map(|value| (id, slot.generation(), value.clone()))
    }

    /// Promote `id` unless it was rebound since `generation` was read
    fn promote_if_current(&mut self, id: SlotId, generation: u64) {
        if self.slots.get(id).generation() == generation {
            self.recency.promote(id);
        }
    }
}

/// Subnet-aware LRU cache in front of a [`Resolver`]
///
/// A miss asks the resolver for the value and the network it covers; every
/// later lookup inside that network is a hit until the entry is evicted.
///
/// Concurrent lookups share a read lock on the hit path. Misses take the
/// write lock and call the resolver while holding it.
pub struct NetCache<V, R> {
    /// Prefix index + recency list + slots
    inner: RwLock<Inner<V>>,

    /// Value source for misses
    resolver: R,

    /// Cache statistics
    stats: CacheStats,

    /// Capacity and promotion policy
    config: CacheConfig,
}

impl<V, R> NetCache<V, R>
where
    V: Clone,
    R: Resolver<V>,
{
    /// Create a cache holding at most `capacity` networks
    ///
    /// # Arguments
    /// * `resolver` - Value source consulted on misses
    /// * `capacity` - Number of networks to cache, at least 1
    ///
    /// # Returns
    /// * `Result<NetCache>` - Cache handle, or [`Error::Config`] for a zero capacity
    pub fn new(resolver: R, capacity: usize) -> Result<Self> {
        Self::with_config(resolver, CacheConfig::with_capacity(capacity))
    }

    /// Create a cache from a full configuration
    pub fn with_config(resolver: R, config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let capacity = config.capacity as u32;

        Ok(Self {
            inner: RwLock::new(Inner::new(capacity)),
            resolver,
            stats: CacheStats::new(),
            config,
        })
    }

    /// Look up `addr`, consulting the resolver on a miss
    ///
    /// Never fails: bookkeeping problems are logged and the resolver's value is
    /// returned uncached.
    pub fn lookup(&self, addr: IpAddr) -> V {
        // Fast path: shared access, copy the value out before releasing
        let hit = self.inner.read().find(addr);
        if let Some((id, generation, value)) = hit {
            self.stats.record_hit();
            self.promote(id, generation);
            return value;
        }

        // Slow path
        let mut inner = self.inner.write();

        // Another writer may have cached this network since the read lock dropped
        if let Some((id, _, value)) = inner.find(addr) {
            self.stats.record_hit();
            inner.recency.promote(id);
            return value;
        }

        self.stats.record_miss();
        let (value, network) = self.resolver.resolve(addr);

        let outcome = match network {
            Some(network) => self.insert_locked(&mut inner, value.clone(), network),
            None => Err(Error::Uncacheable(addr)),
        };
        match outcome {
            Ok(()) => {}
            Err(e @ Error::Uncacheable(_)) => debug!(error = %e, "Result not cached"),
            Err(e) => warn!(%addr, error = %e, "Failed to cache entry"),
        }

        value
    }

    /// Resolve `addr` without touching the cache or its statistics
    pub fn lookup_uncached(&self, addr: IpAddr) -> V {
        self.resolver.resolve(addr).0
    }

    /// Cached value for `addr`, if any, without promotion or statistics
    pub fn peek(&self, addr: IpAddr) -> Option<V> {
        self.inner.read().find(addr).map(|(_, _, value)| value)
    }

    /// Cache `value` for `network`, reusing the least recently used slot
    ///
    /// Fails with [`IndexError::Conflict`] if `network` is already cached in a
    /// slot other than the eviction candidate.
    pub fn insert(&self, value: V, network: Network) -> Result<()> {
        let mut inner = self.inner.write();
        self.insert_locked(&mut inner, value, network)
    }

    fn insert_locked(&self, inner: &mut Inner<V>, value: V, network: Network) -> Result<()> {
        let victim = inner.recency.tail();

        if let Some(owner) = inner.index.get(&network) {
            if owner != victim {
                return Err(IndexError::Conflict(network).into());
            }
        }

        if let Some(old) = inner.slots.get(victim).network() {
            self.stats.record_eviction();
            match inner.index.remove(&old) {
                Ok(_) => debug!(network = %old, slot = victim.index(), "Evicted"),
                Err(e) => {
                    // Drop anything else still aimed at the slot before it is reused
                    let purged = inner.index.purge(victim);
                    warn!(
                        error = %e,
                        slot = victim.index(),
                        purged = purged.len(),
                        "Eviction found index out of sync"
                    );
                }
            }
        }

        inner.slots.bind(victim, value, network);
        inner.index.insert(network, victim)?;
        inner.recency.promote(victim);

        Ok(())
    }

    fn promote(&self, id: SlotId, generation: u64) {
        match self.config.promotion {
            Promotion::Blocking => self.inner.write().promote_if_current(id, generation),
            Promotion::Opportunistic => {
                if let Some(mut inner) = self.inner.try_write() {
                    inner.promote_if_current(id, generation);
                }
            }
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Hit rate as a percentage, 0.0 before the first lookup
    pub fn hit_rate(&self) -> f64 {
        self.stats.hit_rate()
    }

    /// Get cache capacity
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Number of cached networks
    pub fn len(&self) -> usize {
        self.inner.read().slots.bound()
    }

    /// Has nothing been cached yet?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Active configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The wrapped resolver
    pub fn resolver(&self) -> &R {
        &self.resolver
    }
}
