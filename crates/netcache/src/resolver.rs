//! The value source consulted on a cache miss

use std::net::IpAddr;

use crate::net::Network;

/// Maps an address to a value and the network that value is valid for
///
/// Called while the cache holds its exclusive lock, so a slow resolver
/// serializes every other miss behind it. Returning `None` for the network
/// marks the value as uncacheable; it is still handed to the caller.
pub trait Resolver<V>: Send + Sync {
    /// Resolve `addr`
    fn resolve(&self, addr: IpAddr) -> (V, Option<Network>);
}

impl<V, F> Resolver<V> for F
where
    F: Fn(IpAddr) -> (V, Option<Network>) + Send + Sync,
{
    fn resolve(&self, addr: IpAddr) -> (V, Option<Network>) {
        self(addr)
    }
}
