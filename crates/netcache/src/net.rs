//! Address and network model
//!
//! Every address is normalized to a 128-bit key before it touches the index:
//! IPv6 addresses are used as-is, IPv4 addresses become IPv4-mapped IPv6
//! addresses (`::ffff:a.b.c.d`). An IPv4 `/n` therefore occupies `96 + n`
//! bits of the key space.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::error::NetworkError;

/// Width of the normalized key in bits
pub const KEY_BITS: u8 = 128;

/// Number of leading key bits occupied by the IPv4-mapped prefix
const V4_MAPPED_BITS: u8 = 96;

/// Normalize an address into its 128-bit key
#[inline]
pub fn address_key(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => v4.to_ipv6_mapped().into(),
        IpAddr::V6(v6) => v6.into(),
    }
}

/// Mask keeping the leading `len` bits of a key
#[inline]
pub(crate) fn prefix_mask(len: u8) -> u128 {
    match len {
        0 => 0,
        n if n >= KEY_BITS => u128::MAX,
        n => u128::MAX << (KEY_BITS - n),
    }
}

/// Bit `depth` of a key, counted from the most significant bit
#[inline]
pub(crate) fn key_bit(key: u128, depth: u8) -> usize {
    ((key >> (KEY_BITS - 1 - depth)) & 1) as usize
}

/// A canonical IP network: base address with host bits zeroed plus prefix length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Network {
    addr: IpAddr,
    prefix_len: u8,
}

impl Network {
    /// Create a network, zeroing any host bits of `addr`
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self, NetworkError> {
        let max = max_prefix_len(addr);
        if prefix_len > max {
            return Err(NetworkError::PrefixTooLong { prefix_len, max });
        }

        // IPv4-mapped networks take their IPv4 form
        if let IpAddr::V6(v6) = addr {
            match v6.to_ipv4_mapped() {
                Some(v4) if prefix_len >= V4_MAPPED_BITS => {
                    return Self::new(IpAddr::V4(v4), prefix_len - V4_MAPPED_BITS);
                }
                _ => {}
            }
        }

        let addr = match addr {
            IpAddr::V4(v4) => {
                let mask = if prefix_len == 0 { 0 } else { u32::MAX << (32 - prefix_len) };
                IpAddr::V4(Ipv4Addr::from(u32::from(v4) & mask))
            }
            IpAddr::V6(v6) => IpAddr::V6(Ipv6Addr::from(u128::from(v6) & prefix_mask(prefix_len))),
        };

        Ok(Self { addr, prefix_len })
    }

    /// Network covering exactly one address
    pub fn host(addr: IpAddr) -> Self {
        let addr = match addr {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(addr, IpAddr::V4),
            v4 => v4,
        };
        Self {
            addr,
            prefix_len: max_prefix_len(addr),
        }
    }

    /// Canonical base address
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Prefix length in the address family's own width
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Normalized 128-bit key of the base address
    pub fn key(&self) -> u128 {
        address_key(self.addr)
    }

    /// Prefix length within the normalized key space
    pub fn key_len(&self) -> u8 {
        match self.addr {
            IpAddr::V4(_) => V4_MAPPED_BITS + self.prefix_len,
            IpAddr::V6(_) => self.prefix_len,
        }
    }

    /// Does this network contain `addr`?
    pub fn contains(&self, addr: IpAddr) -> bool {
        address_key(addr) & prefix_mask(self.key_len()) == self.key()
    }
}

fn max_prefix_len(addr: IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl FromStr for Network {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            Some((addr, len)) => {
                let addr: IpAddr = addr
                    .parse()
                    .map_err(|_| NetworkError::Parse(s.to_string()))?;
                let len: u8 = len
                    .parse()
                    .map_err(|_| NetworkError::Parse(s.to_string()))?;
                Network::new(addr, len)
            }
            None => s
                .parse()
                .map(Network::host)
                .map_err(|_| NetworkError::Parse(s.to_string())),
        }
    }
}
