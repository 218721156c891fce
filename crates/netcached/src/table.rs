//! CIDR table resolver
//!
//! Table format, one network per line:
//! ```text
//! # comment
//! 10.0.0.0/8      corp
//! 10.20.0.0/16    corp-lab
//! 2001:db8::/32   docs
//! ```
//! Blank lines and `#` comments are skipped. A later row for the same
//! network replaces the earlier one.
//!
//! Rows may nest, so the network handed to the cache is not the matched row
//! itself but the widest block around the address that holds no more
//! specific row. Caching `10.0.0.0/8` whole would otherwise shadow a
//! `10.20.0.0/16` row that had not been looked up yet.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use ahash::RandomState;
use anyhow::{anyhow, bail, Context, Result};
use memmap2::Mmap;
use netcache::{address_key, Network, Resolver};
use nom::{
    bytes::complete::is_not,
    character::complete::{not_line_ending, space1},
    combinator::{all_consuming, map},
    sequence::separated_pair,
    IResult,
};

/// Label returned for addresses no row covers
pub const UNKNOWN_LABEL: &str = "unknown";

/// Key bits ahead of an IPv4 address in the normalized key
const V4_MAPPED_LEN: u8 = 96;

/// One prefix length worth of rows, keyed by canonical network key
type Level = HashMap<u128, (Network, Arc<str>), RandomState>;

/// Longest-prefix-match over a static table, the slow source behind the cache
pub struct TableResolver {
    /// Sorted by prefix length, longest first
    levels: Vec<(u8, Level)>,
    /// `(len, key)` blocks with at least one longer row inside
    covered: HashSet<(u8, u128), RandomState>,
    len: usize,
    unknown: Arc<str>,
}

/// Parse `<cidr> <label>` (already trimmed, not a comment)
fn parse_row(input: &str) -> IResult<&str, (&str, &str)> {
    all_consuming(separated_pair(
        is_not(" \t"),
        space1,
        map(not_line_ending, str::trim_end),
    ))(input)
}

fn key_mask(len: u8) -> u128 {
    if len == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(len))
    }
}

impl TableResolver {
    /// Memory-map and parse a table file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening table {}", path.display()))?;

        // Mapping a zero-length file fails on some platforms
        if file.metadata()?.len() == 0 {
            return Ok(Self::from_rows(Vec::<(Network, String)>::new()));
        }

        // SAFETY: the map is read once during startup and dropped before return
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("mapping table {}", path.display()))?;
        let text = std::str::from_utf8(&mmap)
            .with_context(|| format!("table {} is not valid UTF-8", path.display()))?;

        Self::parse(text).with_context(|| format!("parsing table {}", path.display()))
    }

    /// Parse table text
    pub fn parse(text: &str) -> Result<Self> {
        let mut rows = Vec::new();

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (_, (cidr, label)) = parse_row(line)
                .map_err(|_| anyhow!("line {}: expected '<cidr> <label>'", lineno + 1))?;
            let network: Network = cidr
                .parse()
                .with_context(|| format!("line {}", lineno + 1))?;
            if label.is_empty() {
                bail!("line {}: empty label", lineno + 1);
            }

            rows.push((network, label.to_string()));
        }

        Ok(Self::from_rows(rows))
    }

    /// Build from `(network, label)` rows
    pub fn from_rows<I, S>(rows: I) -> Self
    where
        I: IntoIterator<Item = (Network, S)>,
        S: Into<Arc<str>>,
    {
        let mut by_len: HashMap<u8, Level, RandomState> = HashMap::default();
        for (network, label) in rows {
            by_len
                .entry(network.key_len())
                .or_default()
                .insert(network.key(), (network, label.into()));
        }

        let mut covered: HashSet<(u8, u128), RandomState> = HashSet::default();
        for level in by_len.values() {
            for (network, _) in level.values() {
                for len in 0..network.key_len() {
                    covered.insert((len, network.key() & key_mask(len)));
                }
            }
        }

        let len = by_len.values().map(HashMap::len).sum();
        let mut levels: Vec<(u8, Level)> = by_len.into_iter().collect();
        levels.sort_unstable_by(|a, b| b.0.cmp(&a.0));

        Self {
            levels,
            covered,
            len,
            unknown: Arc::from(UNKNOWN_LABEL),
        }
    }

    /// Most specific row covering `addr`
    pub fn find(&self, addr: IpAddr) -> Option<(Network, Arc<str>)> {
        let key = address_key(addr);
        self.levels.iter().find_map(|(len, level)| {
            level
                .get(&(key & key_mask(*len)))
                .map(|(network, label)| (*network, Arc::clone(label)))
        })
    }

    /// Widest block around `addr` that starts at `start` bits and holds no longer row
    fn uniform_block(&self, addr: IpAddr, start: u8) -> Option<Network> {
        let key = address_key(addr);
        let floor = if addr.is_ipv4() { V4_MAPPED_LEN } else { 0 };

        let mut len = start.max(floor);
        while len < 128 && self.covered.contains(&(len, key & key_mask(len))) {
            len += 1;
        }

        Network::new(addr, len - floor).ok()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.len
    }

    /// Is the table empty?
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Resolver<Arc<str>> for TableResolver {
    fn resolve(&self, addr: IpAddr) -> (Arc<str>, Option<Network>) {
        let (start, label) = match self.find(addr) {
            Some((network, label)) => (network.key_len(), label),
            None => (0, Arc::clone(&self.unknown)),
        };
        (label, self.uniform_block(addr, start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TABLE: &str = "\
# test table
10.0.0.0/8       corp
10.20.0.0/16     corp lab
10.20.30.0/24    lab-rack-3

2001:db8::/32    docs
";

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_row() {
        let (_, (cidr, label)) = parse_row("10.0.0.0/8\tcorp  ").unwrap();
        assert_eq!(cidr, "10.0.0.0/8");
        assert_eq!(label, "corp");

        assert!(parse_row("10.0.0.0/8").is_err());
    }

    #[test]
    fn test_longest_row_wins() {
        let table = TableResolver::parse(TABLE).unwrap();
        assert_eq!(table.len(), 4);

        let (network, label) = table.find(ip("10.20.30.40")).unwrap();
        assert_eq!(network.to_string(), "10.20.30.0/24");
        assert_eq!(&*label, "lab-rack-3");

        let (_, label) = table.find(ip("10.20.1.1")).unwrap();
        assert_eq!(&*label, "corp lab");

        let (_, label) = table.find(ip("10.1.1.1")).unwrap();
        assert_eq!(&*label, "corp");

        let (_, label) = table.find(ip("2001:db8::1")).unwrap();
        assert_eq!(&*label, "docs");
    }

    #[test]
    fn test_resolve_excludes_nested_rows() {
        let table = TableResolver::parse(TABLE).unwrap();

        let (label, network) = table.resolve(ip("10.1.1.1"));
        assert_eq!(&*label, "corp");
        assert_eq!(network.unwrap().to_string(), "10.0.0.0/12");

        let (label, network) = table.resolve(ip("10.20.1.1"));
        assert_eq!(&*label, "corp lab");
        assert_eq!(network.unwrap().to_string(), "10.20.0.0/20");

        // No nested rows: the row itself is the block
        let (label, network) = table.resolve(ip("10.20.30.99"));
        assert_eq!(&*label, "lab-rack-3");
        assert_eq!(network.unwrap().to_string(), "10.20.30.0/24");
    }

    #[test]
    fn test_unmatched_gets_empty_block() {
        let table = TableResolver::parse(TABLE).unwrap();

        let (label, network) = table.resolve(ip("192.168.1.1"));
        assert_eq!(&*label, UNKNOWN_LABEL);
        let network = network.unwrap();
        assert_eq!(network.to_string(), "128.0.0.0/1");
        assert!(table.find(network.addr()).is_none());

        let (label, network) = table.resolve(ip("2001:db9::1"));
        assert_eq!(&*label, UNKNOWN_LABEL);
        assert!(network.unwrap().contains(ip("2001:db9::1")));
    }

    #[test]
    fn test_v6_default_row_covers_v4() {
        let table = TableResolver::parse("::/0 anywhere\n").unwrap();
        let (label, network) = table.resolve(ip("192.0.2.1"));
        assert_eq!(&*label, "anywhere");
        assert_eq!(network.unwrap().to_string(), "0.0.0.0/0");
    }

    #[test]
    fn test_duplicate_row_replaces() {
        let table = TableResolver::parse("10.0.0.0/8 a\n10.0.0.0/8 b\n").unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(&*table.find(ip("10.1.1.1")).unwrap().1, "b");
    }

    #[test]
    fn test_parse_errors() {
        let err = TableResolver::parse("10.0.0.0/8 ok\nnot-a-cidr x\n").err().unwrap();
        assert!(err.to_string().contains("line 2"));

        assert!(TableResolver::parse("10.0.0.0/8\n").is_err());
        assert!(TableResolver::parse("10.0.0.0/40 x\n").is_err());
    }

    #[test]
    fn test_open_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(TABLE.as_bytes()).unwrap();
        file.flush().unwrap();

        let table = TableResolver::open(file.path()).unwrap();
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_open_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let table = TableResolver::open(file.path()).unwrap();
        assert!(table.is_empty());
        assert!(table.find(ip("10.0.0.1")).is_none());
    }
}
