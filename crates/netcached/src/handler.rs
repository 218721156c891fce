//! Command handler for the lookup server

use std::sync::Arc;

use netcache::{NetCache, Promotion, StatsSnapshot};
use serde::Serialize;

use crate::protocol::{Command, Reply};
use crate::table::TableResolver;

/// The daemon's cache: table labels keyed by network
pub type TableCache = NetCache<Arc<str>, TableResolver>;

/// Body of the `STATS` reply
#[derive(Debug, Serialize)]
struct StatsReply {
    #[serde(flatten)]
    counters: StatsSnapshot,
    hit_rate: f64,
    cached_networks: usize,
    capacity: usize,
    promotion: Promotion,
}

pub struct CommandHandler {
    cache: Arc<TableCache>,
}

impl CommandHandler {
    pub fn new(cache: Arc<TableCache>) -> Self {
        Self { cache }
    }

    pub fn handle(&self, cmd: Command) -> Reply {
        match cmd {
            Command::Ping => Reply::Ok("PONG".to_string()),
            Command::Lookup(addr) => Reply::Ok(self.cache.lookup(addr).to_string()),
            Command::UncachedLookup(addr) => Reply::Ok(self.cache.lookup_uncached(addr).to_string()),
            Command::Stats => self.handle_stats(),
            Command::Quit => Reply::Ok("BYE".to_string()),
        }
    }

    fn handle_stats(&self) -> Reply {
        let counters = self.cache.stats().snapshot();
        let body = StatsReply {
            counters,
            hit_rate: counters.hit_rate(),
            cached_networks: self.cache.len(),
            capacity: self.cache.capacity(),
            promotion: self.cache.config().promotion,
        };

        match serde_json::to_string(&body) {
            Ok(json) => Reply::Ok(json),
            Err(e) => Reply::Error(format!("could not encode stats: {}", e)),
        }
    }
}
