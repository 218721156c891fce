//! NetCache Daemon - serves CIDR table lookups through a subnet-aware cache

mod handler;
mod protocol;
mod table;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::BytesMut;
use clap::Parser;
use netcache::{CacheConfig, NetCache, Promotion};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use crate::handler::{CommandHandler, TableCache};
use crate::protocol::{next_line, parse_command, Command, Reply};
use crate::table::TableResolver;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1:7379")]
    bind: String,

    /// CIDR table file (`<cidr> <label>` per line)
    #[arg(short, long)]
    table: Option<String>,

    /// Cache capacity (number of networks)
    #[arg(short, long, default_value_t = 10000)]
    capacity: usize,

    /// Seconds between cache stats log lines (0 disables)
    #[arg(long, default_value_t = 60)]
    stats_interval: u64,

    /// Skip recency updates when the cache is busy instead of waiting
    #[arg(long)]
    opportunistic: bool,

    /// Health check mode (for Docker)
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    // Health check
    if args.health {
        match TcpStream::connect(&args.bind).await {
            Ok(_) => {
                println!("OK");
                std::process::exit(0);
            }
            Err(_) => {
                eprintln!("FAILED");
                std::process::exit(1);
            }
        }
    }

    let Some(table_path) = args.table.as_deref() else {
        anyhow::bail!("--table is required unless --health is given");
    };

    info!("Starting NetCache Daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("Binding to {}", args.bind);
    info!("Table: {}", table_path);
    info!("Cache capacity: {}", args.capacity);

    let table = TableResolver::open(table_path)?;

    let config = CacheConfig {
        capacity: args.capacity,
        promotion: if args.opportunistic {
            Promotion::Opportunistic
        } else {
            Promotion::Blocking
        },
    };
    let cache = Arc::new(NetCache::with_config(table, config)?);
    info!(
        "Loaded {} table rows ({:?} promotion)",
        cache.resolver().len(),
        cache.config().promotion
    );

    if args.stats_interval > 0 {
        tokio::spawn(monitor_cache(
            Arc::clone(&cache),
            Duration::from_secs(args.stats_interval),
        ));
    }

    let listener = TcpListener::bind(&args.bind).await?;
    info!("Server listening on {}", args.bind);

    let handler = Arc::new(CommandHandler::new(cache));

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let handler = Arc::clone(&handler);

                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, handler).await {
                        error!("Error handling client {}: {}", addr, e);
                    }
                    info!("Connection closed: {}", addr);
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
            }
        }
    }
}

/// Log cache statistics every `every`
async fn monitor_cache(cache: Arc<TableCache>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await; // first tick completes immediately

    loop {
        ticker.tick().await;
        let stats = cache.stats().snapshot();
        info!(
            "Cache stats - Hit rate: {:.1}%, Hits: {}, Misses: {}, Evictions: {}",
            stats.hit_rate(),
            stats.hits,
            stats.misses,
            stats.evictions
        );
    }
}

async fn handle_client(mut stream: TcpStream, handler: Arc<CommandHandler>) -> Result<()> {
    let mut buffer = BytesMut::with_capacity(4096);

    loop {
        // Read data from client
        let n = stream.read_buf(&mut buffer).await?;

        if n == 0 {
            // Connection closed
            return Ok(());
        }

        // Handle every complete line
        loop {
            match next_line(&mut buffer) {
                Ok(Some(line)) => {
                    let (reply, quit) = match parse_command(&line) {
                        Ok(cmd) => {
                            let quit = cmd == Command::Quit;
                            (handler.handle(cmd), quit)
                        }
                        Err(e) => (Reply::Error(e), false),
                    };

                    stream.write_all(&reply.serialize()).await?;
                    if quit {
                        return Ok(());
                    }
                }
                Ok(None) => {
                    // Need more data
                    break;
                }
                Err(e) => {
                    warn!("Protocol error: {}", e);
                    stream.write_all(&Reply::Error(e).serialize()).await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};

    async fn spawn_server() -> std::net::SocketAddr {
        let table = TableResolver::parse("10.0.0.0/8 corp\n2001:db8::/32 docs\n").unwrap();
        let cache = Arc::new(NetCache::new(table, 8).unwrap());
        let handler = Arc::new(CommandHandler::new(cache));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let _ = handle_client(stream, handler).await;
                });
            }
        });

        addr
    }

    #[tokio::test]
    async fn test_session() {
        let addr = spawn_server().await;
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        write
            .write_all(b"PING\r\nLOOKUP 10.1.2.3\nlookup 10.9.9.9\nLOOKUP 2001:db8::5\n")
            .await
            .unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "+PONG");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "+corp");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "+corp");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "+docs");

        write.write_all(b"STATS\n").await.unwrap();
        let stats = lines.next_line().await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(stats.trim_start_matches('+')).unwrap();
        assert_eq!(json["hits"], 1);
        assert_eq!(json["misses"], 2);

        write.write_all(b"QUIT\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "+BYE");
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_errors_keep_connection_open() {
        let addr = spawn_server().await;
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        write.write_all(b"LOOKUP nope\nFLY\nPING\n").await.unwrap();
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "-ERR invalid address 'nope'"
        );
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "-ERR unknown command 'fly'"
        );
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "+PONG");
    }

    #[tokio::test]
    async fn test_pipelined_lines_after_bad_line() {
        let addr = spawn_server().await;
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        write.write_all(b"\xff\nPING\nLOOKUP 10.0.0.1\n").await.unwrap();
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "-ERR line is not valid UTF-8"
        );
        let reply = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .expect("no reply to pipelined PING");
        assert_eq!(reply.unwrap().unwrap(), "+PONG");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "+corp");
    }
}
