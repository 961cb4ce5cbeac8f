//! KiteDB Server Daemon
//!
//! The `kited` binary is the KiteDB server process that:
//! - Builds the store and replication rings
//! - Starts the HTTP server for client connections
//! - Handles graceful shutdown on SIGTERM/SIGINT
//!
//! # Usage
//!
//! ```bash
//! # Start server with default settings
//! kited
//!
//! # Start on a custom port
//! kited --port 7171
//!
//! # Apply mutations without the replication rings
//! kited --standalone
//!
//! # Use a configuration file
//! kited --config /etc/kitedb/kited.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kite_ring::Ring;
use kite_server::config::ServerConfig;
use kite_server::dispatcher::Dispatcher;
use kite_server::http;
use kite_server::replicator::{CatchUpRequest, Replicator};
use kite_store::Store;

/// KiteDB Server Daemon
#[derive(Parser, Debug)]
#[command(
    name = "kited",
    version,
    about = "KiteDB key-value store server",
    long_about = "KiteDB is a replicated, sharded key-value store.\n\n\
                  This daemon starts the server and listens for client connections."
)]
struct Args {
    /// Host address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "KITE_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short = 'p', long, default_value_t = 7070, env = "KITE_PORT")]
    port: u16,

    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Data directory for a persistent storage engine
    #[arg(short = 'd', long, value_name = "DIR", env = "KITE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Apply mutations directly, bypassing the replication rings
    #[arg(long)]
    standalone: bool,

    /// Number of replication rings (shards)
    #[arg(long, default_value_t = 1, env = "KITE_RINGS")]
    rings: usize,

    /// Cap on concurrently live scan contexts
    #[arg(long, default_value_t = 1024, env = "KITE_MAX_CONTEXTS")]
    max_contexts: usize,

    /// Idle lifetime of a paused scan, in seconds
    #[arg(long, default_value_t = 60, env = "KITE_CONTEXT_TTL_SECS")]
    context_ttl_secs: u64,

    /// Peer base URLs to catch up from at startup
    #[arg(long, value_name = "URL", env = "KITE_PEER")]
    peer: Vec<String>,

    /// Enable verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", env = "KITE_LOG_LEVEL")]
    log_level: String,

    /// Print configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = load_config(&args)?;

    if args.print_config {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    run_server(config).await
}

fn init_logging(args: &Args) {
    let level = if args.verbose {
        "debug"
    } else {
        &args.log_level
    };

    let filter = EnvFilter::try_new(format!(
        "kite_server={level},kite_store={level},kite_ring={level},kite_engine={level}"
    ))
    .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn load_config(args: &Args) -> Result<ServerConfig> {
    let mut config = if let Some(path) = &args.config {
        ServerConfig::from_file(path).context("Failed to load config file")?
    } else {
        ServerConfig::default()
    };

    config.host = args.host.clone();
    config.port = args.port;

    if args.data_dir.is_some() {
        config.data_dir = args.data_dir.clone();
    }

    if args.standalone {
        config.standalone = true;
    }

    config.rings = args.rings;
    config.max_contexts = args.max_contexts;
    config.context_ttl_secs = args.context_ttl_secs;

    if !args.peer.is_empty() {
        config.peers = args.peer.clone();
    }

    Ok(config)
}

async fn run_server(config: ServerConfig) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    info!("KiteDB v{version} starting");

    if let Some(dir) = &config.data_dir {
        std::fs::create_dir_all(dir).context("Failed to create data directory")?;
        warn!(
            data_dir = %dir.display(),
            "persistent engine not available yet, running with the in-memory engine"
        );
    }

    let store = Arc::new(Store::new(config.store_options()));

    let dispatcher = if config.standalone {
        info!("Standalone mode: mutations bypass the replication rings");
        Arc::new(Dispatcher::standalone(Arc::clone(&store)))
    } else {
        let rings: Vec<Ring> = (0..config.rings.max(1))
            .map(|id| Ring::local(id, Arc::clone(&store), config.queue_depth))
            .collect();
        info!(rings = rings.len(), "Replication rings started");
        Arc::new(Dispatcher::replicated(Arc::clone(&store), rings))
    };

    // Sweeper for scan contexts whose clients went away.
    let sweep_interval = Duration::from_secs(config.sweep_interval_secs.max(1));
    {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                ticker.tick().await;
                store.sweep_contexts();
            }
        });
    }

    let replicator = Replicator::spawn(Arc::clone(&dispatcher), 64);
    for source in &config.peers {
        for table in &config.catch_up_tables {
            let queued = replicator.enqueue(CatchUpRequest {
                source: source.clone(),
                table: table.clone(),
            });
            if !queued {
                info!(%source, %table, "catch-up queue full, skipping");
            }
        }
    }

    let addr: SocketAddr = config
        .socket_addr()
        .parse()
        .context("Invalid server address")?;

    info!("Server configuration:");
    info!("  Listen address: {}", addr);
    info!("  Standalone: {}", config.standalone);
    info!("  Rings: {}", config.rings);
    info!("  Max contexts: {}", config.max_contexts);
    info!("  Context TTL: {}s", config.context_ttl_secs);
    info!("Press Ctrl+C to shutdown");

    http::serve(addr, dispatcher, shutdown_signal()).await?;

    info!("Server stopped. Goodbye!");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
