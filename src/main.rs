//! ecvault storage node
//!
//! Runs one member of the 7-node erasure-coded record store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        ecvault node                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  HTTP :8080  │───▶│ Coordinator  │───▶│  Peers :8089 │       │
//! │  │  PUT / GET   │    │  encode/lock │    │ STORE/FETCH  │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ecvault::config::{CodecKind, NodeConfig, DEFAULT_PEER_PORT};
use ecvault::StorageNode;

// =============================================================================
// CLI Arguments
// =============================================================================

/// ecvault - 4-of-7 erasure-coded record store node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Comma-separated ordered node list (exactly 7); position i stores shard i
    #[arg(long, env = "CLUSTER_NODES")]
    nodes: String,

    /// This node's entry from the node list
    #[arg(long, env = "CURRENT_NODE")]
    current_node: String,

    /// Peer protocol port for node entries without an explicit port
    #[arg(long, env = "PEER_PORT", default_value_t = DEFAULT_PEER_PORT)]
    peer_port: u16,

    /// HTTP server bind address
    #[arg(long, env = "HTTP_ADDR", default_value = "0.0.0.0:8080")]
    http_addr: SocketAddr,

    /// How long a read waits for each peer's shard, in milliseconds
    #[arg(long, env = "FETCH_TIMEOUT_MS", default_value = "500")]
    fetch_timeout_ms: u64,

    /// How long startup waits on each peer dial, in milliseconds
    #[arg(long, env = "CONNECT_TIMEOUT_MS", default_value = "2000")]
    connect_timeout_ms: u64,

    /// Only the first node accepts writes; others answer 307
    #[arg(long, env = "REDIRECT_WRITES")]
    redirect_writes: bool,

    /// Erasure codec: native or reed-solomon
    #[arg(long, env = "EC_CODEC", default_value = "native")]
    codec: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<NodeConfig> {
        let codec: CodecKind = self.codec.parse().context("invalid --codec")?;
        Ok(NodeConfig {
            nodes: self.nodes,
            current_node: self.current_node,
            peer_port: self.peer_port,
            http_addr: self.http_addr,
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            redirect_writes: self.redirect_writes,
            codec,
        })
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting ecvault node");
    info!("  Nodes: {}", args.nodes);
    info!("  Current node: {}", args.current_node);
    info!("  HTTP address: {}", args.http_addr);
    info!("  Fetch timeout: {}ms", args.fetch_timeout_ms);
    info!("  Redirect writes: {}", args.redirect_writes);

    let config = args.into_config()?;
    config
        .topology()
        .context("invalid cluster configuration")?;

    let node = StorageNode::start(config)
        .await
        .context("failed to start storage node")?;

    info!(
        "Node {} serving shard {} on http://{}",
        node.address(),
        node.topology().own_index(),
        node.http_addr()
    );

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for shutdown signal")?;
            info!("Received shutdown signal");
        }
        _ = node.stopped() => {}
    }

    node.shutdown();
    info!("ecvault node stopped");
    Ok(())
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "hyper_util=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
