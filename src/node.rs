//! Storage node bootstrap.
//!
//! Wires the local store, lock table, peer transport, coordinator and HTTP
//! server of one cluster member together and owns their lifetime.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::{self, ApiState};
use crate::cluster::{NodeAddress, NodeTopology};
use crate::config::NodeConfig;
use crate::error::Result;
use crate::metrics::NodeMetrics;
use crate::replication::{ReplicationConfig, ReplicationCoordinator};
use crate::storage::{KeyLockTable, LocalShardStore};
use crate::transport::TcpPeerTransport;

/// A running cluster member.
#[derive(Debug)]
pub struct StorageNode {
    coordinator: Arc<ReplicationCoordinator>,
    transport: TcpPeerTransport,
    http_addr: SocketAddr,
    shutdown: CancellationToken,
    http_task: JoinHandle<()>,
}

impl StorageNode {
    /// Bind the peer listener on this node's configured port and the HTTP
    /// listener on `http_addr`, then start.
    pub async fn start(config: NodeConfig) -> Result<Self> {
        let topology = config.topology()?;
        let peer_bind = SocketAddr::from(([0, 0, 0, 0], topology.own_address().port()));
        let peer_listener = TcpListener::bind(peer_bind).await?;
        let http_listener = TcpListener::bind(config.http_addr).await?;
        Self::start_with_listeners(config, peer_listener, http_listener).await
    }

    /// Start on pre-bound listeners.
    ///
    /// The peer listener is accepting before any peer is dialed, so nodes
    /// started together can all reach each other.
    pub async fn start_with_listeners(
        config: NodeConfig,
        peer_listener: TcpListener,
        http_listener: TcpListener,
    ) -> Result<Self> {
        let topology = Arc::new(config.topology()?);
        let codec = config.codec.build()?;
        let metrics = NodeMetrics::new()?;
        let store = Arc::new(LocalShardStore::new());
        let locks = Arc::new(KeyLockTable::new());
        let shutdown = CancellationToken::new();

        info!(
            "Starting node {} (shard {}) with {:?} codec",
            topology.own_address(),
            topology.own_index(),
            config.codec
        );

        let transport = TcpPeerTransport::new(
            Arc::clone(&topology),
            Arc::clone(&store),
            Arc::clone(&locks),
            shutdown.child_token(),
        )
        .with_connect_timeout(config.connect_timeout);
        transport.listen(peer_listener);
        let connected = transport.connect_to_peers().await;
        metrics.connected_peers.set(connected as i64);

        let coordinator = Arc::new(ReplicationCoordinator::new(
            topology,
            codec,
            store,
            locks,
            Arc::new(transport.clone()),
            metrics,
            ReplicationConfig {
                fetch_timeout: config.fetch_timeout,
            },
        ));

        let http_addr = http_listener.local_addr()?;
        let state = Arc::new(ApiState {
            coordinator: Arc::clone(&coordinator),
            redirect_writes: config.redirect_writes,
            http_port: http_addr.port(),
        });
        let http_task = tokio::spawn(api::serve(http_listener, state, shutdown.child_token()));

        Ok(Self {
            coordinator,
            transport,
            http_addr,
            shutdown,
            http_task,
        })
    }

    pub fn coordinator(&self) -> &Arc<ReplicationCoordinator> {
        &self.coordinator
    }

    pub fn topology(&self) -> &NodeTopology {
        self.coordinator.topology()
    }

    pub fn address(&self) -> &NodeAddress {
        self.topology().own_address()
    }

    /// Bound HTTP address
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// Resolves once [`shutdown`](Self::shutdown) has been called.
    pub async fn stopped(&self) {
        self.shutdown.cancelled().await
    }

    /// Stop every task and close every peer link. Peers see EOF and drop
    /// their side.
    pub fn shutdown(&self) {
        info!("Shutting down node {}", self.address());
        self.shutdown.cancel();
        self.transport.shutdown();
        self.http_task.abort();
    }
}

impl Drop for StorageNode {
    fn drop(&mut self) {
        if !self.shutdown.is_cancelled() {
            self.shutdown.cancel();
            self.transport.shutdown();
            self.http_task.abort();
        }
    }
}
