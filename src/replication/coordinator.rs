//! Replication Coordinator
//!
//! Drives the distributed write and read paths over the 4-of-7 shard
//! layout.
//!
//! # Write Path
//!
//! ```text
//! lock(key) ─▶ encode ─▶ put own shard ─▶ STORE x6 (concurrent) ─▶ unlock
//! ```
//!
//! # Read Path
//!
//! ```text
//! own shard? ──no──▶ not found
//!     │
//!    yes ─▶ FETCH x6 (concurrent, bounded wait) ─▶ decode (rebuild absent)
//! ```
//!
//! Reads never take the key lock. A read racing a write can see shards of
//! two different versions; nothing detects this and the decode may fail or
//! return a wrong record.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use tracing::{debug, error, info, instrument, warn};

use crate::cluster::{NodeAddress, NodeTopology};
use crate::domain::ports::ShardTransport;
use crate::domain::record::Record;
use crate::ec::{ShardCodec, TOTAL_SHARDS};
use crate::error::{Error, Result};
use crate::metrics::{NodeMetrics, READ_ERROR, READ_NOT_FOUND, READ_OK};
use crate::storage::{KeyLockTable, LocalShardStore};

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// How long a read waits for each peer's fetch reply
    pub fetch_timeout: Duration,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_millis(500),
        }
    }
}

/// Outcome of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    /// This node's counter for the key after the write
    pub modification_count: u64,
    /// Peers the STORE line was handed to
    pub replicated: Vec<NodeAddress>,
    /// Peers skipped or failed
    pub failed: Vec<NodeAddress>,
}

/// Reject keys the colon-delimited wire protocol cannot carry.
pub fn validate_key(key: &str) -> Result<()> {
    let reason = if key.is_empty() {
        "key is empty"
    } else if key.contains(':') {
        "key contains ':'"
    } else if key.contains(['\r', '\n']) {
        "key contains a line break"
    } else {
        return Ok(());
    };
    Err(Error::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    })
}

/// Orchestrates writes and reads across the cluster.
pub struct ReplicationCoordinator {
    topology: Arc<NodeTopology>,
    codec: ShardCodec,
    store: Arc<LocalShardStore>,
    locks: Arc<KeyLockTable>,
    transport: Arc<dyn ShardTransport>,
    metrics: NodeMetrics,
    config: ReplicationConfig,
}

impl std::fmt::Debug for ReplicationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationCoordinator")
            .field("node", self.topology.own_address())
            .field("shard_index", &self.topology.own_index())
            .field("config", &self.config)
            .finish()
    }
}

impl ReplicationCoordinator {
    /// `store` and `locks` must be the same instances the transport applies
    /// inbound STOREs to.
    pub fn new(
        topology: Arc<NodeTopology>,
        codec: ShardCodec,
        store: Arc<LocalShardStore>,
        locks: Arc<KeyLockTable>,
        transport: Arc<dyn ShardTransport>,
        metrics: NodeMetrics,
        config: ReplicationConfig,
    ) -> Self {
        Self {
            topology,
            codec,
            store,
            locks,
            transport,
            metrics,
            config,
        }
    }

    pub fn topology(&self) -> &NodeTopology {
        &self.topology
    }

    pub fn metrics(&self) -> &NodeMetrics {
        &self.metrics
    }

    /// Encode `record`, keep this node's shard and push the other six to
    /// their owners.
    ///
    /// Peer failures are logged and reported in the [`WriteReport`]; they
    /// never fail the write. The key lock is held until every STORE has
    /// been attempted.
    #[instrument(skip(self, record), fields(node = %self.topology.own_address()))]
    pub async fn write(&self, key: &str, record: &Record) -> Result<WriteReport> {
        validate_key(key)?;

        let _guard = self.locks.lock(key).await;

        let shards = self.codec.encode(record)?;
        let modification_count = self
            .store
            .put(key, shards[self.topology.own_index()].clone());

        let sends = self.topology.peers().map(|(index, peer)| {
            let shard = shards[index].clone();
            async move { (peer, self.transport.store(peer, key, shard).await) }
        });

        let mut report = WriteReport {
            modification_count,
            replicated: Vec::with_capacity(TOTAL_SHARDS - 1),
            failed: Vec::new(),
        };
        for (peer, result) in join_all(sends).await {
            match result {
                Ok(()) => report.replicated.push(peer.clone()),
                Err(e) => {
                    warn!("Failed to replicate shard of {} to {}: {}", key, peer, e);
                    self.metrics.peer_send_failures.inc();
                    report.failed.push(peer.clone());
                }
            }
        }

        self.metrics.writes.inc();
        self.refresh_peer_gauge();
        info!(
            "Wrote {} (count {}), replicated to {}/{} peers",
            key,
            modification_count,
            report.replicated.len(),
            TOTAL_SHARDS - 1
        );
        Ok(report)
    }

    /// Rebuild the record for `key` from this node's shard and whatever
    /// peers return in time.
    ///
    /// Returns `Ok(None)` when this node holds no shard for the key; a node
    /// never asks peers for its own shard.
    ///
    /// # Errors
    ///
    /// `InsufficientShards` when fewer than 4 shards could be gathered.
    #[instrument(skip(self), fields(node = %self.topology.own_address()))]
    pub async fn read(&self, key: &str) -> Result<Option<Record>> {
        validate_key(key)?;

        let Some(own_shard) = self.store.get(key) else {
            debug!("No local shard for {}", key);
            self.metrics.record_read(READ_NOT_FOUND);
            return Ok(None);
        };

        let mut slots: Vec<Option<Bytes>> = vec![None; TOTAL_SHARDS];
        slots[self.topology.own_index()] = Some(own_shard);

        let timeout = self.config.fetch_timeout;
        let fetches = self.topology.peers().map(|(index, peer)| async move {
            (index, peer, self.transport.fetch(peer, key, timeout).await)
        });

        for (index, peer, result) in join_all(fetches).await {
            match result {
                Ok(Some(shard)) => slots[index] = Some(shard),
                Ok(None) => debug!("Peer {} holds no shard for {}", peer, key),
                Err(e) => {
                    match &e {
                        Error::FetchTimeout { .. } => self.metrics.fetch_timeouts.inc(),
                        _ => self.metrics.peer_send_failures.inc(),
                    }
                    warn!("Fetch of {} from {} failed: {}", key, peer, e);
                    self.transport.disconnect(peer);
                }
            }
        }
        self.refresh_peer_gauge();

        let present = slots.iter().filter(|s| s.is_some()).count();
        match self.codec.decode(&slots) {
            Ok(record) => {
                if present < TOTAL_SHARDS {
                    self.metrics.reconstructions.inc();
                }
                self.metrics.record_read(READ_OK);
                debug!("Read {} from {} shards", key, present);
                Ok(Some(record))
            }
            Err(e) => {
                self.metrics.record_read(READ_ERROR);
                match &e {
                    Error::SingularMatrix { .. } | Error::Reconstruction(_) => {
                        error!("Reconstruction of {} failed: {}", key, e)
                    }
                    _ if e.is_insufficient_shards() => {
                        warn!("Read of {} failed, too few peers answered: {}", key, e)
                    }
                    _ => warn!("Read of {} failed: {}", key, e),
                }
                Err(e)
            }
        }
    }

    /// This node's write counter for `key`
    pub fn local_modification_count(&self, key: &str) -> u64 {
        self.store.modification_count(key)
    }

    /// Number of keys this node holds a shard for
    pub fn local_entry_count(&self) -> usize {
        self.store.count()
    }

    fn refresh_peer_gauge(&self) {
        self.metrics
            .connected_peers
            .set(self.transport.connected_peers() as i64);
    }
}
