//! Metrics module
//!
//! Prometheus counters for one storage node. Each node owns its own
//! `Registry` so several nodes can share a process.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::error::Result;

/// Outcome label values for `ecvault_reads_total`
pub const READ_OK: &str = "ok";
pub const READ_NOT_FOUND: &str = "not_found";
pub const READ_ERROR: &str = "error";

/// Counters and gauges exported at `GET /metrics`.
#[derive(Debug, Clone)]
pub struct NodeMetrics {
    registry: Registry,
    pub writes: IntCounter,
    pub reads: IntCounterVec,
    pub peer_send_failures: IntCounter,
    pub fetch_timeouts: IntCounter,
    pub reconstructions: IntCounter,
    pub connected_peers: IntGauge,
}

impl NodeMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let writes = IntCounter::new("ecvault_writes_total", "Records written through this node")?;
        let reads = IntCounterVec::new(
            Opts::new("ecvault_reads_total", "Record reads by outcome"),
            &["outcome"],
        )?;
        let peer_send_failures = IntCounter::new(
            "ecvault_peer_send_failures_total",
            "STORE or FETCH lines that could not be sent to a peer",
        )?;
        let fetch_timeouts = IntCounter::new(
            "ecvault_fetch_timeouts_total",
            "Peer fetches that got no reply in time",
        )?;
        let reconstructions = IntCounter::new(
            "ecvault_reconstructions_total",
            "Reads that had to rebuild absent shards",
        )?;
        let connected_peers =
            IntGauge::new("ecvault_connected_peers", "Peers with a live connection")?;

        registry.register(Box::new(writes.clone()))?;
        registry.register(Box::new(reads.clone()))?;
        registry.register(Box::new(peer_send_failures.clone()))?;
        registry.register(Box::new(fetch_timeouts.clone()))?;
        registry.register(Box::new(reconstructions.clone()))?;
        registry.register(Box::new(connected_peers.clone()))?;

        Ok(Self {
            registry,
            writes,
            reads,
            peer_send_failures,
            fetch_timeouts,
            reconstructions,
            connected_peers,
        })
    }

    pub fn record_read(&self, outcome: &str) {
        self.reads.with_label_values(&[outcome]).inc();
    }

    /// Text exposition of every metric in this node's registry
    pub fn render(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}
