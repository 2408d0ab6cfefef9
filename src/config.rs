//! Node configuration consumed by [`StorageNode`](crate::node::StorageNode).

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::ReedSolomonCodecAdapter;
use crate::cluster::NodeTopology;
use crate::ec::{ShardCodec, DATA_SHARDS, PARITY_SHARDS};
use crate::error::{Error, Result};
use crate::transport::DEFAULT_CONNECT_TIMEOUT;

/// Default port of the peer protocol
pub const DEFAULT_PEER_PORT: u16 = 8089;

/// Which erasure codec backs the shard codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecKind {
    /// In-crate GF(2^8) implementation
    #[default]
    Native,
    /// reed-solomon-erasure crate
    ReedSolomon,
}

impl CodecKind {
    pub fn build(self) -> Result<ShardCodec> {
        match self {
            CodecKind::Native => ShardCodec::native(),
            CodecKind::ReedSolomon => ShardCodec::new(Arc::new(ReedSolomonCodecAdapter::new(
                DATA_SHARDS,
                PARITY_SHARDS,
            )?)),
        }
    }
}

impl FromStr for CodecKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(CodecKind::Native),
            "reed-solomon" | "reed_solomon" | "rs" => Ok(CodecKind::ReedSolomon),
            other => Err(Error::Config(format!(
                "unknown codec {:?}, expected native or reed-solomon",
                other
            ))),
        }
    }
}

/// Storage node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Comma-separated ordered node list; position i owns shard i
    pub nodes: String,

    /// This node's entry from `nodes`
    pub current_node: String,

    /// Port used for entries without an explicit one
    pub peer_port: u16,

    /// HTTP bind address
    pub http_addr: SocketAddr,

    /// How long a read waits for each peer
    pub fetch_timeout: Duration,

    /// How long startup waits on each peer dial
    pub connect_timeout: Duration,

    /// Only the first node accepts writes; others redirect
    pub redirect_writes: bool,

    pub codec: CodecKind,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            nodes: String::new(),
            current_node: String::new(),
            peer_port: DEFAULT_PEER_PORT,
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            fetch_timeout: Duration::from_millis(500),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            redirect_writes: false,
            codec: CodecKind::Native,
        }
    }
}

impl NodeConfig {
    /// Resolve the node list into a validated topology
    pub fn topology(&self) -> Result<NodeTopology> {
        NodeTopology::from_entries(&self.nodes, &self.current_node, self.peer_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.peer_port, 8089);
        assert_eq!(config.http_addr.port(), 8080);
        assert_eq!(config.fetch_timeout, Duration::from_millis(500));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert!(!config.redirect_writes);
        assert_eq!(config.codec, CodecKind::Native);
    }

    #[test]
    fn test_codec_kind_parse() {
        assert_eq!("native".parse::<CodecKind>().unwrap(), CodecKind::Native);
        assert_eq!(
            "Reed-Solomon".parse::<CodecKind>().unwrap(),
            CodecKind::ReedSolomon
        );
        assert_matches!("lrc".parse::<CodecKind>(), Err(Error::Config(_)));
    }

    #[test]
    fn test_both_codecs_build() {
        assert!(CodecKind::Native.build().is_ok());
        assert!(CodecKind::ReedSolomon.build().is_ok());
    }

    #[test]
    fn test_topology_from_config() {
        let config = NodeConfig {
            nodes: "a,b,c,d,e,f,g".into(),
            current_node: "e".into(),
            ..Default::default()
        };
        let topology = config.topology().unwrap();
        assert_eq!(topology.own_index(), 4);
        assert_eq!(topology.own_address().as_str(), "e:8089");

        let empty = NodeConfig::default();
        assert_matches!(empty.topology(), Err(Error::Config(_)));
    }
}
