//! Static node topology.
//!
//! The ordered node list fixes which shard index each node owns: the node
//! at position `i` stores shard `i` of every record.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ec::TOTAL_SHARDS;
use crate::error::{Error, Result};

/// A node's peer-protocol address, always in `host:port` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Parse a configured node entry. A bare `host` gets `default_port`.
    pub fn parse(entry: &str, default_port: u16) -> Result<Self> {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(Error::Config("empty node address".to_string()));
        }
        if entry.contains(char::is_whitespace) {
            return Err(Error::Config(format!(
                "node address {:?} contains whitespace",
                entry
            )));
        }

        match entry.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(Error::Config(format!("node address {:?} has no host", entry)));
                }
                port.parse::<u16>().map_err(|_| {
                    Error::Config(format!("node address {:?} has an invalid port", entry))
                })?;
                Ok(Self(entry.to_string()))
            }
            None => Ok(Self(format!("{}:{}", entry, default_port))),
        }
    }

    /// Host part, without the port
    pub fn host(&self) -> &str {
        self.0.rsplit_once(':').map_or(self.0.as_str(), |(h, _)| h)
    }

    /// Peer-protocol port
    pub fn port(&self) -> u16 {
        self.0
            .rsplit_once(':')
            .and_then(|(_, p)| p.parse().ok())
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable bijection between node addresses and shard indices 0..6.
#[derive(Debug, Clone)]
pub struct NodeTopology {
    nodes: Vec<NodeAddress>,
    own_index: usize,
}

impl NodeTopology {
    /// Build the topology from the ordered node list and this node's entry.
    ///
    /// # Errors
    ///
    /// `Config` unless there are exactly 7 distinct nodes and `current` is
    /// one of them.
    pub fn new(nodes: Vec<NodeAddress>, current: &NodeAddress) -> Result<Self> {
        if nodes.len() != TOTAL_SHARDS {
            return Err(Error::Config(format!(
                "cluster needs exactly {} nodes, got {}",
                TOTAL_SHARDS,
                nodes.len()
            )));
        }
        for (i, node) in nodes.iter().enumerate() {
            if nodes[..i].contains(node) {
                return Err(Error::Config(format!("node {} is listed twice", node)));
            }
        }
        let own_index = nodes
            .iter()
            .position(|n| n == current)
            .ok_or_else(|| Error::Config(format!("current node {} is not in the node list", current)))?;

        Ok(Self { nodes, own_index })
    }

    /// Parse a comma-separated node list, as given on the command line.
    pub fn from_entries(entries: &str, current: &str, default_port: u16) -> Result<Self> {
        let nodes = entries
            .split(',')
            .filter(|e| !e.trim().is_empty())
            .map(|e| NodeAddress::parse(e, default_port))
            .collect::<Result<Vec<_>>>()?;
        let current = NodeAddress::parse(current, default_port)?;
        Self::new(nodes, &current)
    }

    /// Shard index owned by this node
    pub fn own_index(&self) -> usize {
        self.own_index
    }

    pub fn own_address(&self) -> &NodeAddress {
        &self.nodes[self.own_index]
    }

    /// All nodes in shard-index order
    pub fn nodes(&self) -> &[NodeAddress] {
        &self.nodes
    }

    /// Every other node with its shard index
    pub fn peers(&self) -> impl Iterator<Item = (usize, &NodeAddress)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != self.own_index)
    }

    /// Shard index for `address`, if it is a cluster member
    pub fn index_of(&self, address: &NodeAddress) -> Option<usize> {
        self.nodes.iter().position(|n| n == address)
    }

    pub fn contains(&self, address: &NodeAddress) -> bool {
        self.index_of(address).is_some()
    }

    /// The node that accepts writes when writes are redirected
    pub fn entry_node(&self) -> &NodeAddress {
        &self.nodes[0]
    }

    pub fn is_entry_node(&self) -> bool {
        self.own_index == 0
    }
}
