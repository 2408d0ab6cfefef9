//! Peer-to-peer shard transport: the line protocol and its TCP adapter.

pub mod peer;
pub mod protocol;

pub use peer::{PeerLink, TcpPeerTransport, DEFAULT_CONNECT_TIMEOUT};
pub use protocol::PeerMessage;
