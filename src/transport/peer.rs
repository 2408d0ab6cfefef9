//! TCP peer transport.
//!
//! One persistent duplex connection per peer. Every connection, dialed or
//! accepted, gets exactly one reader task that dispatches inbound lines:
//! `STORE` is queued to the connection's apply task, `FETCH` is answered on
//! the same connection, `RESP` completes the waiting fetch, and anything
//! else (re)associates the connection with a peer address.
//!
//! The apply task takes the key's lock and writes the shard, in arrival
//! order. The reader itself never waits on a key lock, so a write in
//! progress on this node cannot stall fetches arriving on the connection.
//!
//! Links are never repaired. A failed send drops the link from the peer
//! map and later operations towards that peer are skipped until the peer
//! dials in again or the process restarts. With at most 7 nodes the task
//! count is bounded by cluster size, not request volume.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::protocol::PeerMessage;
use crate::cluster::{NodeAddress, NodeTopology};
use crate::domain::ports::ShardTransport;
use crate::error::{Error, Result};
use crate::storage::{KeyLockTable, LocalShardStore};

/// How long dialing one peer may take before it is given up
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Replicated shards waiting for their key lock
type StoreQueue = mpsc::UnboundedSender<(String, Bytes)>;

// =============================================================================
// Peer Link
// =============================================================================

/// Write side of one peer connection. Replaced wholesale, never repaired.
#[derive(Debug)]
pub struct PeerLink {
    remote: SocketAddr,
    writer: AsyncMutex<OwnedWriteHalf>,
}

impl PeerLink {
    fn new(remote: SocketAddr, writer: OwnedWriteHalf) -> Self {
        Self {
            remote,
            writer: AsyncMutex::new(writer),
        }
    }

    /// Remote socket address
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    async fn send(&self, message: &PeerMessage) -> std::io::Result<()> {
        let mut line = message.to_line();
        line.push('\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await
    }
}

// =============================================================================
// Transport
// =============================================================================

struct Inner {
    topology: Arc<NodeTopology>,
    store: Arc<LocalShardStore>,
    locks: Arc<KeyLockTable>,
    links: DashMap<NodeAddress, Arc<PeerLink>>,
    pending: DashMap<String, oneshot::Sender<Option<Bytes>>>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// [`ShardTransport`] over newline-delimited TCP.
#[derive(Clone)]
pub struct TcpPeerTransport {
    inner: Arc<Inner>,
    connect_timeout: Duration,
}

impl std::fmt::Debug for TcpPeerTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpPeerTransport")
            .field("node", self.inner.topology.own_address())
            .field("links", &self.inner.links.len())
            .field("pending", &self.inner.pending.len())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl TcpPeerTransport {
    /// Create a transport sharing `store` and `locks` with the coordinator.
    /// Nothing runs until [`listen`](Self::listen) and
    /// [`connect_to_peers`](Self::connect_to_peers) are called.
    pub fn new(
        topology: Arc<NodeTopology>,
        store: Arc<LocalShardStore>,
        locks: Arc<KeyLockTable>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                topology,
                store,
                locks,
                links: DashMap::new(),
                pending: DashMap::new(),
                shutdown,
                tasks: Mutex::new(Vec::new()),
            }),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Bound each dial in [`connect`](Self::connect).
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Start the accept loop on an already bound listener.
    pub fn listen(&self, listener: TcpListener) {
        let inner = Arc::clone(&self.inner);
        self.inner.track(tokio::spawn(accept_loop(inner, listener)));
    }

    /// Dial every peer once, concurrently. Returns how many links came up.
    /// Peers that refuse are logged and left unconnected.
    #[instrument(skip(self), fields(node = %self.inner.topology.own_address()))]
    pub async fn connect_to_peers(&self) -> usize {
        let peers: Vec<NodeAddress> = self
            .inner
            .topology
            .peers()
            .map(|(_, address)| address.clone())
            .collect();

        let results = join_all(peers.iter().map(|peer| self.connect(peer))).await;

        let mut connected = 0;
        for (peer, result) in peers.iter().zip(results) {
            match result {
                Ok(()) => connected += 1,
                Err(e) => warn!("Could not connect to peer {}: {}", peer, e),
            }
        }
        info!("Connected to {}/{} peers", connected, peers.len());
        connected
    }

    /// Dial one peer, announce ourselves and register the link.
    ///
    /// A host that never answers the dial is given up after the connect
    /// timeout.
    pub async fn connect(&self, peer: &NodeAddress) -> Result<()> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(peer.as_str()))
            .await
            .map_err(|_| {
                Error::peer_unreachable(
                    peer.as_str(),
                    format!("connect timed out after {}ms", self.connect_timeout.as_millis()),
                )
            })?
            .map_err(|e| Error::peer_unreachable(peer.as_str(), e))?;
        let remote = stream
            .peer_addr()
            .map_err(|e| Error::peer_unreachable(peer.as_str(), e))?;
        let (read_half, write_half) = stream.into_split();
        let link = Arc::new(PeerLink::new(remote, write_half));

        let handshake = PeerMessage::Handshake(self.inner.topology.own_address().to_string());
        link.send(&handshake)
            .await
            .map_err(|e| Error::peer_unreachable(peer.as_str(), e))?;

        self.inner.links.insert(peer.clone(), Arc::clone(&link));
        self.inner
            .spawn_reader(link, read_half, Some(peer.clone()));
        debug!("Connected to peer {} at {}", peer, remote);
        Ok(())
    }

    /// Fetches still waiting for a reply
    pub fn pending_fetches(&self) -> usize {
        self.inner.pending.len()
    }

    /// Stop accepting, stop every reader and close every link.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        for handle in self.inner.tasks.lock().drain(..) {
            handle.abort();
        }
        self.inner.links.clear();
        self.inner.pending.clear();
    }

    async fn send(&self, peer: &NodeAddress, message: &PeerMessage) -> Result<()> {
        // clone out of the map so no shard lock is held across the write
        let link = self
            .inner
            .links
            .get(peer)
            .map(|l| Arc::clone(l.value()))
            .ok_or_else(|| Error::peer_unreachable(peer.as_str(), "no connection"))?;

        if let Err(e) = link.send(message).await {
            self.inner.drop_link(peer, &link);
            return Err(Error::peer_unreachable(peer.as_str(), e));
        }
        Ok(())
    }
}

#[async_trait]
impl ShardTransport for TcpPeerTransport {
    async fn store(&self, peer: &NodeAddress, key: &str, shard: Bytes) -> Result<()> {
        let message = PeerMessage::Store {
            key: key.to_string(),
            shard,
        };
        self.send(peer, &message).await
    }

    async fn fetch(
        &self,
        peer: &NodeAddress,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<Bytes>> {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(request_id.clone(), tx);

        let message = PeerMessage::Fetch {
            key: key.to_string(),
            request_id: request_id.clone(),
        };
        if let Err(e) = self.send(peer, &message).await {
            self.inner.pending.remove(&request_id);
            return Err(e);
        }

        let outcome = tokio::time::timeout(timeout, rx).await;
        // the waiter owns its entry; it is gone already if the reply arrived
        self.inner.pending.remove(&request_id);

        match outcome {
            Ok(Ok(shard)) => Ok(shard),
            Ok(Err(_)) => Err(Error::peer_unreachable(
                peer.as_str(),
                "fetch abandoned before a reply arrived",
            )),
            Err(_) => Err(Error::FetchTimeout {
                peer: peer.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    fn disconnect(&self, peer: &NodeAddress) {
        if self.inner.links.remove(peer).is_some() {
            info!("Dropped connection to peer {}", peer);
        }
    }

    fn is_connected(&self, peer: &NodeAddress) -> bool {
        self.inner.links.contains_key(peer)
    }

    fn connected_peers(&self) -> usize {
        self.inner.links.len()
    }
}

// =============================================================================
// Connection Tasks
// =============================================================================

async fn accept_loop(inner: Arc<Inner>, listener: TcpListener) {
    match listener.local_addr() {
        Ok(addr) => info!("Peer listener on {}", addr),
        Err(e) => warn!("Peer listener address unavailable: {}", e),
    }

    loop {
        let accepted = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, remote)) => {
                debug!("Accepted peer connection from {}", remote);
                let (read_half, write_half) = stream.into_split();
                let link = Arc::new(PeerLink::new(remote, write_half));
                inner.spawn_reader(link, read_half, None);
            }
            Err(e) => warn!("Failed to accept peer connection: {}", e),
        }
    }
    debug!("Peer accept loop stopped");
}

impl Inner {
    fn spawn_reader(
        self: &Arc<Self>,
        link: Arc<PeerLink>,
        read_half: OwnedReadHalf,
        peer: Option<NodeAddress>,
    ) {
        let (stores, queue) = mpsc::unbounded_channel();
        let inner = Arc::clone(self);
        self.track(tokio::spawn(inner.apply_stores(queue)));
        let inner = Arc::clone(self);
        self.track(tokio::spawn(async move {
            inner.read_loop(link, read_half, peer, stores).await
        }));
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    /// Apply replicated shards from one connection in arrival order. Ends
    /// once the reader has stopped and the queue is drained.
    async fn apply_stores(self: Arc<Self>, mut queue: mpsc::UnboundedReceiver<(String, Bytes)>) {
        while let Some((key, shard)) = queue.recv().await {
            let _guard = self.locks.lock(&key).await;
            let count = self.store.put(&key, shard);
            debug!(key = %key, count, "Applied replicated shard");
        }
    }

    async fn read_loop(
        self: Arc<Self>,
        link: Arc<PeerLink>,
        read_half: OwnedReadHalf,
        mut peer: Option<NodeAddress>,
        stores: StoreQueue,
    ) {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            let line = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                line = lines.next_line() => line,
            };

            match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    if let Err(e) = self.dispatch(&link, &mut peer, &stores, &line).await {
                        warn!("Peer {} ({}): {}", display_peer(&peer), link.remote(), e);
                    }
                }
                Ok(None) => {
                    debug!("Peer {} ({}) closed the connection", display_peer(&peer), link.remote());
                    break;
                }
                Err(e) => {
                    warn!("Read from peer {} ({}) failed: {}", display_peer(&peer), link.remote(), e);
                    break;
                }
            }
        }

        if let Some(peer) = &peer {
            self.drop_link(peer, &link);
        }
    }

    async fn dispatch(
        &self,
        link: &Arc<PeerLink>,
        peer: &mut Option<NodeAddress>,
        stores: &StoreQueue,
        line: &str,
    ) -> Result<()> {
        match PeerMessage::parse(line)? {
            PeerMessage::Store { key, shard } => {
                stores
                    .send((key, shard))
                    .map_err(|_| Error::Protocol("shard apply task has stopped".into()))?;
            }
            PeerMessage::Fetch { key, request_id } => {
                let reply = PeerMessage::Response {
                    shard: self.store.get(&key),
                    request_id,
                };
                if let Err(e) = link.send(&reply).await {
                    if let Some(peer) = peer.as_ref() {
                        self.drop_link(peer, link);
                    }
                    return Err(Error::peer_unreachable(display_peer(peer), e));
                }
            }
            PeerMessage::Response { shard, request_id } => {
                match self.pending.remove(&request_id) {
                    Some((_, waiter)) => {
                        // the waiter may have timed out in the meantime
                        let _ = waiter.send(shard);
                    }
                    None => debug!("Late or unknown response {}", request_id),
                }
            }
            PeerMessage::Handshake(announced) => {
                self.associate(link, peer, &announced);
            }
        }
        Ok(())
    }

    fn associate(&self, link: &Arc<PeerLink>, peer: &mut Option<NodeAddress>, announced: &str) {
        let own = self.topology.own_address();
        let address = match NodeAddress::parse(announced, own.port()) {
            Ok(address) => address,
            Err(e) => {
                warn!("Ignoring handshake {:?} from {}: {}", announced, link.remote(), e);
                return;
            }
        };
        if &address == own || !self.topology.contains(&address) {
            warn!("Ignoring handshake from non-member {} at {}", address, link.remote());
            return;
        }

        info!("Peer {} identified on {}", address, link.remote());
        self.links.insert(address.clone(), Arc::clone(link));
        *peer = Some(address);
    }

    /// Remove `link` from the peer map only if it is still the registered
    /// link for `peer`; a newer replacement is left alone.
    fn drop_link(&self, peer: &NodeAddress, link: &Arc<PeerLink>) {
        let removed = self
            .links
            .remove_if(peer, |_, current| Arc::ptr_eq(current, link));
        if removed.is_some() {
            info!("Dropped connection to peer {}", peer);
        }
    }
}

fn display_peer(peer: &Option<NodeAddress>) -> String {
    peer.as_ref()
        .map_or_else(|| "<unidentified>".to_string(), |p| p.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    struct TestNode {
        transport: TcpPeerTransport,
        store: Arc<LocalShardStore>,
        locks: Arc<KeyLockTable>,
    }

    /// Bind 7 listeners up front so every address is known before any
    /// node dials.
    async fn cluster() -> (Vec<TestNode>, Vec<NodeAddress>) {
        let mut listeners = Vec::new();
        for _ in 0..7 {
            listeners.push(TcpListener::bind("127.0.0.1:0").await.unwrap());
        }
        let addresses: Vec<NodeAddress> = listeners
            .iter()
            .map(|l| NodeAddress::parse(&l.local_addr().unwrap().to_string(), 0).unwrap())
            .collect();

        let mut nodes = Vec::new();
        for (listener, address) in listeners.into_iter().zip(&addresses) {
            let topology = Arc::new(NodeTopology::new(addresses.clone(), address).unwrap());
            let store = Arc::new(LocalShardStore::new());
            let locks = Arc::new(KeyLockTable::new());
            let transport = TcpPeerTransport::new(
                topology,
                Arc::clone(&store),
                Arc::clone(&locks),
                CancellationToken::new(),
            );
            transport.listen(listener);
            nodes.push(TestNode {
                transport,
                store,
                locks,
            });
        }
        (nodes, addresses)
    }

    async fn eventually(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        check()
    }

    #[tokio::test]
    async fn test_store_and_fetch_between_peers() {
        let (nodes, addresses) = cluster().await;
        assert_eq!(nodes[0].transport.connect_to_peers().await, 6);
        assert_eq!(nodes[0].transport.connected_peers(), 6);

        nodes[0]
            .transport
            .store(&addresses[1], "loc-1", Bytes::from_static(b"shard-1"))
            .await
            .unwrap();
        let store = Arc::clone(&nodes[1].store);
        assert!(eventually(|| store.get("loc-1").is_some()).await);

        let fetched = nodes[0]
            .transport
            .fetch(&addresses[1], "loc-1", Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(fetched, Some(Bytes::from_static(b"shard-1")));

        let missing = nodes[0]
            .transport
            .fetch(&addresses[2], "loc-1", Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(missing, None);
        assert_eq!(nodes[0].transport.pending_fetches(), 0);
    }

    #[tokio::test]
    async fn test_store_waiting_on_key_lock_does_not_block_fetches() {
        let (nodes, addresses) = cluster().await;
        nodes[0].transport.connect_to_peers().await;
        nodes[1].store.put("other", Bytes::from_static(b"other-shard"));

        // a write to "k" is in progress on node 1
        let guard = nodes[1].locks.lock("k").await;
        nodes[0]
            .transport
            .store(&addresses[1], "k", Bytes::from_static(b"k-shard"))
            .await
            .unwrap();

        let fetched = nodes[0]
            .transport
            .fetch(&addresses[1], "other", Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(fetched, Some(Bytes::from_static(b"other-shard")));
        assert!(nodes[0].transport.is_connected(&addresses[1]));
        assert_eq!(nodes[1].store.get("k"), None);

        drop(guard);
        let store = Arc::clone(&nodes[1].store);
        assert!(eventually(|| store.get("k").is_some()).await);
        assert_eq!(nodes[1].store.modification_count("k"), 1);
    }

    #[tokio::test]
    async fn test_stores_from_one_peer_apply_in_order() {
        let (nodes, addresses) = cluster().await;
        nodes[0].transport.connect_to_peers().await;

        for shard in [&b"v1"[..], b"v2", b"v3"] {
            nodes[0]
                .transport
                .store(&addresses[2], "k", Bytes::copy_from_slice(shard))
                .await
                .unwrap();
        }
        let store = Arc::clone(&nodes[2].store);
        assert!(eventually(|| store.modification_count("k") == 3).await);
        assert_eq!(nodes[2].store.get("k"), Some(Bytes::from_static(b"v3")));
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_timeout() {
        let (nodes, _) = cluster().await;
        let transport = nodes[0]
            .transport
            .clone()
            .with_connect_timeout(Duration::from_millis(100));
        // non-routable: the dial either hangs until the timeout or fails fast
        let blackhole = NodeAddress::parse("10.255.255.1:9", 0).unwrap();

        let started = tokio::time::Instant::now();
        let result = transport.connect(&blackhole).await;
        assert_matches!(result, Err(Error::PeerUnreachable { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!transport.is_connected(&blackhole));
    }

    #[tokio::test]
    async fn test_handshake_registers_inbound_link() {
        let (nodes, addresses) = cluster().await;
        nodes[3].transport.connect(&addresses[5]).await.unwrap();

        let acceptor = nodes[5].transport.clone();
        let dialer = addresses[3].clone();
        assert!(eventually(|| acceptor.is_connected(&dialer)).await);

        // node 5 can now reach node 3 over the accepted connection
        nodes[3].store.put("k", Bytes::from_static(b"xyz"));
        let fetched = nodes[5]
            .transport
            .fetch(&addresses[3], "k", Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(fetched, Some(Bytes::from_static(b"xyz")));
    }

    #[tokio::test]
    async fn test_send_without_link_is_unreachable() {
        let (nodes, addresses) = cluster().await;
        assert_matches!(
            nodes[0]
                .transport
                .store(&addresses[4], "k", Bytes::from_static(b"s"))
                .await,
            Err(Error::PeerUnreachable { .. })
        );
        assert_matches!(
            nodes[0]
                .transport
                .fetch(&addresses[4], "k", Duration::from_millis(50))
                .await,
            Err(Error::PeerUnreachable { .. })
        );
        assert_eq!(nodes[0].transport.pending_fetches(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_peer_drops_link() {
        let (nodes, addresses) = cluster().await;
        nodes[0].transport.connect_to_peers().await;
        nodes[2].transport.shutdown();

        let dialer = nodes[0].transport.clone();
        let gone = addresses[2].clone();
        assert!(eventually(|| !dialer.is_connected(&gone)).await);

        let result = nodes[0]
            .transport
            .fetch(&addresses[2], "k", Duration::from_millis(100))
            .await;
        assert!(result.is_err());
        assert_eq!(nodes[0].transport.connected_peers(), 5);
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let (nodes, _) = cluster().await;

        // a peer that accepts and never answers
        let silent = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let silent_addr = silent.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (_stream, _) = silent.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let transport = &nodes[0].transport;
        let stream = TcpStream::connect(silent_addr).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        let link = Arc::new(PeerLink::new(silent_addr, write_half));
        let peer = NodeAddress::parse(&silent_addr.to_string(), 0).unwrap();
        transport.inner.links.insert(peer.clone(), Arc::clone(&link));
        transport
            .inner
            .spawn_reader(link, read_half, Some(peer.clone()));

        let result = transport.fetch(&peer, "k", Duration::from_millis(50)).await;
        assert_matches!(result, Err(Error::FetchTimeout { timeout_ms: 50, .. }));
        assert_eq!(transport.pending_fetches(), 0);

        transport.disconnect(&peer);
        assert!(!transport.is_connected(&peer));
    }
}
