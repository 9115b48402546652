use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use libp2p_identity::PeerId;
use multiaddr::Multiaddr;
use parking_lot::RwLock;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Open,
    Closing,
    Closed,
}

/// Handle to an upgraded transport connection. The handle is cheap to clone;
/// equality is handle identity, so two clones of the same dial outcome compare
/// equal while two separate dials to the same peer do not.
///
/// The connection lifecycle (closing, removal from the connection map) is
/// owned by the component that produced the connection, not by the dial queue.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    id: u64,
    remote_peer: PeerId,
    remote_addr: Multiaddr,
    status: RwLock<ConnectionStatus>,
}

impl Connection {
    pub fn new(remote_peer: PeerId, remote_addr: Multiaddr) -> Self {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        Self { inner: Arc::new(ConnectionInner { id, remote_peer, remote_addr, status: RwLock::new(ConnectionStatus::Open) }) }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn remote_peer(&self) -> PeerId {
        self.inner.remote_peer
    }

    pub fn remote_addr(&self) -> &Multiaddr {
        &self.inner.remote_addr
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.read()
    }

    pub fn set_status(&self, status: ConnectionStatus) {
        *self.inner.status.write() = status;
    }

    pub fn close(&self) {
        self.set_status(ConnectionStatus::Closed);
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Connection {}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("remote_peer", &self.inner.remote_peer.to_string())
            .field("remote_addr", &self.inner.remote_addr.to_string())
            .field("status", &self.status())
            .finish()
    }
}

/// Externally owned view of the currently open connections, keyed by remote
/// peer. Read-only to the dial queue.
pub type ConnectionMap = Arc<RwLock<HashMap<PeerId, Vec<Connection>>>>;

pub fn new_connection_map() -> ConnectionMap {
    Arc::new(RwLock::new(HashMap::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_starts_open_and_closes() {
        let peer = PeerId::random();
        let addr: Multiaddr = "/ip4/192.0.2.1/tcp/1234".parse().unwrap();
        let conn = Connection::new(peer, addr.clone());
        assert_eq!(conn.status(), ConnectionStatus::Open);
        assert_eq!(conn.remote_peer(), peer);
        assert_eq!(conn.remote_addr(), &addr);

        conn.close();
        assert_eq!(conn.status(), ConnectionStatus::Closed);
    }

    #[test]
    fn connection_equality_is_handle_identity() {
        let peer = PeerId::random();
        let addr: Multiaddr = "/ip4/192.0.2.1/tcp/1234".parse().unwrap();
        let a = Connection::new(peer, addr.clone());
        let b = a.clone();
        let c = Connection::new(peer, addr);
        assert_eq!(a, b);
        assert_ne!(a, c, "separate dial outcomes must not compare equal");
    }
}
