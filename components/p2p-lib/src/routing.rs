use futures_util::future::BoxFuture;
use libp2p_identity::PeerId;
use multiaddr::Multiaddr;

use crate::signal::AbortSignal;

#[derive(Clone, Debug)]
pub struct PeerInfo {
    pub peer_id: PeerId,
    pub multiaddrs: Vec<Multiaddr>,
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("no peer routers configured")]
    NoPeerRouters,
    #[error("peer {0} not found")]
    NotFound(String),
    #[error("peer routing failed: {0}")]
    Other(String),
}

pub trait PeerRouting: Send + Sync {
    fn find_peer<'a>(&'a self, peer_id: &'a PeerId, signal: &'a AbortSignal) -> BoxFuture<'a, Result<PeerInfo, RoutingError>>;
}

/// Default routing for stacks with no routers configured.
pub struct NoopPeerRouting;

impl PeerRouting for NoopPeerRouting {
    fn find_peer<'a>(&'a self, _peer_id: &'a PeerId, _signal: &'a AbortSignal) -> BoxFuture<'a, Result<PeerInfo, RoutingError>> {
        Box::pin(async { Err(RoutingError::NoPeerRouters) })
    }
}
