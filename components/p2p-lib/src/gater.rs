use futures_util::future::BoxFuture;
use libp2p_identity::PeerId;
use multiaddr::Multiaddr;

/// Policy hook vetoing dial attempts. Both checks default to allowing
/// everything, so implementations override only the ones they care about.
pub trait ConnectionGater: Send + Sync {
    /// Return true to refuse dialing the peer at all.
    fn deny_dial_peer<'a>(&'a self, _peer_id: &'a PeerId) -> BoxFuture<'a, bool> {
        Box::pin(async { false })
    }

    /// Return true to drop one candidate address from a dial.
    fn deny_dial_multiaddr<'a>(&'a self, _address: &'a Multiaddr) -> BoxFuture<'a, bool> {
        Box::pin(async { false })
    }
}

pub struct AllowAllGater;

impl ConnectionGater for AllowAllGater {}
