use std::collections::HashMap;

use futures_util::future::BoxFuture;
use libp2p_identity::PeerId;
use multiaddr::Multiaddr;
use parking_lot::RwLock;

/// Metadata key under which the timestamp of the last successful dial to a
/// peer is recorded. Values are UTF-8 decimal milliseconds since the epoch so
/// consumers can read them without a schema.
pub const LAST_DIAL_SUCCESS_KEY: &str = "last-dial-success";
/// Metadata key for the timestamp of the last failed dial attempt.
pub const LAST_DIAL_FAILURE_KEY: &str = "last-dial-failure";

/// A known address for a peer. `is_certified` marks addresses vouched for by
/// a signed peer record; certification is sticky under merging, an address
/// certified by any source stays certified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Address {
    pub multiaddr: Multiaddr,
    pub is_certified: bool,
}

impl Address {
    pub fn new(multiaddr: Multiaddr) -> Self {
        Self { multiaddr, is_certified: false }
    }

    pub fn certified(multiaddr: Multiaddr) -> Self {
        Self { multiaddr, is_certified: true }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PeerRecord {
    pub addresses: Vec<Address>,
    pub metadata: HashMap<String, Vec<u8>>,
}

/// Merge payload for [`PeerStore::merge`]: addresses are unioned into the
/// record, metadata keys overwrite existing values.
#[derive(Clone, Debug, Default)]
pub struct PeerUpdate {
    pub multiaddrs: Vec<Multiaddr>,
    pub metadata: HashMap<String, Vec<u8>>,
}

impl PeerUpdate {
    pub fn with_multiaddrs(multiaddrs: Vec<Multiaddr>) -> Self {
        Self { multiaddrs, ..Default::default() }
    }

    pub fn with_metadata(key: &str, value: Vec<u8>) -> Self {
        Self { metadata: HashMap::from([(key.to_string(), value)]), ..Default::default() }
    }
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum StoreError {
    #[error("peer not found")]
    NotFound,
    #[error("peer store error: {0}")]
    Other(String),
}

pub trait PeerStore: Send + Sync {
    fn get<'a>(&'a self, peer_id: &'a PeerId) -> BoxFuture<'a, Result<PeerRecord, StoreError>>;
    fn merge<'a>(&'a self, peer_id: &'a PeerId, update: PeerUpdate) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// In-memory peer store for nodes that do not persist peer data, and for
/// tests.
#[derive(Default)]
pub struct MemoryPeerStore {
    records: RwLock<HashMap<PeerId, PeerRecord>>,
}

impl MemoryPeerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing merge semantics.
    pub fn insert(&self, peer_id: PeerId, record: PeerRecord) {
        self.records.write().insert(peer_id, record);
    }
}

impl PeerStore for MemoryPeerStore {
    fn get<'a>(&'a self, peer_id: &'a PeerId) -> BoxFuture<'a, Result<PeerRecord, StoreError>> {
        Box::pin(async move { self.records.read().get(peer_id).cloned().ok_or(StoreError::NotFound) })
    }

    fn merge<'a>(&'a self, peer_id: &'a PeerId, update: PeerUpdate) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut records = self.records.write();
            let record = records.entry(*peer_id).or_default();
            for multiaddr in update.multiaddrs {
                if !record.addresses.iter().any(|existing| existing.multiaddr == multiaddr) {
                    record.addresses.push(Address::new(multiaddr));
                }
            }
            record.metadata.extend(update.metadata);
            Ok(())
        })
    }
}
