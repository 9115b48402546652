use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use libp2p_identity::PeerId;
use multiaddr::{Multiaddr, Protocol};
use parking_lot::Mutex;

use tern_p2p_lib::{
    AbortSignal, Connection, ConnectionGater, ConnectionMap, DialTransportOptions, MemoryPeerStore, PeerInfo, PeerRecord, PeerRouting,
    PeerStore, PeerUpdate, RoutingError, StoreError, TransportError, TransportManager, new_connection_map,
};

use crate::config::Components;

#[derive(Clone)]
pub(crate) enum MockDial {
    Succeed,
    Fail(&'static str),
    /// Waits for the dial signal, then errors like a cancelled dial would.
    Hang,
}

/// Scripted transport. Unscripted addresses succeed with a connection to the
/// peer embedded in the address. Records every attempt and every signal it
/// was handed.
pub(crate) struct MockTransport {
    delay: Duration,
    script: Mutex<HashMap<String, MockDial>>,
    attempts: Mutex<Vec<Multiaddr>>,
    signals: Mutex<Vec<AbortSignal>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            script: Mutex::new(HashMap::new()),
            attempts: Mutex::new(Vec::new()),
            signals: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn script(&self, address: &Multiaddr, result: MockDial) {
        self.script.lock().insert(address.to_string(), result);
    }

    pub(crate) fn attempts(&self) -> Vec<Multiaddr> {
        self.attempts.lock().clone()
    }

    pub(crate) fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    pub(crate) fn signals(&self) -> Vec<AbortSignal> {
        self.signals.lock().clone()
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl TransportManager for MockTransport {
    fn dial<'a>(&'a self, address: &'a Multiaddr, options: DialTransportOptions) -> BoxFuture<'a, Result<Connection, TransportError>> {
        Box::pin(async move {
            self.attempts.lock().push(address.clone());
            self.signals.lock().push(options.signal.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let scripted = self.script.lock().get(&address.to_string()).cloned();
            let result = match scripted.unwrap_or(MockDial::Succeed) {
                MockDial::Succeed => {
                    let peer_id = crate::address::peer_id_from_multiaddr(address).unwrap_or_else(PeerId::random);
                    Ok(Connection::new(peer_id, address.clone()))
                }
                MockDial::Fail(message) => Err(TransportError::new(message)),
                MockDial::Hang => {
                    options.signal.aborted().await;
                    Err(TransportError::new("dial cancelled"))
                }
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }

    fn dial_transport_for_multiaddr(&self, address: &Multiaddr) -> Option<String> {
        if address.iter().any(|protocol| matches!(protocol, Protocol::Memory(_))) { None } else { Some("tcp".to_string()) }
    }
}

/// Peer store wrapper that records the order of merged metadata keys.
pub(crate) struct RecordingPeerStore {
    inner: MemoryPeerStore,
    merged_keys: Mutex<Vec<String>>,
    fail_merges: AtomicUsize,
}

impl RecordingPeerStore {
    pub(crate) fn new() -> Self {
        Self { inner: MemoryPeerStore::new(), merged_keys: Mutex::new(Vec::new()), fail_merges: AtomicUsize::new(0) }
    }

    pub(crate) fn insert(&self, peer_id: PeerId, record: PeerRecord) {
        self.inner.insert(peer_id, record);
    }

    pub(crate) fn merged_keys(&self) -> Vec<String> {
        self.merged_keys.lock().clone()
    }

    /// Make the next `count` merges fail.
    pub(crate) fn fail_next_merges(&self, count: usize) {
        self.fail_merges.store(count, Ordering::SeqCst);
    }
}

impl PeerStore for RecordingPeerStore {
    fn get<'a>(&'a self, peer_id: &'a PeerId) -> BoxFuture<'a, Result<PeerRecord, StoreError>> {
        self.inner.get(peer_id)
    }

    fn merge<'a>(&'a self, peer_id: &'a PeerId, update: PeerUpdate) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.merged_keys.lock().extend(update.metadata.keys().cloned());
            if self.fail_merges.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
                return Err(StoreError::Other("store unavailable".to_string()));
            }
            self.inner.merge(peer_id, update).await
        })
    }
}

pub(crate) struct StaticRouting {
    pub(crate) multiaddrs: Vec<Multiaddr>,
}

impl PeerRouting for StaticRouting {
    fn find_peer<'a>(&'a self, peer_id: &'a PeerId, _signal: &'a AbortSignal) -> BoxFuture<'a, Result<PeerInfo, RoutingError>> {
        Box::pin(async move { Ok(PeerInfo { peer_id: *peer_id, multiaddrs: self.multiaddrs.clone() }) })
    }
}

pub(crate) struct FailingRouting {
    pub(crate) error: RoutingError,
}

impl PeerRouting for FailingRouting {
    fn find_peer<'a>(&'a self, _peer_id: &'a PeerId, _signal: &'a AbortSignal) -> BoxFuture<'a, Result<PeerInfo, RoutingError>> {
        let error = self.error.clone();
        Box::pin(async move { Err(error) })
    }
}

#[derive(Default)]
pub(crate) struct ScriptedGater {
    pub(crate) deny_peer: bool,
    pub(crate) deny_addrs: Vec<Multiaddr>,
    pub(crate) deny_all_addrs: bool,
}

impl ConnectionGater for ScriptedGater {
    fn deny_dial_peer<'a>(&'a self, _peer_id: &'a PeerId) -> BoxFuture<'a, bool> {
        Box::pin(async move { self.deny_peer })
    }

    fn deny_dial_multiaddr<'a>(&'a self, address: &'a Multiaddr) -> BoxFuture<'a, bool> {
        Box::pin(async move { self.deny_all_addrs || self.deny_addrs.contains(address) })
    }
}

/// One dial queue's worth of mock collaborators.
pub(crate) struct TestStack {
    pub(crate) local_peer_id: PeerId,
    pub(crate) transport: Arc<MockTransport>,
    pub(crate) store: Arc<RecordingPeerStore>,
    pub(crate) connections: ConnectionMap,
    pub(crate) components: Components,
}

pub(crate) fn test_stack() -> TestStack {
    test_stack_with_transport(Arc::new(MockTransport::new()))
}

pub(crate) fn test_stack_with_transport(transport: Arc<MockTransport>) -> TestStack {
    let local_peer_id = PeerId::random();
    let store = Arc::new(RecordingPeerStore::new());
    let connections = new_connection_map();
    let components = Components::new(local_peer_id, transport.clone(), store.clone(), connections.clone());
    TestStack { local_peer_id, transport, store, connections, components }
}
