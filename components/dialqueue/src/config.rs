use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use libp2p_identity::PeerId;
use tern_p2p_lib::{Address, AllowAllGater, ConnectionGater, ConnectionMap, NoopPeerRouting, PeerRouting, PeerStore, TransportManager};

use crate::address::resolve::{Resolver, ResolverRegistry};

pub const DEFAULT_MAX_PARALLEL_DIALS: usize = 100;
pub const DEFAULT_MAX_DIAL_QUEUE_LENGTH: usize = 500;
pub const DEFAULT_MAX_PEER_ADDRS_TO_DIAL: usize = 25;
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DIAL_PRIORITY: u32 = 50;

/// Orders candidate addresses before the attempt loop walks them. `None` in
/// the config selects the built-in sorter.
pub type AddressSorter = Arc<dyn Fn(&Address, &Address) -> Ordering + Send + Sync>;

#[derive(Clone)]
pub struct DialQueueConfig {
    pub address_sorter: Option<AddressSorter>,
    pub max_parallel_dials: usize,
    pub max_dial_queue_length: usize,
    pub max_peer_addrs_to_dial: usize,
    pub dial_timeout: Duration,
    /// Protocol name (e.g. "dnsaddr") to resolver.
    pub resolvers: ResolverRegistry,
}

impl Default for DialQueueConfig {
    fn default() -> Self {
        Self {
            address_sorter: None,
            max_parallel_dials: DEFAULT_MAX_PARALLEL_DIALS,
            max_dial_queue_length: DEFAULT_MAX_DIAL_QUEUE_LENGTH,
            max_peer_addrs_to_dial: DEFAULT_MAX_PEER_ADDRS_TO_DIAL,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            resolvers: ResolverRegistry::new(),
        }
    }
}

pub struct ConfigBuilder {
    config: DialQueueConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self { config: DialQueueConfig::default() }
    }

    pub fn address_sorter(mut self, sorter: AddressSorter) -> Self {
        self.config.address_sorter = Some(sorter);
        self
    }

    pub fn max_parallel_dials(mut self, value: usize) -> Self {
        self.config.max_parallel_dials = value.max(1);
        self
    }

    pub fn max_dial_queue_length(mut self, value: usize) -> Self {
        self.config.max_dial_queue_length = value;
        self
    }

    pub fn max_peer_addrs_to_dial(mut self, value: usize) -> Self {
        self.config.max_peer_addrs_to_dial = value;
        self
    }

    pub fn dial_timeout(mut self, value: Duration) -> Self {
        self.config.dial_timeout = value;
        self
    }

    pub fn resolver(mut self, protocol: &str, resolver: Arc<dyn Resolver>) -> Self {
        self.config.resolvers.insert(protocol.to_string(), resolver);
        self
    }

    pub fn build(self) -> DialQueueConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The collaborators the dial queue borrows. It owns none of them: transports,
/// peer store, routing and the connection map all have external lifecycles.
#[derive(Clone)]
pub struct Components {
    pub local_peer_id: PeerId,
    pub transport_manager: Arc<dyn TransportManager>,
    pub peer_store: Arc<dyn PeerStore>,
    pub peer_routing: Arc<dyn PeerRouting>,
    pub connection_gater: Arc<dyn ConnectionGater>,
    pub connections: ConnectionMap,
}

impl Components {
    pub fn new(
        local_peer_id: PeerId,
        transport_manager: Arc<dyn TransportManager>,
        peer_store: Arc<dyn PeerStore>,
        connections: ConnectionMap,
    ) -> Self {
        Self {
            local_peer_id,
            transport_manager,
            peer_store,
            peer_routing: Arc::new(NoopPeerRouting),
            connection_gater: Arc::new(AllowAllGater),
            connections,
        }
    }

    pub fn with_peer_routing(mut self, peer_routing: Arc<dyn PeerRouting>) -> Self {
        self.peer_routing = peer_routing;
        self
    }

    pub fn with_connection_gater(mut self, connection_gater: Arc<dyn ConnectionGater>) -> Self {
        self.connection_gater = connection_gater;
        self
    }
}
