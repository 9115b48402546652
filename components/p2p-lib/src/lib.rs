pub mod connection;
pub mod gater;
pub mod routing;
pub mod signal;
pub mod store;
pub mod transport;

pub use connection::{Connection, ConnectionMap, ConnectionStatus, new_connection_map};
pub use gater::{AllowAllGater, ConnectionGater};
pub use routing::{NoopPeerRouting, PeerInfo, PeerRouting, RoutingError};
pub use signal::{AbortHandle, AbortReason, AbortSignal, SingleTrigger};
pub use store::{Address, LAST_DIAL_FAILURE_KEY, LAST_DIAL_SUCCESS_KEY, MemoryPeerStore, PeerRecord, PeerStore, PeerUpdate, StoreError};
pub use transport::{DialTransportOptions, TransportError, TransportManager};

pub use libp2p_identity::PeerId;
pub use multiaddr::{Multiaddr, Protocol};
