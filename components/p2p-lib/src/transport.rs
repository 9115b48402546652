use futures_util::future::BoxFuture;
use multiaddr::Multiaddr;

use crate::connection::Connection;
use crate::signal::AbortSignal;

#[derive(Clone, Debug, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Clone)]
pub struct DialTransportOptions {
    /// Aborting the signal must cancel the in-flight dial.
    pub signal: AbortSignal,
}

/// The transport layer as seen by the dial queue: it can say whether an
/// address is dialable at all, and it can dial one address through to an
/// upgraded connection.
pub trait TransportManager: Send + Sync {
    /// Dial a single address and upgrade the resulting stream. Resolves only
    /// to open connections.
    fn dial<'a>(&'a self, address: &'a Multiaddr, options: DialTransportOptions) -> BoxFuture<'a, Result<Connection, TransportError>>;

    /// The name of the transport that can dial this address, or `None` when
    /// no configured transport matches.
    fn dial_transport_for_multiaddr(&self, address: &Multiaddr) -> Option<String>;
}
