use std::net::IpAddr;

use libp2p_identity::PeerId;
use log::{debug, error};
use multiaddr::{Multiaddr, Protocol};

use tern_p2p_lib::{AbortSignal, Address, ConnectionGater, PeerRouting, PeerStore, RoutingError, StoreError, TransportManager};

use crate::config::{Components, DialQueueConfig};
use crate::error::DialError;

pub mod resolve;
mod sort;

pub use sort::default_address_sort;

/// The peer the address dials: the last `/p2p` component, which for circuit
/// addresses is the target behind the relay.
pub(crate) fn peer_id_from_multiaddr(address: &Multiaddr) -> Option<PeerId> {
    address.iter().filter_map(|protocol| if let Protocol::P2p(peer_id) = protocol { Some(peer_id) } else { None }).last()
}

pub(crate) fn addr_uses_circuit(address: &Multiaddr) -> bool {
    address.iter().any(|protocol| matches!(protocol, Protocol::P2pCircuit))
}

/// Path-terminated multiaddrs (e.g. `/unix/...`) cannot take a `/p2p` suffix.
fn has_path_terminal(address: &Multiaddr) -> bool {
    matches!(address.iter().last(), Some(Protocol::Unix(_)))
}

pub(crate) fn candidate_ip_addr(address: &Multiaddr) -> Option<IpAddr> {
    let mut ip = None;
    for protocol in address.iter() {
        match protocol {
            Protocol::Ip4(v4) => ip = Some(IpAddr::V4(v4)),
            Protocol::Ip6(v6) => ip = Some(IpAddr::V6(v6)),
            _ => {}
        }
    }
    ip
}

pub(crate) fn is_publicly_routable(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified() || v4.is_broadcast() || v4.is_documentation())
        }
        IpAddr::V6(v6) => {
            // unique-local fc00::/7 and link-local fe80::/10
            !(v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xfe00) == 0xfc00 || (v6.segments()[0] & 0xffc0) == 0xfe80)
        }
    }
}

fn encapsulate_peer_id(address: &Multiaddr, peer_id: PeerId) -> Multiaddr {
    let mut out = address.clone();
    out.push(Protocol::P2p(peer_id));
    out
}

/// Builds the ordered dial list for a job: seed from the caller's addresses,
/// discover from the peer store and routing when none were given, resolve,
/// append the target peer id, filter undialable and gated addresses, dedupe
/// and sort. Deterministic given its inputs; no peer store writes happen here.
pub(crate) async fn calculate_multiaddrs(
    components: &Components,
    config: &DialQueueConfig,
    peer_id: Option<PeerId>,
    addr_strings: &[String],
    signal: &AbortSignal,
) -> Result<Vec<Address>, DialError> {
    let mut addrs: Vec<Address> = Vec::with_capacity(addr_strings.len());
    for raw in addr_strings {
        let multiaddr =
            raw.parse::<Multiaddr>().map_err(|err| DialError::InvalidParameters(format!("invalid multiaddr {raw}: {err}")))?;
        addrs.push(Address::new(multiaddr));
    }

    if let Some(peer_id) = peer_id {
        if peer_id == components.local_peer_id {
            return Err(DialError::DialSelf);
        }
        if components.connection_gater.deny_dial_peer(&peer_id).await {
            return Err(DialError::Denied(format!("the connection gater denied dialing peer {peer_id}")));
        }
        if addrs.is_empty() {
            match components.peer_store.get(&peer_id).await {
                Ok(record) => addrs.extend(record.addresses),
                Err(StoreError::NotFound) => {}
                Err(err) => return Err(DialError::PeerStore(err.to_string())),
            }
        }
        if addrs.is_empty() {
            match components.peer_routing.find_peer(&peer_id, signal).await {
                Ok(info) => addrs.extend(info.multiaddrs.into_iter().map(Address::new)),
                Err(RoutingError::NoPeerRouters) => {}
                Err(err) => error!("dial queue: looking up multiaddrs for {peer_id} in the peer routing failed: {err}"),
            }
        }
    }

    // Resolution replaces resolvable addresses with their targets. An address
    // that resolves to exactly itself keeps its record, preserving the
    // certification flag.
    let mut resolved: Vec<Address> = Vec::with_capacity(addrs.len());
    for address in addrs {
        let outputs = resolve::resolve_multiaddrs(&address.multiaddr, &config.resolvers, signal)
            .await
            .map_err(|err| DialError::Resolve(err.to_string()))?;
        if outputs.len() == 1 && outputs[0] == address.multiaddr {
            resolved.push(address);
        } else {
            resolved.extend(outputs.into_iter().map(Address::new));
        }
    }
    let mut addrs = resolved;

    if let Some(peer_id) = peer_id {
        addrs = addrs
            .into_iter()
            .map(|address| {
                if has_path_terminal(&address.multiaddr) || peer_id_from_multiaddr(&address.multiaddr).is_some() {
                    address
                } else {
                    Address { multiaddr: encapsulate_peer_id(&address.multiaddr, peer_id), is_certified: address.is_certified }
                }
            })
            .collect();
    }

    addrs.retain(|address| components.transport_manager.dial_transport_for_multiaddr(&address.multiaddr).is_some());

    // Resolution of shared bootstrap hostnames can surface addresses that
    // embed a different peer id than the one being dialed.
    if let Some(peer_id) = peer_id {
        addrs.retain(|address| peer_id_from_multiaddr(&address.multiaddr).is_none_or(|embedded| embedded == peer_id));
    }

    let mut deduped: Vec<(String, Address)> = Vec::with_capacity(addrs.len());
    for address in addrs {
        let key = address.multiaddr.to_string();
        match deduped.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, existing)) => existing.is_certified |= address.is_certified,
            None => deduped.push((key, address)),
        }
    }
    let addrs: Vec<Address> = deduped.into_iter().map(|(_, address)| address).collect();

    if addrs.is_empty() {
        return Err(DialError::NoValidAddresses);
    }

    let mut gated: Vec<Address> = Vec::with_capacity(addrs.len());
    for address in addrs {
        if components.connection_gater.deny_dial_multiaddr(&address.multiaddr).await {
            debug!("dial queue: connection gater denied dialing {}", address.multiaddr);
        } else {
            gated.push(address);
        }
    }
    if gated.is_empty() {
        return Err(DialError::Denied("the connection gater denied all addresses in the dial request".to_string()));
    }
    let mut addrs = gated;

    match &config.address_sorter {
        Some(sorter) => addrs.sort_by(|a, b| sorter(a, b)),
        None => addrs.sort_by(default_address_sort),
    }

    Ok(addrs)
}

/// Probe whether the stack could dial any of the given addresses. Runs the
/// full address pipeline without a target peer and with no side effects; any
/// failure means "not dialable".
pub(crate) async fn is_dialable(
    components: &Components,
    config: &DialQueueConfig,
    multiaddrs: &[Multiaddr],
    run_on_limited_connection: bool,
    signal: &AbortSignal,
) -> bool {
    let addr_strings: Vec<String> = multiaddrs.iter().map(Multiaddr::to_string).collect();
    match calculate_multiaddrs(components, config, None, &addr_strings, signal).await {
        Ok(addresses) => run_on_limited_connection || addresses.iter().any(|address| !addr_uses_circuit(&address.multiaddr)),
        Err(err) => {
            log::trace!("dial queue: address not dialable: {err}");
            false
        }
    }
}
