use std::cmp::Ordering;

use multiaddr::{Multiaddr, Protocol};

use tern_p2p_lib::Address;

use super::{addr_uses_circuit, candidate_ip_addr, is_publicly_routable};

/// The built-in candidate ordering: certified addresses first, then public
/// addresses before relay circuits, then secure websockets over plain
/// websockets over raw TCP. The sort is stable, so equally ranked addresses
/// keep their discovery order.
pub fn default_address_sort(a: &Address, b: &Address) -> Ordering {
    certified_rank(a)
        .cmp(&certified_rank(b))
        .then_with(|| route_rank(&a.multiaddr).cmp(&route_rank(&b.multiaddr)))
        .then_with(|| transport_rank(&a.multiaddr).cmp(&transport_rank(&b.multiaddr)))
}

fn certified_rank(address: &Address) -> u8 {
    if address.is_certified { 0 } else { 1 }
}

fn route_rank(address: &Multiaddr) -> u8 {
    if addr_uses_circuit(address) {
        return 2;
    }
    match candidate_ip_addr(address) {
        Some(ip) if is_publicly_routable(ip) => 0,
        // Name-based addresses resolve to something dialable or fail later.
        None => 0,
        Some(_) => 1,
    }
}

fn transport_rank(address: &Multiaddr) -> u8 {
    let mut rank = 3;
    for protocol in address.iter() {
        match protocol {
            Protocol::Wss(_) => return 0,
            Protocol::Ws(_) => rank = rank.min(1),
            Protocol::Tcp(_) => rank = rank.min(2),
            _ => {}
        }
    }
    rank
}
