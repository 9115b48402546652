use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use log::warn;
use multiaddr::{Multiaddr, Protocol};

use tern_p2p_lib::AbortSignal;

/// Bound on recursive re-resolution: a resolver may return addresses that are
/// themselves resolvable (dnsaddr chains).
const MAX_RESOLVE_DEPTH: usize = 32;

#[derive(Clone, Debug, thiserror::Error)]
#[error("{0}")]
pub struct ResolveError(pub String);

impl ResolveError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Protocol-specific address resolution (e.g. `dnsaddr` TXT lookups). The
/// dial queue installs one resolver per protocol name from its config; the
/// lookup machinery itself lives outside the core.
pub trait Resolver: Send + Sync {
    fn resolve<'a>(&'a self, address: &'a Multiaddr, signal: &'a AbortSignal) -> BoxFuture<'a, Result<Vec<Multiaddr>, ResolveError>>;
}

pub type ResolverRegistry = HashMap<String, Arc<dyn Resolver>>;

/// The registry key for a resolvable protocol component. Resolution is a
/// name-lookup concern, so only the DNS family participates.
fn protocol_name(protocol: &Protocol<'_>) -> Option<&'static str> {
    match protocol {
        Protocol::Dnsaddr(_) => Some("dnsaddr"),
        Protocol::Dns(_) => Some("dns"),
        Protocol::Dns4(_) => Some("dns4"),
        Protocol::Dns6(_) => Some("dns6"),
        _ => None,
    }
}

fn find_resolver<'r>(address: &Multiaddr, resolvers: &'r ResolverRegistry) -> Option<&'r Arc<dyn Resolver>> {
    address.iter().find_map(|protocol| protocol_name(&protocol).and_then(|name| resolvers.get(name)))
}

/// Expand one address through the registry. Addresses with no matching
/// resolver pass through unchanged; resolved outputs are re-resolved until
/// terminal, bounded by [`MAX_RESOLVE_DEPTH`]. Resolver failures propagate.
pub(crate) async fn resolve_multiaddrs(
    address: &Multiaddr,
    resolvers: &ResolverRegistry,
    signal: &AbortSignal,
) -> Result<Vec<Multiaddr>, ResolveError> {
    let mut output = Vec::new();
    let mut work: VecDeque<(Multiaddr, usize)> = VecDeque::from([(address.clone(), 0)]);
    while let Some((address, depth)) = work.pop_front() {
        let Some(resolver) = find_resolver(&address, resolvers) else {
            output.push(address);
            continue;
        };
        if depth >= MAX_RESOLVE_DEPTH {
            warn!("dial queue: giving up resolving {address} after {MAX_RESOLVE_DEPTH} levels");
            output.push(address);
            continue;
        }
        let results = resolver.resolve(&address, signal).await?;
        if results.len() == 1 && results[0] == address {
            // The resolver considers the address terminal.
            output.push(address);
        } else {
            for resolved in results {
                work.push_back((resolved, depth + 1));
            }
        }
    }
    Ok(output)
}

/// Resolver backed by a fixed table. Unknown addresses resolve to themselves.
pub struct StaticResolver {
    entries: HashMap<Multiaddr, Vec<Multiaddr>>,
}

impl StaticResolver {
    pub fn new(entries: HashMap<Multiaddr, Vec<Multiaddr>>) -> Self {
        Self { entries }
    }
}

impl Resolver for StaticResolver {
    fn resolve<'a>(&'a self, address: &'a Multiaddr, _signal: &'a AbortSignal) -> BoxFuture<'a, Result<Vec<Multiaddr>, ResolveError>> {
        Box::pin(async move { Ok(self.entries.get(address).cloned().unwrap_or_else(|| vec![address.clone()])) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn addr(s: &str) -> Multiaddr {
        s.parse().unwrap()
    }

    fn registry(entries: HashMap<Multiaddr, Vec<Multiaddr>>) -> ResolverRegistry {
        ResolverRegistry::from([("dnsaddr".to_string(), Arc::new(StaticResolver::new(entries)) as Arc<dyn Resolver>)])
    }

    #[test]
    fn unresolvable_addresses_pass_through() {
        let resolvers = registry(HashMap::new());
        let input = addr("/ip4/192.0.2.1/tcp/1000");
        let out = block_on(resolve_multiaddrs(&input, &resolvers, &AbortSignal::never())).unwrap();
        assert_eq!(out, vec![input]);
    }

    #[test]
    fn resolvable_address_expands_to_targets() {
        let input = addr("/dnsaddr/bootstrap.example.com");
        let targets = vec![addr("/ip4/192.0.2.1/tcp/1000"), addr("/ip4/192.0.2.2/tcp/1000")];
        let resolvers = registry(HashMap::from([(input.clone(), targets.clone())]));
        let out = block_on(resolve_multiaddrs(&input, &resolvers, &AbortSignal::never())).unwrap();
        assert_eq!(out, targets);
    }

    #[test]
    fn resolution_recurses_through_chains() {
        let root = addr("/dnsaddr/bootstrap.example.com");
        let middle = addr("/dnsaddr/host-1.example.com");
        let leaf = addr("/ip4/192.0.2.1/tcp/1000");
        let resolvers = registry(HashMap::from([(root.clone(), vec![middle.clone()]), (middle, vec![leaf.clone()])]));
        let out = block_on(resolve_multiaddrs(&root, &resolvers, &AbortSignal::never())).unwrap();
        assert_eq!(out, vec![leaf]);
    }

    #[test]
    fn identity_resolution_is_terminal() {
        let input = addr("/dnsaddr/bootstrap.example.com");
        let resolvers = registry(HashMap::new());
        let out = block_on(resolve_multiaddrs(&input, &resolvers, &AbortSignal::never())).unwrap();
        assert_eq!(out, vec![input], "a resolver returning its input must not recurse forever");
    }

    #[test]
    fn resolver_failures_propagate() {
        struct FailingResolver;
        impl Resolver for FailingResolver {
            fn resolve<'a>(
                &'a self,
                _address: &'a Multiaddr,
                _signal: &'a AbortSignal,
            ) -> BoxFuture<'a, Result<Vec<Multiaddr>, ResolveError>> {
                Box::pin(async { Err(ResolveError::new("lookup failed")) })
            }
        }
        let resolvers = ResolverRegistry::from([("dnsaddr".to_string(), Arc::new(FailingResolver) as Arc<dyn Resolver>)]);
        let res = block_on(resolve_multiaddrs(&addr("/dnsaddr/bootstrap.example.com"), &resolvers, &AbortSignal::never()));
        assert!(res.is_err());
    }
}
