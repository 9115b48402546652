pub mod address;
pub mod config;
pub mod error;
pub mod metrics;
pub mod progress;
pub mod queue;

mod abort;
mod job_queue;
#[cfg(test)]
mod test_support;

pub use address::default_address_sort;
pub use address::resolve::{ResolveError, Resolver, ResolverRegistry, StaticResolver};
pub use config::{
    AddressSorter, Components, ConfigBuilder, DEFAULT_DIAL_PRIORITY, DEFAULT_DIAL_TIMEOUT, DEFAULT_MAX_DIAL_QUEUE_LENGTH,
    DEFAULT_MAX_PARALLEL_DIALS, DEFAULT_MAX_PEER_ADDRS_TO_DIAL, DialQueueConfig,
};
pub use error::DialError;
pub use metrics::DialMetricsSnapshot;
pub use progress::{DialProgress, OnProgress};
pub use queue::{DialOptions, DialQueue, DialTarget, PendingDialSnapshot};
