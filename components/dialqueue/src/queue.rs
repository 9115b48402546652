use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use libp2p_identity::PeerId;
use log::{debug, info, warn};
use multiaddr::Multiaddr;
use parking_lot::Mutex;
use serde::Serialize;
use triggered::Listener;

use tern_p2p_lib::{
    AbortReason, AbortSignal, Connection, ConnectionStatus, DialTransportOptions, LAST_DIAL_FAILURE_KEY, LAST_DIAL_SUCCESS_KEY, PeerStore,
    PeerUpdate, SingleTrigger, TransportManager,
};

use crate::abort::DialAbortController;
use crate::address::{calculate_multiaddrs, is_dialable, peer_id_from_multiaddr};
use crate::config::{Components, DEFAULT_DIAL_PRIORITY, DialQueueConfig};
use crate::error::DialError;
use crate::job_queue::{DialJob, JobOptions, JobQueue, JobWork};
use crate::metrics::{DialMetrics, DialMetricsSnapshot};
use crate::progress::{DialProgress, OnProgress};

/// What to dial: a peer whose addresses are discovered from the peer store
/// and routing, or one or more concrete multiaddrs.
#[derive(Clone, Debug)]
pub enum DialTarget {
    Peer(PeerId),
    Addrs(Vec<Multiaddr>),
}

impl From<PeerId> for DialTarget {
    fn from(peer_id: PeerId) -> Self {
        DialTarget::Peer(peer_id)
    }
}

impl From<Multiaddr> for DialTarget {
    fn from(multiaddr: Multiaddr) -> Self {
        DialTarget::Addrs(vec![multiaddr])
    }
}

impl From<Vec<Multiaddr>> for DialTarget {
    fn from(multiaddrs: Vec<Multiaddr>) -> Self {
        DialTarget::Addrs(multiaddrs)
    }
}

/// Observability view of one queued dial.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PendingDialSnapshot {
    pub id: u64,
    pub peer_id: Option<String>,
    pub priority: u32,
    pub multiaddrs: Vec<String>,
}

#[derive(Clone, Default)]
pub struct DialOptions {
    /// Dial even when an open connection to the target already exists.
    pub force: bool,
    /// Higher priority dials run first. `None` means [`DEFAULT_DIAL_PRIORITY`].
    pub priority: Option<u32>,
    /// Caller-held cancellation. Aborting detaches only this caller from a
    /// shared dial.
    pub signal: Option<AbortSignal>,
    pub on_progress: Option<OnProgress>,
    /// When false, `is_dialable` requires at least one non-circuit address.
    pub run_on_limited_connection: Option<bool>,
}

/// The connection-establishment scheduler. Given a peer and/or addresses it
/// produces at most one open connection, coalescing overlapping requests,
/// bounding parallelism and feeding dial outcomes back into the peer store.
pub struct DialQueue {
    components: Arc<Components>,
    config: Arc<DialQueueConfig>,
    queue: JobQueue,
    metrics: Arc<DialMetrics>,
    shutdown: Mutex<SingleTrigger>,
    running: AtomicBool,
}

impl DialQueue {
    /// The queue is ready to dial as soon as it is constructed; `stop`/`start`
    /// drive the shutdown controller afterwards.
    pub fn new(components: Components, config: DialQueueConfig) -> Self {
        let metrics = Arc::new(DialMetrics::default());
        let queue = JobQueue::new(config.max_parallel_dials, config.max_dial_queue_length, metrics.clone());
        Self {
            components: Arc::new(components),
            config: Arc::new(config),
            queue,
            metrics,
            shutdown: Mutex::new(SingleTrigger::new()),
            running: AtomicBool::new(true),
        }
    }

    /// Install a fresh shutdown controller after a `stop`.
    pub fn start(&self) {
        *self.shutdown.lock() = SingleTrigger::new();
        self.running.store(true, Ordering::SeqCst);
        info!("dial queue: started");
    }

    /// Abort every pending and running dial and refuse new ones until
    /// `start` is called again.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.lock().trigger.trigger();
        self.queue.abort();
        info!("dial queue: stopped");
    }

    pub fn metrics_snapshot(&self) -> DialMetricsSnapshot {
        self.metrics.snapshot(self.queue.queued(), self.queue.running())
    }

    /// The dials waiting for a slot, in dispatch order.
    pub fn pending_dials(&self) -> Vec<PendingDialSnapshot> {
        self.queue
            .pending()
            .into_iter()
            .map(|job| PendingDialSnapshot {
                id: job.id(),
                peer_id: job.peer_id().map(|peer_id| peer_id.to_string()),
                priority: job.priority(),
                multiaddrs: job.addrs(),
            })
            .collect()
    }

    fn shutdown_listener(&self) -> Listener {
        self.shutdown.lock().listener.clone()
    }

    /// Dial the target and return an open, upgraded connection.
    ///
    /// An existing open connection short-circuits the dial unless `force` is
    /// set. A dial that overlaps an in-flight job joins it instead of dialing
    /// again, and every joined caller receives the same connection.
    pub async fn dial(&self, target: impl Into<DialTarget>, options: DialOptions) -> Result<Connection, DialError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(DialError::Aborted("dial queue is not started".to_string()));
        }
        let (peer_id, multiaddrs) = split_target(target.into())?;

        if !options.force
            && let Some(connection) = self.find_existing(peer_id.as_ref(), &multiaddrs)
        {
            debug!("dial queue: already connected to {}", connection.remote_peer());
            emit(&options.on_progress, DialProgress::AlreadyConnected);
            return Ok(connection);
        }

        let addr_strings: Vec<String> = multiaddrs.iter().map(Multiaddr::to_string).collect();
        let components = self.components.clone();
        let config = self.config.clone();
        let shutdown = self.shutdown_listener();
        let work = move || -> JobWork {
            Box::new(move |job: DialJob| Box::pin(async move { execute_job(components, config, shutdown, job).await }))
        };

        let job_options = JobOptions { priority: options.priority.unwrap_or(DEFAULT_DIAL_PRIORITY), on_progress: options.on_progress.clone() };
        let (job, joined) = self.queue.add_or_join(peer_id, addr_strings, job_options, work)?;
        if joined {
            debug!("dial queue: joining existing dial job {}", job.id());
            emit(&options.on_progress, DialProgress::AlreadyInDialQueue);
        } else {
            debug!("dial queue: enqueued dial job {} for {:?}", job.id(), job.peer_id());
            emit(&options.on_progress, DialProgress::AddToDialQueue);
        }
        self.queue.join(job, options.signal).await
    }

    /// Whether the stack could dial any of the given addresses. Side-effect
    /// free; never fails.
    pub async fn is_dialable(&self, multiaddrs: &[Multiaddr], options: DialOptions) -> bool {
        let signal = options.signal.unwrap_or_else(AbortSignal::never);
        is_dialable(&self.components, &self.config, multiaddrs, options.run_on_limited_connection.unwrap_or(true), &signal).await
    }

    fn find_existing(&self, peer_id: Option<&PeerId>, multiaddrs: &[Multiaddr]) -> Option<Connection> {
        let connections = self.components.connections.read();
        if let Some(peer_id) = peer_id
            && let Some(existing) = connections.get(peer_id)
            && let Some(connection) = existing.iter().find(|connection| connection.status() == ConnectionStatus::Open)
        {
            return Some(connection.clone());
        }
        if !multiaddrs.is_empty() {
            for existing in connections.values() {
                if let Some(connection) = existing.iter().find(|connection| {
                    connection.status() == ConnectionStatus::Open && multiaddrs.iter().any(|multiaddr| connection.remote_addr() == multiaddr)
                }) {
                    return Some(connection.clone());
                }
            }
        }
        None
    }
}

fn emit(on_progress: &Option<OnProgress>, event: DialProgress) {
    if let Some(on_progress) = on_progress {
        on_progress(event);
    }
}

fn split_target(target: DialTarget) -> Result<(Option<PeerId>, Vec<Multiaddr>), DialError> {
    match target {
        DialTarget::Peer(peer_id) => Ok((Some(peer_id), Vec::new())),
        DialTarget::Addrs(multiaddrs) => {
            if multiaddrs.is_empty() {
                return Err(DialError::InvalidParameters("no multiaddrs provided".to_string()));
            }
            let mut peer_id = None;
            for multiaddr in &multiaddrs {
                if let Some(embedded) = peer_id_from_multiaddr(multiaddr) {
                    match peer_id {
                        None => peer_id = Some(embedded),
                        Some(existing) if existing == embedded => {}
                        Some(existing) => {
                            return Err(DialError::InvalidParameters(format!(
                                "multiaddrs contain conflicting peer ids {existing} and {embedded}"
                            )));
                        }
                    }
                }
            }
            Ok((peer_id, multiaddrs))
        }
    }
}

async fn execute_job(components: Arc<Components>, config: Arc<DialQueueConfig>, shutdown: Listener, job: DialJob) -> Result<Connection, DialError> {
    job.emit_progress(DialProgress::StartDial);
    let controller = DialAbortController::new(config.dial_timeout, shutdown, job.abort_listener());
    let signal = controller.signal();
    // The select bounds the whole job even when a collaborator ignores the
    // signal it was handed.
    let outcome = tokio::select! {
        outcome = run_dial(&components, &config, &job, &signal) => outcome,
        reason = signal.aborted() => Err(match reason {
            AbortReason::Timeout => DialError::Timeout(reason.as_str().to_string()),
            reason => DialError::Aborted(reason.as_str().to_string()),
        }),
    };
    controller.clear();
    outcome
}

async fn run_dial(
    components: &Components,
    config: &DialQueueConfig,
    job: &DialJob,
    signal: &AbortSignal,
) -> Result<Connection, DialError> {
    let addr_strings = job.addrs();
    let addresses = calculate_multiaddrs(components, config, job.peer_id(), &addr_strings, signal).await?;
    job.emit_progress(DialProgress::CalculatedAddresses(addresses.clone()));

    let mut errors: Vec<DialError> = Vec::new();
    let mut dialed = 0usize;
    for address in &addresses {
        if dialed == config.max_peer_addrs_to_dial {
            return Err(DialError::TooManyAddresses(config.max_peer_addrs_to_dial));
        }
        dialed += 1;
        debug!("dial queue: job {} dialing {}", job.id(), address.multiaddr);
        match components.transport_manager.dial(&address.multiaddr, DialTransportOptions { signal: signal.clone() }).await {
            Ok(connection) => {
                record_dial_success(components, &connection).await;
                info!("dial queue: job {} connected to {} via {}", job.id(), connection.remote_peer(), connection.remote_addr());
                return Ok(connection);
            }
            Err(err) => {
                if let Some(peer_id) = job.peer_id() {
                    record_dial_failure(components, &peer_id).await;
                }
                if signal.is_aborted() {
                    return Err(DialError::Timeout(err.to_string()));
                }
                debug!("dial queue: job {} failed to dial {}: {err}", job.id(), address.multiaddr);
                errors.push(DialError::Transport(err.to_string()));
            }
        }
    }
    if errors.len() == 1
        && let Some(err) = errors.pop()
    {
        return Err(err);
    }
    Err(DialError::Aggregate(errors))
}

fn now_millis_bytes() -> Vec<u8> {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis().to_string().into_bytes()
}

/// Store-write failures are logged and swallowed so they never mask the dial
/// outcome.
async fn record_dial_success(components: &Components, connection: &Connection) {
    let update = PeerUpdate {
        multiaddrs: vec![connection.remote_addr().clone()],
        metadata: HashMap::from([(LAST_DIAL_SUCCESS_KEY.to_string(), now_millis_bytes())]),
    };
    if let Err(err) = components.peer_store.merge(&connection.remote_peer(), update).await {
        warn!("dial queue: recording dial success for {} failed: {err}", connection.remote_peer());
    }
}

async fn record_dial_failure(components: &Components, peer_id: &PeerId) {
    let update = PeerUpdate::with_metadata(LAST_DIAL_FAILURE_KEY, now_millis_bytes());
    if let Err(err) = components.peer_store.merge(peer_id, update).await {
        warn!("dial queue: recording dial failure for {peer_id} failed: {err}");
    }
}
