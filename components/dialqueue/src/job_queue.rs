use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::future::BoxFuture;
use libp2p_identity::PeerId;
use log::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::watch;
use triggered::{Listener, Trigger};

use tern_p2p_lib::{AbortReason, AbortSignal, Connection};

use crate::error::DialError;
use crate::metrics::DialMetrics;
use crate::progress::{DialProgress, OnProgress};

pub(crate) type JobOutcome = Result<Connection, DialError>;
pub(crate) type JobWork = Box<dyn FnOnce(DialJob) -> BoxFuture<'static, JobOutcome> + Send>;

pub(crate) struct JobOptions {
    pub priority: u32,
    pub on_progress: Option<OnProgress>,
}

/// Handle to one scheduled dial. All callers that dial an overlapping target
/// hold clones of the same job; the outcome is broadcast through a watch cell
/// so every waiter observes the identical result.
#[derive(Clone)]
pub(crate) struct DialJob {
    inner: Arc<JobInner>,
}

struct JobInner {
    id: u64,
    peer_id: Option<PeerId>,
    priority: u32,
    /// Stringified candidate addresses in discovery order, grown when later
    /// callers join the job.
    addrs: Mutex<Vec<String>>,
    on_progress: Mutex<Vec<OnProgress>>,
    work: Mutex<Option<JobWork>>,
    waiters: AtomicUsize,
    abort_trigger: Trigger,
    abort_listener: Listener,
    result_tx: watch::Sender<Option<JobOutcome>>,
    result_rx: watch::Receiver<Option<JobOutcome>>,
}

impl DialJob {
    fn new(id: u64, peer_id: Option<PeerId>, addrs: Vec<String>, options: JobOptions, work: JobWork) -> Self {
        let (abort_trigger, abort_listener) = triggered::trigger();
        let (result_tx, result_rx) = watch::channel(None);
        Self {
            inner: Arc::new(JobInner {
                id,
                peer_id,
                priority: options.priority,
                addrs: Mutex::new(addrs),
                on_progress: Mutex::new(options.on_progress.into_iter().collect()),
                work: Mutex::new(Some(work)),
                waiters: AtomicUsize::new(0),
                abort_trigger,
                abort_listener,
                result_tx,
                result_rx,
            }),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    pub(crate) fn peer_id(&self) -> Option<PeerId> {
        self.inner.peer_id
    }

    pub(crate) fn priority(&self) -> u32 {
        self.inner.priority
    }

    pub(crate) fn addrs(&self) -> Vec<String> {
        self.inner.addrs.lock().clone()
    }

    /// Union new candidate addresses into the job, preserving insertion order.
    /// Addresses added after the job started calculating are ignored by that
    /// calculation; they still count for overlap matching.
    pub(crate) fn add_addrs(&self, addrs: impl IntoIterator<Item = String>) {
        let mut own = self.inner.addrs.lock();
        for addr in addrs {
            if !own.contains(&addr) {
                own.push(addr);
            }
        }
    }

    pub(crate) fn add_progress_listener(&self, on_progress: OnProgress) {
        self.inner.on_progress.lock().push(on_progress);
    }

    pub(crate) fn emit_progress(&self, event: DialProgress) {
        for on_progress in self.inner.on_progress.lock().iter() {
            on_progress(event.clone());
        }
    }

    /// Fires the job-level abort, cancelling the composite signal of a
    /// running job.
    pub(crate) fn abort(&self) {
        self.inner.abort_trigger.trigger();
    }

    pub(crate) fn abort_listener(&self) -> Listener {
        self.inner.abort_listener.clone()
    }

    /// Whether a dial for `peer_id`/`addrs` should coalesce onto this job.
    /// Overlap means an equal peer id or a shared address string, and only
    /// counts when the peer ids are compatible: equal, or at least one side
    /// absent. Conflicting peer ids never join, even on a shared address.
    fn matches(&self, peer_id: Option<&PeerId>, addrs: &[String]) -> bool {
        match (self.inner.peer_id.as_ref(), peer_id) {
            (Some(own), Some(target)) if own == target => return true,
            (Some(own), Some(target)) if own != target => return false,
            _ => {}
        }
        let own = self.inner.addrs.lock();
        addrs.iter().any(|addr| own.contains(addr))
    }

    fn complete(&self, outcome: JobOutcome) -> bool {
        self.inner.result_tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(outcome);
                true
            } else {
                false
            }
        })
    }

    fn is_complete(&self) -> bool {
        self.inner.result_rx.borrow().is_some()
    }

    fn take_work(&self) -> Option<JobWork> {
        self.inner.work.lock().take()
    }

    fn register_waiter(&self) {
        self.inner.waiters.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns the number of waiters left after this one detaches.
    fn unregister_waiter(&self) -> usize {
        self.inner.waiters.fetch_sub(1, Ordering::SeqCst) - 1
    }
}

/// Bounded-concurrency executor for dial jobs: at most `concurrency` jobs run
/// at once, the rest wait in priority order (higher first, FIFO for ties).
#[derive(Clone)]
pub(crate) struct JobQueue {
    shared: Arc<QueueShared>,
}

struct QueueShared {
    concurrency: usize,
    max_length: usize,
    metrics: Arc<DialMetrics>,
    state: Mutex<QueueState>,
}

struct QueueState {
    next_id: u64,
    pending: Vec<DialJob>,
    running: Vec<DialJob>,
}

impl JobQueue {
    pub(crate) fn new(concurrency: usize, max_length: usize, metrics: Arc<DialMetrics>) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                concurrency: concurrency.max(1),
                max_length,
                metrics,
                state: Mutex::new(QueueState { next_id: 1, pending: Vec::new(), running: Vec::new() }),
            }),
        }
    }

    /// Jobs submitted or running, i.e. not yet settled.
    pub(crate) fn size(&self) -> usize {
        let state = self.shared.state.lock();
        state.pending.len() + state.running.len()
    }

    pub(crate) fn queued(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    pub(crate) fn running(&self) -> usize {
        self.shared.state.lock().running.len()
    }

    /// The pending jobs in dispatch order.
    pub(crate) fn pending(&self) -> Vec<DialJob> {
        self.shared.state.lock().pending.clone()
    }

    /// Atomically coalesce onto a compatible in-flight job or enqueue a new
    /// one. Returns the job and whether an existing one was joined. `work` is
    /// only invoked for the new-job path.
    pub(crate) fn add_or_join(
        &self,
        peer_id: Option<PeerId>,
        addrs: Vec<String>,
        options: JobOptions,
        work: impl FnOnce() -> JobWork,
    ) -> Result<(DialJob, bool), DialError> {
        let job = {
            let mut state = self.shared.state.lock();
            if let Some(job) = state.running.iter().chain(state.pending.iter()).find(|job| job.matches(peer_id.as_ref(), &addrs)) {
                let job = job.clone();
                job.add_addrs(addrs);
                if let Some(on_progress) = options.on_progress {
                    job.add_progress_listener(on_progress);
                }
                return Ok((job, true));
            }
            if state.pending.len() + state.running.len() >= self.shared.max_length {
                return Err(DialError::QueueFull);
            }
            let id = state.next_id;
            state.next_id += 1;
            let job = DialJob::new(id, peer_id, addrs, options, work());
            let insert_at = state.pending.iter().position(|other| other.priority() < job.priority()).unwrap_or(state.pending.len());
            state.pending.insert(insert_at, job.clone());
            job
        };
        self.maybe_dispatch();
        Ok((job, false))
    }

    fn maybe_dispatch(&self) {
        loop {
            let job = {
                let mut state = self.shared.state.lock();
                if state.running.len() >= self.shared.concurrency || state.pending.is_empty() {
                    return;
                }
                let job = state.pending.remove(0);
                state.running.push(job.clone());
                job
            };
            let queue = self.clone();
            tokio::spawn(async move { queue.run_job(job).await });
        }
    }

    async fn run_job(&self, job: DialJob) {
        if !job.is_complete() {
            self.shared.metrics.record_started();
            let outcome = match job.take_work() {
                Some(work) => work(job.clone()).await,
                None => Err(DialError::Aborted(AbortReason::QueueCleared.as_str().to_string())),
            };
            if job.complete(outcome.clone()) {
                match &outcome {
                    Ok(connection) => {
                        self.shared.metrics.record_succeeded();
                        debug!("dial queue: job {} settled with connection to {}", job.id(), connection.remote_peer());
                    }
                    Err(err) if err.is_abort() => {
                        self.shared.metrics.record_aborted();
                        debug!("dial queue: job {} aborted: {err}", job.id());
                    }
                    Err(err) => {
                        self.shared.metrics.record_failed();
                        warn!("dial queue: job {} failed: {err}", job.id());
                    }
                }
            }
        }
        {
            let mut state = self.shared.state.lock();
            state.running.retain(|other| other.id() != job.id());
        }
        self.maybe_dispatch();
    }

    /// Wait for the job outcome. A caller-supplied signal detaches only this
    /// waiter; the job itself is aborted once its last waiter has gone.
    pub(crate) async fn join(&self, job: DialJob, signal: Option<AbortSignal>) -> JobOutcome {
        job.register_waiter();
        let mut result_rx = job.inner.result_rx.clone();
        let user = signal.unwrap_or_else(AbortSignal::never);
        tokio::select! {
            outcome = result_rx.wait_for(Option::is_some) => {
                job.unregister_waiter();
                let settled = outcome.ok().and_then(|guard| guard.as_ref().cloned());
                settled.unwrap_or_else(|| Err(DialError::Aborted(AbortReason::QueueCleared.as_str().to_string())))
            }
            _ = user.aborted() => {
                if job.unregister_waiter() == 0 {
                    self.remove_pending(&job);
                    job.abort();
                }
                Err(DialError::Aborted(AbortReason::User.as_str().to_string()))
            }
        }
    }

    fn remove_pending(&self, job: &DialJob) {
        let removed = {
            let mut state = self.shared.state.lock();
            let before = state.pending.len();
            state.pending.retain(|other| other.id() != job.id());
            before != state.pending.len()
        };
        if removed {
            job.complete(Err(DialError::Aborted(AbortReason::User.as_str().to_string())));
            job.take_work();
            self.shared.metrics.record_aborted();
        }
    }

    /// Queue shutdown: pending jobs settle with an abort error, running jobs'
    /// composite signals fire.
    pub(crate) fn abort(&self) {
        let (pending, running) = {
            let mut state = self.shared.state.lock();
            (std::mem::take(&mut state.pending), state.running.clone())
        };
        for job in pending {
            job.complete(Err(DialError::Aborted(AbortReason::QueueCleared.as_str().to_string())));
            job.take_work();
            job.abort();
            self.shared.metrics.record_aborted();
        }
        for job in running {
            job.abort();
        }
    }
}
