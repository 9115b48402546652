use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use triggered::Listener;

use tern_p2p_lib::{AbortReason, AbortSignal};

/// Composes the per-dial timeout, the queue-wide shutdown and the job-level
/// abort into the single signal handed to address resolution and transport
/// dials. The timeout starts when the composer is created, i.e. when the job
/// begins executing rather than when it was submitted.
pub(crate) struct DialAbortController {
    signal: AbortSignal,
    watcher: JoinHandle<()>,
}

impl DialAbortController {
    pub(crate) fn new(timeout: Duration, shutdown: Listener, job_abort: Listener) -> Self {
        let (trigger, listener) = triggered::trigger();
        let reason: Arc<OnceLock<AbortReason>> = Arc::new(OnceLock::new());
        let signal = AbortSignal::from_parts(listener, reason.clone());
        let watcher = tokio::spawn(async move {
            let fired = tokio::select! {
                _ = tokio::time::sleep(timeout) => AbortReason::Timeout,
                _ = shutdown => AbortReason::Shutdown,
                _ = job_abort => AbortReason::QueueCleared,
            };
            let _ = reason.set(fired);
            trigger.trigger();
        });
        Self { signal, watcher }
    }

    pub(crate) fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Detach the composed listeners. Without this a watcher would linger for
    /// the full timeout after every short dial.
    pub(crate) fn clear(self) {}
}

impl Drop for DialAbortController {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}
