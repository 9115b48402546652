use std::sync::{Arc, OnceLock};

use triggered::{Listener, Trigger};

/// Why a signal fired. The reason is recorded before the listener is
/// triggered, so observers that see the signal aborted can always read it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbortReason {
    Timeout,
    Shutdown,
    User,
    QueueCleared,
}

impl AbortReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortReason::Timeout => "dial timed out",
            AbortReason::Shutdown => "dial queue shut down",
            AbortReason::User => "dial aborted by caller",
            AbortReason::QueueCleared => "dial queue cleared",
        }
    }
}

/// One-shot cancellation token. Cheap to clone; all clones observe the same
/// underlying trigger.
#[derive(Clone)]
pub struct AbortSignal {
    listener: Listener,
    reason: Arc<OnceLock<AbortReason>>,
}

impl AbortSignal {
    /// A caller-held token: abort via the returned handle.
    pub fn manual() -> (AbortHandle, AbortSignal) {
        let (trigger, listener) = triggered::trigger();
        let reason = Arc::new(OnceLock::new());
        (AbortHandle { trigger, reason: reason.clone() }, AbortSignal { listener, reason })
    }

    /// A signal that never fires.
    pub fn never() -> AbortSignal {
        let (_trigger, listener) = triggered::trigger();
        AbortSignal { listener, reason: Arc::new(OnceLock::new()) }
    }

    pub fn from_parts(listener: Listener, reason: Arc<OnceLock<AbortReason>>) -> AbortSignal {
        AbortSignal { listener, reason }
    }

    pub fn is_aborted(&self) -> bool {
        self.reason.get().is_some()
    }

    pub fn reason(&self) -> Option<AbortReason> {
        self.reason.get().copied()
    }

    /// Resolves when the signal fires. Never resolves for `never()` signals.
    pub async fn aborted(&self) -> AbortReason {
        self.listener.clone().await;
        self.reason().unwrap_or(AbortReason::User)
    }
}

pub struct AbortHandle {
    trigger: Trigger,
    reason: Arc<OnceLock<AbortReason>>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.abort_with(AbortReason::User);
    }

    pub fn abort_with(&self, reason: AbortReason) {
        let _ = self.reason.set(reason);
        self.trigger.trigger();
    }
}

/// A trigger/listener pair owned by one component, in the shape services use
/// for shutdown signalling.
pub struct SingleTrigger {
    pub trigger: Trigger,
    pub listener: Listener,
}

impl SingleTrigger {
    pub fn new() -> Self {
        let (trigger, listener) = triggered::trigger();
        Self { trigger, listener }
    }
}

impl Default for SingleTrigger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_signal_reports_reason() {
        let (handle, signal) = AbortSignal::manual();
        assert!(!signal.is_aborted());
        assert_eq!(signal.reason(), None);

        handle.abort();
        assert!(signal.is_aborted());
        assert_eq!(signal.reason(), Some(AbortReason::User));
        assert_eq!(signal.aborted().await, AbortReason::User);
    }

    #[tokio::test]
    async fn abort_with_keeps_first_reason() {
        let (handle, signal) = AbortSignal::manual();
        handle.abort_with(AbortReason::Shutdown);
        handle.abort_with(AbortReason::Timeout);
        assert_eq!(signal.reason(), Some(AbortReason::Shutdown));
    }

    #[test]
    fn never_signal_is_not_aborted() {
        let signal = AbortSignal::never();
        assert!(!signal.is_aborted());
    }
}
