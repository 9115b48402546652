use std::sync::Arc;

use tern_p2p_lib::Address;

/// Progress notifications emitted while a dial moves through the queue.
/// Emission is best-effort: callers that did not register a callback simply
/// see nothing.
#[derive(Clone, Debug)]
pub enum DialProgress {
    AlreadyConnected,
    AlreadyInDialQueue,
    AddToDialQueue,
    StartDial,
    CalculatedAddresses(Vec<Address>),
}

impl DialProgress {
    /// Stable event name, usable as a log or metric label.
    pub fn name(&self) -> &'static str {
        match self {
            DialProgress::AlreadyConnected => "dial-queue:already-connected",
            DialProgress::AlreadyInDialQueue => "dial-queue:already-in-dial-queue",
            DialProgress::AddToDialQueue => "dial-queue:add-to-dial-queue",
            DialProgress::StartDial => "dial-queue:start-dial",
            DialProgress::CalculatedAddresses(_) => "dial-queue:calculated-addresses",
        }
    }
}

pub type OnProgress = Arc<dyn Fn(DialProgress) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_stable() {
        assert_eq!(DialProgress::AlreadyConnected.name(), "dial-queue:already-connected");
        assert_eq!(DialProgress::AlreadyInDialQueue.name(), "dial-queue:already-in-dial-queue");
        assert_eq!(DialProgress::AddToDialQueue.name(), "dial-queue:add-to-dial-queue");
        assert_eq!(DialProgress::StartDial.name(), "dial-queue:start-dial");
        assert_eq!(DialProgress::CalculatedAddresses(Vec::new()).name(), "dial-queue:calculated-addresses");
    }
}
