/// Errors surfaced by the dial queue. The enum is `Clone` because one job
/// outcome is broadcast to every caller that joined the dial.
#[derive(Clone, Debug, thiserror::Error)]
pub enum DialError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("tried to dial self")]
    DialSelf,
    #[error("dial queue is full")]
    QueueFull,
    #[error("peer had more than {0} addresses to dial")]
    TooManyAddresses(usize),
    #[error("dial denied: {0}")]
    Denied(String),
    #[error("no valid addresses to dial")]
    NoValidAddresses,
    #[error("dial timed out: {0}")]
    Timeout(String),
    #[error("dial aborted: {0}")]
    Aborted(String),
    #[error("{0}")]
    Transport(String),
    #[error("all multiaddr dials failed")]
    Aggregate(Vec<DialError>),
    #[error("address resolution failed: {0}")]
    Resolve(String),
    #[error("peer store error: {0}")]
    PeerStore(String),
}

impl DialError {
    /// Abort-category errors are routine cancellations (caller went away,
    /// timeout fired, queue shut down) and are kept out of failure logging.
    pub fn is_abort(&self) -> bool {
        matches!(self, DialError::Aborted(_) | DialError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_strings_are_stable() {
        assert_eq!(DialError::DialSelf.to_string(), "tried to dial self");
        assert_eq!(DialError::QueueFull.to_string(), "dial queue is full");
        assert_eq!(DialError::Aggregate(vec![]).to_string(), "all multiaddr dials failed");
        assert_eq!(DialError::TooManyAddresses(25).to_string(), "peer had more than 25 addresses to dial");
    }

    #[test]
    fn abort_category_covers_cancellations_only() {
        assert!(DialError::Aborted("caller".into()).is_abort());
        assert!(DialError::Timeout("slow".into()).is_abort());
        assert!(!DialError::QueueFull.is_abort());
        assert!(!DialError::Transport("refused".into()).is_abort());
    }
}
