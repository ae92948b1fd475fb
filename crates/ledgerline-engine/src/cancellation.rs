//! Explicit cancellation for long-running operations.
//!
//! A [`CancellationSource`] is owned by whoever decides to stop (a signal
//! handler, a job scheduler); [`CancellationSignal`]s are cloned into the
//! operations that must check it.

use tokio::sync::watch;

/// Owning side of a cancellation signal.
#[derive(Debug)]
pub struct CancellationSource {
    sender: watch::Sender<bool>,
}

impl CancellationSource {
    /// Creates a source whose signals are not yet cancelled.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(false);
        Self { sender }
    }

    /// Returns a signal observing this source.
    #[must_use]
    pub fn signal(&self) -> CancellationSignal {
        CancellationSignal {
            receiver: Some(self.sender.subscribe()),
        }
    }

    /// Cancels every signal derived from this source.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Observing side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    receiver: Option<watch::Receiver<bool>>,
}

impl CancellationSignal {
    /// A signal that is never cancelled.
    #[must_use]
    pub fn never() -> Self {
        Self { receiver: None }
    }

    /// Returns `true` once the source has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.receiver.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_observes_cancel() {
        let source = CancellationSource::new();
        let signal = source.signal();
        assert!(!signal.is_cancelled());

        source.cancel();

        assert!(signal.is_cancelled());
        assert!(source.signal().is_cancelled());
    }

    #[test]
    fn test_never_is_not_cancelled() {
        assert!(!CancellationSignal::never().is_cancelled());
    }
}
