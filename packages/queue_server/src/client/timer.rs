//! Cancellable confirmation delay.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use conference_queue::EntryId;

/// What a timer sends when its delay elapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    /// Sequence number of the attempt that armed the timer.
    pub attempt: u64,
    pub candidate: EntryId,
}

/// One armed confirmation delay for one candidate.
///
/// When the delay elapses a [`TimerFired`] is sent on the `fired` channel.
/// Cancelling (or dropping) the timer before then guarantees nothing is sent.
/// A firing that was already queued when the timer got cancelled can still be
/// read from the channel, so receivers match `attempt` against their own.
#[derive(Debug)]
pub struct ConfirmationTimer {
    attempt: u64,
    candidate: EntryId,
    cancel: CancellationToken,
}

impl ConfirmationTimer {
    pub fn start(
        attempt: u64,
        candidate: EntryId,
        delay: Duration,
        fired: mpsc::Sender<TimerFired>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let id = candidate.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    trace!(entry = %id, attempt, "Confirmation timer cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    if !token.is_cancelled() {
                        let _ = fired.send(TimerFired { attempt, candidate: id }).await;
                    }
                }
            }
        });

        Self {
            attempt,
            candidate,
            cancel,
        }
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn candidate(&self) -> &EntryId {
        &self.candidate
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ConfirmationTimer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
