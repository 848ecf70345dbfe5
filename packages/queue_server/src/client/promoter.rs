//! Drives [`ClientQueue`] with a real clock and timer.
//!
//! The driver does no I/O. Server messages go in through
//! [`PromotionDriver::handle_server_message`]; the confirmation to send comes
//! out of [`PromotionDriver::confirm_due`] once the timer fires.

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use conference_queue::{ClientQueue, EntryId, QueueStats, RejectionOutcome, RenderState, TeacherId};

use crate::ws::{ClientMessage, ServerMessage};

use super::timer::{ConfirmationTimer, TimerFired};

pub struct PromotionDriver {
    queue: ClientQueue,
    /// Counts from the last snapshot, for the finished-party totals.
    stats: Option<QueueStats>,
    confirm_delay: Duration,
    timer: Option<ConfirmationTimer>,
    /// Number of attempts started so far; the live timer carries the latest.
    attempts: u64,
    fired_tx: mpsc::Sender<TimerFired>,
    fired_rx: mpsc::Receiver<TimerFired>,
}

impl PromotionDriver {
    pub fn new(teacher_id: TeacherId, confirm_delay: Duration) -> Self {
        let (fired_tx, fired_rx) = mpsc::channel(4);
        Self {
            queue: ClientQueue::new(teacher_id),
            stats: None,
            confirm_delay,
            timer: None,
            attempts: 0,
            fired_tx,
            fired_rx,
        }
    }

    pub fn queue(&self) -> &ClientQueue {
        &self.queue
    }

    pub fn teacher_id(&self) -> &TeacherId {
        self.queue.teacher_id()
    }

    pub fn render_state(&self) -> RenderState {
        RenderState::build(self.queue.local(), self.stats.as_ref())
    }

    /// Apply one message from the room. Returns true if the displayed queue
    /// may have changed.
    pub fn handle_server_message(&mut self, msg: &ServerMessage) -> bool {
        if msg.teacher_id() != Some(self.queue.teacher_id()) {
            return false;
        }
        match msg {
            ServerMessage::QueueSnapshot {
                queue,
                version,
                stats,
                ..
            } => {
                self.stats = Some(*stats);
                if let Some(superseded) = self.queue.apply_snapshot(queue.clone()) {
                    debug!(entry = %superseded.candidate, version, "Snapshot superseded pending promotion");
                }
                self.cancel_timer();
                self.render_pass();
                true
            }
            ServerMessage::PromotionRejected {
                entry_id, reason, ..
            } => match self.queue.apply_rejection(entry_id.as_ref()) {
                RejectionOutcome::RolledBack(candidate) => {
                    info!(entry = %candidate, %reason, "Promotion rejected, rolled back");
                    self.cancel_timer();
                    true
                }
                RejectionOutcome::Ignored => false,
            },
            _ => false,
        }
    }

    /// Try an optimistic promotion, arming the confirmation timer if one starts.
    pub fn render_pass(&mut self) -> Option<EntryId> {
        let now = tokio::time::Instant::now().into_std();
        let candidate = self.queue.render_pass(now)?;
        self.attempts += 1;
        debug!(
            entry = %candidate,
            attempt = self.attempts,
            delay_ms = self.confirm_delay.as_millis() as u64,
            "Optimistic promotion"
        );
        self.timer = Some(ConfirmationTimer::start(
            self.attempts,
            candidate.clone(),
            self.confirm_delay,
            self.fired_tx.clone(),
        ));
        Some(candidate)
    }

    /// Wait for a timer to fire. Pending forever if none is armed.
    pub async fn next_fired(&mut self) -> Option<TimerFired> {
        self.fired_rx.recv().await
    }

    /// The confirm request to send for a fired timer, if it is still wanted.
    ///
    /// Only the timer of the live attempt counts. A firing left in the channel
    /// by an earlier attempt for the same candidate is dropped.
    pub fn confirm_due(&mut self, fired: &TimerFired) -> Option<ClientMessage> {
        let live = self.timer.as_ref().map(ConfirmationTimer::attempt);
        if live != Some(fired.attempt) {
            debug!(entry = %fired.candidate, attempt = fired.attempt, "Ignoring stale timer");
            return None;
        }
        if !self.queue.begin_confirmation(&fired.candidate) {
            return None;
        }
        self.timer = None;
        Some(ClientMessage::ConfirmPromotion {
            teacher_id: self.queue.teacher_id().clone(),
            entry_id: fired.candidate.clone(),
        })
    }

    /// Forget optimistic state after the connection dropped.
    pub fn reset_for_reconnect(&mut self) {
        if let Some(attempt) = self.queue.reset_for_reconnect() {
            debug!(entry = %attempt.candidate, "Dropped pending promotion on disconnect");
        }
        self.cancel_timer();
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}
