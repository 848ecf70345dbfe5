//! Client-side optimistic promotion.
//!
//! A client shows a best-guess current party as soon as its queue has none,
//! then asks the server to confirm after a delay. The state here is pure: the
//! caller owns the clock and the timer and feeds events in.
//!
//! Lifecycle of one attempt:
//!
//! 1. [`ClientQueue::render_pass`] promotes the head of waiting locally and
//!    records a [`PromotionAttempt`].
//! 2. [`ClientQueue::begin_confirmation`] marks the confirmation as sent when
//!    the delay elapses.
//! 3. The attempt ends on the next snapshot ([`ClientQueue::apply_snapshot`])
//!    or on a matching rejection ([`ClientQueue::apply_rejection`]), which also
//!    suppresses auto-promotion until the next snapshot.

use std::time::Instant;

use crate::model::{EntryId, EntryStatus, QueueEntry, TeacherId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionAttempt {
    pub candidate: EntryId,
    pub started_at: Instant,
    /// Set once the confirm request has gone out.
    pub confirmation_sent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionOutcome {
    /// The pending attempt was reverted and auto-promotion is suppressed.
    RolledBack(EntryId),
    /// The rejection did not concern this client's in-flight attempt.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct ClientQueue {
    teacher_id: TeacherId,
    authoritative: Vec<QueueEntry>,
    local: Vec<QueueEntry>,
    pending: Option<PromotionAttempt>,
    suppressed: bool,
}

impl ClientQueue {
    pub fn new(teacher_id: TeacherId) -> Self {
        Self {
            teacher_id,
            authoritative: Vec::new(),
            local: Vec::new(),
            pending: None,
            suppressed: false,
        }
    }

    pub fn teacher_id(&self) -> &TeacherId {
        &self.teacher_id
    }

    /// What should be displayed right now, optimistic guess included.
    pub fn local(&self) -> &[QueueEntry] {
        &self.local
    }

    /// The last snapshot received from the server.
    pub fn authoritative(&self) -> &[QueueEntry] {
        &self.authoritative
    }

    pub fn pending(&self) -> Option<&PromotionAttempt> {
        self.pending.as_ref()
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        self.local.iter().find(|e| e.is_current())
    }

    /// Replace all local state with a server snapshot.
    ///
    /// Returns the attempt that was superseded, if any, so the caller can
    /// cancel its timer.
    pub fn apply_snapshot(&mut self, entries: Vec<QueueEntry>) -> Option<PromotionAttempt> {
        self.local = entries.clone();
        self.authoritative = entries;
        self.suppressed = false;
        self.pending.take()
    }

    /// Optimistically promote the head of waiting when nobody is current.
    ///
    /// Returns the promoted entry when a new attempt was started.
    pub fn render_pass(&mut self, now: Instant) -> Option<EntryId> {
        if self.pending.is_some() || self.suppressed || self.current().is_some() {
            return None;
        }
        let head = self.local.iter_mut().find(|e| e.is_waiting())?;
        head.status = EntryStatus::Current;
        let candidate = head.id.clone();
        self.pending = Some(PromotionAttempt {
            candidate: candidate.clone(),
            started_at: now,
            confirmation_sent: false,
        });
        Some(candidate)
    }

    /// Called when the confirmation delay for `candidate` elapses.
    ///
    /// Returns true if a confirm request should be sent now. A timer that
    /// outlived its attempt gets false.
    pub fn begin_confirmation(&mut self, candidate: &EntryId) -> bool {
        match self.pending.as_mut() {
            Some(attempt) if &attempt.candidate == candidate && !attempt.confirmation_sent => {
                attempt.confirmation_sent = true;
                true
            }
            _ => false,
        }
    }

    /// Handle a promotion-rejected event from the room.
    ///
    /// Only a rejection for our own in-flight confirmation is acted on. A
    /// rejection without an entry id is taken to refer to it.
    pub fn apply_rejection(&mut self, entry_id: Option<&EntryId>) -> RejectionOutcome {
        let matches = match (&self.pending, entry_id) {
            (Some(attempt), Some(id)) => attempt.confirmation_sent && &attempt.candidate == id,
            (Some(attempt), None) => attempt.confirmation_sent,
            (None, _) => false,
        };
        if !matches {
            return RejectionOutcome::Ignored;
        }
        let Some(attempt) = self.pending.take() else {
            return RejectionOutcome::Ignored;
        };

        if let Some(entry) = self
            .local
            .iter_mut()
            .find(|e| e.id == attempt.candidate && e.is_current())
        {
            entry.status = EntryStatus::Waiting;
        }
        self.suppressed = true;
        RejectionOutcome::RolledBack(attempt.candidate)
    }

    /// Drop optimistic state after the transport was lost.
    ///
    /// The next snapshot is treated as fully authoritative; until it arrives
    /// no promotion is attempted.
    pub fn reset_for_reconnect(&mut self) -> Option<PromotionAttempt> {
        self.local = self.authoritative.clone();
        self.suppressed = true;
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with(entries: Vec<QueueEntry>) -> ClientQueue {
        let mut client = ClientQueue::new(TeacherId::from("t1"));
        client.apply_snapshot(entries);
        client
    }

    fn statuses(client: &ClientQueue) -> Vec<(&str, EntryStatus)> {
        client
            .local()
            .iter()
            .map(|e| (e.id.as_str(), e.status))
            .collect()
    }

    #[test]
    fn promotes_head_when_nobody_current() {
        let mut client = client_with(vec![
            QueueEntry::waiting("P1", "A"),
            QueueEntry::waiting("P2", "B"),
        ]);
        let promoted = client.render_pass(Instant::now());
        assert_eq!(promoted, Some(EntryId::from("P1")));
        assert_eq!(
            statuses(&client),
            vec![("P1", EntryStatus::Current), ("P2", EntryStatus::Waiting)]
        );
        let attempt = client.pending().unwrap();
        assert_eq!(attempt.candidate, EntryId::from("P1"));
        assert!(!attempt.confirmation_sent);
        // authoritative copy is untouched
        assert!(client.authoritative().iter().all(|e| e.is_waiting()));
    }

    #[test]
    fn no_promotion_when_current_exists() {
        let mut client = client_with(vec![
            QueueEntry::current("P1", "A"),
            QueueEntry::waiting("P2", "B"),
        ]);
        assert_eq!(client.render_pass(Instant::now()), None);
        assert!(client.pending().is_none());
    }

    #[test]
    fn no_promotion_on_empty_queue() {
        let mut client = client_with(vec![]);
        assert_eq!(client.render_pass(Instant::now()), None);
        assert!(client.pending().is_none());
    }

    #[test]
    fn repeated_render_passes_keep_one_attempt() {
        let mut client = client_with(vec![QueueEntry::waiting("P1", "A")]);
        let started = Instant::now();
        assert!(client.render_pass(started).is_some());
        assert_eq!(client.render_pass(Instant::now()), None);
        assert_eq!(client.pending().unwrap().started_at, started);
    }

    #[test]
    fn snapshot_supersedes_pending_attempt() {
        let mut client = client_with(vec![QueueEntry::waiting("P1", "A")]);
        client.render_pass(Instant::now());
        let cancelled = client.apply_snapshot(vec![QueueEntry::current("P1", "A")]);
        assert_eq!(cancelled.map(|a| a.candidate), Some(EntryId::from("P1")));
        assert!(client.pending().is_none());
        assert_eq!(statuses(&client), vec![("P1", EntryStatus::Current)]);
    }

    #[test]
    fn begin_confirmation_only_once_and_only_for_pending() {
        let mut client = client_with(vec![QueueEntry::waiting("P1", "A")]);
        client.render_pass(Instant::now());
        assert!(!client.begin_confirmation(&EntryId::from("P2")));
        assert!(client.begin_confirmation(&EntryId::from("P1")));
        assert!(!client.begin_confirmation(&EntryId::from("P1")));
    }

    #[test]
    fn rejection_rolls_back_and_suppresses() {
        let mut client = client_with(vec![QueueEntry::waiting("P1", "A")]);
        client.render_pass(Instant::now());
        client.begin_confirmation(&EntryId::from("P1"));

        let outcome = client.apply_rejection(Some(&EntryId::from("P1")));
        assert_eq!(outcome, RejectionOutcome::RolledBack(EntryId::from("P1")));
        assert_eq!(statuses(&client), vec![("P1", EntryStatus::Waiting)]);
        assert!(client.is_suppressed());

        // no storm: render passes do nothing until the next snapshot
        assert_eq!(client.render_pass(Instant::now()), None);
        assert_eq!(client.render_pass(Instant::now()), None);

        client.apply_snapshot(vec![QueueEntry::waiting("P1", "A")]);
        assert!(!client.is_suppressed());
        assert_eq!(client.render_pass(Instant::now()), Some(EntryId::from("P1")));
    }

    #[test]
    fn rejection_for_other_entry_is_ignored() {
        let mut client = client_with(vec![
            QueueEntry::waiting("P1", "A"),
            QueueEntry::waiting("P2", "B"),
        ]);
        client.render_pass(Instant::now());
        client.begin_confirmation(&EntryId::from("P1"));
        assert_eq!(
            client.apply_rejection(Some(&EntryId::from("P2"))),
            RejectionOutcome::Ignored
        );
        assert!(client.pending().is_some());
        assert!(!client.is_suppressed());
    }

    #[test]
    fn rejection_before_confirmation_sent_is_ignored() {
        let mut client = client_with(vec![QueueEntry::waiting("P1", "A")]);
        client.render_pass(Instant::now());
        assert_eq!(
            client.apply_rejection(Some(&EntryId::from("P1"))),
            RejectionOutcome::Ignored
        );
        assert_eq!(statuses(&client), vec![("P1", EntryStatus::Current)]);
    }

    #[test]
    fn anonymous_rejection_applies_to_in_flight_attempt() {
        let mut client = client_with(vec![QueueEntry::waiting("P1", "A")]);
        client.render_pass(Instant::now());
        client.begin_confirmation(&EntryId::from("P1"));
        assert_eq!(
            client.apply_rejection(None),
            RejectionOutcome::RolledBack(EntryId::from("P1"))
        );
    }

    #[test]
    fn reconnect_discards_optimistic_state() {
        let mut client = client_with(vec![QueueEntry::waiting("P1", "A")]);
        client.render_pass(Instant::now());
        let dropped = client.reset_for_reconnect();
        assert!(dropped.is_some());
        assert_eq!(statuses(&client), vec![("P1", EntryStatus::Waiting)]);
        assert_eq!(client.render_pass(Instant::now()), None);
    }
}
