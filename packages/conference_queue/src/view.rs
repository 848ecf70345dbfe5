//! Presentation adapter: turns a queue into what a display shows.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::QueueEntry;
use crate::queue::QueueStats;

/// How many waiting parties a display lists after the current one.
pub const UPCOMING_SHOWN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderState {
    pub current: Option<QueueEntry>,
    pub upcoming: Vec<QueueEntry>,
    pub waiting_total: usize,
    pub counts: QueueStats,
}

impl RenderState {
    /// Build from an ordered entry list. `history` supplies the completed and
    /// skipped tallies, which the entries alone cannot carry.
    pub fn build(entries: &[QueueEntry], history: Option<&QueueStats>) -> Self {
        let current = entries.iter().find(|e| e.is_current()).cloned();
        let waiting: Vec<&QueueEntry> = entries.iter().filter(|e| e.is_waiting()).collect();

        Self {
            upcoming: waiting
                .iter()
                .take(UPCOMING_SHOWN)
                .map(|e| (*e).clone())
                .collect(),
            waiting_total: waiting.len(),
            counts: QueueStats {
                waiting: waiting.len(),
                current: usize::from(current.is_some()),
                completed: history.map(|h| h.completed).unwrap_or(0),
                skipped: history.map(|h| h.skipped).unwrap_or(0),
            },
            current,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.waiting_total == 0
    }

    /// Waiting parties not listed in `upcoming`.
    pub fn hidden_waiting(&self) -> usize {
        self.waiting_total.saturating_sub(self.upcoming.len())
    }
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No parents in queue");
        }
        match &self.current {
            Some(entry) => writeln!(f, "Now meeting: {}", entry.display_name)?,
            None => writeln!(f, "Now meeting: (nobody)")?,
        }
        if !self.upcoming.is_empty() {
            writeln!(f, "Up next:")?;
            for (i, entry) in self.upcoming.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, entry.display_name)?;
            }
        }
        if self.hidden_waiting() > 0 {
            writeln!(f, "  ... and {} more", self.hidden_waiting())?;
        }
        write!(
            f,
            "waiting {} | current {} | completed {} | skipped {}",
            self.counts.waiting, self.counts.current, self.counts.completed, self.counts.skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shows_current_and_first_three_waiting() {
        let entries = vec![
            QueueEntry::current("P1", "Ada"),
            QueueEntry::waiting("P2", "Ben"),
            QueueEntry::waiting("P3", "Cy"),
            QueueEntry::waiting("P4", "Dee"),
            QueueEntry::waiting("P5", "Eve"),
        ];
        let view = RenderState::build(&entries, None);
        assert_eq!(view.current.as_ref().map(|e| e.id.as_str()), Some("P1"));
        let upcoming: Vec<_> = view.upcoming.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(upcoming, vec!["P2", "P3", "P4"]);
        assert_eq!(view.waiting_total, 4);
        assert_eq!(view.hidden_waiting(), 1);
        assert!(!view.is_empty());
    }

    #[test]
    fn empty_queue_renders_notice() {
        let view = RenderState::build(&[], None);
        assert!(view.is_empty());
        assert_eq!(view.to_string(), "No parents in queue\n");
    }

    #[test]
    fn counts_include_history() {
        let history = QueueStats {
            waiting: 0,
            current: 0,
            completed: 4,
            skipped: 2,
        };
        let view = RenderState::build(&[QueueEntry::waiting("P1", "Ada")], Some(&history));
        assert_eq!(view.counts.completed, 4);
        assert_eq!(view.counts.skipped, 2);
        assert_eq!(view.counts.waiting, 1);
        assert_eq!(view.counts.current, 0);
        let text = view.to_string();
        assert!(text.contains("Now meeting: (nobody)"));
        assert!(text.contains("1. Ada"));
    }
}
