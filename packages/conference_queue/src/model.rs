use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a queued party. Survives reordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Key of a teacher's queue (and of its real-time room).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeacherId(String);

impl TeacherId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TeacherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TeacherId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TeacherId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Waiting,
    Current,
    Completed,
    Skipped,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Current => "current",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parent party in a teacher's queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: EntryId,
    #[serde(rename = "displayName", alias = "display_name")]
    pub display_name: String,
    pub status: EntryStatus,
}

impl QueueEntry {
    pub fn new(id: impl Into<EntryId>, display_name: impl Into<String>, status: EntryStatus) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            status,
        }
    }

    pub fn waiting(id: impl Into<EntryId>, display_name: impl Into<String>) -> Self {
        Self::new(id, display_name, EntryStatus::Waiting)
    }

    pub fn current(id: impl Into<EntryId>, display_name: impl Into<String>) -> Self {
        Self::new(id, display_name, EntryStatus::Current)
    }

    pub fn is_current(&self) -> bool {
        self.status == EntryStatus::Current
    }

    pub fn is_waiting(&self) -> bool {
        self.status == EntryStatus::Waiting
    }

    pub(crate) fn with_status(&self, status: EntryStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}
