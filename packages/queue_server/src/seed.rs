//! Initial roster and queue snapshot provider.
//!
//! The seed file is a JSON array of teachers:
//!
//! ```json
//! [
//!   { "id": 12, "name": "Ms. Rivera",
//!     "queue": [ { "_id": "a1", "name": "Lee family", "status": "current" } ] }
//! ]
//! ```
//!
//! Entry ids may be given as `id` or `_id` and names as `name`,
//! `displayName` or `display_name`. Everything is normalized here so the rest
//! of the server only ever sees [`QueueEntry`].

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;

use conference_queue::{EntryStatus, QueueEntry, QueueError, TeacherId, TeacherQueue};

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read seed file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid seed JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("teacher {teacher}: entry #{index} has no id")]
    MissingEntryId { teacher: TeacherId, index: usize },

    #[error("teacher {teacher}: {source}")]
    Queue {
        teacher: TeacherId,
        source: QueueError,
    },
}

/// Ids show up as strings or bare numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTeacher {
    #[serde(alias = "_id")]
    id: RawId,
    #[serde(default, alias = "displayName", alias = "display_name")]
    name: Option<String>,
    #[serde(default)]
    queue: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    id: Option<RawId>,
    #[serde(default, rename = "_id")]
    legacy_id: Option<RawId>,
    #[serde(default, alias = "displayName", alias = "display_name")]
    name: Option<String>,
    #[serde(default)]
    status: Option<EntryStatus>,
}

#[derive(Debug, Clone)]
pub struct TeacherSeed {
    pub id: TeacherId,
    pub name: String,
    pub queue: TeacherQueue,
}

#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub teachers: Vec<TeacherSeed>,
}

impl Roster {
    pub fn len(&self) -> usize {
        self.teachers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teachers.is_empty()
    }
}

pub fn load_roster(path: &Path) -> Result<Roster, SeedError> {
    let body = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_roster(&body)
}

pub fn parse_roster(body: &str) -> Result<Roster, SeedError> {
    let raw: Vec<RawTeacher> = serde_json::from_str(body)?;
    let mut seen = HashSet::new();
    let mut teachers = Vec::with_capacity(raw.len());

    for teacher in raw {
        let id = TeacherId::new(teacher.id.into_string());
        if !seen.insert(id.clone()) {
            warn!(teacher = %id, "Duplicate teacher id in seed, skipping");
            continue;
        }

        let mut entries = Vec::with_capacity(teacher.queue.len());
        for (index, entry) in teacher.queue.into_iter().enumerate() {
            let entry_id = entry
                .id
                .or(entry.legacy_id)
                .map(RawId::into_string)
                .ok_or_else(|| SeedError::MissingEntryId {
                    teacher: id.clone(),
                    index,
                })?;
            let display_name = entry.name.unwrap_or_else(|| entry_id.clone());
            entries.push(QueueEntry::new(
                entry_id,
                display_name,
                entry.status.unwrap_or(EntryStatus::Waiting),
            ));
        }

        let queue = TeacherQueue::from_entries(entries).map_err(|source| SeedError::Queue {
            teacher: id.clone(),
            source,
        })?;

        teachers.push(TeacherSeed {
            name: teacher.name.unwrap_or_else(|| id.to_string()),
            id,
            queue,
        });
    }

    Ok(Roster { teachers })
}
