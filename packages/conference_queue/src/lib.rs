//! Conference Queue - per-teacher visitor queue state machine
//!
//! This crate holds the pure, I/O-free core of the conference day queue:
//!
//! - [`TeacherQueue`]: the authoritative ordered queue for one teacher, with
//!   replace-on-write transitions (`complete`, `skip`, `confirm_promotion`, ...)
//! - [`ClientQueue`]: the client-side optimistic promotion state
//! - [`RenderState`]: what a display needs to show for a queue
//!
//! It has no async runtime and no transport knowledge. The server and the
//! watcher client in `queue_server` drive these types.
//!
//! # Example
//!
//! ```
//! use conference_queue::{EntryId, QueueEntry, TeacherQueue};
//!
//! let queue = TeacherQueue::from_entries(vec![
//!     QueueEntry::current("p1", "Ada Parent"),
//!     QueueEntry::waiting("p2", "Ben Parent"),
//! ])
//! .unwrap();
//!
//! let (next, _change) = queue.complete(None).unwrap();
//! assert_eq!(next.current().map(|e| e.id.clone()), Some(EntryId::from("p2")));
//! ```

mod error;
mod model;
pub mod promotion;
mod queue;
pub mod view;

pub use error::{ErrorKind, QueueError};
pub use model::{EntryId, EntryStatus, QueueEntry, TeacherId};
pub use promotion::{ClientQueue, PromotionAttempt, RejectionOutcome};
pub use queue::{QueueChange, QueueStats, TeacherQueue};
pub use view::RenderState;
