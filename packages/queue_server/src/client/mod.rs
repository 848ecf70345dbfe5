//! Viewer side of the queue channel.
//!
//! - `timer`: the cancellable confirmation delay
//! - `promoter`: optimistic promotion wired to a real clock
//! - `session`: WebSocket connection, reconnect and teacher commands

pub mod promoter;
pub mod session;
pub mod timer;

pub use promoter::PromotionDriver;
pub use session::{
    ActionCooldown, Backoff, ConnectionStatus, SessionCommand, SessionError, SessionEvent,
    run_watch_session,
};
pub use timer::{ConfirmationTimer, TimerFired};
