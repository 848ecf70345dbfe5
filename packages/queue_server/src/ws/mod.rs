//! Room-scoped real-time queue channel
//!
//! Each connection follows at most one teacher room at a time and receives:
//! - a full snapshot on join and after every committed mutation
//! - promotion rejections for that room
//! - direct replies to its own teacher actions and heartbeats

pub(crate) mod dispatch;
mod handler;
mod protocol;


pub use handler::handle_queue_ws;
pub use protocol::{ClientMessage, ServerMessage};
