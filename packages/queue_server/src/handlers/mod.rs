pub mod health;
pub mod queues;
pub mod websocket;

// Re-export all handlers for easy route registration
pub use health::{health_handler, health_live_handler, health_ready_handler, metrics_handler};
pub use queues::{
    complete_current, enqueue_entry, entry_position, get_queue, list_queues, remove_entry,
    skip_current,
};
pub use websocket::queue_websocket_handler;
