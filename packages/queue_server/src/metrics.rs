//! Server metrics for observability
//!
//! Runtime counters for connections, queue mutations and promotion outcomes.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Connection metrics
    /// Currently active WebSocket connections
    pub active_connections: AtomicU64,
    /// Total connections since server start
    pub total_connections: AtomicU64,
    /// Room joins (including re-joins after reconnect)
    pub room_joins: AtomicU64,

    // Queue metrics
    pub completes: AtomicU64,
    pub skips: AtomicU64,
    pub promotions_confirmed: AtomicU64,
    pub promotions_rejected: AtomicU64,
    /// Teacher actions refused (nothing to do, stale, unknown queue)
    pub actions_rejected: AtomicU64,
    /// Snapshots pushed to rooms
    pub snapshots_broadcast: AtomicU64,

    // Message metrics
    pub messages_received: AtomicU64,
    /// Messages dropped because a connection lagged behind its room
    pub messages_dropped: AtomicU64,

    start_time: Option<Instant>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn room_joined(&self) {
        self.room_joins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn completed(&self) {
        self.completes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn skipped(&self) {
        self.skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn promotion_confirmed(&self) {
        self.promotions_confirmed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn promotion_rejected(&self) {
        self.promotions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn action_rejected(&self) {
        self.actions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot_broadcast(&self) {
        self.snapshots_broadcast.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_dropped(&self, n: u64) {
        self.messages_dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
                room_joins: self.room_joins.load(Ordering::Relaxed),
            },
            queue: QueueMetrics {
                completes: self.completes.load(Ordering::Relaxed),
                skips: self.skips.load(Ordering::Relaxed),
                promotions_confirmed: self.promotions_confirmed.load(Ordering::Relaxed),
                promotions_rejected: self.promotions_rejected.load(Ordering::Relaxed),
                actions_rejected: self.actions_rejected.load(Ordering::Relaxed),
                snapshots_broadcast: self.snapshots_broadcast.load(Ordering::Relaxed),
            },
            messages: MessageMetrics {
                received: self.messages_received.load(Ordering::Relaxed),
                dropped: self.messages_dropped.load(Ordering::Relaxed),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub queue: QueueMetrics,
    pub messages: MessageMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
    pub room_joins: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub completes: u64,
    pub skips: u64,
    pub promotions_confirmed: u64,
    pub promotions_rejected: u64,
    pub actions_rejected: u64,
    pub snapshots_broadcast: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub queues: QueueHealth,
    pub connections: u64,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueHealth {
    /// Teachers on the roster
    pub teachers: u64,
    /// Queues with a running actor
    pub active: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_tracking() {
        let metrics = ServerMetrics::new();

        metrics.connection_opened();
        metrics.connection_opened();
        assert_eq!(metrics.active_connections.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.total_connections.load(Ordering::Relaxed), 2);

        metrics.connection_closed();
        assert_eq!(metrics.active_connections.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.total_connections.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_snapshot() {
        let metrics = ServerMetrics::new();
        metrics.completed();
        metrics.promotion_rejected();
        metrics.messages_dropped(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.queue.completes, 1);
        assert_eq!(snapshot.queue.promotions_rejected, 1);
        assert_eq!(snapshot.messages.dropped, 3);
        assert_eq!(snapshot.connections.active, 0);
    }
}
