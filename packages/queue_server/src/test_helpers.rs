use std::path::PathBuf;
use std::sync::Arc;

use crate::AppState;
use crate::config::{QueueConfig, ServerConfig};
use crate::metrics::ServerMetrics;
use crate::queue_registry::QueueRegistry;
use crate::seed::parse_roster;

/// Two seeded teachers: `t1` meeting P1 with P2 and P3 waiting, `t2` idle.
pub const TEST_ROSTER: &str = r#"[
    {"id": "t1", "name": "Ms. Rivera", "queue": [
        {"id": "P1", "name": "Lee family", "status": "current"},
        {"id": "P2", "name": "Park family"},
        {"id": "P3", "name": "Diaz family"}
    ]},
    {"id": "t2", "name": "Mr. Okafor"}
]"#;

/// Build a fully-wired `AppState` over [`TEST_ROSTER`] with a strict roster.
pub fn test_state() -> AppState {
    let roster = parse_roster(TEST_ROSTER).expect("test roster");
    let config = QueueConfig {
        seed_file: PathBuf::from("teachers.json"),
        max_parents: Some(10),
        strict_roster: true,
        max_unlisted_queues: 8,
    };
    let metrics = Arc::new(ServerMetrics::new());
    let server_config = ServerConfig::default();
    let registry = QueueRegistry::new(
        roster,
        &config,
        server_config.broadcast_capacity,
        Some(metrics.clone()),
    );
    AppState {
        registry: Arc::new(registry),
        metrics,
        server_config: Arc::new(server_config),
    }
}

pub async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}
