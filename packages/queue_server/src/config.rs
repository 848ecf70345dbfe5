use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// =============================================================================
// Tunable config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [queue]
//                    max_parents = 12
//
//   env var:         PTC_QUEUE__MAX_PARENTS=12   (double underscore = nesting)

pub const DEFAULT_PORT: u16 = 5000;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub queue: QueueFileConfig,
    #[serde(default)]
    pub client: ClientFileConfig,
}

/// Lives under `[server]` in config.toml.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    #[serde(default = "default_send_channel_capacity")]
    pub send_channel_capacity: usize,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            broadcast_capacity: default_broadcast_capacity(),
            send_channel_capacity: default_send_channel_capacity(),
        }
    }
}

/// Lives under `[queue]` in config.toml.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueFileConfig {
    /// Roster + initial queues. Relative paths resolve against the data dir.
    #[serde(default)]
    pub seed_file: Option<PathBuf>,
    /// Maximum parties per teacher queue (0 = unlimited).
    #[serde(default = "default_max_parents")]
    pub max_parents: usize,
    /// Only teachers listed in the seed get a queue.
    #[serde(default = "default_strict_roster")]
    pub strict_roster: bool,
    /// With an open roster, how many unlisted teachers may get a queue.
    #[serde(default = "default_max_unlisted_queues")]
    pub max_unlisted_queues: usize,
}

impl Default for QueueFileConfig {
    fn default() -> Self {
        Self {
            seed_file: None,
            max_parents: default_max_parents(),
            strict_roster: default_strict_roster(),
            max_unlisted_queues: default_max_unlisted_queues(),
        }
    }
}

/// Lives under `[client]` in config.toml. Used by `ptc watch`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientFileConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_confirm_delay_ms")]
    pub confirm_delay_ms: u64,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_action_cooldown_ms")]
    pub action_cooldown_ms: u64,
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

impl Default for ClientFileConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            confirm_delay_ms: default_confirm_delay_ms(),
            heartbeat_secs: default_heartbeat_secs(),
            action_cooldown_ms: default_action_cooldown_ms(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

fn default_broadcast_capacity() -> usize {
    256
}
fn default_send_channel_capacity() -> usize {
    100
}
fn default_max_parents() -> usize {
    10
}
fn default_strict_roster() -> bool {
    true
}
fn default_max_unlisted_queues() -> usize {
    64
}
fn default_server_url() -> String {
    format!("http://127.0.0.1:{}", DEFAULT_PORT)
}
fn default_confirm_delay_ms() -> u64 {
    2000
}
fn default_heartbeat_secs() -> u64 {
    30
}
fn default_action_cooldown_ms() -> u64 {
    1000
}
fn default_reconnect_initial_ms() -> u64 {
    500
}
fn default_reconnect_max_ms() -> u64 {
    10_000
}

/// Build a figment that layers: defaults → config.toml → PTC_* env vars.
///
///   `PTC_SERVER__PORT=8080`        →  `server.port = 8080`
///   `PTC_CLIENT__CONFIRM_DELAY_MS` →  `client.confirm_delay_ms`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("PTC_").split("__"))
}

// =============================================================================
// Runtime config structs (derived from FileConfig)
// =============================================================================

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Room broadcast channel capacity per teacher
    pub broadcast_capacity: usize,
    /// Per-connection outbound message buffer
    pub send_channel_capacity: usize,
}

impl ServerConfig {
    pub fn from_file(fc: &ServerFileConfig) -> Self {
        Self {
            host: fc.host.clone().unwrap_or_else(|| "127.0.0.1".to_string()),
            port: fc.port.unwrap_or(DEFAULT_PORT),
            broadcast_capacity: fc.broadcast_capacity.max(1),
            send_channel_capacity: fc.send_channel_capacity.max(1),
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_file(&ServerFileConfig::default())
    }
}

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub seed_file: PathBuf,
    pub max_parents: Option<usize>,
    pub strict_roster: bool,
    pub max_unlisted_queues: usize,
}

impl QueueConfig {
    pub fn from_file(fc: &QueueFileConfig, data_dir: &Path) -> Self {
        let seed_file = match &fc.seed_file {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => data_dir.join(p),
            None => data_dir.join("teachers.json"),
        };
        Self {
            seed_file,
            max_parents: (fc.max_parents > 0).then_some(fc.max_parents),
            strict_roster: fc.strict_roster,
            max_unlisted_queues: fc.max_unlisted_queues,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub server_url: String,
    pub confirm_delay: Duration,
    pub heartbeat_interval: Duration,
    pub action_cooldown: Duration,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

impl ClientConfig {
    pub fn from_file(fc: &ClientFileConfig) -> Self {
        let reconnect_initial = Duration::from_millis(fc.reconnect_initial_ms.max(1));
        Self {
            server_url: fc.server_url.trim_end_matches('/').to_string(),
            confirm_delay: Duration::from_millis(fc.confirm_delay_ms),
            heartbeat_interval: Duration::from_secs(fc.heartbeat_secs.max(1)),
            action_cooldown: Duration::from_millis(fc.action_cooldown_ms),
            reconnect_initial,
            reconnect_max: Duration::from_millis(fc.reconnect_max_ms).max(reconnect_initial),
        }
    }

    /// WebSocket endpoint derived from the HTTP base URL.
    pub fn ws_url(&self) -> String {
        let base = if let Some(rest) = self.server_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.server_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.server_url.clone()
        };
        format!("{}/api/ws", base)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_file(&ClientFileConfig::default())
    }
}

// =============================================================================
// Directory layout (derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct PtcConfig {
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl PtcConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".ptc"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        let logs_dir = data_dir.join("logs");
        std::fs::create_dir_all(&logs_dir)
            .with_context(|| format!("Failed to create logs directory: {:?}", logs_dir))?;

        info!("Data directory: {}", data_dir.display());

        Ok(Self { data_dir, logs_dir })
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    pub fn load(&self) -> Result<FileConfig> {
        load_config(&self.data_dir)
            .extract()
            .context("Failed to load configuration")
    }

    /// Write `fc` as config.toml, returning the path written.
    pub fn write_config(&self, fc: &FileConfig) -> Result<PathBuf> {
        let path = self.config_toml_path();
        let body = toml::to_string_pretty(fc).context("Failed to serialize configuration")?;
        std::fs::write(&path, body)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(path)
    }
}
