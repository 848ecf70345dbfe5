use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use conference_queue::TeacherId;
use queue_server::config::{ClientConfig, FileConfig, PtcConfig, QueueConfig, ServerConfig};
use queue_server::metrics::ServerMetrics;
use queue_server::queue_registry::QueueRegistry;
use queue_server::seed::{Roster, load_roster};
use queue_server::{AppState, build_router, cli};

#[derive(Parser)]
#[command(name = "ptc")]
#[command(about = "Parent-teacher conference queue coordinator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Custom data directory (defaults to ~/.ptc)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the queue server in the foreground
    Serve(ServeArgs),

    /// Follow a teacher's queue, with c/s to complete or skip
    Watch(WatchArgs),

    /// Print a queue (or every queue) once
    Snapshot(SnapshotArgs),

    /// Show the effective configuration
    Config(ConfigArgs),
}

#[derive(Parser)]
struct ServeArgs {
    /// Port for the web server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Roster file (overrides config)
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Parser)]
struct WatchArgs {
    /// Teacher whose room to join
    #[arg(short, long)]
    teacher: String,

    /// Server base URL (overrides config)
    #[arg(long)]
    server: Option<String>,

    #[arg(short, long)]
    debug: bool,
}

#[derive(Parser)]
struct SnapshotArgs {
    /// Teacher to show (default: list every queue)
    #[arg(short, long)]
    teacher: Option<String>,

    /// Server base URL (overrides config)
    #[arg(long)]
    server: Option<String>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct ConfigArgs {
    /// Write the effective configuration to config.toml
    #[arg(long)]
    write: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = PtcConfig::new(cli.data_dir.clone())?;
    let file_config = config.load()?;

    match cli.command {
        Commands::Serve(args) => run_server(args, config, file_config).await,
        Commands::Watch(args) => {
            init_tracing(args.debug, false);
            let client = client_config(&file_config, args.server);
            cli::watch_command(client, TeacherId::new(args.teacher)).await
        }
        Commands::Snapshot(args) => {
            let client = client_config(&file_config, args.server);
            cli::snapshot_command(&client, args.teacher.map(TeacherId::new), args.json).await
        }
        Commands::Config(args) => cli::config_command(&config, &file_config, args.write),
    }
}

fn client_config(file_config: &FileConfig, server: Option<String>) -> ClientConfig {
    let mut fc = file_config.client.clone();
    if let Some(server) = server {
        fc.server_url = server;
    }
    ClientConfig::from_file(&fc)
}

fn init_tracing(debug: bool, server: bool) {
    let default_directive = match (debug, server) {
        (true, true) => "ptc=debug,queue_server=debug,tower_http=debug,info",
        (false, true) => "ptc=info,queue_server=info,tower_http=info,warn",
        (true, false) => "ptc=debug,queue_server=debug,warn",
        // The watcher owns stdout; only problems are logged.
        (false, false) => "warn",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

async fn run_server(args: ServeArgs, config: PtcConfig, mut file_config: FileConfig) -> Result<()> {
    init_tracing(args.debug, true);

    info!("Starting parent-teacher conference queue server");

    if let Some(port) = args.port {
        file_config.server.port = Some(port);
    }
    if let Some(host) = args.host {
        file_config.server.host = Some(host);
    }
    if let Some(seed) = args.seed {
        file_config.queue.seed_file = Some(seed);
    }

    let server_config = ServerConfig::from_file(&file_config.server);
    let queue_config = QueueConfig::from_file(&file_config.queue, &config.data_dir);

    let roster = if queue_config.seed_file.exists() {
        load_roster(&queue_config.seed_file)
            .with_context(|| format!("Failed to load roster {:?}", queue_config.seed_file))?
    } else {
        warn!(
            "No roster at {}, starting with no teachers",
            queue_config.seed_file.display()
        );
        Roster::default()
    };
    info!(
        teachers = roster.len(),
        strict = queue_config.strict_roster,
        max_parents = ?queue_config.max_parents,
        "Roster loaded"
    );

    let metrics = Arc::new(ServerMetrics::new());
    let registry = Arc::new(QueueRegistry::new(
        roster,
        &queue_config,
        server_config.broadcast_capacity,
        Some(metrics.clone()),
    ));

    let addr = server_config.bind_addr()?;
    let app = build_router(AppState {
        registry,
        metrics,
        server_config: Arc::new(server_config),
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Queue server listening on http://{}", actual_addr);
    info!("API endpoints:");
    info!("  GET    /api/queues                                  - List queues");
    info!("  GET    /api/queues/:teacher_id                      - Queue snapshot");
    info!("  POST   /api/queues/:teacher_id/complete             - Complete current");
    info!("  POST   /api/queues/:teacher_id/skip                 - Skip current");
    info!("  POST   /api/queues/:teacher_id/entries              - Add a party");
    info!("  DELETE /api/queues/:teacher_id/entries/:entry_id    - Remove a party");
    info!("  GET    /api/queues/:teacher_id/entries/:id/position - Parties ahead");
    info!("  GET    /api/ws                                      - Room WebSocket");
    info!("  GET    /health, /health/live, /health/ready, /metrics");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}
