//! Cadence Player (cadence-player) - Main entry point
//!
//! Runs the playback orchestration core as a local service for the UI
//! process: restores the previous session, then serves the HTTP/SSE control
//! surface until interrupted.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use cadence_common::config::{self, LoggingConfig};
use cadence_common::events::EventBus;
use cadence_player::api::{self, AppContext};
use cadence_player::config::PlayerSettings;
use cadence_player::db;
use cadence_player::fs::{FileSystem, LocalFileSystem};
use cadence_player::library::DownloadRegistry;
use cadence_player::lyrics::LyricSynchronizer;
use cadence_player::playback::{BusSink, PlaybackEngine};
use cadence_player::plugin::{LocalFilePlugin, PluginHost};
use cadence_player::source::MediaSourceResolver;
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for cadence-player
#[derive(Parser, Debug)]
#[command(name = "cadence-player")]
#[command(about = "Playback orchestration core for the Cadence player")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "CADENCE_PORT")]
    port: Option<u16>,

    /// Root folder holding the database
    #[arg(short, long, env = "CADENCE_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Bootstrap config file
    #[arg(short, long, env = "CADENCE_CONFIG")]
    config: Option<PathBuf>,
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins over the configured level. With `logging.file` set, output
/// is appended to that file instead of stderr.
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.filter_directives()));
    let registry = tracing_subscriber::registry().with(filter);

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Loaded before the subscriber exists, so config warnings are not logged
    let toml_config = config::load_or_default(args.config.as_deref());
    init_tracing(&toml_config.logging)?;

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    let db_path = config::resolve_database_path(&root_folder, &toml_config);
    let port = args.port.unwrap_or(toml_config.port);

    info!("Starting Cadence Player on port {}", port);
    info!("Root folder: {}", root_folder.display());

    let pool = db::open_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let settings = PlayerSettings::load(&pool)
        .await
        .context("Failed to load player settings")?;

    let events = Arc::new(EventBus::default());
    let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem);

    let registry = Arc::new(DownloadRegistry::new(
        pool.clone(),
        Arc::clone(&fs),
        Arc::clone(&events),
    ));
    let downloaded = registry
        .load()
        .await
        .context("Failed to load download library")?;
    info!("Download library: {} local files", downloaded);

    let plugins = Arc::new(PluginHost::new().with_plugin(Arc::new(LocalFilePlugin)));
    info!("Plugins: {:?}", plugins.platforms());

    let resolver = Arc::new(MediaSourceResolver::new(
        Arc::clone(&registry),
        Arc::clone(&plugins),
        fs,
    ));
    let lyrics = Arc::new(LyricSynchronizer::new(plugins, Arc::clone(&events)));
    let sink = Arc::new(BusSink::new(Arc::clone(&events)));

    let engine = Arc::new(PlaybackEngine::new(
        pool,
        settings,
        resolver,
        sink,
        lyrics,
        Arc::clone(&events),
    ));
    engine
        .setup()
        .await
        .context("Failed to restore playback session")?;
    info!("Playback engine initialized");

    let ctx = AppContext {
        engine: Arc::clone(&engine),
        registry,
        events,
    };
    api::run(port, ctx, shutdown_signal())
        .await
        .context("Server error")?;

    engine.shutdown();
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
