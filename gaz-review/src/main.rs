//! gaz-review - reconciliation review and index consolidation service
//!
//! Serves the review queue for contributed gazetteer records, applies
//! reviewer decisions and keeps the canonical cluster index consistent.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gaz_common::config::{load_module_config, RootFolderInitializer, RootFolderResolver};
use gaz_common::events::EventBus;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gaz_review::config::ReviewConfig;
use gaz_review::index::{ElasticIndex, IndexStore, MemoryIndex};
use gaz_review::AppState;

const MODULE_NAME: &str = "gaz-review";

/// Command-line arguments for gaz-review
#[derive(Parser, Debug)]
#[command(name = "gaz-review")]
#[command(about = "Reconciliation review and canonical index consolidation")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5791", env = "GAZ_REVIEW_PORT")]
    port: u16,

    /// Root folder holding the database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Search cluster base URL; omit for the in-process index
    #[arg(long)]
    index_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gaz_review=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting gaz-review on port {}", args.port);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = gaz_review::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    let toml_config = load_module_config(MODULE_NAME);
    let config = ReviewConfig::resolve(&db_pool, &toml_config, args.index_url).await?;

    let index: Arc<dyn IndexStore> = match &config.index_url {
        Some(url) => {
            let elastic = ElasticIndex::new(url, &config.index_name, config.index_timeout)
                .context("Failed to build index client")?;
            elastic
                .ensure_index()
                .await
                .with_context(|| format!("Index {} at {} not reachable", config.index_name, url))?;
            info!("Canonical index: {}/{}", url, config.index_name);
            Arc::new(elastic)
        }
        None => {
            warn!("No index URL configured, using in-process index (not persisted)");
            Arc::new(MemoryIndex::new())
        }
    };

    let event_bus = EventBus::new(100);
    let state = AppState::new(db_pool, index, event_bus, config);
    let app = gaz_review::build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
