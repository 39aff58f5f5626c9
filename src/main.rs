// ABOUTME: Main entry point for the syncscript collaborative vault server
// ABOUTME: Loads configuration, opens storage, wires shared state and serves HTTP and WebSocket traffic

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod auth;
mod auth_helpers;
mod config;
mod entities;
mod error;
mod invites;
mod middleware;
mod migration;
mod permissions;
mod realtime;
mod seed;
mod server;
mod session;
mod socket;
mod sources;
mod storage;
mod types;
mod uploads;
mod validation;
mod vaults;

#[cfg(test)]
mod integration_tests;

use config::ServerConfig;
use realtime::Hub;
use session::SessionStore;
use storage::Storage;
use uploads::LocalFileStore;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub sessions: SessionStore,
    pub hub: Arc<Hub>,
    pub files: Arc<LocalFileStore>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub async fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let storage = Storage::connect(&config.database_url).await?;
        let files = LocalFileStore::open(config.upload_dir.clone()).await?;

        Ok(Self {
            storage: Arc::new(storage),
            sessions: SessionStore::new(config.session_max_age_secs),
            hub: Arc::new(Hub::new()),
            files: Arc::new(files),
            config: Arc::new(config),
        })
    }
}

#[derive(Parser)]
#[command(name = "syncscript", about = "Collaborative source vault server")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "syncscript.toml")]
    config: PathBuf,

    /// Listen address override
    #[arg(short, long)]
    listen: Option<String>,

    /// Database URL override
    #[arg(short, long)]
    database: Option<String>,

    /// Upload directory override
    #[arg(long)]
    upload_dir: Option<PathBuf>,

    /// Insert demo users and vaults before serving
    #[arg(long)]
    seed_demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut cfg = if cli.config.exists() {
        ServerConfig::load(&cli.config)?
    } else {
        tracing::info!("No config file found, using defaults");
        ServerConfig::default()
    };

    if let Some(listen) = cli.listen {
        cfg.listen_addr = listen;
    }
    if let Some(database) = cli.database {
        cfg.database_url = database;
    }
    if let Some(upload_dir) = cli.upload_dir {
        cfg.upload_dir = upload_dir;
    }

    let state = AppState::new(cfg).await?;

    if cli.seed_demo {
        seed::seed_demo(&state.storage).await?;
    }

    server::spawn_session_cleanup(state.sessions.clone());

    let listen_addr = state.config.listen_addr.clone();
    let app = server::build_router(state)?;

    let listener = TcpListener::bind(&listen_addr).await?;
    tracing::info!("Syncscript listening on http://{}", listen_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
