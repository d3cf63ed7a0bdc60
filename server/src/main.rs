use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use foreman_core::{Coordinator, SystemClock};
use foreman_database::SqliteStore;
use foreman_server::config::Config;
use foreman_server::http::{app, AppState};
use foreman_server::telemetry;

/// Coordination server for autonomous code-modifying agents.
#[derive(Parser, Debug)]
#[command(name = "foremand", version, about)]
struct Args {
    /// Path to a TOML config file (also CONFIG_FILE).
    #[arg(long)]
    config: Option<String>,

    /// SQLite database path (also DB_PATH).
    #[arg(long)]
    db: Option<String>,

    /// Listen port (also PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Bind address (also BIND).
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    if let Some(ref path) = args.config {
        // Flags beat the environment; from_env reads CONFIG_FILE.
        std::env::set_var("CONFIG_FILE", path);
    }
    let mut config = Config::from_env().context("configuration error")?;
    if let Some(db) = args.db {
        config.database.path = Some(db);
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    config.validate().context("invalid configuration")?;

    telemetry::init_telemetry(&config.logging)?;
    telemetry::log_startup_info(&config);

    let store = SqliteStore::new(&config.database_path())
        .await
        .context("failed to open database")?;
    store.migrate().await.context("failed to migrate database")?;

    let coordinator = Arc::new(Coordinator::new(Arc::new(store), Arc::new(SystemClock)));
    let state = Arc::new(AppState::new(coordinator, Arc::new(config.clone())));

    let address = config.server_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    tracing::info!(%address, "listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("failed to install ctrl-c handler");
        // Without a signal handler, run until killed.
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
