//! Fireline Fusion server entrypoint.
//!
//! Wires configuration, the Postgres pool (with embedded migrations),
//! the shared application state, and the HTTP/WebSocket router, then
//! serves until `ctrl_c`/`SIGTERM`, mirroring the teacher's `main.rs`
//! lifecycle: a single `CancellationToken` broadcast from the signal
//! handler that every background task (`stream::heartbeat_loop`, mission
//! lifecycle timers) `select!`s against.

use clap::Parser;
use fireline_fusion::config::AppConfig;
use fireline_fusion::store::memory::InMemoryStore;
use fireline_fusion::store::postgres::PostgresStore;
use fireline_fusion::store::Store;
use fireline_fusion::{api, stream};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fireline-fusion", about = "Wildfire sensor fusion and mission dispatch platform")]
struct Cli {
    /// Overrides DATABASE_URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Overrides BIND_ADDRESS / PORT.
    #[arg(long)]
    bind_address: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Run against an in-memory store instead of Postgres. Intended for
    /// local smoke tests; production deployments always use Postgres.
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    let config = Arc::new(AppConfig::from_env(
        cli.database_url.clone(),
        cli.bind_address.clone(),
        cli.port,
    )?);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    info!(bind_address = %config.bind_address, "starting fireline-fusion");

    let store: Arc<dyn Store> = if cli.in_memory {
        warn!("running with the in-memory store; records do not survive a restart");
        Arc::new(InMemoryStore::new())
    } else {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(&config.database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Arc::new(PostgresStore::new(pool))
    };

    let shutdown = CancellationToken::new();

    let (app, stream_registry) = api::build(store, config.clone(), shutdown.clone());
    tokio::spawn(stream::heartbeat_loop(stream_registry, shutdown.clone()));

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(addr = %listener.local_addr()?, "listening");

    let shutdown_signal = {
        let shutdown = shutdown.clone();
        async move {
            let ctrl_c = async {
                tokio::signal::ctrl_c().await.ok();
            };
            #[cfg(unix)]
            let terminate = async {
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to install SIGTERM handler")
                    .recv()
                    .await;
            };
            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => info!("received ctrl-c, shutting down"),
                _ = terminate => info!("received SIGTERM, shutting down"),
            }
            shutdown.cancel();
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("fireline-fusion shutdown complete");
    Ok(())
}
