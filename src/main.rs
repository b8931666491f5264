mod api;
mod classifier;
mod config;
mod error;
mod model;
mod predicate;
mod queue;
mod server;
mod watcher;
mod worker;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use server::Server;

#[derive(Parser)]
#[command(name = "eventspoold", version, about = "Spool-fed event ingest pipeline and read-only query server")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eventspool=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load(&cli.config)?;
    info!(path = %cli.config.display(), "loaded configuration");

    let server = Arc::new(Server::new(config));
    std::fs::create_dir_all(&server.config.files.directory)?;
    std::fs::create_dir_all(&server.config.global.output)?;

    let watcher_server = Arc::clone(&server);
    std::thread::spawn(move || watcher::run(watcher_server));

    let worker_handles = worker::spawn_pool(Arc::clone(&server));
    info!(count = worker_handles.len(), "spawned ingest workers");

    let bind: SocketAddr = server
        .config
        .api
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid api.bind address {}: {}", server.config.api.bind, e))?;

    let app = api::router(Arc::clone(&server));
    info!(%bind, "query server listening");
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| anyhow::anyhow!("unable to bind api.bind {}: {}", bind, e))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("http server error: {}", e))
}
