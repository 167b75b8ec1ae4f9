mod auth;
mod cli;
mod config;
mod error;
mod handlers;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tinyrepo_storage::BackendConfig;

use config::ServerConfig;
use state::AppState;

/// Small versioned artifact repository.
#[derive(Parser, Debug)]
#[command(name = "tinyrepo", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server, configured from the environment.
    Serve,
    /// Create or inspect access tokens.
    Token(cli::token::TokenArgs),
    /// Download an artifact from a server.
    Pull(cli::pull::PullArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve => serve().await,
        Commands::Token(args) => cli::token::run(args),
        Commands::Pull(args) => cli::pull::run(args).await,
    }
}

async fn serve() -> anyhow::Result<()> {
    info!("tinyrepo starting");

    let config = ServerConfig::from_env()?;
    let storage = tinyrepo_storage::from_config(&config.backend)?;
    match &config.backend {
        BackendConfig::Directory { path } => {
            info!(path = %path.display(), "Using local directory storage")
        }
        BackendConfig::S3(s3) => {
            info!(endpoint = %s3.endpoint, bucket = %s3.bucket, "Using S3 storage")
        }
    }

    let state = Arc::new(AppState::new(Arc::from(storage), config.jwt_secret));
    let app = routes::build_router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(port = config.port, "Listening on http://0.0.0.0:{}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("tinyrepo stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
