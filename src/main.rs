use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lp_experiments::config::Config;
use lp_experiments::error::GenerationError;
use lp_experiments::generate::GenerationClient;
use lp_experiments::server::{build_router, AppState};
use lp_experiments::storage::{SqliteStorage, Storage, User};

/// Landing-page A/B experiment tracking and analysis server
#[derive(Parser, Debug)]
#[command(name = "lp-experiments", version, about)]
struct Cli {
    /// Address to bind the HTTP server to (overrides BIND_ADDR)
    #[arg(long)]
    bind: Option<SocketAddr>,
    /// Path to the SQLite database file (overrides DATABASE_PATH)
    #[arg(long)]
    database: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account and print its API token
    CreateUser {
        /// Email address (unique)
        #[arg(long)]
        email: String,
        /// Display name
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(bind) = cli.bind {
        config.server.bind_addr = bind;
    }
    if let Some(database) = cli.database {
        config.database.path = database;
    }

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "LP experiment server starting..."
    );

    // Initialize storage
    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    // Admin subcommands run against the same database and exit.
    if let Some(Command::CreateUser { email, name }) = cli.command {
        let user = User::new(email.trim(), name.trim());
        storage.create_user(&user).await?;
        println!("id:        {}", user.id);
        println!("email:     {}", user.email);
        println!("api token: {}", user.api_token);
        return Ok(());
    }

    // Initialize the drafting client when configured
    let generator = match GenerationClient::new(&config.generation, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.generation.base_url, "Generation client initialized");
            Some(c)
        }
        Err(GenerationError::NotConfigured) => None,
        Err(e) => {
            error!(error = %e, "Failed to initialize generation client");
            return Err(e.into());
        }
    };

    // Create application state and the beacon worker
    let storage: Arc<dyn Storage> = Arc::new(storage);
    let (state, beacon_worker) = AppState::new(config.clone(), storage, generator);
    let state = Arc::new(state);

    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(config.server.bind_addr).await?;
    info!(addr = %config.server.bind_addr, "Server ready, accepting connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Dropping the last state handle closes the beacon queue; the worker
    // drains whatever is buffered before exiting.
    drop(state);
    if let Err(e) = beacon_worker.await {
        error!(error = %e, "Beacon worker terminated abnormally");
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        lp_experiments::config::LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        lp_experiments::config::LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
