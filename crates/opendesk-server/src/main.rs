//! Server entry point for Opendesk.
//!
//! Loads configuration from the environment (a `.env` file is honored,
//! command-line flags win), opens and migrates the database, seeds the demo
//! dataset on first run, and starts the HTTP server.
//!
//! A missing model-provider API key is deliberately not a startup error:
//! responder construction is deferred to first use, so the process comes up
//! and individual chat requests fail instead.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use opendesk_agent::{Orchestrator, OrchestratorConfig};
use opendesk_store::{Database, seed};
use opendesk_web::{WebConfig, WebServer};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Opendesk — multi-agent customer-support chat backend.
#[derive(Parser)]
#[command(name = "opendesk-server", version, about)]
struct Cli {
    /// Port to listen on (overrides PORT).
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database path (overrides OPENDESK_DB).
    #[arg(long)]
    db: Option<PathBuf>,

    /// Serve canned replies without calling the model provider
    /// (overrides OPENDESK_MOCK_MODE).
    #[arg(long)]
    mock: bool,

    /// Skip seeding the demo dataset.
    #[arg(long)]
    no_seed: bool,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("starting opendesk");

    // Resolve configuration: env first, flags override.
    let port = cli
        .port
        .or_else(|| env_var("PORT").and_then(|p| p.parse().ok()))
        .unwrap_or(3000);
    let db_path = cli
        .db
        .or_else(|| env_var("OPENDESK_DB").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("data/opendesk.db"));
    let mock_mode = cli.mock || env_flag("OPENDESK_MOCK_MODE");

    let api_key = env_var("OPENAI_API_KEY");
    if api_key.is_none() && !mock_mode {
        warn!("OPENAI_API_KEY is not set; chat requests will fail until it is provided");
    }

    let orchestrator_config = OrchestratorConfig {
        api_key,
        model: env_var("OPENDESK_MODEL").unwrap_or_else(|| "gpt-4-turbo-preview".into()),
        base_url: env_var("OPENAI_BASE_URL"),
        mock_mode,
    };

    let web_config = WebConfig {
        bind_addr: env_var("OPENDESK_BIND").unwrap_or_else(|| "127.0.0.1".into()),
        port,
        cors_origin: env_var("FRONTEND_ORIGIN").unwrap_or_else(|| "http://localhost:5173".into()),
    };

    // Open the store.
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("failed to create data directory")?;
    }
    let db = Database::open_and_migrate(db_path.clone())
        .await
        .context("failed to open database")?;
    info!(path = %db_path.display(), "store initialized");

    if !cli.no_seed {
        seed::seed_demo_data(&db)
            .await
            .context("failed to seed demo data")?;
    }

    if mock_mode {
        warn!("mock mode enabled — serving canned replies only");
    }

    let orchestrator = Arc::new(Orchestrator::new(db.clone(), orchestrator_config));
    let server = WebServer::new(web_config, orchestrator, db);

    info!(addr = %server.addr(), "opendesk ready");
    server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("server error: {e}"))?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Environment helpers
// ---------------------------------------------------------------------------

/// Read an environment variable, treating empty values as unset.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Read a boolean flag from the environment.
fn env_flag(name: &str) -> bool {
    env_var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
