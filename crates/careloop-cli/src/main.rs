use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use careloop_config::{AppConfig, ConfigLoader};
use careloop_db::{PatientStore, RecordStore, ScheduleStore, SessionStore};
use careloop_gateway::{AppState, GatewayServer};
use careloop_security::RedactingWriter;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "careloop",
    version,
    about = "Patient outreach gateway for diabetes self-management"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "careloop.toml")]
    config: PathBuf,

    /// Override the configured SQLite database path.
    #[arg(long, global = true, env = "CARELOOP_DB_PATH")]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook gateway and the outreach firing loop (default).
    Serve {
        /// Override the configured bind address, e.g. 0.0.0.0:3970.
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Create the database file and all tables, then exit.
    InitDb,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(RedactingWriter::stderr())
        .init();

    let cli = Cli::parse();
    let mut config = ConfigLoader::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    if let Some(db_path) = cli.db_path {
        config.database.path = db_path;
    }

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => serve(config, bind).await,
        Command::InitDb => init_db(&config),
    }
}

async fn serve(config: AppConfig, bind: Option<SocketAddr>) -> anyhow::Result<()> {
    let addr = match bind {
        Some(addr) => addr,
        None => format!("{}:{}", config.gateway.host, config.gateway.port)
            .parse()
            .context("invalid gateway host/port in config")?,
    };

    let state = Arc::new(AppState::new(config).context("failed to initialize state")?);
    GatewayServer::new(state)
        .run(addr)
        .await
        .context("gateway exited with error")?;
    Ok(())
}

fn init_db(config: &AppConfig) -> anyhow::Result<()> {
    let path = PathBuf::from(&config.database.path);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    // Each store runs its own idempotent migrations on open.
    PatientStore::open(&path).context("patient store migration failed")?;
    RecordStore::open(&path).context("record store migration failed")?;
    ScheduleStore::open(&path).context("schedule store migration failed")?;
    SessionStore::open(&path).context("session store migration failed")?;

    info!("database initialized at {}", path.display());
    Ok(())
}
