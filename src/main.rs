use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
use config::{AppConfig, CliConfig, FileConfig};

mod server;
use server::{run_server, RequestsLoggingLevel};

mod sqlite_persistence;

mod support;
use support::SqliteSupportStore;

mod user;
use user::SqliteUserStore;

/// Canonicalizes where possible and falls back to joining onto the
/// current directory, so paths stay valid after a later chdir. Paths
/// that do not exist yet are passed through untouched.
fn parse_path(s: &str) -> Result<PathBuf> {
    let raw = PathBuf::from(s);
    let resolved = match raw.canonicalize() {
        Ok(path) => path,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => raw,
        Err(err) => return Err(err).with_context(|| format!("Error resolving path: {}", s)),
    };
    if resolved.is_absolute() {
        Ok(resolved)
    } else {
        Ok(std::env::current_dir()?.join(resolved))
    }
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the SQLite database files (users.db, support.db).
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// TOML config file; its values override the CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// How much of each request to log.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Frontend directory to serve statically at the root.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };

    let cli_config = CliConfig {
        db_dir: cli_args.db_dir,
        port: cli_args.port,
        logging_level: cli_args.logging_level,
        frontend_dir_path: cli_args.frontend_dir_path,
    };

    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!(
        "Opening SQLite user database at {:?}...",
        config.user_db_path()
    );
    let user_store = Arc::new(SqliteUserStore::new(config.user_db_path())?);

    info!(
        "Opening SQLite support database at {:?}...",
        config.support_db_path()
    );
    let support_store = Arc::new(SqliteSupportStore::new(config.support_db_path())?);

    info!("Ready to serve at port {}!", config.port);
    run_server(
        user_store,
        support_store,
        config.logging_level,
        config.port,
        config.frontend_dir_path,
    )
    .await
}
