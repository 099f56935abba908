mod file_config;

pub use file_config::FileConfig;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::ValueEnum;

use crate::server::RequestsLoggingLevel;

/// The CLI arguments a TOML config file may override.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
}

/// Fully resolved runtime configuration. File values win over CLI values
/// field by field; the database directory must already exist.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
}

impl AppConfig {
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = match file.db_dir.map(PathBuf::from).or_else(|| cli.db_dir.clone()) {
            Some(dir) => validated_db_dir(dir)?,
            None => bail!("db_dir must be specified via --db-dir or in config file"),
        };

        // A bad level name in the file is an error rather than a silent
        // fallback to the CLI value.
        let logging_level = match file.logging_level.as_deref() {
            Some(name) => parse_logging_level(name)?,
            None => cli.logging_level.clone(),
        };

        Ok(Self {
            db_dir,
            port: file.port.unwrap_or(cli.port),
            logging_level,
            frontend_dir_path: file
                .frontend_dir_path
                .or_else(|| cli.frontend_dir_path.clone()),
        })
    }

    pub fn user_db_path(&self) -> PathBuf {
        self.db_dir.join("users.db")
    }

    pub fn support_db_path(&self) -> PathBuf {
        self.db_dir.join("support.db")
    }
}

fn validated_db_dir(dir: PathBuf) -> Result<PathBuf> {
    if !dir.exists() {
        bail!("Database directory does not exist: {:?}", dir);
    }
    if !dir.is_dir() {
        bail!("db_dir is not a directory: {:?}", dir);
    }
    Ok(dir)
}

fn parse_logging_level(name: &str) -> Result<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(name, true)
        .map_err(|_| anyhow::anyhow!("Unknown logging level '{}'", name))
}
