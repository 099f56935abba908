use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Optional TOML configuration. Every field is optional and anything set
/// here wins over the corresponding CLI argument. Unknown keys are
/// rejected instead of ignored.
#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub frontend_dir_path: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
