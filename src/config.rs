use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Feature flags and identity of a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file path; `None` selects an in-memory store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Wiki scope stamped on every saved document
    pub wiki: String,
    /// Read class definitions from the dedicated class tables
    pub class_tables_read: bool,
    /// Persist class definitions to the dedicated class tables
    pub class_tables_write: bool,
    /// Honor per-class custom table mappings at all
    pub custom_mappings: bool,
    /// Allow injecting custom mappings into the live schema at runtime
    pub dynamic_custom_mappings: bool,
    /// Maintain the outbound link graph on save
    pub backlinks: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: None,
            wiki: "main".to_string(),
            class_tables_read: true,
            class_tables_write: false,
            custom_mappings: true,
            dynamic_custom_mappings: true,
            backlinks: true,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("folio.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<StoreConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: StoreConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &StoreConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}
