use crate::storage::{DataStoreProvider, SqliteProvider};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Store backend, by provider type name
    pub store: String,
    /// Directory holding one database file per schema
    pub data_dir: PathBuf,
    /// Keep every schema in memory instead of on disk
    pub in_memory: bool,
    /// Log every SQL statement
    pub log_sql: bool,
    /// Directory of SQL files referenced by script migration steps
    pub migration_scripts: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            store: "sqlite".to_string(),
            data_dir: PathBuf::from(".tablecache"),
            in_memory: false,
            log_sql: false,
            migration_scripts: None,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("tablecache.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<PersistenceConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: PersistenceConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &PersistenceConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_data_dir(config: &PersistenceConfig) -> anyhow::Result<()> {
    if config.in_memory {
        return Ok(());
    }
    if !config.data_dir.as_os_str().is_empty() && !config.data_dir.exists() {
        std::fs::create_dir_all(&config.data_dir)?;
    }
    Ok(())
}

/// Store provider selected by `config.store`.
pub fn store_provider(config: &PersistenceConfig) -> anyhow::Result<Arc<dyn DataStoreProvider>> {
    match config.store.as_str() {
        "sqlite" if config.in_memory => Ok(Arc::new(SqliteProvider::in_memory())),
        "sqlite" => {
            ensure_data_dir(config)?;
            Ok(Arc::new(SqliteProvider::new(&config.data_dir)))
        }
        other => anyhow::bail!("unsupported store type '{}' (available: sqlite)", other),
    }
}
