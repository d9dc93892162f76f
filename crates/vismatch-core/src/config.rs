//! Persisted config (storage paths, dimension, search defaults) in the app data directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::app_data;
use crate::embedding::DEFAULT_DIMENSION;
use crate::engine::StoragePaths;
use crate::matching::{DEFAULT_MIN_SIMILARITY, DEFAULT_TOP_K};

const CONFIG_FILENAME: &str = "config.toml";
const DEFAULT_INDEX_FILE: &str = "embeddings/index.bin";
const DEFAULT_METADATA_FILE: &str = "products.json";
/// 16 MiB, the upload limit of the serving layer.
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Index blob location. Defaults to `embeddings/index.bin` under the app data dir.
    pub index_path: Option<String>,
    /// Product metadata location. Defaults to `products.json` under the app data dir.
    pub metadata_path: Option<String>,
    /// Directory of catalog images (chosen by the user).
    pub catalog_root: Option<String>,
    pub dimension: usize,
    pub top_k: usize,
    pub min_similarity: f32,
    pub allowed_extensions: Vec<String>,
    pub max_image_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_path: None,
            metadata_path: None,
            catalog_root: None,
            dimension: DEFAULT_DIMENSION,
            top_k: DEFAULT_TOP_K,
            min_similarity: DEFAULT_MIN_SIMILARITY,
            allowed_extensions: ["png", "jpg", "jpeg", "gif", "webp"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

impl Config {
    /// Resolve the two artifact paths. Unset paths fall back to the app data
    /// directory; returns `None` only if one is unset and that directory is unknown.
    pub fn storage_paths(&self) -> Option<StoragePaths> {
        let index = match non_empty(&self.index_path) {
            Some(p) => PathBuf::from(p),
            None => app_data::app_data_dir()?.join(DEFAULT_INDEX_FILE),
        };
        let metadata = match non_empty(&self.metadata_path) {
            Some(p) => PathBuf::from(p),
            None => app_data::app_data_dir()?.join(DEFAULT_METADATA_FILE),
        };
        Some(StoragePaths::new(index, metadata))
    }

    pub fn catalog_root(&self) -> Option<PathBuf> {
        non_empty(&self.catalog_root).map(PathBuf::from)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Load config from the app data directory. Returns default config if missing or invalid.
pub fn load_config() -> Config {
    let Some(data_dir) = app_data::app_data_dir() else {
        return Config::default();
    };
    let path = data_dir.join(CONFIG_FILENAME);
    let Ok(s) = std::fs::read_to_string(&path) else {
        return Config::default();
    };
    toml::from_str(&s).unwrap_or_else(|e| {
        tracing::warn!("ignoring invalid config at {}: {}", path.display(), e);
        Config::default()
    })
}

/// Load config from an explicit file. Unlike [`load_config`], errors are reported.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    toml::from_str(&s).map_err(ConfigError::Parse)
}

/// Save config to the app data directory.
pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    let data_dir = app_data::app_data_dir().ok_or(ConfigError::NoDataDir)?;
    let path = data_dir.join(CONFIG_FILENAME);
    let s = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    std::fs::write(&path, s).map_err(ConfigError::Write)
}

/// Get the configured catalog image directory, if any.
pub fn get_catalog_root() -> Option<PathBuf> {
    load_config().catalog_root()
}

/// Set and persist the catalog image directory.
pub fn set_catalog_root(path: &Path) -> Result<(), ConfigError> {
    let path = path.canonicalize().map_err(ConfigError::Canonicalize)?;
    if !path.is_dir() {
        return Err(ConfigError::NotADirectory(path));
    }
    let mut config = load_config();
    config.catalog_root = Some(path.to_string_lossy().into_owned());
    save_config(&config)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine app data directory")]
    NoDataDir,
    #[error("failed to read config {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
    #[error("failed to resolve path: {0}")]
    Canonicalize(std::io::Error),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
}
