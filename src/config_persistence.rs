//! Loading and saving `config.toml` under the user config directory.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::{sanitize_config, ArtworkConfig};

const APP_DIR_NAME: &str = "coverkeep";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no user config directory is available on this platform")]
    NoConfigDir,
    #[error("config file io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Default location: `<config_dir>/coverkeep/config.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoConfigDir)
}

/// Reads the config at `path`, writing defaults first when the file is missing.
/// A file that fails to parse falls back to defaults and is left untouched.
pub fn load_or_create_config(path: &Path) -> Result<ArtworkConfig, ConfigError> {
    if !path.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        let default_config = ArtworkConfig::default();
        save_config(path, &default_config)?;
        return Ok(default_config);
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = match toml::from_str::<ArtworkConfig>(&content) {
        Ok(config) => config,
        Err(error) => {
            warn!(
                "Failed to parse config at {}, using defaults: {}",
                path.display(),
                error
            );
            ArtworkConfig::default()
        }
    };
    Ok(sanitize_config(parsed))
}

pub fn save_config(path: &Path, config: &ArtworkConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let serialized = toml::to_string(config)?;
    fs::write(path, serialized).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
