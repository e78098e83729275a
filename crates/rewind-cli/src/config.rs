use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};

/// Bucket used for remote snapshots when the config names none.
pub const DEFAULT_BUCKET: &str = "rewind-versions";

/// User-level configuration loaded from `~/.config/rewind/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the data directory (key, credentials, local snapshots).
    pub data_dir: Option<PathBuf>,
    /// Remote snapshot bucket settings.
    pub remote: Option<RemoteConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct RemoteConfig {
    pub bucket: Option<String>,
    /// S3-compatible endpoint; AWS when absent.
    pub endpoint: Option<String>,
    /// Falls back to the region stored with the credentials.
    pub region: Option<String>,
}

impl Config {
    pub fn bucket(&self) -> &str {
        self.remote
            .as_ref()
            .and_then(|r| r.bucket.as_deref())
            .unwrap_or(DEFAULT_BUCKET)
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.remote.as_ref().and_then(|r| r.endpoint.as_deref())
    }

    pub fn region(&self) -> Option<&str> {
        self.remote.as_ref().and_then(|r| r.region.as_deref())
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("rewind").join("config.toml"))
}

/// Write the given config to the default path unless a file is already there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    let path = default_path()?;
    write_to_path_if_missing(config, &path)?;
    Ok(path)
}

/// Returns whether a file was written; existing files are left untouched.
pub fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(true)
}
