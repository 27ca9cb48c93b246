//! Persisted configuration: `~/.unn/config.toml`, loaded with
//! `Config::load`/`load_or_default` and written back with `save`.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use unn_common::APP_QUALIFIER;

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub doors_dir: Option<PathBuf>,
    #[serde(default)]
    pub files_dir: Option<PathBuf>,
    #[serde(default)]
    pub stun_servers: Vec<String>,
}

impl Config {
    fn default_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER.0, APP_QUALIFIER.1, APP_QUALIFIER.2)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        debug!("load room config");
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path().ok_or_else(|| anyhow::anyhow!("could not determine config dir"))?,
        };
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn load_or_default(path: Option<&Path>) -> Self {
        Self::load(path).unwrap_or_else(|error| {
            warn!(%error, "no room config loaded, starting with defaults");
            Config::default()
        })
    }

    pub fn save(&self, path: Option<&Path>) -> anyhow::Result<()> {
        debug!("save room config");
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path().ok_or_else(|| anyhow::anyhow!("could not determine config dir"))?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string(self)?)?;
        Ok(())
    }
}
