use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::authn::AuthnConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub authn: AuthnConfig,
}

impl ServerConfig {
    /// Reads a TOML configuration file. The authenticator mode is validated
    /// here so that a typo fails at startup rather than on first login.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(format!("invalid config: {e}")))?;
        config.authn.mode()?;
        Ok(config)
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("hubkeeper.db")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            authn: AuthnConfig::default(),
        }
    }
}
