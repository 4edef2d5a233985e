//! Configuration and path detection

mod paths;

pub use paths::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::profile::{GameVariant, LiveTarget};
use crate::remote::DEFAULT_API_BASE;

/// Environment variable that overrides the configured access token
pub const ACCESS_TOKEN_ENV: &str = "ADDONSYNC_ACCESS_TOKEN";

const APP_DIR: &str = "addonsync";

fn default_backup_keep() -> usize {
    10
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

/// Remote store settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Bearer token for the Drive application-data folder
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            api_base: default_api_base(),
        }
    }
}

/// Configuration for addonsync
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Game install root (the folder holding `_retail_` etc.)
    #[serde(default)]
    pub game_path: Option<PathBuf>,
    /// Account folder name under `WTF/Account`
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub variant: GameVariant,
    /// Label stamped on captured profiles
    #[serde(default)]
    pub device_name: Option<String>,
    /// Overrides the platform data directory
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Backups kept per account after an apply
    #[serde(default = "default_backup_keep")]
    pub backup_keep: usize,
    #[serde(default)]
    pub remote: RemoteConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            game_path: None,
            account: None,
            variant: GameVariant::default(),
            device_name: None,
            data_dir: None,
            backup_keep: default_backup_keep(),
            remote: RemoteConfig::default(),
        }
    }
}

impl Config {
    /// Defaults with the game path detected and, if the install has exactly
    /// one account, that account selected
    pub fn auto_detect() -> Self {
        let mut config = Self {
            game_path: detect_game_path(),
            ..Self::default()
        };
        if let Some(ref game_path) = config.game_path {
            let accounts = list_accounts(game_path, config.variant);
            if let [only] = accounts.as_slice() {
                config.account = Some(only.clone());
            }
        }
        config
    }

    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR).join("config.json"))
    }

    /// Load config from disk, falling back to auto-detection if not found
    pub fn load() -> Self {
        Self::config_path()
            .and_then(|path| Self::load_from(&path).ok())
            .unwrap_or_else(Self::auto_detect)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()
            .ok_or_else(|| Error::Config("no configuration directory on this platform".to_string()))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Root holding profiles, backups and the activity log
    pub fn data_root(&self) -> Result<PathBuf> {
        match self.data_dir {
            Some(ref dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|p| p.join(APP_DIR))
                .ok_or_else(|| Error::Config("no data directory on this platform".to_string())),
        }
    }

    pub fn profiles_dir(&self) -> Result<PathBuf> {
        Ok(self.data_root()?.join("profiles"))
    }

    pub fn backups_dir(&self) -> Result<PathBuf> {
        Ok(self.data_root()?.join("backups"))
    }

    /// Lock files guarding apply and restore, one per target
    pub fn locks_dir(&self) -> Result<PathBuf> {
        Ok(self.data_root()?.join("locks"))
    }

    /// Lock file held while a sync, push-all or pull-all runs
    pub fn sync_lock_path(&self) -> Result<PathBuf> {
        Ok(self.data_root()?.join("sync.lock"))
    }

    pub fn activity_path(&self) -> Result<PathBuf> {
        Ok(self.data_root()?.join("activity.log"))
    }

    /// Access token, with the environment taking precedence
    pub fn access_token(&self) -> Option<String> {
        self.token_with_override(std::env::var(ACCESS_TOKEN_ENV).ok())
    }

    fn token_with_override(&self, from_env: Option<String>) -> Option<String> {
        from_env
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.remote.access_token.clone())
            .filter(|t| !t.trim().is_empty())
    }

    /// The live configuration tree selected by this config
    pub fn live_target(&self) -> Result<LiveTarget> {
        let game_path = self
            .game_path
            .clone()
            .ok_or_else(|| Error::Config("game_path is not set".to_string()))?;
        let account = self
            .account
            .clone()
            .ok_or_else(|| Error::Config("account is not set".to_string()))?;
        if !validate_game_path(&game_path, self.variant) {
            tracing::warn!(
                "{} has no {} install; settings will be written to a fresh directory",
                game_path.display(),
                self.variant.install_dir()
            );
        }
        Ok(LiveTarget::new(game_path, self.variant, account))
    }
}
