use insights_core::DEFAULT_MONTHS_BACK;
use insights_transfer::{check_days, SettingsError, TransferSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::source::CsvImportProfile;

const CONFIG_FILE: &str = "insights.toml";
const DATABASE_FILE: &str = "insights.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Transfer(#[from] SettingsError),
    #[error("Could not determine the user's data directory")]
    NoProjectDirs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Look-back used when a sync names neither dates nor months.
    pub default_months_back: u32,
    /// Days added on each side of the sync window when loading the batch
    /// the classifier sees.
    pub classification_padding_days: i64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            default_months_back: DEFAULT_MONTHS_BACK,
            classification_padding_days: 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Overrides `<data dir>/insights.db`.
    pub database_path: Option<PathBuf>,
    pub sync: SyncSettings,
    pub transfer: TransferSettings,
    pub csv: CsvImportProfile,
}

impl AppConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let mut config: AppConfig = toml::from_str(toml_content)?;
        config.transfer = config.transfer.validated()?;
        check_days("sync.classification_padding_days", config.sync.classification_padding_days)?;
        Ok(config)
    }

    /// Reads `explicit` when given, failing if it is missing. Otherwise reads
    /// `insights.toml` from the user's config directory, falling back to
    /// defaults when there is none.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let Some(dirs) = project_dirs() else {
                    return Ok(Self::default());
                };
                let path = dirs.config_dir().join(CONFIG_FILE);
                if !path.exists() {
                    tracing::debug!(path = %path.display(), "no config file, using defaults");
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Self::from_toml(&content)
    }

    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        let dirs = project_dirs().ok_or(ConfigError::NoProjectDirs)?;
        Ok(dirs.data_dir().join(DATABASE_FILE))
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "insights", "Insights")
}
