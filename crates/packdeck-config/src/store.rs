//! Persistence of [`Settings`] as a pretty-printed JSON document.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::info;

use crate::defaults::SETTINGS_FILE_NAME;
use crate::error::{ConfigError, ConfigResult};
use crate::model::{AppConfig, Settings, SettingsPatch};
use crate::validate::validate_settings;

/// File-backed settings store.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Store reading and writing `settings.json` inside `config_dir`.
    #[must_use]
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            path: config_dir.as_ref().join(SETTINGS_FILE_NAME),
        }
    }

    /// Store located by the application configuration.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            path: config.settings_path(),
        }
    }

    /// Path of the settings document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the settings, writing the defaults first when no document exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the document cannot be read, parsed or created.
    pub async fn load(&self) -> ConfigResult<Settings> {
        match fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| ConfigError::Malformed {
                path: self.path.clone(),
                source,
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let defaults = Settings::default();
                self.write(&defaults).await?;
                info!(path = %self.path.display(), "created default settings");
                Ok(defaults)
            }
            Err(err) => Err(ConfigError::io("read_settings", &self.path, err)),
        }
    }

    /// Validate and persist `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] for out-of-range values, or an IO
    /// error when the document cannot be written.
    pub async fn save(&self, settings: &Settings) -> ConfigResult<()> {
        validate_settings(settings)?;
        self.write(settings).await?;
        info!(path = %self.path.display(), "settings saved");
        Ok(())
    }

    /// Load, patch and save in one step, returning the stored result.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`Self::load`] and [`Self::save`].
    pub async fn update(&self, patch: &SettingsPatch) -> ConfigResult<Settings> {
        let current = self.load().await?;
        let updated = patch.apply(&current);
        self.save(&updated).await?;
        Ok(updated)
    }

    async fn write(&self, settings: &Settings) -> ConfigResult<()> {
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| ConfigError::io("create_config_dir", parent, err))?;
        }
        let rendered =
            serde_json::to_string_pretty(settings).map_err(|source| ConfigError::Malformed {
                path: self.path.clone(),
                source,
            })?;
        fs::write(&self.path, rendered)
            .await
            .map_err(|err| ConfigError::io("write_settings", &self.path, err))
    }
}
