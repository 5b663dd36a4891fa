//! Typed configuration and settings models.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults::{
    DEFAULT_API_URL, DEFAULT_CONFIG_DIR, DEFAULT_DOWNLOAD_DIR, DEFAULT_HP_DRAIN_RATE, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_LOG_LEVEL, DEFAULT_ORIGIN, DEFAULT_OVERALL_DIFFICULTY, DEFAULT_PAGE_SIZE,
    SETTINGS_FILE_NAME,
};

/// Log output style requested through the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// Structured JSON lines.
    Json,
    /// Human-readable lines.
    Pretty,
}

/// Process-level configuration resolved at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Catalog API base URL without a trailing slash.
    pub api_url: String,
    /// `Origin` header presented to the catalog.
    pub origin: String,
    /// Packs requested per page.
    pub page_size: u64,
    /// Directory receiving downloaded archives.
    pub download_dir: PathBuf,
    /// Directory holding the settings file.
    pub config_dir: PathBuf,
    /// HTTP client timeout.
    pub http_timeout: Duration,
    /// Log level directive.
    pub log_level: String,
    /// Requested log style; `None` lets the logger pick per build profile.
    pub log_output: Option<LogOutput>,
}

impl AppConfig {
    /// Location of the persisted settings document.
    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join(SETTINGS_FILE_NAME)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            origin: DEFAULT_ORIGIN.to_owned(),
            page_size: DEFAULT_PAGE_SIZE,
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            log_level: DEFAULT_LOG_LEVEL.to_owned(),
            log_output: None,
        }
    }
}

/// User-adjustable settings persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// HP drain rate written into converted charts.
    pub hp_drain_rate: f64,
    /// Overall difficulty written into converted charts.
    pub overall_difficulty: f64,
    /// Destination for song folders; empty disables copying.
    pub song_path: String,
}

impl Settings {
    /// Song destination, if configured.
    #[must_use]
    pub fn song_dir(&self) -> Option<&Path> {
        let trimmed = self.song_path.trim();
        (!trimmed.is_empty()).then(|| Path::new(trimmed))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hp_drain_rate: DEFAULT_HP_DRAIN_RATE,
            overall_difficulty: DEFAULT_OVERALL_DIFFICULTY,
            song_path: String::new(),
        }
    }
}

/// Partial update of [`Settings`]; unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    /// New HP drain rate.
    pub hp_drain_rate: Option<f64>,
    /// New overall difficulty.
    pub overall_difficulty: Option<f64>,
    /// New song destination.
    pub song_path: Option<String>,
}

impl SettingsPatch {
    /// Whether the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.hp_drain_rate.is_none()
            && self.overall_difficulty.is_none()
            && self.song_path.is_none()
    }

    /// Produce the settings resulting from applying this patch to `current`.
    #[must_use]
    pub fn apply(&self, current: &Settings) -> Settings {
        Settings {
            hp_drain_rate: self.hp_drain_rate.unwrap_or(current.hp_drain_rate),
            overall_difficulty: self
                .overall_difficulty
                .unwrap_or(current.overall_difficulty),
            song_path: self
                .song_path
                .clone()
                .unwrap_or_else(|| current.song_path.clone()),
        }
    }
}
