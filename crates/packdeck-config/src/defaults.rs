//! Fallback values applied when the environment leaves a field unset.

/// Catalog API base URL.
pub const DEFAULT_API_URL: &str = "https://api.etternaonline.com";
/// `Origin` header presented to the catalog.
pub const DEFAULT_ORIGIN: &str = "https://etternaonline.com";
/// Packs requested per page.
pub const DEFAULT_PAGE_SIZE: u64 = 12;
/// Directory receiving downloaded archives.
pub const DEFAULT_DOWNLOAD_DIR: &str = "./downloads";
/// Directory holding the settings file.
pub const DEFAULT_CONFIG_DIR: &str = "./config";
/// HTTP client timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
/// File name of the persisted settings document.
pub const SETTINGS_FILE_NAME: &str = "settings.json";

pub(crate) const DEFAULT_LOG_LEVEL: &str = "info";
pub(crate) const DEFAULT_HP_DRAIN_RATE: f64 = 8.0;
pub(crate) const DEFAULT_OVERALL_DIFFICULTY: f64 = 9.0;
pub(crate) const MAX_PAGE_SIZE: u64 = 100;
pub(crate) const MAX_RATE: f64 = 10.0;
