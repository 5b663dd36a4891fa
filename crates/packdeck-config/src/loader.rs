//! Environment-driven loading of [`AppConfig`].

use std::path::PathBuf;

use crate::error::ConfigResult;
use crate::model::AppConfig;
use crate::validate::{parse_api_url, parse_log_output, parse_page_size, parse_timeout};

/// Catalog API base URL.
pub const ENV_API_URL: &str = "PACKDECK_API_URL";
/// `Origin` header value.
pub const ENV_ORIGIN: &str = "PACKDECK_ORIGIN";
/// Packs per page.
pub const ENV_PAGE_SIZE: &str = "PACKDECK_PAGE_SIZE";
/// Archive download directory.
pub const ENV_DOWNLOAD_DIR: &str = "PACKDECK_DOWNLOAD_DIR";
/// Settings directory.
pub const ENV_CONFIG_DIR: &str = "PACKDECK_CONFIG_DIR";
/// HTTP timeout in seconds.
pub const ENV_HTTP_TIMEOUT_SECS: &str = "PACKDECK_HTTP_TIMEOUT_SECS";
/// Log level directive.
pub const ENV_LOG_LEVEL: &str = "PACKDECK_LOG_LEVEL";
/// Log style (`json` or `pretty`).
pub const ENV_LOG_FORMAT: &str = "PACKDECK_LOG_FORMAT";

/// Load configuration from the process environment.
///
/// # Errors
///
/// Returns [`crate::ConfigError::InvalidField`] when a variable is set to an
/// invalid value.
pub fn load_from_env() -> ConfigResult<AppConfig> {
    load_with(|key| std::env::var(key).ok())
}

/// Load configuration through an arbitrary variable lookup.
///
/// Blank values are treated as unset.
///
/// # Errors
///
/// Returns [`crate::ConfigError::InvalidField`] when a variable is set to an
/// invalid value.
pub fn load_with<F>(lookup: F) -> ConfigResult<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
    let mut config = AppConfig::default();

    if let Some(value) = get(ENV_API_URL) {
        config.api_url = parse_api_url(&value)?;
    }
    if let Some(value) = get(ENV_ORIGIN) {
        config.origin = value.trim().to_owned();
    }
    if let Some(value) = get(ENV_PAGE_SIZE) {
        config.page_size = parse_page_size(&value)?;
    }
    if let Some(value) = get(ENV_DOWNLOAD_DIR) {
        config.download_dir = PathBuf::from(value);
    }
    if let Some(value) = get(ENV_CONFIG_DIR) {
        config.config_dir = PathBuf::from(value);
    }
    if let Some(value) = get(ENV_HTTP_TIMEOUT_SECS) {
        config.http_timeout = parse_timeout(&value)?;
    }
    if let Some(value) = get(ENV_LOG_LEVEL) {
        config.log_level = value.trim().to_owned();
    }
    if let Some(value) = get(ENV_LOG_FORMAT) {
        config.log_output = Some(parse_log_output(&value)?);
    }

    tracing::debug!(
        api_url = %config.api_url,
        page_size = config.page_size,
        download_dir = %config.download_dir.display(),
        "configuration loaded"
    );
    Ok(config)
}
