//! Validation helpers and parsing utilities for configuration values.

use std::time::Duration;

use url::Url;

use crate::defaults::{MAX_PAGE_SIZE, MAX_RATE};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{LogOutput, Settings};

/// Check that both chart rates are finite and within `0..=10`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] naming the first offending field.
pub fn validate_settings(settings: &Settings) -> ConfigResult<()> {
    check_rate("hp_drain_rate", settings.hp_drain_rate)?;
    check_rate("overall_difficulty", settings.overall_difficulty)
}

fn check_rate(field: &'static str, value: f64) -> ConfigResult<()> {
    if !value.is_finite() {
        return Err(ConfigError::invalid(
            "settings",
            field,
            value.to_string(),
            "not_finite",
        ));
    }
    if !(0.0..=MAX_RATE).contains(&value) {
        return Err(ConfigError::invalid(
            "settings",
            field,
            value.to_string(),
            "out_of_range",
        ));
    }
    Ok(())
}

pub(crate) fn parse_api_url(value: &str) -> ConfigResult<String> {
    let trimmed = value.trim().trim_end_matches('/');
    let url = Url::parse(trimmed)
        .map_err(|_| ConfigError::invalid("env", "api_url", value, "invalid_url"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid("env", "api_url", value, "unsupported_scheme"));
    }
    Ok(trimmed.to_owned())
}

pub(crate) fn parse_page_size(value: &str) -> ConfigResult<u64> {
    let size: u64 = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid("env", "page_size", value, "not_an_integer"))?;
    if !(1..=MAX_PAGE_SIZE).contains(&size) {
        return Err(ConfigError::invalid("env", "page_size", value, "out_of_range"));
    }
    Ok(size)
}

pub(crate) fn parse_timeout(value: &str) -> ConfigResult<Duration> {
    let secs: u64 = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid("env", "http_timeout_secs", value, "not_an_integer"))?;
    if secs == 0 {
        return Err(ConfigError::invalid(
            "env",
            "http_timeout_secs",
            value,
            "must_be_positive",
        ));
    }
    Ok(Duration::from_secs(secs))
}

pub(crate) fn parse_log_output(value: &str) -> ConfigResult<LogOutput> {
    match value.trim().to_ascii_lowercase().as_str() {
        "json" => Ok(LogOutput::Json),
        "pretty" => Ok(LogOutput::Pretty),
        _ => Err(ConfigError::invalid("env", "log_format", value, "unknown_format")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_must_be_finite_and_bounded() {
        assert!(validate_settings(&Settings::default()).is_ok());
        for bad in [f64::NAN, f64::INFINITY, -0.5, 10.5] {
            let settings = Settings {
                hp_drain_rate: bad,
                ..Settings::default()
            };
            assert!(matches!(
                validate_settings(&settings),
                Err(ConfigError::InvalidField {
                    field: "hp_drain_rate",
                    ..
                })
            ));
        }
        let edge = Settings {
            hp_drain_rate: 0.0,
            overall_difficulty: 10.0,
            song_path: String::new(),
        };
        assert!(validate_settings(&edge).is_ok());
    }

    #[test]
    fn page_size_bounds() {
        assert_eq!(parse_page_size(" 25 ").ok(), Some(25));
        assert!(parse_page_size("0").is_err());
        assert!(parse_page_size("101").is_err());
        assert!(parse_page_size("many").is_err());
    }

    #[test]
    fn scalar_parsers() {
        assert_eq!(parse_timeout("5").ok(), Some(Duration::from_secs(5)));
        assert!(parse_timeout("0").is_err());
        assert_eq!(parse_log_output("JSON").ok(), Some(LogOutput::Json));
        assert!(parse_log_output("xml").is_err());
        assert!(parse_api_url("ftp://example.com").is_err());
        assert!(parse_api_url("not a url").is_err());
        assert_eq!(
            parse_api_url("http://127.0.0.1:8080/").ok().as_deref(),
            Some("http://127.0.0.1:8080")
        );
    }
}
