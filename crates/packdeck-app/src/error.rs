//! # Design
//!
//! - Centralize application-level errors for bootstrap and command handling.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration operations failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: packdeck_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: packdeck_telemetry::TelemetryError,
    },
    /// Catalog operations failed.
    #[error("catalog operation failed")]
    Catalog {
        /// Operation identifier.
        operation: &'static str,
        /// Source catalog error.
        source: packdeck_core::CatalogFetchError,
    },
    /// The HTTP client could not be built.
    #[error("http client setup failed")]
    HttpClient {
        /// Source HTTP client error.
        source: reqwest::Error,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: packdeck_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: packdeck_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn catalog(
        operation: &'static str,
        source: packdeck_core::CatalogFetchError,
    ) -> Self {
        Self::Catalog { operation, source }
    }

    /// Field, reason and value of an input validation failure; `None` for
    /// operational failures.
    #[must_use]
    pub fn validation_detail(&self) -> Option<String> {
        let (field, reason, value) = match self {
            Self::Config {
                source: packdeck_config::ConfigError::InvalidField {
                    field,
                    reason,
                    value,
                    ..
                },
                ..
            }
            | Self::Catalog {
                source:
                    packdeck_core::CatalogFetchError::InvalidQuery {
                        field,
                        reason,
                        value,
                    },
                ..
            } => (*field, *reason, value.as_deref()),
            _ => return None,
        };
        Some(match value {
            Some(value) => format!("{field} ({reason}): {value}"),
            None => format!("{field} ({reason})"),
        })
    }
}
