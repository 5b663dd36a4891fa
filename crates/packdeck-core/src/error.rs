//! Error types for catalog queries and pack downloads.

use std::error::Error;

use packdeck_events::PackId;
use thiserror::Error;

/// Failure while building or executing a catalog query.
#[derive(Debug, Error)]
pub enum CatalogFetchError {
    /// Query parameters failed validation.
    #[error("invalid catalog query")]
    InvalidQuery {
        /// Field that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// The request never produced a response.
    #[error("catalog request failed")]
    Transport {
        /// URL used for the request.
        url: String,
        /// Underlying transport failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The provider answered with a non-success status.
    #[error("catalog responded with an error status")]
    HttpStatus {
        /// URL used for the request.
        url: String,
        /// HTTP status code returned by the provider.
        status: u16,
    },
    /// The response body was not a valid catalog page.
    #[error("catalog response could not be decoded")]
    Decode {
        /// URL used for the request.
        url: String,
        /// Underlying decode failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl CatalogFetchError {
    pub(crate) fn invalid_query(
        field: &'static str,
        reason: &'static str,
        value: impl Into<String>,
    ) -> Self {
        Self::InvalidQuery {
            field,
            reason,
            value: Some(value.into()),
        }
    }
}

/// Convenience alias for catalog results.
pub type CatalogResult<T> = Result<T, CatalogFetchError>;

/// Local rejection of a download request; nothing was started.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DownloadStartError {
    /// A download for the pack is already running.
    #[error("download already in progress")]
    AlreadyInProgress {
        /// Pack that was requested.
        pack_id: PackId,
    },
    /// The pack was already downloaded in this session.
    #[error("pack already downloaded")]
    AlreadyCompleted {
        /// Pack that was requested.
        pack_id: PackId,
    },
}

/// Failure reported by the worker while a download was in flight.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The transfer could not be started or was interrupted.
    #[error("pack transfer failed")]
    Transport {
        /// Pack being downloaded.
        pack_id: PackId,
        /// Source URL.
        url: String,
        /// Underlying transport failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The source answered with a non-success status.
    #[error("pack source responded with an error status")]
    HttpStatus {
        /// Pack being downloaded.
        pack_id: PackId,
        /// Source URL.
        url: String,
        /// HTTP status code returned by the source.
        status: u16,
    },
    /// A filesystem or post-processing step failed.
    #[error("pack worker failed")]
    Worker {
        /// Pack being processed.
        pack_id: PackId,
        /// Step that failed.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The worker task ended without reporting an outcome.
    #[error("pack worker stopped unexpectedly")]
    Aborted {
        /// Pack being processed.
        pack_id: PackId,
    },
}

impl DownloadError {
    /// Pack the failure belongs to.
    #[must_use]
    pub const fn pack_id(&self) -> PackId {
        match self {
            Self::Transport { pack_id, .. }
            | Self::HttpStatus { pack_id, .. }
            | Self::Worker { pack_id, .. }
            | Self::Aborted { pack_id } => *pack_id,
        }
    }
}

/// Convenience alias for download results.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Render an error and its sources as one `: `-separated line.
#[must_use]
pub fn error_chain(err: &(dyn Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut current = err.source();
    while let Some(source) = current {
        rendered.push_str(": ");
        rendered.push_str(&source.to_string());
        current = source.source();
    }
    rendered
}
