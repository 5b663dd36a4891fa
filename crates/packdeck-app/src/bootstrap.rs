//! Service wiring shared by every command.

use std::sync::Arc;

use packdeck_catalog::{CatalogFetcher, HttpCatalogProvider};
use packdeck_config::{AppConfig, LogOutput, SettingsStore};
use packdeck_core::{CatalogProvider, PackWorker};
use packdeck_events::{EventBus, ProgressChannel};
use packdeck_fsops::HttpPackWorker;
use packdeck_telemetry::{LogFormat, LoggingConfig, Metrics};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::orchestrator::DownloadOrchestrator;

/// Install the global logger as requested by `config`.
///
/// # Errors
///
/// Returns an error when a global subscriber is already installed.
pub fn init_telemetry(config: &AppConfig) -> AppResult<()> {
    let format = match config.log_output {
        Some(LogOutput::Json) => LogFormat::Json,
        Some(LogOutput::Pretty) => LogFormat::Pretty,
        None => LogFormat::infer(),
    };
    let logging = LoggingConfig {
        level: &config.log_level,
        format,
        ..LoggingConfig::default()
    };
    packdeck_telemetry::init_logging(&logging)
        .map_err(|err| AppError::telemetry("telemetry.init", err))
}

/// Build the HTTP client shared by the catalog provider and the pack worker.
///
/// # Errors
///
/// Returns an error when the TLS backend cannot be initialised.
pub fn http_client(config: &AppConfig) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .map_err(|source| AppError::HttpClient { source })
}

/// Wired application components.
pub struct AppServices {
    /// Resolved process configuration.
    pub config: AppConfig,
    /// Persisted user settings.
    pub settings: SettingsStore,
    /// Lifecycle event bus.
    pub events: EventBus,
    /// Metrics registry.
    pub metrics: Metrics,
    /// Catalog fetcher; reconciles the orchestrator on every loaded page.
    pub fetcher: Arc<CatalogFetcher>,
    /// Download orchestrator.
    pub orchestrator: Arc<DownloadOrchestrator>,
}

impl AppServices {
    /// Production wiring: HTTP catalog and HTTP pack worker.
    ///
    /// # Errors
    ///
    /// Returns an error when the metrics registry, the HTTP client, or the
    /// catalog endpoint cannot be set up.
    pub fn from_config(config: AppConfig) -> AppResult<Self> {
        let metrics =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        let client = http_client(&config)?;
        let provider = HttpCatalogProvider::from_config(client.clone(), &config)
            .map_err(|err| AppError::catalog("catalog.provider", err))?;
        let settings = SettingsStore::from_config(&config);
        let worker = HttpPackWorker::new(
            client,
            config.origin.clone(),
            config.download_dir.clone(),
            settings.clone(),
            metrics.clone(),
        );
        info!(
            api_url = %provider.endpoint(),
            download_dir = %config.download_dir.display(),
            "services configured"
        );
        Ok(Self::with_parts(
            config,
            Arc::new(provider),
            Arc::new(worker),
            metrics,
        ))
    }

    /// Wire the components around injected collaborators.
    #[must_use]
    pub fn with_parts(
        config: AppConfig,
        provider: Arc<dyn CatalogProvider>,
        worker: Arc<dyn PackWorker>,
        metrics: Metrics,
    ) -> Self {
        let events = EventBus::new();
        let settings = SettingsStore::from_config(&config);
        let orchestrator = Arc::new(DownloadOrchestrator::new(
            worker,
            ProgressChannel::new(),
            events.clone(),
            metrics.clone(),
        ));
        let fetcher = Arc::new(
            CatalogFetcher::new(provider, events.clone(), metrics.clone())
                .with_observer(orchestrator.clone()),
        );
        Self {
            config,
            settings,
            events,
            metrics,
            fetcher,
            orchestrator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn production_wiring_uses_config_endpoint() -> anyhow::Result<()> {
        let config = AppConfig {
            api_url: "https://api.test".into(),
            http_timeout: Duration::from_secs(5),
            ..AppConfig::default()
        };
        let services = AppServices::from_config(config)?;
        assert_eq!(services.config.api_url, "https://api.test");
        assert_eq!(
            services.settings.path(),
            services.config.settings_path().as_path()
        );
        assert_eq!(services.metrics.snapshot().active_downloads, 0);
        Ok(())
    }
}
