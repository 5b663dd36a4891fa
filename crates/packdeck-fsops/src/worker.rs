//! HTTP + filesystem implementation of [`PackWorker`].

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, ORIGIN};
use packdeck_config::SettingsStore;
use packdeck_core::{DownloadError, DownloadResult, PackDownload, PackId, PackWorker};
use packdeck_events::{DownloadStage, ProgressPublisher};
use packdeck_telemetry::Metrics;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::task;
use tracing::{info, warn};

use crate::archive::{archive_file_name, extract_zip, extraction_dir};
use crate::charts::{
    ChartConverter, ConversionSettings, convert_charts, find_charts, install_song_dirs,
};
use crate::error::FsOpsError;
use crate::osu::SmToOsuConverter;

/// Bytes that must arrive before another download progress update is sent.
pub const PROGRESS_BYTE_STEP: u64 = 100 * 1024;
/// Longest gap between download progress updates while bytes are arriving.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);
/// `Accept` header sent with archive requests.
const ARCHIVE_ACCEPT: &str = "*/*";

/// Downloads pack archives over HTTP and unpacks them on disk.
#[derive(Clone)]
pub struct HttpPackWorker {
    client: reqwest::Client,
    origin: String,
    download_dir: PathBuf,
    settings: SettingsStore,
    converter: Arc<dyn ChartConverter>,
    metrics: Metrics,
}

impl HttpPackWorker {
    /// Worker writing archives into `download_dir` and reading chart settings
    /// from `settings`. Archive requests carry `origin` as their `Origin`
    /// header. Charts are converted to osu!mania beatmaps unless another
    /// converter is set.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        origin: impl Into<String>,
        download_dir: impl Into<PathBuf>,
        settings: SettingsStore,
        metrics: Metrics,
    ) -> Self {
        Self {
            client,
            origin: origin.into(),
            download_dir: download_dir.into(),
            settings,
            converter: Arc::new(SmToOsuConverter),
            metrics,
        }
    }

    /// Replace the chart converter.
    #[must_use]
    pub fn with_converter(mut self, converter: Arc<dyn ChartConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// Directory receiving archives.
    #[must_use]
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    async fn fetch_archive(
        &self,
        request: &PackDownload,
        progress: &ProgressPublisher,
    ) -> DownloadResult<PathBuf> {
        let pack_id = request.pack_id;
        fs::create_dir_all(&self.download_dir).await.map_err(|err| {
            worker_error(
                pack_id,
                "download",
                FsOpsError::io("download.create_dir", &self.download_dir, err),
            )
        })?;
        let archive = self
            .download_dir
            .join(archive_file_name(&request.source_url));

        let response = self
            .client
            .get(&request.source_url)
            .header(ACCEPT, ARCHIVE_ACCEPT)
            .header(ORIGIN, &self.origin)
            .send()
            .await
            .map_err(|err| transport_error(request, err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                pack_id,
                url: request.source_url.clone(),
                status: status.as_u16(),
            });
        }
        let total = response.content_length().unwrap_or(0);

        let mut file = fs::File::create(&archive).await.map_err(|err| {
            worker_error(
                pack_id,
                "download",
                FsOpsError::io("download.create_file", &archive, err),
            )
        })?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut throttle = ProgressThrottle::new(Instant::now());

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| transport_error(request, err))?;
            file.write_all(&chunk).await.map_err(|err| {
                worker_error(
                    pack_id,
                    "download",
                    FsOpsError::io("download.write", &archive, err),
                )
            })?;
            downloaded = downloaded.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));
            if throttle.should_emit(downloaded, Instant::now()) {
                progress.emit(DownloadStage::Downloading, downloaded, total);
            }
        }
        file.flush().await.map_err(|err| {
            worker_error(
                pack_id,
                "download",
                FsOpsError::io("download.flush", &archive, err),
            )
        })?;
        progress.emit(DownloadStage::Downloading, downloaded, downloaded);

        info!(pack_id, bytes = downloaded, archive = %archive.display(), "archive downloaded");
        Ok(archive)
    }

    async fn unpack(&self, pack_id: PackId, archive: &Path) -> DownloadResult<PathBuf> {
        let source = archive.to_path_buf();
        let target = extraction_dir(archive);
        let destination = target.clone();
        let outcome = task::spawn_blocking(move || extract_zip(&source, &destination))
            .await
            .map_err(|err| worker_error(pack_id, "extract", err))
            .and_then(|result| result.map_err(|err| worker_error(pack_id, "extract", err)));
        self.record_step("extract", outcome.is_ok());

        let files = outcome?;
        info!(pack_id, files, target = %target.display(), "archive extracted");
        Ok(target)
    }

    async fn post_process(&self, pack_id: PackId, extracted: PathBuf) -> DownloadResult<()> {
        let settings = self
            .settings
            .load()
            .await
            .map_err(|err| worker_error(pack_id, "load_settings", err))?;
        let converter = Arc::clone(&self.converter);

        let outcome = task::spawn_blocking(move || {
            let charts = find_charts(&extracted)?;
            let converted = convert_charts(
                &charts,
                converter.as_ref(),
                ConversionSettings::from(&settings),
            );
            let installed = match settings.song_dir() {
                Some(song_root) => install_song_dirs(&charts, song_root)?.len(),
                None => 0,
            };
            Ok::<_, FsOpsError>((charts.len(), converted, installed))
        })
        .await
        .map_err(|err| worker_error(pack_id, "convert", err))
        .and_then(|result| result.map_err(|err| worker_error(pack_id, "convert", err)));
        self.record_step("convert", outcome.is_ok());

        let (charts, converted, installed) = outcome?;
        if charts == 0 {
            warn!(pack_id, "pack contained no charts");
        }
        info!(pack_id, charts, converted, installed, "pack post-processed");
        Ok(())
    }

    fn record_step(&self, step: &str, ok: bool) {
        self.metrics
            .inc_fsops_step(step, if ok { "ok" } else { "failed" });
    }
}

#[async_trait]
impl PackWorker for HttpPackWorker {
    async fn download_pack(
        &self,
        request: PackDownload,
        progress: ProgressPublisher,
    ) -> DownloadResult<PathBuf> {
        progress.emit(DownloadStage::Downloading, 0, 0);
        let archive = self.fetch_archive(&request, &progress).await?;

        progress.emit(DownloadStage::Extracting, 100, 100);
        let extracted = self.unpack(request.pack_id, &archive).await?;

        progress.emit(DownloadStage::Converting, 100, 100);
        self.post_process(request.pack_id, extracted).await?;

        Ok(archive)
    }
}

/// Rate limiter for download progress updates.
#[derive(Debug)]
struct ProgressThrottle {
    last_bytes: u64,
    last_at: Instant,
}

impl ProgressThrottle {
    const fn new(now: Instant) -> Self {
        Self {
            last_bytes: 0,
            last_at: now,
        }
    }

    fn should_emit(&mut self, bytes: u64, now: Instant) -> bool {
        let due = bytes.saturating_sub(self.last_bytes) >= PROGRESS_BYTE_STEP
            || now.saturating_duration_since(self.last_at) >= PROGRESS_INTERVAL;
        if due {
            self.last_bytes = bytes;
            self.last_at = now;
        }
        due
    }
}

fn transport_error(request: &PackDownload, err: reqwest::Error) -> DownloadError {
    DownloadError::Transport {
        pack_id: request.pack_id,
        url: request.source_url.clone(),
        source: Box::new(err),
    }
}

fn worker_error(
    pack_id: PackId,
    operation: &'static str,
    source: impl Into<Box<dyn Error + Send + Sync>>,
) -> DownloadError {
    DownloadError::Worker {
        pack_id,
        operation,
        source: source.into(),
    }
}
