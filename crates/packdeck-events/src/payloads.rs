//! Event payload types carried across the workspace.

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier assigned to each event emitted on the bus.
pub type EventId = u64;

/// Stable catalog identifier of a pack.
pub type PackId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Ordered phases of a single pack download.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStage {
    /// Archive bytes are being transferred.
    Downloading,
    /// The archive is being unpacked.
    Extracting,
    /// Charts inside the pack are being converted and installed.
    Converting,
}

impl DownloadStage {
    /// Wire name of the stage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Extracting => "extracting",
            Self::Converting => "converting",
        }
    }
}

impl Display for DownloadStage {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Progress notification emitted by the worker for one pack.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Pack the update belongs to.
    pub pack_id: PackId,
    /// Bytes transferred so far.
    #[serde(rename = "downloaded")]
    pub bytes_downloaded: u64,
    /// Expected total bytes; zero when the size is unknown.
    #[serde(rename = "total")]
    pub bytes_total: u64,
    /// Current lifecycle stage.
    pub stage: DownloadStage,
}

impl ProgressEvent {
    /// Convenience constructor.
    #[must_use]
    pub const fn new(
        pack_id: PackId,
        stage: DownloadStage,
        bytes_downloaded: u64,
        bytes_total: u64,
    ) -> Self {
        Self {
            pack_id,
            bytes_downloaded,
            bytes_total,
            stage,
        }
    }
}

/// Lifecycle events surfaced on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A catalog page was fetched and is now the visible page.
    CatalogLoaded {
        /// Page number reported by the provider.
        page: u64,
        /// Last available page.
        last_page: u64,
        /// Total number of packs matching the query.
        total: u64,
        /// Pack ids on the page, in display order.
        pack_ids: Vec<PackId>,
    },
    /// A download was admitted and its worker started.
    DownloadStarted {
        /// Pack being downloaded.
        pack_id: PackId,
        /// Source locator handed to the worker.
        source_url: String,
    },
    /// Progress was applied to an active download.
    DownloadProgress {
        /// Pack being downloaded.
        pack_id: PackId,
        /// Current stage.
        stage: DownloadStage,
        /// Bytes transferred so far.
        bytes_downloaded: u64,
        /// Expected total bytes.
        bytes_total: u64,
    },
    /// The worker finished and the pack is installed.
    DownloadCompleted {
        /// Pack that completed.
        pack_id: PackId,
        /// Local path of the downloaded archive.
        archive_path: String,
    },
    /// The worker reported a failure; the pack returned to idle.
    DownloadFailed {
        /// Pack that failed.
        pack_id: PackId,
        /// Human-readable failure detail.
        message: String,
    },
    /// Bookkeeping for an off-page download was dropped during reconciliation.
    DownloadForgotten {
        /// Pack whose entry was dropped.
        pack_id: PackId,
    },
}

impl Event {
    /// Machine-friendly discriminator for observers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CatalogLoaded { .. } => "catalog_loaded",
            Self::DownloadStarted { .. } => "download_started",
            Self::DownloadProgress { .. } => "download_progress",
            Self::DownloadCompleted { .. } => "download_completed",
            Self::DownloadFailed { .. } => "download_failed",
            Self::DownloadForgotten { .. } => "download_forgotten",
        }
    }

    /// Pack the event refers to, when it is pack scoped.
    #[must_use]
    pub const fn pack_id(&self) -> Option<PackId> {
        match self {
            Self::DownloadStarted { pack_id, .. }
            | Self::DownloadProgress { pack_id, .. }
            | Self::DownloadCompleted { pack_id, .. }
            | Self::DownloadFailed { pack_id, .. }
            | Self::DownloadForgotten { pack_id } => Some(*pack_id),
            Self::CatalogLoaded { .. } => None,
        }
    }
}

impl From<ProgressEvent> for Event {
    fn from(progress: ProgressEvent) -> Self {
        Self::DownloadProgress {
            pack_id: progress.pack_id,
            stage: progress.stage,
            bytes_downloaded: progress.bytes_downloaded,
            bytes_total: progress.bytes_total,
        }
    }
}

/// Metadata wrapper tracking the event id and emission timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier.
    pub id: EventId,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event.
    pub event: Event,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn progress_event_uses_worker_wire_names() -> Result<(), serde_json::Error> {
        let event = ProgressEvent::new(42, DownloadStage::Downloading, 50, 200);
        let value = serde_json::to_value(event)?;
        assert_eq!(
            value,
            json!({"packId": 42, "downloaded": 50, "total": 200, "stage": "downloading"})
        );

        let decoded: ProgressEvent = serde_json::from_value(
            json!({"packId": 7, "downloaded": 1, "total": 1, "stage": "converting"}),
        )?;
        assert_eq!(decoded.stage, DownloadStage::Converting);
        Ok(())
    }

    #[test]
    fn pack_scoped_events_expose_pack_id() {
        let progress: Event = ProgressEvent::new(3, DownloadStage::Extracting, 1, 1).into();
        assert_eq!(progress.kind(), "download_progress");
        assert_eq!(progress.pack_id(), Some(3));

        let loaded = Event::CatalogLoaded {
            page: 1,
            last_page: 4,
            total: 40,
            pack_ids: vec![1, 2],
        };
        assert_eq!(loaded.pack_id(), None);
    }
}
