use packdeck_events::{DownloadStage, PackId};
use serde::{Deserialize, Serialize};

/// Download lifecycle of one pack as seen by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DownloadState {
    /// Nothing known about the pack; a download may be started.
    #[default]
    Idle,
    /// A worker is running for the pack.
    Active {
        /// Stage most recently reported by the worker.
        stage: DownloadStage,
        /// Bytes reported so far for the stage.
        bytes_downloaded: u64,
        /// Total bytes for the stage; zero while unknown.
        bytes_total: u64,
    },
    /// The pack finished downloading during this session.
    Completed,
    /// The last attempt failed. The orchestrator itself records failures as
    /// [`DownloadState::Idle`]; this variant is used in outcome summaries.
    Failed {
        /// Rendered failure.
        message: String,
    },
}

impl DownloadState {
    /// Fresh active state before any progress has arrived.
    #[must_use]
    pub const fn started() -> Self {
        Self::Active {
            stage: DownloadStage::Downloading,
            bytes_downloaded: 0,
            bytes_total: 0,
        }
    }

    /// Whether a worker is running.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    /// Whether the pack finished downloading.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Whole-number percentage for display.
    #[must_use]
    pub const fn percent(&self) -> u8 {
        match self {
            Self::Active {
                bytes_downloaded,
                bytes_total,
                ..
            } => percent_complete(*bytes_downloaded, *bytes_total),
            Self::Completed => 100,
            Self::Idle | Self::Failed { .. } => 0,
        }
    }
}

/// Rounded percentage of `downloaded` over `total`, clamped to `0..=100`.
///
/// Returns `0` while the total is unknown (zero).
#[must_use]
#[allow(clippy::cast_lossless, clippy::cast_possible_truncation)]
pub const fn percent_complete(downloaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let total_wide = total as u128;
    let done = if downloaded > total {
        total_wide
    } else {
        downloaded as u128
    };
    // Round half up: (done * 100 + total / 2) / total, kept in integers.
    ((done * 200 + total_wide) / (total_wide * 2)) as u8
}

/// Work order handed to the pack worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackDownload {
    /// Pack being downloaded.
    pub pack_id: PackId,
    /// Display name, used for logs and directory naming fallbacks.
    pub name: String,
    /// Archive URL.
    pub source_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_and_handles_unknown_totals() {
        assert_eq!(percent_complete(50, 200), 25);
        assert_eq!(percent_complete(0, 0), 0);
        assert_eq!(percent_complete(10, 0), 0);
        assert_eq!(percent_complete(1, 3), 33);
        assert_eq!(percent_complete(2, 3), 67);
        assert_eq!(percent_complete(1, 200), 1);
        assert_eq!(percent_complete(300, 200), 100);
        assert_eq!(percent_complete(u64::MAX, u64::MAX), 100);
    }

    #[test]
    fn percent_is_monotonic_in_downloaded() {
        let total = 977;
        let mut previous = 0;
        for downloaded in 0..=total {
            let current = percent_complete(downloaded, total);
            assert!(current >= previous);
            previous = current;
        }
        assert_eq!(previous, 100);
    }

    #[test]
    fn state_percent_follows_variant() {
        assert_eq!(DownloadState::Idle.percent(), 0);
        assert_eq!(DownloadState::started().percent(), 0);
        assert_eq!(DownloadState::Completed.percent(), 100);
        let active = DownloadState::Active {
            stage: DownloadStage::Downloading,
            bytes_downloaded: 50,
            bytes_total: 200,
        };
        assert!(active.is_active());
        assert_eq!(active.percent(), 25);
    }

    #[test]
    fn state_serializes_with_tag() {
        let json = serde_json::to_value(DownloadState::started()).expect("serialize");
        assert_eq!(json["state"], "active");
        assert_eq!(json["stage"], "downloading");
    }
}
