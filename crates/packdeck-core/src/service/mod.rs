//! Service seams implemented by transport and filesystem adapters.

use std::path::PathBuf;

use async_trait::async_trait;
use packdeck_events::ProgressPublisher;

use crate::error::{CatalogResult, DownloadResult};
use crate::model::{CatalogPage, CatalogQuery, PackDownload, SortOption, sort_options};

/// Source of catalog pages.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Fetch the page described by `query`.
    async fn list_packs(&self, query: &CatalogQuery) -> CatalogResult<CatalogPage>;

    /// Sort options the provider understands.
    fn sort_options(&self) -> Vec<SortOption> {
        sort_options()
    }
}

/// Performs the transfer and post-processing of one pack.
///
/// Implementations report progress through `progress` and return the path of
/// the downloaded archive.
#[async_trait]
pub trait PackWorker: Send + Sync {
    /// Download and unpack the requested pack.
    async fn download_pack(
        &self,
        request: PackDownload,
        progress: ProgressPublisher,
    ) -> DownloadResult<PathBuf>;
}

/// Notified whenever a new catalog page is accepted for display.
#[async_trait]
pub trait PageObserver: Send + Sync {
    /// Called with the freshly loaded page.
    async fn page_loaded(&self, page: &CatalogPage);
}
