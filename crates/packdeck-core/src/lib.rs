#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, unreachable_pub)]
#![allow(clippy::module_name_repetitions)]

//! Catalog and download domain types plus the seams implemented by adapters.
//!
//! Layout: `model/` (packs, queries, download state), `service/` (provider,
//! worker and observer traits), `error.rs` (error taxonomy).

pub mod error;
pub mod model;
pub mod service;

pub use error::{
    CatalogFetchError, CatalogResult, DownloadError, DownloadResult, DownloadStartError,
    error_chain,
};
pub use model::{
    CatalogPage, CatalogQuery, DownloadState, Pack, PackDownload, PageLinks, PageMeta,
    PageMetaLink, QueryKey, SortDirection, SortField, SortOption, SortSpec, Tag,
    percent_complete, sort_options,
};
pub use packdeck_events::{DownloadStage, PackId, ProgressEvent};
pub use service::{CatalogProvider, PackWorker, PageObserver};
