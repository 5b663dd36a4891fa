//! Domain model shared by the catalog and download layers.

mod download;
mod pack;
mod query;

pub use download::{DownloadState, PackDownload, percent_complete};
pub use pack::{CatalogPage, Pack, PageLinks, PageMeta, PageMetaLink, Tag};
pub use query::{
    CatalogQuery, QueryKey, SortDirection, SortField, SortOption, SortSpec, sort_options,
};
