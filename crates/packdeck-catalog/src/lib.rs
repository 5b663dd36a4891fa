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

//! Catalog browsing: query construction, deduplicated fetching and the HTTP
//! provider for the pack listing API.

pub mod fetcher;
pub mod http;
pub mod query;

pub use fetcher::{CatalogFetcher, CatalogState, FetchOutcome};
pub use http::{ACCEPT_HEADER_VALUE, HttpCatalogProvider, PACKS_PATH};
pub use query::{CatalogSelection, QueryBuilder};
