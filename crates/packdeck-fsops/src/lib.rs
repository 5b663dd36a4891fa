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

//! Pack worker: archive transfer, extraction and chart post-processing.
//!
//! Layout: `worker.rs` (`HttpPackWorker`), `archive.rs` (ZIP extraction),
//! `charts.rs` (chart discovery, conversion seam, song folder install),
//! `simfile.rs` (`.sm` parsing), `osu.rs` (osu!mania encoding and the default
//! converter), `error.rs` (error taxonomy).

pub mod archive;
pub mod charts;
pub mod error;
pub mod osu;
pub mod simfile;
pub mod worker;

pub use archive::{archive_file_name, extract_zip};
pub use charts::{
    ChartConverter, ConversionSettings, converted_file_name, find_charts,
    install_song_dirs,
};
pub use error::{FsOpsError, FsOpsResult};
pub use osu::{SmToOsuConverter, UNKNOWN_DIFFICULTY, encode_beatmap};
pub use simfile::{Simfile, SimfileError};
pub use worker::{HttpPackWorker, PROGRESS_BYTE_STEP, PROGRESS_INTERVAL};
