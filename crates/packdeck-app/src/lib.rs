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
#![allow(clippy::module_name_repetitions, clippy::redundant_pub_crate)]

//! Packdeck application wiring and command-line surface.
//!
//! Layout:
//! - `bootstrap.rs`: telemetry setup and service wiring
//! - `orchestrator.rs`: per-pack download state and worker supervision
//! - `cli.rs`: argument parsing and command dispatch
//! - `output.rs`: renderers for command results and progress
//! - `main.rs`: thin entrypoint delegating to `run()`

/// Service wiring.
pub mod bootstrap;
/// Application error type.
pub mod error;
/// Download orchestration.
pub mod orchestrator;

pub(crate) mod cli;
pub(crate) mod output;

pub use bootstrap::{AppServices, http_client, init_telemetry};
pub use cli::run;
pub use error::{AppError, AppResult};
pub use orchestrator::{DownloadHandle, DownloadOrchestrator, WorkerOutcome};
