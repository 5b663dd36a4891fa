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

//! Event plumbing for Packdeck.
//!
//! Two transports live here:
//! - [`ProgressChannel`]: per-pack named streams (`download-progress-<id>`) that
//!   carry [`ProgressEvent`]s from the pack worker to whoever subscribed first.
//! - [`EventBus`]: a broadcast firehose of lifecycle [`Event`]s with sequential
//!   identifiers and a bounded replay ring, used by observers such as the CLI.
//!
//! Layout: `payloads.rs` (event types), `topics.rs` (channel naming),
//! `channel.rs` (progress channel), `routing.rs` (event bus).

pub mod channel;
pub mod payloads;
pub mod routing;
pub mod topics;

pub use channel::{ProgressChannel, ProgressPublisher, ProgressSubscription, SubscriptionId};
pub use payloads::{
    DEFAULT_REPLAY_CAPACITY, DownloadStage, Event, EventEnvelope, EventId, PackId, ProgressEvent,
};
pub use routing::{EventBus, EventStream};
pub use topics::{PROGRESS_CHANNEL_PREFIX, progress_channel_name};
