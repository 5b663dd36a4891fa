//! Channel and topic identifiers used across transports.

use crate::payloads::PackId;

/// Prefix shared by every per-pack progress channel.
pub const PROGRESS_CHANNEL_PREFIX: &str = "download-progress-";

/// Name of the progress channel carrying updates for `pack_id`.
#[must_use]
pub fn progress_channel_name(pack_id: PackId) -> String {
    format!("{PROGRESS_CHANNEL_PREFIX}{pack_id}")
}
