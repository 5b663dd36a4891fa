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

//! Runtime configuration and persisted user settings.
//!
//! Layout: `model.rs` (typed config and settings), `loader.rs` (environment
//! loading), `store.rs` (settings file persistence), `validate.rs` (field
//! validation), `defaults.rs` (fallback values).

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod store;
pub mod validate;

pub use defaults::{
    DEFAULT_API_URL, DEFAULT_CONFIG_DIR, DEFAULT_DOWNLOAD_DIR, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_ORIGIN, DEFAULT_PAGE_SIZE, SETTINGS_FILE_NAME,
};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_from_env, load_with};
pub use model::{AppConfig, LogOutput, Settings, SettingsPatch};
pub use store::SettingsStore;
