pub mod api;
pub mod config;
pub mod pipeline;
pub mod session;
pub mod storage;
pub mod worker;

use std::path::PathBuf;

/// Directory that holds `config/fixpix.settings.*` when no path is given.
pub fn default_app_root() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from(env!("CARGO_MANIFEST_DIR")))
}
