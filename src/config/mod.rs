pub mod dynamic;
pub mod fields;
pub mod keys;
pub mod store;

pub use dynamic::{masked, normalize_token, parse_bool, DynamicConfig, SharedConfig};
pub use fields::{Field, FieldKind, Section};
pub use store::{ConfigEntry, ConfigStore};

use std::path::PathBuf;

const DEFAULT_DATA_DIR: &str = "/opt/render/project/src/data";

/// Directory holding the SQLite files: `$RENDER_DATA_DIR` when present on
/// disk, else the working directory.
pub fn data_dir() -> PathBuf {
    let configured = std::env::var("RENDER_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string());
    let dir = PathBuf::from(configured);
    if dir.is_dir() {
        dir
    } else {
        PathBuf::from(".")
    }
}
