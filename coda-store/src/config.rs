use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Widest clock window one export will return, regardless of what the
/// caller asks for.
pub const DEFAULT_MAX_EXPORT_RANGE: u64 = 10_000;

/// Configuration for the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the node database.
    pub path: PathBuf,
    /// Root directory for content-addressed blob files.
    pub storage_root: PathBuf,
    #[serde(default = "default_max_export_range")]
    pub max_export_range: u64,
}

fn default_max_export_range() -> u64 {
    DEFAULT_MAX_EXPORT_RANGE
}

impl Default for Config {
    fn default() -> Self {
        Config {
            path: PathBuf::from("./coda-store-db"),
            storage_root: PathBuf::from("./coda-file-storage"),
            max_export_range: DEFAULT_MAX_EXPORT_RANGE,
        }
    }
}
