//! Storage configuration from TOML (`[storage]` section)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStorageConfig {
    /// JSON snapshot of all conversations (default: `<data_dir>/corsie/conversations.json`)
    pub data_file: Option<PathBuf>,
    /// Keep conversations only in memory when false
    pub persist: bool,
}

impl Default for FileStorageConfig {
    fn default() -> Self {
        Self {
            data_file: None,
            persist: true,
        }
    }
}

impl FileStorageConfig {
    pub fn default_data_file() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("corsie").join("conversations.json"))
    }

    /// Where conversations are persisted, or `None` for memory only.
    pub fn resolved_data_file(&self) -> Option<PathBuf> {
        if !self.persist {
            return None;
        }
        self.data_file.clone().or_else(Self::default_data_file)
    }
}
