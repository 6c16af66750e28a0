//! Runtime configuration for the grid engine
//!
//! Configuration lives in a JSON file. Every field has a default, so an
//! empty object (or a missing file) yields a working setup.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Engine and host settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GridConfig {
    /// Width given to columns created by AddColumn or import
    pub default_column_width: u32,
    /// Number of mapped rows shown in the import preview
    pub preview_rows: usize,
    /// Percentage increment between import progress reports
    pub progress_step: u8,
    /// Directory used by the JSON file gateway
    pub storage_dir: PathBuf,
    /// Owner whose sheet the host opens
    pub owner_id: String,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            default_column_width: 200,
            preview_rows: 3,
            progress_step: 10,
            storage_dir: PathBuf::from(".grid"),
            owner_id: "local".to_string(),
        }
    }
}

impl GridConfig {
    /// Load a config file, falling back to defaults when it does not exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save the config as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
