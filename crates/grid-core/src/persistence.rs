//! Persistence gateway for sheet snapshots
//!
//! One sheet is stored per owner. The JSON document uses the same camelCase
//! shape as the in-memory [`Sheet`] serialization.

use crate::error::{Error, Result};
use crate::sheet::Sheet;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Storage backend that loads and saves whole sheet snapshots
pub trait PersistenceGateway {
    /// Load the owner's sheet; `None` if nothing has been saved yet
    fn load(&self, owner_id: &str) -> Result<Option<Sheet>>;

    /// Save the full snapshot, replacing whatever was stored for its owner
    fn save(&mut self, sheet: &Sheet) -> Result<()>;
}

/// Stores each owner's sheet as `spreadsheet_<owner>.json` in a directory
#[derive(Debug, Clone)]
pub struct JsonFileGateway {
    dir: PathBuf,
}

impl JsonFileGateway {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document holding `owner_id`'s sheet.
    ///
    /// Bytes outside `[A-Za-z0-9_-]` are percent-encoded, so distinct owners
    /// never share a file.
    pub fn path_for(&self, owner_id: &str) -> PathBuf {
        let mut owner = String::with_capacity(owner_id.len());
        for b in owner_id.bytes() {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
                owner.push(char::from(b));
            } else {
                owner.push_str(&format!("%{:02X}", b));
            }
        }
        self.dir.join(format!("spreadsheet_{}.json", owner))
    }
}

impl PersistenceGateway for JsonFileGateway {
    fn load(&self, owner_id: &str) -> Result<Option<Sheet>> {
        let path = self.path_for(owner_id);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|e| Error::FileRead {
            path: path.clone(),
            source: e,
        })?;
        let sheet: Sheet = serde_json::from_str(&content)?;
        if sheet.owner_id != owner_id {
            return Err(Error::Integrity(format!(
                "'{}' holds the sheet of owner '{}', expected '{}'",
                path.display(),
                sheet.owner_id,
                owner_id
            )));
        }
        sheet.check_integrity()?;
        debug!(path = %path.display(), rows = sheet.row_count(), "sheet loaded");
        Ok(Some(sheet))
    }

    fn save(&mut self, sheet: &Sheet) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&sheet.owner_id);
        let content = serde_json::to_string_pretty(sheet)?;
        fs::write(&path, content)?;
        debug!(path = %path.display(), "sheet saved");
        Ok(())
    }
}

/// In-process gateway, mostly for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    sheets: HashMap<String, Sheet>,
    fail_saves: bool,
    save_count: usize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate with a stored sheet
    pub fn with_sheet(sheet: Sheet) -> Self {
        let mut gateway = Self::new();
        gateway.sheets.insert(sheet.owner_id.clone(), sheet);
        gateway
    }

    /// Make every subsequent save fail
    pub fn set_fail_saves(&mut self, fail: bool) {
        self.fail_saves = fail;
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.save_count
    }

    pub fn stored(&self, owner_id: &str) -> Option<&Sheet> {
        self.sheets.get(owner_id)
    }
}

impl PersistenceGateway for MemoryGateway {
    fn load(&self, owner_id: &str) -> Result<Option<Sheet>> {
        Ok(self.sheets.get(owner_id).cloned())
    }

    fn save(&mut self, sheet: &Sheet) -> Result<()> {
        if self.fail_saves {
            return Err(Error::Io(std::io::Error::other("storage unavailable")));
        }
        self.sheets.insert(sheet.owner_id.clone(), sheet.clone());
        self.save_count += 1;
        Ok(())
    }
}
