//! CSV import pipeline: upload, header mapping, and merge
//!
//! The pipeline moves through `Upload -> Mapping -> Importing -> Done`.
//! A failed merge returns it to `Mapping` with the error recorded.

use crate::config::GridConfig;
use crate::error::{Error, Result};
use crate::mutation::{MappedData, MergeMode, Operation};
use crate::parser::{parse_csv_bytes, ParsedCsv};
use crate::store::{Dispatch, PatchOutcome};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

/// Where the pipeline is in the import protocol
///
/// There is no separate error step: a failed upload stays in `Upload` and a
/// failed merge returns to `Mapping`, with the reason in
/// [`ImportPipeline::last_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStep {
    Upload,
    Mapping,
    Importing,
    Done,
}

impl std::fmt::Display for ImportStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ImportStep::Upload => "upload",
            ImportStep::Mapping => "mapping",
            ImportStep::Importing => "importing",
            ImportStep::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// What a source header becomes in the sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingTarget {
    /// Leave the column out
    Skip,
    /// Use the source header as the column name
    Original,
    /// Use another column name; an empty name skips the column
    Rename(String),
}

/// Mapping for one source header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub source: String,
    pub target: MappingTarget,
}

impl MappingEntry {
    /// Target column name, or `None` when skipped
    pub fn target_name(&self) -> Option<&str> {
        match &self.target {
            MappingTarget::Skip => None,
            MappingTarget::Original => Some(self.source.as_str()),
            MappingTarget::Rename(name) if name.is_empty() => None,
            MappingTarget::Rename(name) => Some(name.as_str()),
        }
    }
}

/// Source header to target name correspondence, one entry per CSV column
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    entries: Vec<MappingEntry>,
}

impl ColumnMapping {
    /// Map every header to itself
    pub fn identity(headers: &[String]) -> Self {
        Self {
            entries: headers
                .iter()
                .map(|h| MappingEntry {
                    source: h.clone(),
                    target: MappingTarget::Original,
                })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    /// Set the target for the header at a column position
    pub fn set(&mut self, index: usize, target: MappingTarget) -> Result<()> {
        let entry = self
            .entries
            .get_mut(index)
            .ok_or_else(|| Error::UnknownHeader(format!("#{}", index)))?;
        entry.target = target;
        Ok(())
    }

    /// Set the target for every column carrying this header
    pub fn set_for_header(&mut self, header: &str, target: MappingTarget) -> Result<()> {
        let mut found = false;
        for entry in self.entries.iter_mut().filter(|e| e.source == header) {
            entry.target = target.clone();
            found = true;
        }
        if found {
            Ok(())
        } else {
            Err(Error::UnknownHeader(header.to_string()))
        }
    }

    /// Non-skipped target names in source order, duplicates included
    pub fn target_headers(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|e| e.target_name().map(str::to_string))
            .collect()
    }

    /// Map one source record to the target headers.
    ///
    /// When several sources share a target name the last one wins, and every
    /// column with that name receives its value.
    pub fn map_record(&self, record: &[String]) -> Vec<String> {
        let mut by_target: HashMap<&str, &str> = HashMap::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if let Some(name) = entry.target_name() {
                let value = record.get(i).map(String::as_str).unwrap_or("");
                by_target.insert(name, value);
            }
        }

        self.entries
            .iter()
            .filter_map(|e| e.target_name())
            .map(|name| by_target.get(name).copied().unwrap_or("").to_string())
            .collect()
    }
}

/// The first mapped rows, as the mapping step shows them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportPreview {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Result of a committed import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub rows_imported: usize,
    pub columns_imported: usize,
    pub mode: MergeMode,
}

/// Drives one CSV file from selection to merge
#[derive(Debug, Clone)]
pub struct ImportPipeline {
    step: ImportStep,
    parsed: Option<ParsedCsv>,
    mapping: ColumnMapping,
    mode: MergeMode,
    progress: u8,
    error: Option<String>,
    preview_rows: usize,
    progress_step: u8,
}

impl Default for ImportPipeline {
    fn default() -> Self {
        Self::new(&GridConfig::default())
    }
}

impl ImportPipeline {
    pub fn new(config: &GridConfig) -> Self {
        Self {
            step: ImportStep::Upload,
            parsed: None,
            mapping: ColumnMapping::default(),
            mode: MergeMode::Replace,
            progress: 0,
            error: None,
            preview_rows: config.preview_rows,
            progress_step: config.progress_step.clamp(1, 100),
        }
    }

    pub fn step(&self) -> ImportStep {
        self.step
    }

    /// Last reported progress, 0-100
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Message of the last failure, if any
    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn parsed(&self) -> Option<&ParsedCsv> {
        self.parsed.as_ref()
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    pub fn merge_mode(&self) -> MergeMode {
        self.mode
    }

    pub fn set_merge_mode(&mut self, mode: MergeMode) {
        self.mode = mode;
    }

    /// Accept a selected file and move to the mapping step.
    ///
    /// On failure the pipeline stays in `Upload` so another file can be chosen.
    pub fn upload(&mut self, file_name: &str, bytes: &[u8]) -> Result<()> {
        self.require(ImportStep::Upload, "upload a file")?;

        let result = if file_name.to_lowercase().ends_with(".csv") {
            parse_csv_bytes(bytes, file_name)
        } else {
            Err(Error::Parse {
                source_name: file_name.to_string(),
                message: "Please select a CSV file".to_string(),
            })
        };

        match result {
            Ok(parsed) => {
                info!(
                    file = file_name,
                    rows = parsed.row_count(),
                    columns = parsed.column_count(),
                    "CSV parsed"
                );
                self.mapping = ColumnMapping::identity(&parsed.headers);
                self.parsed = Some(parsed);
                self.progress = 0;
                self.error = None;
                self.step = ImportStep::Mapping;
                Ok(())
            }
            Err(e) => {
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Change the target of the header at a column position
    pub fn set_target(&mut self, index: usize, target: MappingTarget) -> Result<()> {
        self.require(ImportStep::Mapping, "change the mapping")?;
        self.mapping.set(index, target)
    }

    /// Change the target of every column with this header
    pub fn set_target_for(&mut self, header: &str, target: MappingTarget) -> Result<()> {
        self.require(ImportStep::Mapping, "change the mapping")?;
        self.mapping.set_for_header(header, target)
    }

    /// Mapped headers and the first few mapped rows
    pub fn preview(&self) -> Option<ImportPreview> {
        let parsed = self.parsed.as_ref()?;
        Some(ImportPreview {
            headers: self.mapping.target_headers(),
            rows: parsed
                .rows
                .iter()
                .take(self.preview_rows)
                .map(|r| self.mapping.map_record(r))
                .collect(),
        })
    }

    /// Whether the import can be started
    pub fn can_confirm(&self) -> bool {
        self.step == ImportStep::Mapping && !self.mapping.target_headers().is_empty()
    }

    /// Map the data and merge it as one operation, reporting progress along the way.
    ///
    /// Progress values passed to `on_progress` only increase. Once the merge
    /// starts it runs to completion.
    pub fn confirm<D, F>(&mut self, target: &mut D, mut on_progress: F) -> Result<ImportSummary>
    where
        D: Dispatch + ?Sized,
        F: FnMut(u8),
    {
        self.require(ImportStep::Mapping, "confirm")?;
        let headers = self.mapping.target_headers();
        if headers.is_empty() {
            return Err(Error::EmptyMapping);
        }
        let Some(parsed) = self.parsed.take() else {
            return Err(Error::InvalidImportState {
                action: "confirm",
                step: self.step.to_string(),
            });
        };

        self.step = ImportStep::Importing;
        self.error = None;
        self.progress = 0;
        on_progress(0);

        // Mapping accounts for the first 90%, the merge for the rest.
        let total = parsed.rows.len();
        let mut rows = Vec::with_capacity(total);
        let mut reported = 0u8;
        for (i, record) in parsed.rows.iter().enumerate() {
            rows.push(self.mapping.map_record(record));
            let pct = ((i + 1) * 90 / total) as u8;
            let pct = pct - pct % self.progress_step;
            if pct > reported {
                reported = pct;
                on_progress(pct);
            }
        }
        self.progress = reported;
        self.parsed = Some(parsed);

        let data = MappedData { headers, rows };
        let summary = ImportSummary {
            rows_imported: data.rows.len(),
            columns_imported: data.headers.len(),
            mode: self.mode,
        };

        let merged = match target.dispatch(&Operation::Import {
            data,
            mode: self.mode,
        }) {
            Ok(PatchOutcome::Applied) => Ok(()),
            Ok(PatchOutcome::Ignored { reason }) => Err(reason),
            Err(e) => Err(e.to_string()),
        };
        if let Err(reason) = merged {
            warn!(error = %reason, "import merge failed");
            let err = Error::Import(reason);
            self.error = Some(err.to_string());
            self.step = ImportStep::Mapping;
            return Err(err);
        }

        self.progress = 100;
        on_progress(100);
        self.step = ImportStep::Done;
        info!(
            rows = summary.rows_imported,
            columns = summary.columns_imported,
            "import committed"
        );
        Ok(summary)
    }

    /// Abandon the import; allowed before the merge starts
    pub fn cancel(&mut self) -> Result<()> {
        if self.step == ImportStep::Importing {
            return Err(Error::InvalidImportState {
                action: "cancel",
                step: self.step.to_string(),
            });
        }
        self.reset();
        Ok(())
    }

    /// Return to an empty `Upload` step
    pub fn reset(&mut self) {
        self.step = ImportStep::Upload;
        self.parsed = None;
        self.mapping = ColumnMapping::default();
        self.progress = 0;
        self.error = None;
    }

    fn require(&self, step: ImportStep, action: &'static str) -> Result<()> {
        if self.step == step {
            Ok(())
        } else {
            Err(Error::InvalidImportState {
                action,
                step: self.step.to_string(),
            })
        }
    }
}
