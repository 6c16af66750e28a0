//! Error types for grid-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in grid-core
#[derive(Debug, Error)]
pub enum Error {
    /// CSV content could not be read as a sheet
    #[error("failed to parse CSV '{source_name}': {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    /// The merge step of an import failed
    #[error("failed to import data: {0}")]
    Import(String),

    /// A start request hit a cell that is already being enriched
    #[error("enrichment already in progress for row '{row_id}', column '{column_id}'")]
    EnrichmentAlreadyInProgress { row_id: String, column_id: String },

    /// No column with this id
    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    /// No row with this id
    #[error("row '{0}' not found")]
    RowNotFound(String),

    /// The cell cannot enter the editing state
    #[error("cell cannot be edited: {reason}")]
    NotEditable { reason: String },

    /// An import pipeline action was requested from the wrong step
    #[error("cannot {action} while import is in the {step} step")]
    InvalidImportState { action: &'static str, step: String },

    /// Every source header is mapped to skip
    #[error("no columns selected for import")]
    EmptyMapping,

    /// Mapping refers to a header that is not in the parsed file
    #[error("header '{0}' not found in CSV")]
    UnknownHeader(String),

    /// A snapshot failed its structural checks
    #[error("sheet integrity violated: {0}")]
    Integrity(String),

    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Reference errors are tolerated by the store as no-ops
    pub fn is_missing_reference(&self) -> bool {
        matches!(self, Error::ColumnNotFound(_) | Error::RowNotFound(_))
    }
}
