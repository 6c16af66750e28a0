//! grid-core: Core library for an editable, enrichable spreadsheet grid
//!
//! This library provides functionality to:
//! - Hold a sheet of typed columns, rows and cells in an entity store
//! - Apply structural and value operations atomically
//! - Import CSV files through a parse, map and merge pipeline
//! - Track cell edits and column drag-resizes
//! - Persist sheets per owner and export them as CSV

pub mod config;
pub mod editor;
pub mod error;
pub mod export;
pub mod import;
pub mod mutation;
pub mod parser;
pub mod persistence;
pub mod session;
pub mod sheet;
pub mod store;

pub use config::GridConfig;
pub use editor::{Notice, NoticeLevel, SheetEditor};
pub use error::{Error, Result};
pub use export::{export_csv, export_file_name, write_csv};
pub use import::{
    ColumnMapping, ImportPipeline, ImportPreview, ImportStep, ImportSummary, MappingEntry,
    MappingTarget,
};
pub use mutation::{
    apply, enrichment_targets, ApplyContext, EnrichmentTarget, EnrichmentUpdate, MappedData,
    MergeMode, Operation,
};
pub use parser::{parse_csv_bytes, parse_csv_str, ParsedCsv};
pub use persistence::{JsonFileGateway, MemoryGateway, PersistenceGateway};
pub use session::{ActiveEdit, CellEditSession, ColumnResizer, ResizeMessage};
pub use sheet::{
    Cell, CellValue, Column, ColumnType, EnrichmentType, Row, Sheet, MIN_COLUMN_WIDTH,
};
pub use store::{Dispatch, PatchOutcome, SheetStore};
