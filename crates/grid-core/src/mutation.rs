//! Mutation engine: validated operations that turn one sheet snapshot into the next
//!
//! This module provides:
//! - The [`Operation`] command type hosts dispatch for every change
//! - [`apply`], which produces a new snapshot or rejects the operation
//! - The enrichment worker contract ([`EnrichmentUpdate`], [`enrichment_targets`])
//!
//! `apply` never mutates its input. Operations that reference a missing row
//! or column return `ColumnNotFound`/`RowNotFound`, which the store treats
//! as a no-op.

use crate::error::{Error, Result};
use crate::sheet::{
    new_id, CellValue, Column, ColumnType, EnrichmentType, Row, Sheet, MIN_COLUMN_WIDTH,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Progress or result reported by an enrichment worker for one cell
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentUpdate {
    /// `Some(true)` starts an enrichment, `Some(false)` finishes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_enriching: Option<bool>,
    /// Raw result, coerced like any other cell input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment_error: Option<String>,
}

impl EnrichmentUpdate {
    /// Mark a cell as being enriched
    pub fn start() -> Self {
        Self {
            is_enriching: Some(true),
            ..Self::default()
        }
    }

    /// Finish an enrichment with a result value
    pub fn complete(value: impl Into<String>) -> Self {
        Self {
            is_enriching: Some(false),
            value: Some(value.into()),
            enrichment_error: None,
        }
    }

    /// Finish an enrichment with an error
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            is_enriching: Some(false),
            value: None,
            enrichment_error: Some(message.into()),
        }
    }
}

/// How imported data is combined with the current sheet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Discard all existing columns and rows
    #[default]
    Replace,
    /// Keep existing data, match targets to columns by name, append rows
    Append,
}

/// Imported data after header mapping: one value per header in every row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappedData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// A change to the sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Operation {
    #[serde(rename_all = "camelCase")]
    AddColumn {
        column_id: String,
        name: String,
        column_type: ColumnType,
        enrichment_type: Option<EnrichmentType>,
        custom_prompt: Option<String>,
    },
    RenameSheet { title: String },
    #[serde(rename_all = "camelCase")]
    ResizeColumn { column_id: String, width: i64 },
    #[serde(rename_all = "camelCase")]
    DeleteColumn { column_id: String },
    #[serde(rename_all = "camelCase")]
    SetColumnVisibility { column_id: String, visible: bool },
    #[serde(rename_all = "camelCase")]
    EditCell {
        row_id: String,
        column_id: String,
        raw_input: String,
    },
    #[serde(rename_all = "camelCase")]
    SetEnrichmentState {
        row_id: String,
        column_id: String,
        update: EnrichmentUpdate,
    },
    Import { data: MappedData, mode: MergeMode },
}

impl Operation {
    /// Build an AddColumn with a freshly generated column id
    pub fn add_column(
        name: impl Into<String>,
        column_type: ColumnType,
        enrichment_type: Option<EnrichmentType>,
        custom_prompt: Option<String>,
    ) -> Self {
        Operation::AddColumn {
            column_id: new_id("col"),
            name: name.into(),
            column_type,
            enrichment_type,
            custom_prompt,
        }
    }

    pub fn edit_cell(
        row_id: impl Into<String>,
        column_id: impl Into<String>,
        raw_input: impl Into<String>,
    ) -> Self {
        Operation::EditCell {
            row_id: row_id.into(),
            column_id: column_id.into(),
            raw_input: raw_input.into(),
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::AddColumn { .. } => "add_column",
            Operation::RenameSheet { .. } => "rename_sheet",
            Operation::ResizeColumn { .. } => "resize_column",
            Operation::DeleteColumn { .. } => "delete_column",
            Operation::SetColumnVisibility { .. } => "set_column_visibility",
            Operation::EditCell { .. } => "edit_cell",
            Operation::SetEnrichmentState { .. } => "set_enrichment_state",
            Operation::Import { .. } => "import",
        }
    }
}

/// Inputs to `apply` that do not come from the operation itself
#[derive(Debug, Clone, Copy)]
pub struct ApplyContext {
    pub now: DateTime<Utc>,
    pub default_column_width: u32,
}

impl ApplyContext {
    pub fn new(now: DateTime<Utc>, default_column_width: u32) -> Self {
        Self {
            now,
            default_column_width,
        }
    }
}

/// Apply an operation to a snapshot, producing the next snapshot
pub fn apply(sheet: &Sheet, op: &Operation, ctx: &ApplyContext) -> Result<Sheet> {
    let mut next = sheet.clone();

    match op {
        Operation::AddColumn {
            column_id,
            name,
            column_type,
            enrichment_type,
            custom_prompt,
        } => {
            if next.find_column(column_id).is_some() {
                return Err(Error::Integrity(format!(
                    "column id '{}' already exists",
                    column_id
                )));
            }
            let column = Column::new(
                column_id.clone(),
                name.clone(),
                *column_type,
                *enrichment_type,
                custom_prompt.clone(),
                ctx.default_column_width,
            );
            for row in &mut next.rows {
                row.set(&column.id, CellValue::empty_for(column.column_type));
            }
            next.columns.push(column);
        }

        Operation::RenameSheet { title } => {
            next.name = title.clone();
        }

        Operation::ResizeColumn { column_id, width } => {
            let column = column_mut(&mut next, column_id)?;
            column.width = clamp_width(*width);
        }

        Operation::DeleteColumn { column_id } => {
            let index = next
                .columns
                .iter()
                .position(|c| &c.id == column_id)
                .ok_or_else(|| Error::ColumnNotFound(column_id.clone()))?;
            next.columns.remove(index);
            // Removing the cell also drops any in-flight enrichment marker on it.
            for row in &mut next.rows {
                row.cells.remove(column_id);
            }
        }

        Operation::SetColumnVisibility { column_id, visible } => {
            column_mut(&mut next, column_id)?.is_visible = *visible;
        }

        Operation::EditCell {
            row_id,
            column_id,
            raw_input,
        } => {
            let column_type = column_type_of(&next, column_id)?;
            let row = row_mut(&mut next, row_id)?;
            row.set(column_id, CellValue::coerce(column_type, raw_input));
        }

        Operation::SetEnrichmentState {
            row_id,
            column_id,
            update,
        } => {
            let column_type = column_type_of(&next, column_id)?;
            let row = row_mut(&mut next, row_id)?;
            if !row.cells.contains_key(column_id) {
                row.set(column_id, CellValue::empty_for(column_type));
            }
            let cell = row
                .cells
                .get_mut(column_id)
                .ok_or_else(|| Error::ColumnNotFound(column_id.clone()))?;

            match update.is_enriching {
                Some(true) if cell.is_enriching => {
                    return Err(Error::EnrichmentAlreadyInProgress {
                        row_id: row_id.clone(),
                        column_id: column_id.clone(),
                    });
                }
                Some(true) => {
                    cell.is_enriching = true;
                    cell.enrichment_error = None;
                }
                Some(false) => cell.is_enriching = false,
                None => {}
            }
            if let Some(raw) = &update.value {
                cell.value = CellValue::coerce(column_type, raw);
                if update.enrichment_error.is_none() {
                    cell.enrichment_error = None;
                }
            }
            if let Some(message) = &update.enrichment_error {
                cell.enrichment_error = Some(message.clone());
            }
        }

        Operation::Import { data, mode } => match mode {
            MergeMode::Replace => replace_with(&mut next, data, ctx),
            MergeMode::Append => append_from(&mut next, data, ctx),
        },
    }

    next.touch(ctx.now);
    Ok(next)
}

/// Stored width for a requested width
pub fn clamp_width(width: i64) -> u32 {
    u32::try_from(width.max(i64::from(MIN_COLUMN_WIDTH))).unwrap_or(u32::MAX)
}

fn column_mut<'a>(sheet: &'a mut Sheet, column_id: &str) -> Result<&'a mut Column> {
    sheet
        .columns
        .iter_mut()
        .find(|c| c.id == column_id)
        .ok_or_else(|| Error::ColumnNotFound(column_id.to_string()))
}

fn row_mut<'a>(sheet: &'a mut Sheet, row_id: &str) -> Result<&'a mut Row> {
    sheet
        .rows
        .iter_mut()
        .find(|r| r.id == row_id)
        .ok_or_else(|| Error::RowNotFound(row_id.to_string()))
}

fn column_type_of(sheet: &Sheet, column_id: &str) -> Result<ColumnType> {
    sheet
        .find_column(column_id)
        .map(|c| c.column_type)
        .ok_or_else(|| Error::ColumnNotFound(column_id.to_string()))
}

/// Build one Text column per header and one row per record, dropping everything else
fn replace_with(sheet: &mut Sheet, data: &MappedData, ctx: &ApplyContext) {
    let columns: Vec<Column> = data
        .headers
        .iter()
        .map(|header| Column::text(new_id("col"), header.clone(), ctx.default_column_width))
        .collect();

    let rows = data
        .rows
        .iter()
        .map(|record| {
            let mut row = Row::new(new_id("row"));
            for (i, column) in columns.iter().enumerate() {
                let raw = record.get(i).map(String::as_str).unwrap_or("");
                row.set(&column.id, CellValue::coerce(ColumnType::Text, raw));
            }
            row
        })
        .collect();

    sheet.columns = columns;
    sheet.rows = rows;
}

/// Match headers to existing columns by name, add Text columns for the rest
fn append_from(sheet: &mut Sheet, data: &MappedData, ctx: &ApplyContext) {
    let mut targets: Vec<String> = Vec::with_capacity(data.headers.len());
    for header in &data.headers {
        let column_id = match sheet.find_column_by_name(header) {
            Some(column) => column.id.clone(),
            None => {
                let column =
                    Column::text(new_id("col"), header.clone(), ctx.default_column_width);
                for row in &mut sheet.rows {
                    row.set(&column.id, CellValue::Empty);
                }
                let id = column.id.clone();
                sheet.columns.push(column);
                id
            }
        };
        targets.push(column_id);
    }

    let types: HashMap<&str, ColumnType> = sheet
        .columns
        .iter()
        .map(|c| (c.id.as_str(), c.column_type))
        .collect();

    let mut new_rows = Vec::with_capacity(data.rows.len());
    for record in &data.rows {
        let mut row = Row::new(new_id("row"));
        for column in &sheet.columns {
            row.set(&column.id, CellValue::empty_for(column.column_type));
        }
        for (i, column_id) in targets.iter().enumerate() {
            let raw = record.get(i).map(String::as_str).unwrap_or("");
            let column_type = types.get(column_id.as_str()).copied().unwrap_or(ColumnType::Text);
            row.set(column_id, CellValue::coerce(column_type, raw));
        }
        new_rows.push(row);
    }

    sheet.rows.extend(new_rows);
}

/// A cell an enrichment worker should process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentTarget {
    pub row_id: String,
    pub column_id: String,
    pub enrichment_type: EnrichmentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
}

/// List the cells of an Enrichment column that are not already being enriched
pub fn enrichment_targets(sheet: &Sheet, column_id: &str) -> Vec<EnrichmentTarget> {
    let Some(column) = sheet.find_column(column_id) else {
        return Vec::new();
    };
    let Some(enrichment_type) = column.enrichment_type else {
        return Vec::new();
    };

    sheet
        .rows
        .iter()
        .filter(|row| !row.get(column_id).is_some_and(|c| c.is_enriching))
        .map(|row| EnrichmentTarget {
            row_id: row.id.clone(),
            column_id: column_id.to_string(),
            enrichment_type,
            custom_prompt: column.custom_prompt.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ApplyContext {
        ApplyContext::new(Utc::now(), 200)
    }

    fn seeded() -> Sheet {
        Sheet::seed("user_1", Utc::now())
    }

    #[test]
    fn test_add_column_backfills_rows() {
        let sheet = seeded();
        let op = Operation::add_column("Score", ColumnType::Number, None, None);
        let next = apply(&sheet, &op, &ctx()).unwrap();

        assert_eq!(next.column_count(), 4);
        let added = &next.columns[3];
        assert_eq!(added.name, "Score");
        assert_eq!(added.width, 200);
        for row in &next.rows {
            assert_eq!(row.get(&added.id).map(|c| &c.value), Some(&CellValue::Empty));
        }
        next.check_integrity().unwrap();
        // input snapshot untouched
        assert_eq!(sheet.column_count(), 3);
    }

    #[test]
    fn test_add_checkbox_column_starts_unchecked() {
        let op = Operation::add_column("Done", ColumnType::Checkbox, None, None);
        let next = apply(&seeded(), &op, &ctx()).unwrap();
        let id = &next.columns[3].id;
        assert_eq!(next.cell("row_1", id).map(|c| &c.value), Some(&CellValue::Bool(false)));
        next.check_integrity().unwrap();
    }

    #[test]
    fn test_add_column_with_taken_id_is_rejected() {
        let op = Operation::AddColumn {
            column_id: "col_name".to_string(),
            name: "Dup".to_string(),
            column_type: ColumnType::Text,
            enrichment_type: None,
            custom_prompt: None,
        };
        assert!(matches!(apply(&seeded(), &op, &ctx()), Err(Error::Integrity(_))));
    }

    #[test]
    fn test_resize_clamps_to_floor() {
        let sheet = seeded();
        let narrow = Operation::ResizeColumn {
            column_id: "col_name".to_string(),
            width: 40,
        };
        let next = apply(&sheet, &narrow, &ctx()).unwrap();
        assert_eq!(next.find_column("col_name").unwrap().width, 120);

        let wide = Operation::ResizeColumn {
            column_id: "col_name".to_string(),
            width: 321,
        };
        let next = apply(&next, &wide, &ctx()).unwrap();
        assert_eq!(next.find_column("col_name").unwrap().width, 321);
    }

    #[test]
    fn test_unknown_references() {
        let sheet = seeded();
        let resize = Operation::ResizeColumn {
            column_id: "nope".to_string(),
            width: 300,
        };
        assert!(matches!(apply(&sheet, &resize, &ctx()), Err(Error::ColumnNotFound(_))));

        let edit = Operation::edit_cell("row_404", "col_name", "x");
        assert!(matches!(apply(&sheet, &edit, &ctx()), Err(Error::RowNotFound(_))));
    }

    #[test]
    fn test_delete_column_cascades() {
        let op = Operation::DeleteColumn {
            column_id: "col_email".to_string(),
        };
        let next = apply(&seeded(), &op, &ctx()).unwrap();
        assert_eq!(next.column_count(), 2);
        assert!(next.rows.iter().all(|r| !r.cells.contains_key("col_email")));
        next.check_integrity().unwrap();
    }

    #[test]
    fn test_edit_cell_coerces_by_column_type() {
        let add = Operation::add_column("Score", ColumnType::Number, None, None);
        let sheet = apply(&seeded(), &add, &ctx()).unwrap();
        let score = sheet.columns[3].id.clone();

        let sheet = apply(&sheet, &Operation::edit_cell("row_1", &score, "42.5"), &ctx()).unwrap();
        assert_eq!(sheet.cell("row_1", &score).unwrap().value, CellValue::Number(42.5));

        let sheet = apply(&sheet, &Operation::edit_cell("row_1", &score, "abc"), &ctx()).unwrap();
        assert_eq!(sheet.cell("row_1", &score).unwrap().value, CellValue::Number(0.0));

        let sheet = apply(&sheet, &Operation::edit_cell("row_1", "col_name", ""), &ctx()).unwrap();
        assert_eq!(sheet.cell("row_1", "col_name").unwrap().value, CellValue::Empty);
        // the original cell id survives an overwrite
        assert_eq!(sheet.cell("row_1", "col_name").unwrap().id, "cell_row_1_col_name");
    }

    #[test]
    fn test_rename_and_visibility() {
        let sheet = apply(
            &seeded(),
            &Operation::RenameSheet {
                title: "Leads".to_string(),
            },
            &ctx(),
        )
        .unwrap();
        assert_eq!(sheet.name, "Leads");

        let sheet = apply(
            &sheet,
            &Operation::SetColumnVisibility {
                column_id: "col_company".to_string(),
                visible: false,
            },
            &ctx(),
        )
        .unwrap();
        assert_eq!(sheet.visible_columns().len(), 2);
    }

    fn enrich(sheet: &Sheet, update: EnrichmentUpdate) -> Result<Sheet> {
        let op = Operation::SetEnrichmentState {
            row_id: "row_1".to_string(),
            column_id: "col_email".to_string(),
            update,
        };
        apply(sheet, &op, &ctx())
    }

    #[test]
    fn test_enrichment_lifecycle() {
        let sheet = enrich(&seeded(), EnrichmentUpdate::start()).unwrap();
        assert!(sheet.cell("row_1", "col_email").unwrap().is_enriching);

        let err = enrich(&sheet, EnrichmentUpdate::start()).unwrap_err();
        assert!(matches!(err, Error::EnrichmentAlreadyInProgress { .. }));

        let done = enrich(&sheet, EnrichmentUpdate::complete("found@x.com")).unwrap();
        let cell = done.cell("row_1", "col_email").unwrap();
        assert!(!cell.is_enriching);
        assert_eq!(cell.value, CellValue::Text("found@x.com".to_string()));

        let failed = enrich(&sheet, EnrichmentUpdate::fail("lookup timed out")).unwrap();
        let cell = failed.cell("row_1", "col_email").unwrap();
        assert!(!cell.is_enriching);
        assert_eq!(cell.enrichment_error.as_deref(), Some("lookup timed out"));

        // a restart clears the previous error
        let restarted = enrich(&failed, EnrichmentUpdate::start()).unwrap();
        assert_eq!(restarted.cell("row_1", "col_email").unwrap().enrichment_error, None);
    }

    #[test]
    fn test_delete_column_clears_enrichment_markers() {
        let sheet = enrich(&seeded(), EnrichmentUpdate::start()).unwrap();
        let op = Operation::DeleteColumn {
            column_id: "col_email".to_string(),
        };
        let next = apply(&sheet, &op, &ctx()).unwrap();
        assert!(next
            .rows
            .iter()
            .flat_map(|r| r.cells.values())
            .all(|c| !c.is_enriching && c.column_id != "col_email"));
    }

    #[test]
    fn test_import_replace_discards_existing() {
        let data = MappedData {
            headers: vec!["Name".to_string(), "Email".to_string()],
            rows: vec![vec!["Alice".to_string(), "alice@x.com".to_string()]],
        };
        let op = Operation::Import {
            data,
            mode: MergeMode::Replace,
        };
        let next = apply(&seeded(), &op, &ctx()).unwrap();
        assert_eq!(next.column_count(), 2);
        assert_eq!(next.row_count(), 1);
        assert!(next.find_column("col_name").is_none());
        next.check_integrity().unwrap();
    }

    #[test]
    fn test_import_append_matches_by_name() {
        let data = MappedData {
            headers: vec!["Email".to_string(), "Phone".to_string()],
            rows: vec![vec!["bob@x.com".to_string(), "555".to_string()]],
        };
        let op = Operation::Import {
            data,
            mode: MergeMode::Append,
        };
        let next = apply(&seeded(), &op, &ctx()).unwrap();
        assert_eq!(next.column_count(), 4);
        assert_eq!(next.row_count(), 3);

        let appended = &next.rows[2];
        assert_eq!(
            appended.get("col_email").unwrap().value,
            CellValue::Text("bob@x.com".to_string())
        );
        assert_eq!(appended.get("col_name").unwrap().value, CellValue::Empty);
        next.check_integrity().unwrap();
    }

    #[test]
    fn test_enrichment_targets() {
        let add = Operation::add_column(
            "Work email",
            ColumnType::Enrichment,
            Some(EnrichmentType::Email),
            None,
        );
        let sheet = apply(&seeded(), &add, &ctx()).unwrap();
        let column_id = sheet.columns[3].id.clone();
        assert_eq!(enrichment_targets(&sheet, &column_id).len(), 2);
        assert!(enrichment_targets(&sheet, "col_name").is_empty());

        let start = Operation::SetEnrichmentState {
            row_id: "row_2".to_string(),
            column_id: column_id.clone(),
            update: EnrichmentUpdate::start(),
        };
        let sheet = apply(&sheet, &start, &ctx()).unwrap();
        let targets = enrichment_targets(&sheet, &column_id);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].row_id, "row_1");
    }

    #[test]
    fn test_operation_json_shape() {
        let op = Operation::edit_cell("row_1", "col_name", "Ann");
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "editCell");
        assert_eq!(json["rowId"], "row_1");
        assert_eq!(json["rawInput"], "Ann");
    }
}
