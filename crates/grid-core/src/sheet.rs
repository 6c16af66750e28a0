//! Core sheet types: columns, rows, cells and the sheet aggregate

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Narrowest width a column may have, in pixels
pub const MIN_COLUMN_WIDTH: u32 = 120;

/// Generate a fresh identifier with a readable prefix (e.g. `col_3f2a…`)
pub fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// Kind of data a column holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Number,
    Checkbox,
    Enrichment,
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ColumnType::Text => "text",
            ColumnType::Number => "number",
            ColumnType::Checkbox => "checkbox",
            ColumnType::Enrichment => "enrichment",
        };
        write!(f, "{}", name)
    }
}

/// What an enrichment worker should look up for an Enrichment column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentType {
    Email,
    Phone,
    Company,
    Custom,
}

/// A column definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Stable unique id (e.g. "col_name")
    pub id: String,
    /// Display name
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Present iff `column_type` is Enrichment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment_type: Option<EnrichmentType>,
    /// Present iff `enrichment_type` is Custom
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
    /// Display width, never below [`MIN_COLUMN_WIDTH`]
    pub width: u32,
    pub is_visible: bool,
}

impl Column {
    /// Create a visible column, normalizing the enrichment fields to the column type
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        column_type: ColumnType,
        enrichment_type: Option<EnrichmentType>,
        custom_prompt: Option<String>,
        width: u32,
    ) -> Self {
        let enrichment_type = match column_type {
            ColumnType::Enrichment => Some(enrichment_type.unwrap_or(EnrichmentType::Email)),
            _ => None,
        };
        let custom_prompt = match enrichment_type {
            Some(EnrichmentType::Custom) => Some(custom_prompt.unwrap_or_default()),
            _ => None,
        };

        Self {
            id: id.into(),
            name: name.into(),
            column_type,
            enrichment_type,
            custom_prompt,
            width: width.max(MIN_COLUMN_WIDTH),
            is_visible: true,
        }
    }

    /// Create a plain text column
    pub fn text(id: impl Into<String>, name: impl Into<String>, width: u32) -> Self {
        Self::new(id, name, ColumnType::Text, None, None, width)
    }
}

/// A typed cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Empty,
}

impl CellValue {
    /// Turn raw user input into a value that satisfies the column type.
    ///
    /// Number input that does not parse becomes `0`; entry is never blocked.
    /// Checkbox input is read for truthiness. Text and Enrichment keep the
    /// input verbatim, with the empty string stored as Empty.
    pub fn coerce(column_type: ColumnType, raw: &str) -> Self {
        match column_type {
            ColumnType::Number => match raw.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => CellValue::Number(n),
                _ => CellValue::Number(0.0),
            },
            ColumnType::Checkbox => CellValue::Bool(is_truthy(raw)),
            ColumnType::Text | ColumnType::Enrichment => {
                if raw.is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::Text(raw.to_string())
                }
            }
        }
    }

    /// The value a freshly created cell of this column type holds
    pub fn empty_for(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Checkbox => CellValue::Bool(false),
            _ => CellValue::Empty,
        }
    }

    /// Whether this value is allowed in a column of the given type
    pub fn fits(&self, column_type: ColumnType) -> bool {
        matches!(
            (column_type, self),
            (ColumnType::Number, CellValue::Number(_) | CellValue::Empty)
                | (ColumnType::Checkbox, CellValue::Bool(_))
                | (
                    ColumnType::Text | ColumnType::Enrichment,
                    CellValue::Text(_) | CellValue::Empty
                )
        )
    }

    /// Check if the cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Convert to a display string
    pub fn to_string_value(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Empty => String::new(),
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Empty => write!(f, ""),
        }
    }
}

fn is_truthy(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !matches!(
        trimmed.to_ascii_lowercase().as_str(),
        "false" | "0" | "no" | "off"
    )
}

/// The value at a (row, column) intersection plus its enrichment status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub id: String,
    pub row_id: String,
    pub column_id: String,
    pub value: CellValue,
    #[serde(default)]
    pub is_enriching: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment_error: Option<String>,
}

impl Cell {
    /// Create a cell with no enrichment state
    pub fn new(row_id: &str, column_id: &str, value: CellValue) -> Self {
        Self {
            id: format!("cell_{}_{}", row_id, column_id),
            row_id: row_id.to_string(),
            column_id: column_id.to_string(),
            value,
            is_enriching: false,
            enrichment_error: None,
        }
    }
}

/// A record holding one cell per column, keyed by column id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: String,
    pub cells: BTreeMap<String, Cell>,
}

impl Row {
    /// Create a row without cells
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cells: BTreeMap::new(),
        }
    }

    /// Get the cell for a column id
    pub fn get(&self, column_id: &str) -> Option<&Cell> {
        self.cells.get(column_id)
    }

    /// Insert or overwrite the value for a column, keeping an existing cell id
    pub fn set(&mut self, column_id: &str, value: CellValue) {
        match self.cells.get_mut(column_id) {
            Some(cell) => cell.value = value,
            None => {
                let cell = Cell::new(&self.id, column_id, value);
                self.cells.insert(column_id.to_string(), cell);
            }
        }
    }
}

/// The aggregate of columns, rows and metadata owned by one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sheet {
    pub id: String,
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
    #[serde(rename = "userId")]
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sheet {
    /// Create an empty sheet
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: new_id("sheet"),
            name: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            owner_id: owner_id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create the sample sheet a new owner starts with
    pub fn seed(owner_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut sheet = Self::new(owner_id, "My Spreadsheet", now);
        sheet.columns = vec![
            Column::text("col_name", "Name", 200),
            Column::text("col_email", "Email", 250),
            Column::text("col_company", "Company", 200),
        ];

        let samples = [
            ("row_1", "John Doe", "john@example.com", "Acme Corp"),
            ("row_2", "Jane Smith", "jane@company.com", "Tech Solutions"),
        ];
        for (id, name, email, company) in samples {
            let mut row = Row::new(id);
            row.set("col_name", CellValue::Text(name.to_string()));
            row.set("col_email", CellValue::Text(email.to_string()));
            row.set("col_company", CellValue::Text(company.to_string()));
            sheet.rows.push(row);
        }

        sheet
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Find a column by id
    pub fn find_column(&self, id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Find the first column with this display name
    pub fn find_column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Find a row by id
    pub fn find_row(&self, id: &str) -> Option<&Row> {
        self.rows.iter().find(|r| r.id == id)
    }

    /// Get the cell at a (row, column) intersection
    pub fn cell(&self, row_id: &str, column_id: &str) -> Option<&Cell> {
        self.find_row(row_id).and_then(|r| r.get(column_id))
    }

    /// Columns the grid should render
    pub fn visible_columns(&self) -> Vec<&Column> {
        self.columns.iter().filter(|c| c.is_visible).collect()
    }

    /// Move `updated_at` forward to `now`; never moves it backwards
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Verify the structural invariants every committed snapshot must hold
    pub fn check_integrity(&self) -> Result<()> {
        let mut column_ids = HashSet::new();
        for column in &self.columns {
            if !column_ids.insert(column.id.as_str()) {
                return Err(Error::Integrity(format!("duplicate column id '{}'", column.id)));
            }
            if column.width < MIN_COLUMN_WIDTH {
                return Err(Error::Integrity(format!(
                    "column '{}' is {}px wide",
                    column.id, column.width
                )));
            }
        }

        let mut row_ids = HashSet::new();
        for row in &self.rows {
            if !row_ids.insert(row.id.as_str()) {
                return Err(Error::Integrity(format!("duplicate row id '{}'", row.id)));
            }
            if row.cells.len() != self.columns.len() {
                return Err(Error::Integrity(format!(
                    "row '{}' has {} cells for {} columns",
                    row.id,
                    row.cells.len(),
                    self.columns.len()
                )));
            }
            for column in &self.columns {
                let cell = row.cells.get(&column.id).ok_or_else(|| {
                    Error::Integrity(format!("row '{}' has no cell for '{}'", row.id, column.id))
                })?;
                if !cell.value.fits(column.column_type) {
                    return Err(Error::Integrity(format!(
                        "cell '{}' holds {:?} in a {} column",
                        cell.id, cell.value, column.column_type
                    )));
                }
            }
        }

        Ok(())
    }
}
