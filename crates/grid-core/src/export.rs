//! CSV export of a sheet

use crate::error::Result;
use crate::sheet::Sheet;
use std::fs;
use std::path::{Path, PathBuf};

/// Render the sheet as CSV: a header line of column names, then one line per row
pub fn export_csv(sheet: &Sheet) -> String {
    let mut lines = Vec::with_capacity(sheet.rows.len() + 1);

    let header: Vec<String> = sheet.columns.iter().map(|c| escape_csv(&c.name)).collect();
    lines.push(header.join(","));

    for row in &sheet.rows {
        let values: Vec<String> = sheet
            .columns
            .iter()
            .map(|col| {
                row.get(&col.id)
                    .map(|c| escape_csv(&c.value.to_string_value()))
                    .unwrap_or_default()
            })
            .collect();
        lines.push(values.join(","));
    }

    lines.join("\n")
}

/// File name for an exported sheet
pub fn export_file_name(sheet: &Sheet) -> String {
    let stem: String = sheet
        .name
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    let stem = stem.trim();
    if stem.is_empty() {
        "export.csv".to_string()
    } else {
        format!("{}.csv", stem)
    }
}

/// Write the sheet into `dir` under its export file name
pub fn write_csv<P: AsRef<Path>>(sheet: &Sheet, dir: P) -> Result<PathBuf> {
    let path = dir.as_ref().join(export_file_name(sheet));
    fs::write(&path, export_csv(sheet))?;
    Ok(path)
}

/// Escape a value for CSV output
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
