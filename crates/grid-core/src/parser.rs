//! CSV parser for imported files
//!
//! Row 0 is always the header row. Blank lines are skipped. Short records
//! are padded with empty fields; long records are truncated to the header.
//! A quoted field that is never closed rejects the whole file.

use crate::error::{Error, Result};
use tracing::warn;

/// Raw text content of a CSV file, split into header and data rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCsv {
    /// File name the data came from
    pub source_name: String,
    pub headers: Vec<String>,
    /// Data rows, each exactly `headers.len()` fields long
    pub rows: Vec<Vec<String>>,
}

impl ParsedCsv {
    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Get the number of data rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Value in the first data row for a header index, used as a sample
    pub fn sample(&self, index: usize) -> Option<&str> {
        self.rows
            .first()
            .and_then(|r| r.get(index))
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Parse raw file bytes into headers and rows
pub fn parse_csv_bytes(bytes: &[u8], source_name: &str) -> Result<ParsedCsv> {
    let parse_error = |message: String| Error::Parse {
        source_name: source_name.to_string(),
        message,
    };

    if let Some(line) = unterminated_quote_line(bytes) {
        return Err(parse_error(format!(
            "Quoted field unterminated (opened on line {})",
            line
        )));
    }

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true) // Allow varying number of fields
        .from_reader(bytes);

    let mut records = Vec::new();
    for result in csv_reader.records() {
        let record = result.map_err(|e| parse_error(e.to_string()))?;
        if record.len() == 1 && record[0].is_empty() {
            continue;
        }
        records.push(record);
    }

    let mut records = records.into_iter();
    let header_record = records
        .next()
        .ok_or_else(|| parse_error("CSV file is empty".to_string()))?;
    let headers: Vec<String> = header_record.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for (row_idx, record) in records.enumerate() {
        let mut cells: Vec<String> = record.iter().map(str::to_string).collect();

        if cells.len() > headers.len() {
            warn!(
                row = row_idx + 1,
                source = source_name,
                "row has more fields than headers, truncating"
            );
            cells.truncate(headers.len());
        }
        // Pad with empty cells if row is shorter than header
        cells.resize(headers.len(), String::new());

        rows.push(cells);
    }

    Ok(ParsedCsv {
        source_name: source_name.to_string(),
        headers,
        rows,
    })
}

/// Line on which a quoted field opens without ever closing
fn unterminated_quote_line(bytes: &[u8]) -> Option<usize> {
    let mut line = 1;
    let mut opened_on = 0;
    let mut in_quotes = false;
    let mut field_start = true;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if in_quotes {
            match b {
                // Doubled quote is an escaped quote inside the field
                b'"' if bytes.get(i + 1) == Some(&b'"') => i += 1,
                b'"' => in_quotes = false,
                b'\n' => line += 1,
                _ => {}
            }
            field_start = false;
        } else {
            match b {
                b'"' if field_start => {
                    in_quotes = true;
                    opened_on = line;
                    field_start = false;
                }
                b',' | b'\r' => field_start = true,
                b'\n' => {
                    line += 1;
                    field_start = true;
                }
                _ => field_start = false,
            }
        }
        i += 1;
    }

    in_quotes.then_some(opened_on)
}

/// Parse CSV from a string (useful for testing)
pub fn parse_csv_str(content: &str, source_name: &str) -> Result<ParsedCsv> {
    parse_csv_bytes(content.as_bytes(), source_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_csv() {
        let csv = "Name,Email\nAlice,alice@x.com\nBob,bob@x.com";
        let parsed = parse_csv_str(csv, "people.csv").unwrap();

        assert_eq!(parsed.headers, vec!["Name", "Email"]);
        assert_eq!(parsed.row_count(), 2);
        assert_eq!(parsed.rows[1], vec!["Bob", "bob@x.com"]);
    }

    #[test]
    fn test_parse_skips_blank_lines() {
        let csv = "\nName,Email\n\nAlice,a@x.com\n\n\nBob,b@x.com\n";
        let parsed = parse_csv_str(csv, "people.csv").unwrap();
        assert_eq!(parsed.headers, vec!["Name", "Email"]);
        assert_eq!(parsed.row_count(), 2);
    }

    #[test]
    fn test_parse_quoted_fields() {
        let csv = "Company,Quote\n\"Acme, Inc.\",\"She said \"\"hi\"\"\"\n";
        let parsed = parse_csv_str(csv, "q.csv").unwrap();
        assert_eq!(parsed.rows[0], vec!["Acme, Inc.", "She said \"hi\""]);
    }

    #[test]
    fn test_parse_ragged_rows() {
        let csv = "A,B,C\n1\n1,2,3,4\n";
        let parsed = parse_csv_str(csv, "r.csv").unwrap();
        assert_eq!(parsed.rows[0], vec!["1", "", ""]);
        assert_eq!(parsed.rows[1], vec!["1", "2", "3"]);
    }

    #[test]
    fn test_parse_unterminated_quote() {
        let err = parse_csv_str("Name\n\"Alice,x\nBob,y", "bad.csv").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(err.to_string().contains("Quoted field unterminated"));
        assert!(err.to_string().contains("line 2"));

        let err = parse_csv_str("Name,Email\n\"Alice,alice@x.com\nBob,bob@x.com\n", "bad.csv")
            .unwrap_err();
        assert!(err.to_string().contains("Quoted field unterminated"));
    }

    #[test]
    fn test_parse_multiline_quoted_field() {
        let csv = "Name,Note\nAlice,\"line one\nline \"\"two\"\"\"\nBob,x\n";
        let parsed = parse_csv_str(csv, "notes.csv").unwrap();
        assert_eq!(parsed.row_count(), 2);
        assert_eq!(parsed.rows[0][1], "line one\nline \"two\"");
    }

    #[test]
    fn test_parse_empty_input() {
        for input in ["", "\n\n"] {
            let err = parse_csv_str(input, "empty.csv").unwrap_err();
            assert!(matches!(err, Error::Parse { .. }));
            assert!(err.to_string().contains("CSV file is empty"));
        }
    }

    #[test]
    fn test_parse_header_only() {
        let parsed = parse_csv_str("Name,Email\n", "h.csv").unwrap();
        assert_eq!(parsed.column_count(), 2);
        assert_eq!(parsed.row_count(), 0);
        assert_eq!(parsed.sample(0), None);
    }

    #[test]
    fn test_parse_invalid_utf8() {
        let bytes = b"Name\n\xff\xfe\n";
        let err = parse_csv_bytes(bytes, "bin.csv").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
