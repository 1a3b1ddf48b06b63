//! File parsing logic
//!
//! Turns raw uploaded bytes into [`TableData`] according to the declared
//! file format. CSV goes through the `csv` crate with flexible row
//! handling; Excel workbooks go through `calamine` (first sheet only,
//! header row expected).

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};

use crate::types::{FileFormat, MergeError, TableData, TableRow};

/// Parses uploaded bytes into a table according to the declared format.
///
/// # Arguments
/// * `file` - File name, used for error reporting only
/// * `format` - The format derived from the file's extension
/// * `contents` - Raw file bytes
///
/// # Returns
/// * `TableData` with headers and rows normalized to the header width
pub fn parse_table(
    file: &str,
    format: FileFormat,
    contents: &[u8],
) -> Result<TableData, MergeError> {
    match format {
        FileFormat::Csv => parse_csv(file, contents),
        FileFormat::Xlsx | FileFormat::Xls => parse_workbook(file, contents),
    }
}

/// Parses CSV bytes into a table.
///
/// # Behavior
/// - The first record is the header row; a file without one fails
/// - Handles variable column counts (flexible parsing)
/// - Skips unreadable records with a warning (does not fail the file)
/// - Header names are kept exactly as written; no trimming or case
///   folding, so signature comparison stays byte-exact
pub fn parse_csv(file: &str, contents: &[u8]) -> Result<TableData, MergeError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true) // Allow variable column counts
        .has_headers(true)
        .from_reader(contents);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| MergeError::ParseError {
            file: file.to_string(),
            message: format!("Failed to parse CSV headers: {}", e),
        })?
        .iter()
        .map(|s| s.to_string())
        .collect();

    if headers.is_empty() {
        return Err(MergeError::ParseError {
            file: file.to_string(),
            message: "CSV file has no header row".to_string(),
        });
    }

    let header_count = headers.len();
    let mut rows: Vec<TableRow> = Vec::new();
    let mut skipped_rows: usize = 0;

    for (line_number, result) in reader.records().enumerate() {
        match result {
            Ok(record) => {
                let row: TableRow = record.iter().map(|s| s.to_string()).collect();
                rows.push(normalize_row(row, header_count));
            }
            Err(e) => {
                skipped_rows += 1;
                tracing::warn!(
                    "Skipping unreadable record {} in '{}': {}",
                    line_number + 2, // +1 for 1-based indexing, +1 for the header row
                    file,
                    e
                );
            }
        }
    }

    if skipped_rows > 0 {
        tracing::info!(
            "Parsed '{}': {} rows kept, {} rows skipped due to errors",
            file,
            rows.len(),
            skipped_rows
        );
    }

    Ok(TableData { headers, rows })
}

/// Parses an Excel workbook (.xlsx or .xls) into a table.
///
/// Reads the first sheet only. The first row is the header row; every
/// cell is rendered to its string form since the engine never interprets
/// cell values.
pub fn parse_workbook(file: &str, contents: &[u8]) -> Result<TableData, MergeError> {
    let cursor = Cursor::new(contents.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor).map_err(|e| MergeError::ParseError {
        file: file.to_string(),
        message: format!("Failed to open workbook: {}", e),
    })?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| MergeError::ParseError {
            file: file.to_string(),
            message: "Workbook has no sheets".to_string(),
        })?
        .map_err(|e| MergeError::ParseError {
            file: file.to_string(),
            message: format!("Failed to read first sheet: {}", e),
        })?;

    let mut rows_iter = range.rows();

    let headers: Vec<String> = rows_iter
        .next()
        .ok_or_else(|| MergeError::ParseError {
            file: file.to_string(),
            message: "Sheet has no header row".to_string(),
        })?
        .iter()
        .map(cell_to_string)
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(MergeError::ParseError {
            file: file.to_string(),
            message: "Sheet has no header row".to_string(),
        });
    }

    let header_count = headers.len();
    let rows: Vec<TableRow> = rows_iter
        .map(|cells| {
            let row: TableRow = cells.iter().map(cell_to_string).collect();
            normalize_row(row, header_count)
        })
        .collect();

    Ok(TableData { headers, rows })
}

/// Normalizes a row to match the expected column count.
///
/// - If the row has fewer columns than headers, pad with empty strings
/// - If the row has more columns than headers, truncate
fn normalize_row(mut row: TableRow, header_count: usize) -> TableRow {
    while row.len() < header_count {
        row.push(String::new());
    }
    row.truncate(header_count);
    row
}

/// Renders one workbook cell to its string form.
///
/// Integral floats print without a trailing `.0` so spreadsheet numbers
/// round-trip the way they display.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => e.to_string(),
    }
}
