//! Export serialization
//!
//! Serializes a merged table to CSV or Excel bytes. Both encodings are
//! deterministic: identical input and format choice always produce
//! byte-identical output (rust_xlsxwriter stamps a fixed creation time
//! into the workbook, so even the zip container is reproducible).

use rust_xlsxwriter::Workbook;

use crate::types::{ExportBundle, ExportFormat, MergeError, TableData};

/// Sheet name used for Excel exports
pub const EXPORT_SHEET_NAME: &str = "Merged Data";

/// Serializes a table and attaches the suggested download file name.
///
/// # Arguments
/// * `table` - The merged table to serialize
/// * `format` - Output encoding
/// * `file_stem` - Caller-supplied file name without extension; the
///   correct extension is appended here
pub fn export_table(
    table: &TableData,
    format: ExportFormat,
    file_stem: &str,
) -> Result<ExportBundle, MergeError> {
    let bytes = match format {
        ExportFormat::Csv => to_csv_bytes(table)?,
        ExportFormat::Xlsx => to_xlsx_bytes(table)?,
    };

    Ok(ExportBundle {
        file_name: format!("{}.{}", file_stem, format.extension()),
        bytes,
    })
}

/// Encodes a table as UTF-8 comma-separated text.
///
/// Header row first, one line per data row, `\n`-terminated, no
/// row-index column. Fields containing commas, quotes, or newlines are
/// quoted per RFC 4180 by the `csv` writer.
pub fn to_csv_bytes(table: &TableData) -> Result<Vec<u8>, MergeError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(&table.headers)
        .map_err(|e| MergeError::WriteError {
            message: format!("Failed to write CSV header row: {}", e),
        })?;

    for row in &table.rows {
        writer.write_record(row).map_err(|e| MergeError::WriteError {
            message: format!("Failed to write CSV row: {}", e),
        })?;
    }

    writer
        .into_inner()
        .map_err(|e| MergeError::WriteError {
            message: format!("Failed to flush CSV output: {}", e),
        })
}

/// Encodes a table as a single-sheet .xlsx workbook.
///
/// Sheet name is "Merged Data", header row first, one row per record,
/// no index column. Every cell is written as a string; the engine never
/// reinterprets cell values.
pub fn to_xlsx_bytes(table: &TableData) -> Result<Vec<u8>, MergeError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    worksheet
        .set_name(EXPORT_SHEET_NAME)
        .map_err(|e| MergeError::WriteError {
            message: format!("Failed to name worksheet: {}", e),
        })?;

    for (col, header) in table.headers.iter().enumerate() {
        worksheet
            .write_string(0, column_number(col)?, header.as_str())
            .map_err(|e| MergeError::WriteError {
                message: format!("Failed to write header cell: {}", e),
            })?;
    }

    for (row_idx, row) in table.rows.iter().enumerate() {
        for (col, cell) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32 + 1, column_number(col)?, cell.as_str())
                .map_err(|e| MergeError::WriteError {
                    message: format!("Failed to write data cell: {}", e),
                })?;
        }
    }

    workbook.save_to_buffer().map_err(|e| MergeError::WriteError {
        message: format!("Failed to serialize workbook: {}", e),
    })
}

/// Converts a zero-based column index to the worksheet column type.
///
/// The writer rejects columns past the xlsx sheet limit on its own; this
/// conversion keeps the bound explicit instead of letting a cast wrap.
fn column_number(col: usize) -> Result<u16, MergeError> {
    u16::try_from(col).map_err(|_| MergeError::WriteError {
        message: format!("Too many columns for an xlsx sheet: {}", col + 1),
    })
}
