//! Core type definitions for the table merge engine
//!
//! Contains the data types for parsed tables, column-structure grouping,
//! export payloads, and the typed error enum shared by every operation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Core Data Types
// ============================================================================

/// A single row of tabular data represented as a vector of string values
pub type TableRow = Vec<String>;

/// A parsed tabular file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableData {
    /// Column headers, in the order they appear in the file
    pub headers: Vec<String>,
    /// Data rows (each row is normalized to the header width)
    pub rows: Vec<TableRow>,
}

impl TableData {
    /// Number of data rows (excludes the header row).
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// The order-independent column signature of this table.
    pub fn signature(&self) -> ColumnSignature {
        ColumnSignature::new(&self.headers)
    }
}

/// A file handed to the engine for ingestion
#[derive(Debug, Clone)]
pub struct FileUpload {
    /// File name including extension; doubles as the file identifier
    pub name: String,
    /// Raw file contents
    pub contents: Vec<u8>,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// Input file formats recognized by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileFormat {
    /// Comma-separated text with a header row
    Csv,
    /// Office Open XML workbook
    Xlsx,
    /// Legacy binary Excel workbook
    Xls,
}

impl FileFormat {
    /// Derives the format from a file name's extension.
    ///
    /// Matching is case-insensitive (`data.CSV` parses as CSV). Any
    /// extension outside the recognized set is an `UnsupportedFormat`
    /// error naming the file.
    pub fn from_file_name(name: &str) -> Result<Self, MergeError> {
        let lower = name.to_lowercase();
        if lower.ends_with(".csv") {
            Ok(FileFormat::Csv)
        } else if lower.ends_with(".xlsx") {
            Ok(FileFormat::Xlsx)
        } else if lower.ends_with(".xls") {
            Ok(FileFormat::Xls)
        } else {
            Err(MergeError::UnsupportedFormat {
                file: name.to_string(),
            })
        }
    }
}

// ============================================================================
// Grouping Types
// ============================================================================

/// Order-independent identity of a table's column set.
///
/// Two tables are structurally compatible iff their signatures are equal.
/// The signature is the lexicographically sorted list of column names;
/// casing and whitespace are preserved as-is, so `"Id"` and `"id"` are
/// distinct columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnSignature(Vec<String>);

impl ColumnSignature {
    /// Builds a signature from column names, ignoring their order.
    pub fn new(columns: &[String]) -> Self {
        let mut sorted: Vec<String> = columns.to_vec();
        sorted.sort();
        Self(sorted)
    }

    /// The sorted column names that make up this signature.
    pub fn columns(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Files sharing one column signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnGroup {
    /// The shared column signature
    pub signature: ColumnSignature,
    /// File names in this group, in first-seen order
    pub files: Vec<String>,
}

/// Partition of the working set by column signature.
///
/// Groups appear in first-seen order. Every successfully parsed file
/// belongs to exactly one group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grouping {
    pub groups: Vec<ColumnGroup>,
}

impl Grouping {
    /// Looks up the group for a signature, if one exists.
    pub fn get(&self, signature: &ColumnSignature) -> Option<&ColumnGroup> {
        self.groups.iter().find(|g| &g.signature == signature)
    }

    /// Number of distinct column structures.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// The implicit selection when exactly one group exists.
    ///
    /// A single group means every file already shares one structure, so
    /// the set is merge-ready without user input. Returns `None` when
    /// zero or multiple groups exist.
    pub fn auto_selection(&self) -> Option<&ColumnSignature> {
        match self.groups.as_slice() {
            [only] => Some(&only.signature),
            _ => None,
        }
    }

    /// Computes the kept/excluded split for a chosen signature.
    ///
    /// Side-effect-free; fails with `InvalidSelection` if the signature
    /// is not a key of this grouping.
    pub fn selection(&self, signature: &ColumnSignature) -> Result<SelectionPreview, MergeError> {
        if self.get(signature).is_none() {
            return Err(MergeError::InvalidSelection);
        }

        let mut kept = Vec::new();
        let mut excluded = Vec::new();
        for group in &self.groups {
            if &group.signature == signature {
                kept.extend(group.files.iter().cloned());
            } else {
                excluded.extend(group.files.iter().cloned());
            }
        }

        Ok(SelectionPreview { kept, excluded })
    }
}

/// The kept/excluded file split implied by a group selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionPreview {
    /// Files that would be merged
    pub kept: Vec<String>,
    /// Files that would be dropped from the working set
    pub excluded: Vec<String>,
}

// ============================================================================
// Ingest Report Types
// ============================================================================

/// A file that was rejected during ingest, with the reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestFailure {
    /// Name of the rejected file
    pub file: String,
    /// Why the file was rejected
    pub error: MergeError,
}

/// Outcome of an ingest batch.
///
/// Every uploaded file appears exactly once, either in `loaded` or in
/// `failures`; no rejection is silently swallowed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    /// Files parsed successfully, in upload order
    pub loaded: Vec<String>,
    /// Files rejected, with per-file errors
    pub failures: Vec<IngestFailure>,
}

impl IngestReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Summary of one working-set file, for display in a file list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    /// File name
    pub name: String,
    /// Column headers in file order
    pub columns: Vec<String>,
    /// Number of data rows
    pub row_count: usize,
}

// ============================================================================
// Export Types
// ============================================================================

/// Output encodings for the merged table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExportFormat {
    /// UTF-8 comma-separated text
    Csv,
    /// Single-sheet workbook
    Xlsx,
}

impl ExportFormat {
    /// The file extension (without the dot) for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

/// Serialized export output, ready to hand to a download handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    /// Suggested file name (caller-supplied stem plus extension)
    pub file_name: String,
    /// Encoded file contents
    pub bytes: Vec<u8>,
}

// ============================================================================
// Session State
// ============================================================================

/// Lifecycle states of a merge session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// No files ingested
    Empty,
    /// Files ingested, multiple column structures, selection pending
    Grouped,
    /// A single unambiguous file set is ready for concatenation
    MergeReady,
    /// Merge produced; the result is available for export
    Merged,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Empty
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Typed error enum for merge operations
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", content = "details", rename_all = "camelCase")]
pub enum MergeError {
    /// File extension is not .csv, .xlsx, or .xls
    #[error("Unsupported file format: {file}")]
    UnsupportedFormat { file: String },

    /// File matched a recognized extension but its content is unreadable
    #[error("Failed to parse {file}: {message}")]
    ParseError { file: String, message: String },

    /// Selection references a signature not present in the grouping
    #[error("Selection does not match any column structure group")]
    InvalidSelection,

    /// Operation requires a state the session is not in
    #[error("Operation not allowed in state {state:?}")]
    NotReady { state: SessionState },

    /// Merge requested on an empty working set
    #[error("No files available to merge")]
    EmptySet,

    /// Export serialization failed
    #[error("Failed to write export: {message}")]
    WriteError { message: String },
}
