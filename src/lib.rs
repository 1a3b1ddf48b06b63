//! tablemerge - merge structurally-compatible tabular files
//!
//! This crate ingests CSV and Excel uploads, partitions them by
//! column-name signature, lets the caller keep one structurally
//! compatible group when structures diverge, concatenates the kept
//! tables, and serializes the result as CSV or Excel bytes.
//!
//! The entry point is [`MergeSession`]; a frontend owns one session per
//! user and drives it through ingest, selection, merge, and export.

pub mod export;
pub mod reader;
pub mod session;
pub mod types;

pub use session::MergeSession;
pub use types::{
    ColumnGroup, ColumnSignature, ExportBundle, ExportFormat, FileFormat, FileSummary, FileUpload,
    Grouping, IngestFailure, IngestReport, MergeError, SelectionPreview, SessionState, TableData,
};
