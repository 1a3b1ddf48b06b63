//! The grouping/selection engine
//!
//! A [`MergeSession`] owns one user's working set: the parsed tables,
//! the column-structure grouping derived from them, and the state
//! machine gating merge and export. Each session is independently
//! constructed and discarded; there is no shared or ambient state.
//!
//! State machine:
//!
//! ```text
//! EMPTY --ingest--> GROUPED --(single signature, auto)--> MERGE_READY
//! GROUPED --confirm(signature)--> MERGE_READY
//! MERGE_READY --merge--> MERGED --export(format)--> bytes
//! any state --reset--> EMPTY
//! ```
//!
//! Re-ingesting in any state replaces the previous working set
//! wholesale; nothing survives from the prior upload batch.

use crate::export;
use crate::reader;
use crate::types::{
    ColumnGroup, ColumnSignature, ExportBundle, ExportFormat, FileFormat, FileSummary, FileUpload,
    Grouping, IngestFailure, IngestReport, MergeError, SelectionPreview, SessionState, TableData,
};

/// Session-scoped merge engine
#[derive(Debug, Default)]
pub struct MergeSession {
    /// Working set of parsed tables, keyed by file name, insertion order
    tables: Vec<(String, TableData)>,
    /// Partition of the working set by column signature
    grouping: Grouping,
    /// Current lifecycle state
    state: SessionState,
    /// The merged table, present once `merge` has run
    merged: Option<TableData>,
}

impl MergeSession {
    /// Creates an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Ingest
    // ========================================================================

    /// Ingests a batch of uploaded files, replacing the working set.
    ///
    /// Each file is parsed according to its extension. Files that fail
    /// (unsupported extension or unreadable content) are recorded in the
    /// report and excluded from the working set; one bad file never
    /// aborts the batch. Uploading the same file name twice keeps the
    /// later contents at the original position.
    ///
    /// # Returns
    /// * `IngestReport` listing every loaded file and every rejection
    pub fn ingest(&mut self, files: Vec<FileUpload>) -> IngestReport {
        self.tables.clear();
        self.merged = None;

        let mut report = IngestReport::default();

        for upload in files {
            let parsed = FileFormat::from_file_name(&upload.name)
                .and_then(|format| reader::parse_table(&upload.name, format, &upload.contents));

            match parsed {
                Ok(table) => {
                    self.insert_table(upload.name, table);
                }
                Err(error) => {
                    tracing::warn!("Rejected '{}' during ingest: {}", upload.name, error);
                    report.failures.push(IngestFailure {
                        file: upload.name,
                        error,
                    });
                }
            }
        }

        report.loaded = self.tables.iter().map(|(name, _)| name.clone()).collect();

        self.recompute();

        tracing::info!(
            "Ingest complete: {} file(s) loaded, {} rejected, {} column structure(s)",
            report.loaded.len(),
            report.failures.len(),
            self.grouping.len()
        );

        report
    }

    /// Inserts a parsed table, replacing any earlier upload of the same
    /// name in place.
    fn insert_table(&mut self, name: String, table: TableData) {
        if let Some(entry) = self.tables.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = table;
        } else {
            self.tables.push((name, table));
        }
    }

    /// Rebuilds the grouping and state from the current working set.
    fn recompute(&mut self) {
        self.merged = None;
        self.grouping = group_tables(&self.tables);

        self.state = if self.tables.is_empty() {
            SessionState::Empty
        } else if self.grouping.auto_selection().is_some() {
            SessionState::MergeReady
        } else {
            SessionState::Grouped
        };
    }

    // ========================================================================
    // Read-Only Accessors
    // ========================================================================

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The current partition of the working set by column signature.
    pub fn grouping(&self) -> &Grouping {
        &self.grouping
    }

    /// Name, columns, and row count of every working-set file, in
    /// insertion order.
    pub fn file_summaries(&self) -> Vec<FileSummary> {
        self.tables
            .iter()
            .map(|(name, table)| FileSummary {
                name: name.clone(),
                columns: table.headers.clone(),
                row_count: table.row_count(),
            })
            .collect()
    }

    /// The first `limit` rows of one working-set file, for previews.
    pub fn preview(&self, file: &str, limit: usize) -> Option<TableData> {
        self.tables
            .iter()
            .find(|(name, _)| name == file)
            .map(|(_, table)| TableData {
                headers: table.headers.clone(),
                rows: table.rows.iter().take(limit).cloned().collect(),
            })
    }

    /// The merged table, if a merge has been produced.
    pub fn merged(&self) -> Option<&TableData> {
        self.merged.as_ref()
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Computes the kept/excluded split for a chosen signature without
    /// changing any state.
    ///
    /// # Returns
    /// * `Err(MergeError::InvalidSelection)` if the signature is not a
    ///   key of the current grouping
    pub fn select(&self, signature: &ColumnSignature) -> Result<SelectionPreview, MergeError> {
        self.grouping.selection(signature)
    }

    /// Applies a selection: drops excluded files from the working set
    /// and transitions to merge-ready.
    ///
    /// Validates before mutating, so a failed confirm leaves the session
    /// untouched. The excluded files are discarded, not hidden; they
    /// must be re-uploaded to come back.
    pub fn confirm(&mut self, signature: &ColumnSignature) -> Result<SelectionPreview, MergeError> {
        let preview = self.grouping.selection(signature)?;

        self.tables
            .retain(|(name, _)| preview.kept.iter().any(|kept| kept == name));
        self.recompute();

        Ok(preview)
    }

    // ========================================================================
    // Merge & Export
    // ========================================================================

    /// Concatenates the working set into one table.
    ///
    /// Rows are appended in insertion order; the merged column order is
    /// the first table's header order, and later tables' cells are
    /// re-projected onto it. No deduplication, no sorting.
    ///
    /// # Returns
    /// * `Err(MergeError::EmptySet)` if the working set is empty
    /// * `Err(MergeError::NotReady)` unless the session is merge-ready
    pub fn merge(&mut self) -> Result<&TableData, MergeError> {
        if self.tables.is_empty() {
            return Err(MergeError::EmptySet);
        }
        if self.state != SessionState::MergeReady {
            return Err(MergeError::NotReady { state: self.state });
        }

        let mut tables = self.tables.iter().map(|(_, table)| table);
        // Non-empty working set was checked above
        let first = match tables.next() {
            Some(table) => table,
            None => return Err(MergeError::EmptySet),
        };

        let headers = first.headers.clone();
        let mut rows = first.rows.clone();
        for table in tables {
            append_aligned_rows(&mut rows, &headers, table);
        }

        self.state = SessionState::Merged;
        Ok(self.merged.insert(TableData { headers, rows }))
    }

    /// Serializes the merged table for download.
    ///
    /// # Arguments
    /// * `format` - Output encoding
    /// * `file_stem` - Suggested file name without extension
    ///
    /// # Returns
    /// * `Err(MergeError::NotReady)` if no merge has been produced
    pub fn export(
        &self,
        format: ExportFormat,
        file_stem: &str,
    ) -> Result<ExportBundle, MergeError> {
        match &self.merged {
            Some(table) => export::export_table(table, format, file_stem),
            None => Err(MergeError::NotReady { state: self.state }),
        }
    }

    /// Clears all working state back to empty, as if no files had ever
    /// been ingested.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

// ============================================================================
// Grouping & Alignment
// ============================================================================

/// Partitions tables by column signature, preserving first-seen order
/// for both groups and the files within each group.
fn group_tables(tables: &[(String, TableData)]) -> Grouping {
    let mut grouping = Grouping::default();

    for (name, table) in tables {
        let signature = table.signature();
        match grouping.groups.iter_mut().find(|g| g.signature == signature) {
            Some(group) => group.files.push(name.clone()),
            None => grouping.groups.push(ColumnGroup {
                signature,
                files: vec![name.clone()],
            }),
        }
    }

    grouping
}

/// Appends a table's rows, re-projected onto the reference header order.
///
/// Tables reaching this point share one signature, so every reference
/// column name exists in the table (duplicate names are matched
/// positionally, each source column consumed once). A name that cannot
/// be matched yields empty cells rather than misaligned data.
fn append_aligned_rows(rows: &mut Vec<Vec<String>>, reference: &[String], table: &TableData) {
    if table.headers == reference {
        rows.extend(table.rows.iter().cloned());
        return;
    }

    let mut consumed = vec![false; table.headers.len()];
    let index_map: Vec<Option<usize>> = reference
        .iter()
        .map(|name| {
            let found = table
                .headers
                .iter()
                .enumerate()
                .find(|(i, header)| !consumed[*i] && *header == name)
                .map(|(i, _)| i);
            if let Some(i) = found {
                consumed[i] = true;
            }
            found
        })
        .collect();

    for row in &table.rows {
        let aligned: Vec<String> = index_map
            .iter()
            .map(|idx| match idx {
                Some(i) => row.get(*i).cloned().unwrap_or_default(),
                None => String::new(),
            })
            .collect();
        rows.push(aligned);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, content: &str) -> FileUpload {
        FileUpload::new(name, content.as_bytes().to_vec())
    }

    fn signature(columns: &[&str]) -> ColumnSignature {
        ColumnSignature::new(&columns.iter().map(|c| c.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn test_new_session_is_empty() {
        let session = MergeSession::new();
        assert_eq!(session.state(), SessionState::Empty);
        assert!(session.grouping().is_empty());
        assert!(session.merged().is_none());
    }

    #[test]
    fn test_same_columns_different_order_form_one_group() {
        let mut session = MergeSession::new();
        let report = session.ingest(vec![
            upload("a.csv", "id,name\n1,Alice\n2,Bob"),
            upload("b.csv", "name,id\nCarol,3\nDan,4\nEve,5"),
        ]);

        assert_eq!(report.loaded, vec!["a.csv", "b.csv"]);
        assert!(!report.has_failures());
        assert_eq!(session.grouping().len(), 1);
        // Single group is auto-selected
        assert_eq!(session.state(), SessionState::MergeReady);
    }

    #[test]
    fn test_distinct_column_sets_partition_the_input() {
        let mut session = MergeSession::new();
        session.ingest(vec![
            upload("a.csv", "id,name\n1,Alice"),
            upload("c.csv", "id,value\n1,100"),
            upload("d.csv", "name,id\nBob,2"),
        ]);

        let grouping = session.grouping();
        assert_eq!(grouping.len(), 2);
        assert_eq!(session.state(), SessionState::Grouped);

        // Disjoint, union = input, first-seen order
        assert_eq!(grouping.groups[0].files, vec!["a.csv", "d.csv"]);
        assert_eq!(grouping.groups[1].files, vec!["c.csv"]);
    }

    #[test]
    fn test_ingest_collects_per_file_errors() {
        let mut session = MergeSession::new();
        let report = session.ingest(vec![
            upload("good.csv", "id\n1"),
            upload("notes.txt", "whatever"),
            upload("empty.csv", ""),
        ]);

        assert_eq!(report.loaded, vec!["good.csv"]);
        assert_eq!(report.failures.len(), 2);
        assert!(matches!(
            report.failures[0].error,
            MergeError::UnsupportedFormat { .. }
        ));
        assert!(matches!(
            report.failures[1].error,
            MergeError::ParseError { .. }
        ));

        // Failed files never enter any group
        assert_eq!(session.grouping().len(), 1);
        assert_eq!(session.grouping().groups[0].files, vec!["good.csv"]);
    }

    #[test]
    fn test_ingest_all_failures_leaves_session_empty() {
        let mut session = MergeSession::new();
        let report = session.ingest(vec![upload("bad.txt", "x")]);

        assert!(report.loaded.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(session.state(), SessionState::Empty);
    }

    #[test]
    fn test_duplicate_upload_name_keeps_later_contents_in_place() {
        let mut session = MergeSession::new();
        session.ingest(vec![
            upload("a.csv", "id\n1"),
            upload("b.csv", "id\n2"),
            upload("a.csv", "id\n9\n10"),
        ]);

        let summaries = session.file_summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].name, "a.csv");
        assert_eq!(summaries[0].row_count, 2);
        assert_eq!(summaries[1].name, "b.csv");
    }

    #[test]
    fn test_reingest_replaces_working_set_wholesale() {
        let mut session = MergeSession::new();
        session.ingest(vec![upload("a.csv", "id\n1")]);
        assert_eq!(session.state(), SessionState::MergeReady);

        session.ingest(vec![
            upload("x.csv", "k\n1"),
            upload("y.csv", "v\n2"),
        ]);

        let names: Vec<String> = session
            .file_summaries()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["x.csv", "y.csv"]);
        assert_eq!(session.state(), SessionState::Grouped);
    }

    #[test]
    fn test_select_is_side_effect_free() {
        let mut session = MergeSession::new();
        session.ingest(vec![
            upload("a.csv", "id,name\n1,Alice"),
            upload("c.csv", "id,value\n1,100"),
        ]);

        let preview = session.select(&signature(&["id", "value"])).unwrap();
        assert_eq!(preview.kept, vec!["c.csv"]);
        assert_eq!(preview.excluded, vec!["a.csv"]);

        // Nothing changed
        assert_eq!(session.state(), SessionState::Grouped);
        assert_eq!(session.file_summaries().len(), 2);
    }

    #[test]
    fn test_invalid_selection_leaves_grouping_unchanged() {
        let mut session = MergeSession::new();
        session.ingest(vec![
            upload("a.csv", "id,name\n1,Alice"),
            upload("c.csv", "id,value\n1,100"),
        ]);
        let before = session.grouping().clone();

        let missing = signature(&["nope"]);
        assert!(matches!(
            session.select(&missing),
            Err(MergeError::InvalidSelection)
        ));
        assert!(matches!(
            session.confirm(&missing),
            Err(MergeError::InvalidSelection)
        ));

        assert_eq!(session.grouping(), &before);
        assert_eq!(session.state(), SessionState::Grouped);
    }

    #[test]
    fn test_confirm_drops_excluded_files() {
        let mut session = MergeSession::new();
        session.ingest(vec![
            upload("a.csv", "id,name\n1,Alice"),
            upload("c.csv", "id,value\n1,100"),
        ]);

        let preview = session.confirm(&signature(&["id", "value"])).unwrap();
        assert_eq!(preview.kept, vec!["c.csv"]);
        assert_eq!(preview.excluded, vec!["a.csv"]);

        // Excluded files are gone, not hidden
        let names: Vec<String> = session
            .file_summaries()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["c.csv"]);
        assert_eq!(session.state(), SessionState::MergeReady);
        assert!(session.preview("a.csv", 3).is_none());
    }

    #[test]
    fn test_merge_concatenates_in_insertion_order() {
        let mut session = MergeSession::new();
        session.ingest(vec![
            upload("a.csv", "id,name\n1,Alice\n2,Bob"),
            upload("b.csv", "id,name\n3,Carol"),
        ]);

        let merged = session.merge().unwrap();
        assert_eq!(merged.headers, vec!["id", "name"]);
        assert_eq!(merged.row_count(), 3);
        assert_eq!(merged.rows[0], vec!["1", "Alice"]);
        assert_eq!(merged.rows[1], vec!["2", "Bob"]);
        assert_eq!(merged.rows[2], vec!["3", "Carol"]);
    }

    #[test]
    fn test_merge_aligns_reordered_columns() {
        let mut session = MergeSession::new();
        session.ingest(vec![
            upload("a.csv", "id,name\n1,Alice"),
            upload("b.csv", "name,id\nBob,2"),
        ]);

        let merged = session.merge().unwrap();
        // Column order follows the first file; b.csv's cells are
        // re-projected onto it
        assert_eq!(merged.headers, vec!["id", "name"]);
        assert_eq!(merged.rows[1], vec!["2", "Bob"]);
    }

    #[test]
    fn test_merge_on_empty_set_fails() {
        let mut session = MergeSession::new();
        assert!(matches!(session.merge(), Err(MergeError::EmptySet)));
    }

    #[test]
    fn test_merge_while_grouped_fails_not_ready() {
        let mut session = MergeSession::new();
        session.ingest(vec![
            upload("a.csv", "id,name\n1,Alice"),
            upload("c.csv", "id,value\n1,100"),
        ]);

        let result = session.merge();
        assert!(matches!(
            result,
            Err(MergeError::NotReady {
                state: SessionState::Grouped
            })
        ));
        // No partial result was produced
        assert!(session.merged().is_none());
    }

    #[test]
    fn test_export_before_merge_fails_not_ready() {
        let mut session = MergeSession::new();
        session.ingest(vec![upload("a.csv", "id\n1")]);

        let result = session.export(ExportFormat::Csv, "merged_data");
        assert!(matches!(result, Err(MergeError::NotReady { .. })));
    }

    #[test]
    fn test_reset_returns_to_empty_from_any_state() {
        let mut session = MergeSession::new();
        session.ingest(vec![upload("a.csv", "id\n1")]);
        session.merge().unwrap();
        assert_eq!(session.state(), SessionState::Merged);

        session.reset();
        assert_eq!(session.state(), SessionState::Empty);
        assert!(session.grouping().is_empty());
        assert!(session.merged().is_none());
        assert!(session.file_summaries().is_empty());
    }

    #[test]
    fn test_preview_limits_rows() {
        let mut session = MergeSession::new();
        session.ingest(vec![upload("a.csv", "id\n1\n2\n3\n4")]);

        let preview = session.preview("a.csv", 3).unwrap();
        assert_eq!(preview.row_count(), 3);
        assert_eq!(preview.headers, vec!["id"]);
    }

    // ========================================================================
    // End-To-End Scenarios
    // ========================================================================

    #[test]
    fn test_scenario_compatible_files_merge_and_export() {
        // a.csv (id,name, 2 rows) + b.csv (name,id, 3 rows): one group,
        // auto merge-ready, 5 rows after merge, 6-line CSV export
        let mut session = MergeSession::new();
        let report = session.ingest(vec![
            upload("a.csv", "id,name\n1,Alice\n2,Bob"),
            upload("b.csv", "name,id\nCarol,3\nDan,4\nEve,5"),
        ]);

        assert_eq!(report.loaded.len(), 2);
        assert_eq!(session.grouping().len(), 1);
        assert_eq!(session.state(), SessionState::MergeReady);

        let merged = session.merge().unwrap();
        assert_eq!(merged.row_count(), 5);

        let bundle = session.export(ExportFormat::Csv, "merged_data").unwrap();
        assert_eq!(bundle.file_name, "merged_data.csv");

        let text = String::from_utf8(bundle.bytes).unwrap();
        assert_eq!(text.lines().count(), 6);
        assert_eq!(text.lines().next().unwrap(), "id,name");
    }

    #[test]
    fn test_scenario_divergent_files_select_and_merge() {
        // a.csv (id,name) + c.csv (id,value): two groups of one file
        // each; keeping c.csv's structure excludes a.csv
        let mut session = MergeSession::new();
        session.ingest(vec![
            upload("a.csv", "id,name\n1,Alice"),
            upload("c.csv", "id,value\n1,100"),
        ]);

        assert_eq!(session.grouping().len(), 2);
        assert_eq!(session.state(), SessionState::Grouped);

        let chosen = signature(&["id", "value"]);
        let preview = session.confirm(&chosen).unwrap();
        assert_eq!(preview.kept, vec!["c.csv"]);
        assert_eq!(preview.excluded, vec!["a.csv"]);

        let merged = session.merge().unwrap();
        assert_eq!(merged.headers, vec!["id", "value"]);
        assert_eq!(merged.row_count(), 1);
    }

    #[test]
    fn test_scenario_export_round_trip() {
        let mut session = MergeSession::new();
        session.ingest(vec![
            upload("a.csv", "id,name\n1,Alice\n2,Bob"),
            upload("b.csv", "name,id\nCarol,3"),
        ]);
        session.merge().unwrap();

        let bundle = session.export(ExportFormat::Csv, "out").unwrap();
        let reparsed = crate::reader::parse_csv("out.csv", &bundle.bytes).unwrap();

        let merged = session.merged().unwrap();
        assert_eq!(reparsed.headers, merged.headers);
        assert_eq!(reparsed.rows, merged.rows);
    }
}
