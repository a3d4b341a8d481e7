//! Upload → Extract → Match & Save, as user-triggered actions over a [`SessionState`].
//!
//! Each action checks the upstream slot it depends on, calls its collaborator, and only
//! writes back on success. Nothing advances on its own.
//!
//! The two remote actions also come split in three (read inputs, call out, commit) so a
//! caller can run the network part without holding the session.

use crate::db::OrderStore;
use crate::error::{PipelineError, Result};
use crate::export::ExportFormat;
use crate::extract::LineItemExtractor;
use crate::matching::{align_candidates, descriptions, CandidateMap, CandidateMatcher};
use crate::session::{SessionState, Slot};
use crate::types::{cell_text, LineItemTable, MatchCandidates, UploadedDocument, MATCHED_ITEM_COLUMN};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

/// Largest PDF accepted for upload.
pub const MAX_DOCUMENT_BYTES: usize = 50 * 1024 * 1024;

/// Rows shown back after a save.
pub const RECENT_ROWS: usize = 5;

const NEED_DOCUMENT: &str = "Upload a PDF first.";
const NEED_TABLE: &str = "Run the Generate Extraction step first.";

/// Which actions the current session state allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageGates {
    pub can_extract: bool,
    pub can_match: bool,
    pub can_save: bool,
    pub has_candidates: bool,
}

pub fn stage_gates(session: &SessionState) -> StageGates {
    let has_table = session.is_present(Slot::Table);
    StageGates {
        can_extract: session.is_present(Slot::Document),
        can_match: has_table,
        can_save: has_table,
        has_candidates: session.is_present(Slot::MatchCandidates),
    }
}

// ── Upload ────────────────────────────────────────────────────────────────

/// Check that `bytes` look like a PDF we are willing to send.
pub fn validate_pdf(bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        return Err(PipelineError::InvalidDocument("File is empty.".to_string()));
    }
    if bytes.len() > MAX_DOCUMENT_BYTES {
        return Err(PipelineError::InvalidDocument("File too large (max 50MB).".to_string()));
    }
    if !bytes.starts_with(b"%PDF-") {
        return Err(PipelineError::InvalidDocument("Not a valid PDF file.".to_string()));
    }
    Ok(())
}

/// Replace the session's document. Table and candidates from an earlier document stay.
pub fn upload_document(session: &mut SessionState, file_name: &str, bytes: Vec<u8>) -> Result<()> {
    validate_pdf(&bytes)?;
    info!(file = file_name, bytes = bytes.len(), "document uploaded");
    session.set_document(UploadedDocument {
        file_name: file_name.to_string(),
        bytes,
    });
    Ok(())
}

// ── Extract ───────────────────────────────────────────────────────────────

/// Clone of the document to send, so the request can run without the session borrowed.
pub fn extraction_input(session: &SessionState) -> Result<UploadedDocument> {
    session
        .document()
        .cloned()
        .ok_or(PipelineError::NotReady(NEED_DOCUMENT))
}

pub fn run_extraction(extractor: &dyn LineItemExtractor, document: &UploadedDocument) -> Result<LineItemTable> {
    extractor.extract(document).map_err(|e| {
        warn!(error = %e, "extraction failed; keeping previous table");
        e
    })
}

/// Store a fresh extraction result. Returns its row count.
pub fn commit_extraction(session: &mut SessionState, table: LineItemTable) -> usize {
    let rows = table.row_count();
    session.set_table(table);
    rows
}

pub fn generate_extraction(session: &mut SessionState, extractor: &dyn LineItemExtractor) -> Result<usize> {
    let document = session
        .document()
        .ok_or(PipelineError::NotReady(NEED_DOCUMENT))?;
    let table = run_extraction(extractor, document)?;
    Ok(commit_extraction(session, table))
}

fn table_mut(session: &mut SessionState) -> Result<&mut LineItemTable> {
    session.table_mut().ok_or(PipelineError::NotReady(NEED_TABLE))
}

/// Grid write-back: the edited table replaces the stored one.
pub fn replace_table(session: &mut SessionState, table: LineItemTable) -> Result<()> {
    let previous_rows = table_mut(session)?.row_count();
    let new_rows = table.row_count();
    if new_rows == previous_rows {
        if let Some(candidates) = session.match_candidates() {
            check_selections(&table, candidates)?;
        }
    }
    session.set_table(table);
    if new_rows != previous_rows {
        session.clear(Slot::MatchCandidates);
    }
    Ok(())
}

fn is_offered(options: &[String], choice: &str) -> bool {
    if options.is_empty() {
        choice.is_empty()
    } else {
        options.iter().any(|o| o == choice)
    }
}

fn check_selections(table: &LineItemTable, candidates: &MatchCandidates) -> Result<()> {
    let Some(chosen) = table.column_text(MATCHED_ITEM_COLUMN) else {
        return Ok(());
    };
    for (row, (choice, options)) in chosen.iter().zip(candidates).enumerate() {
        if !is_offered(options, choice) {
            return Err(PipelineError::InvalidEdit(format!(
                "'{}' is not a candidate for row {}",
                choice,
                row + 1
            )));
        }
    }
    Ok(())
}

/// Edits to `Matched Item` go through [`select_match`], so only offered candidates land there.
pub fn edit_cell(session: &mut SessionState, row: usize, column: &str, value: Value) -> Result<()> {
    if column == MATCHED_ITEM_COLUMN {
        return select_match(session, row, &cell_text(&value));
    }
    table_mut(session)?.set_cell(row, column, value)
}

/// Adding or removing rows breaks row alignment, so candidates are dropped.
pub fn add_row(session: &mut SessionState) -> Result<usize> {
    let idx = table_mut(session)?.add_empty_row();
    session.clear(Slot::MatchCandidates);
    Ok(idx)
}

pub fn remove_row(session: &mut SessionState, row: usize) -> Result<()> {
    table_mut(session)?.remove_row(row)?;
    session.clear(Slot::MatchCandidates);
    Ok(())
}

pub fn add_column(session: &mut SessionState, name: &str) -> Result<()> {
    table_mut(session)?.add_column(name, Value::String(String::new()))
}

pub fn remove_column(session: &mut SessionState, name: &str) -> Result<()> {
    table_mut(session)?.remove_column(name)
}

// ── Match & Save ──────────────────────────────────────────────────────────

/// Descriptions captured for one matching request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRequest {
    pub queries: Vec<String>,
}

pub fn matching_request(session: &SessionState) -> Result<MatchRequest> {
    let table = session.table().ok_or(PipelineError::NotReady(NEED_TABLE))?;
    Ok(MatchRequest {
        queries: descriptions(table),
    })
}

pub fn run_matching(matcher: &dyn CandidateMatcher, request: &MatchRequest, limit: usize) -> Result<CandidateMap> {
    matcher.match_batch(&request.queries, limit).map_err(|e| {
        warn!(error = %e, "matching failed; keeping previous candidates");
        e
    })
}

/// Store candidates for `request` and preselect each row's first one (or empty) into
/// `Matched Item`. Refused if the line items changed since the request was taken.
pub fn commit_matching(session: &mut SessionState, request: &MatchRequest, response: &CandidateMap) -> Result<usize> {
    let table = table_mut(session)?;
    if descriptions(table) != request.queries {
        return Err(PipelineError::InvalidEdit(
            "Line items changed while matching ran. Run Generate Mapping again.".to_string(),
        ));
    }
    table.ensure_column(MATCHED_ITEM_COLUMN);
    let candidates = align_candidates(&request.queries, response);

    for (row, options) in candidates.iter().enumerate() {
        let default = options.first().cloned().unwrap_or_default();
        table.set_cell(row, MATCHED_ITEM_COLUMN, Value::String(default))?;
    }
    let rows = candidates.len();
    info!(rows, with_candidates = candidates.iter().filter(|c| !c.is_empty()).count(), "matching complete");
    session.set_match_candidates(candidates);
    Ok(rows)
}

/// Request, then commit, candidates for every row. Returns the number of rows matched.
pub fn generate_matching(
    session: &mut SessionState,
    matcher: &dyn CandidateMatcher,
    limit: usize,
) -> Result<usize> {
    let request = matching_request(session)?;
    let response = run_matching(matcher, &request, limit)?;
    commit_matching(session, &request, &response)
}

/// Write the user's pick for one row into its `Matched Item`.
pub fn select_match(session: &mut SessionState, row: usize, choice: &str) -> Result<()> {
    let options = session
        .match_candidates()
        .ok_or(PipelineError::NotReady("Run Generate Mapping first."))?
        .get(row)
        .ok_or_else(|| PipelineError::InvalidEdit(format!("No candidates for row {}", row + 1)))?;
    if !is_offered(options, choice) {
        return Err(PipelineError::InvalidEdit(format!(
            "'{}' is not a candidate for row {}",
            choice,
            row + 1
        )));
    }

    let table = table_mut(session)?;
    table.ensure_column(MATCHED_ITEM_COLUMN);
    table.set_cell(row, MATCHED_ITEM_COLUMN, Value::String(choice.to_string()))
}

/// What a save wrote, plus the newest stored rows for confirmation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReceipt {
    pub saved_rows: usize,
    pub total_rows: usize,
    pub recent: LineItemTable,
}

/// Append the table to the store and read back the newest rows.
pub fn confirm_and_save(session: &mut SessionState, store: &OrderStore) -> Result<SaveReceipt> {
    let table = table_mut(session)?;
    table.ensure_column(MATCHED_ITEM_COLUMN);
    let saved_rows = store.append(table)?;
    Ok(SaveReceipt {
        saved_rows,
        total_rows: store.count()?,
        recent: store.read_recent(RECENT_ROWS)?,
    })
}

/// Drop the document, table and candidates, and put the purchase-order fields back to defaults.
pub fn start_new_order(session: &mut SessionState) {
    for slot in [Slot::Document, Slot::Table, Slot::MatchCandidates, Slot::PoFields] {
        session.clear(slot);
    }
    info!("session reset for a new order");
}

/// Serialize the current table. Available whether or not a save succeeded.
pub fn export_table(session: &mut SessionState, format: ExportFormat) -> Result<Vec<u8>> {
    let table = table_mut(session)?;
    table.ensure_column(MATCHED_ITEM_COLUMN);
    format.render(table)
}

pub fn export_csv(session: &mut SessionState) -> Result<Vec<u8>> {
    export_table(session, ExportFormat::Csv)
}

pub fn export_xlsx(session: &mut SessionState) -> Result<Vec<u8>> {
    export_table(session, ExportFormat::Xlsx)
}
