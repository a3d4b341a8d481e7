use crate::config::AppConfig;
use crate::db::OrderStore;
use crate::export::{resolve_export_path, ExportFormat};
use crate::extract::ExtractionClient;
use crate::matching::MatchingClient;
use crate::pipeline::{self, SaveReceipt, StageGates};
use crate::session::{SessionSnapshot, SessionState};
use crate::types::LineItemTable;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tauri::State;

pub struct AppState {
    pub session: Arc<Mutex<SessionState>>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        AppState {
            session: Arc::new(Mutex::new(SessionState::new())),
            config,
        }
    }
}

/// Everything a view needs to render after an action.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(flatten)]
    pub session: SessionSnapshot,
    pub gates: StageGates,
}

impl SessionView {
    fn of(session: &SessionState) -> Self {
        SessionView {
            session: session.snapshot(),
            gates: pipeline::stage_gates(session),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResult {
    #[serde(flatten)]
    pub receipt: SaveReceipt,
    pub database_path: String,
    pub session: SessionView,
}

fn lock(session: &Mutex<SessionState>) -> Result<MutexGuard<'_, SessionState>, String> {
    session.lock().map_err(|e| e.to_string())
}

/// Run `action` on the session and return the refreshed view.
fn with_session<F>(state: &State<AppState>, action: F) -> Result<SessionView, String>
where
    F: FnOnce(&mut SessionState) -> crate::error::Result<()>,
{
    let mut session = lock(&state.session)?;
    action(&mut session).map_err(|e| e.to_string())?;
    Ok(SessionView::of(&session))
}

#[tauri::command]
pub fn get_app_config(state: State<AppState>) -> AppConfig {
    state.config.clone()
}

#[tauri::command]
pub fn get_session(state: State<AppState>) -> Result<SessionView, String> {
    let session = lock(&state.session)?;
    Ok(SessionView::of(&session))
}

// ── Upload ────────────────────────────────────────────────────────────────

#[tauri::command]
pub fn upload_document(state: State<AppState>, file_path: String) -> Result<SessionView, String> {
    let path = Path::new(&file_path);
    let bytes = fs::read(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            "File not found.".to_string()
        } else {
            format!("Could not read file: {}", e)
        }
    })?;
    let file_name = path
        .file_name()
        .and_then(|o| o.to_str())
        .unwrap_or("document.pdf")
        .to_string();
    with_session(&state, |s| pipeline::upload_document(s, &file_name, bytes))
}

/// PDF bytes as base64 for the in-window preview.
#[tauri::command]
pub fn document_preview_base64(state: State<AppState>) -> Result<String, String> {
    let session = lock(&state.session)?;
    let doc = session.document().ok_or("No document uploaded.")?;
    Ok(BASE64.encode(&doc.bytes))
}

#[tauri::command]
pub fn add_po_field(state: State<AppState>) -> Result<SessionView, String> {
    with_session(&state, |s| {
        s.po_fields_mut().add_field();
        Ok(())
    })
}

#[tauri::command]
pub fn set_po_field(state: State<AppState>, name: String, value: String) -> Result<SessionView, String> {
    with_session(&state, |s| s.po_fields_mut().set(&name, &value))
}

#[tauri::command]
pub fn remove_po_field(state: State<AppState>, name: String) -> Result<SessionView, String> {
    with_session(&state, |s| {
        s.po_fields_mut().remove(&name);
        Ok(())
    })
}

#[tauri::command]
pub fn clear_po_fields(state: State<AppState>) -> Result<SessionView, String> {
    with_session(&state, |s| {
        s.po_fields_mut().clear();
        Ok(())
    })
}

// ── Extract ───────────────────────────────────────────────────────────────

/// The request runs on the blocking pool with the session unlocked, so other commands
/// keep working while the service answers.
#[tauri::command]
pub async fn generate_extraction(state: State<'_, AppState>) -> Result<SessionView, String> {
    let document = {
        let session = lock(&state.session)?;
        pipeline::extraction_input(&session).map_err(|e| e.to_string())?
    };
    let config = state.config.clone();
    let table = tauri::async_runtime::spawn_blocking(move || -> Result<LineItemTable, String> {
        let client = ExtractionClient::new(&config).map_err(|e| e.to_string())?;
        pipeline::run_extraction(&client, &document).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| e.to_string())??;

    let mut session = lock(&state.session)?;
    pipeline::commit_extraction(&mut session, table);
    Ok(SessionView::of(&session))
}

#[tauri::command]
pub fn update_table(state: State<AppState>, table: LineItemTable) -> Result<SessionView, String> {
    with_session(&state, |s| pipeline::replace_table(s, table))
}

#[tauri::command]
pub fn edit_cell(state: State<AppState>, row: usize, column: String, value: Value) -> Result<SessionView, String> {
    with_session(&state, |s| pipeline::edit_cell(s, row, &column, value))
}

#[tauri::command]
pub fn add_row(state: State<AppState>) -> Result<SessionView, String> {
    with_session(&state, |s| pipeline::add_row(s).map(|_| ()))
}

#[tauri::command]
pub fn remove_row(state: State<AppState>, row: usize) -> Result<SessionView, String> {
    with_session(&state, |s| pipeline::remove_row(s, row))
}

#[tauri::command]
pub fn add_column(state: State<AppState>, name: String) -> Result<SessionView, String> {
    with_session(&state, |s| pipeline::add_column(s, &name))
}

#[tauri::command]
pub fn remove_column(state: State<AppState>, name: String) -> Result<SessionView, String> {
    with_session(&state, |s| pipeline::remove_column(s, &name))
}

// ── Match & Save ──────────────────────────────────────────────────────────

#[tauri::command]
pub async fn generate_matching(state: State<'_, AppState>) -> Result<SessionView, String> {
    let request = {
        let session = lock(&state.session)?;
        pipeline::matching_request(&session).map_err(|e| e.to_string())?
    };
    let config = state.config.clone();
    let (request, response) = tauri::async_runtime::spawn_blocking(move || -> Result<_, String> {
        let client = MatchingClient::new(&config).map_err(|e| e.to_string())?;
        let response = pipeline::run_matching(&client, &request, config.match_limit).map_err(|e| e.to_string())?;
        Ok((request, response))
    })
    .await
    .map_err(|e| e.to_string())??;

    let mut session = lock(&state.session)?;
    pipeline::commit_matching(&mut session, &request, &response).map_err(|e| e.to_string())?;
    Ok(SessionView::of(&session))
}

#[tauri::command]
pub fn select_match(state: State<AppState>, row: usize, choice: String) -> Result<SessionView, String> {
    with_session(&state, |s| pipeline::select_match(s, row, &choice))
}

#[tauri::command]
pub async fn confirm_and_save(state: State<'_, AppState>) -> Result<SaveResult, String> {
    let session = Arc::clone(&state.session);
    let config = state.config.clone();
    tauri::async_runtime::spawn_blocking(move || -> Result<SaveResult, String> {
        let store = OrderStore::new(&config.database_path, config.schema_policy);
        let mut session = lock(&session)?;
        let receipt = pipeline::confirm_and_save(&mut session, &store).map_err(|e| e.to_string())?;
        Ok(SaveResult {
            receipt,
            database_path: store.path().display().to_string(),
            session: SessionView::of(&session),
        })
    })
    .await
    .map_err(|e| e.to_string())?
}

/// Clear everything and start over with the default purchase-order fields.
#[tauri::command]
pub fn start_new_order(state: State<AppState>) -> Result<SessionView, String> {
    with_session(&state, |s| {
        pipeline::start_new_order(s);
        Ok(())
    })
}

/// Current table rendered as `format`, base64-encoded for a browser download.
#[tauri::command]
pub fn export_table(state: State<AppState>, format: ExportFormat) -> Result<String, String> {
    let mut session = lock(&state.session)?;
    let bytes = pipeline::export_table(&mut session, format).map_err(|e| e.to_string())?;
    Ok(BASE64.encode(bytes))
}

/// Write the export to `path`, or to a fresh file in Downloads. Returns the path written.
#[tauri::command]
pub fn save_export(state: State<AppState>, format: ExportFormat, path: Option<String>) -> Result<String, String> {
    let bytes = {
        let mut session = lock(&state.session)?;
        pipeline::export_table(&mut session, format).map_err(|e| e.to_string())?
    };
    let target = resolve_export_path(path.as_deref(), format).map_err(|e| e.to_string())?;
    fs::write(&target, &bytes).map_err(|e| format!("Could not write file: {}", e))?;
    Ok(target.display().to_string())
}
