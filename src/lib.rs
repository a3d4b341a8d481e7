pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod extract;
pub mod matching;
pub mod pipeline;
mod remote;
pub mod session;
pub mod types;

#[cfg(feature = "desktop")]
mod commands;

pub use config::AppConfig;
pub use db::{OrderStore, SchemaPolicy};
pub use error::{PipelineError, Service};
pub use extract::{ExtractionClient, LineItemExtractor};
pub use matching::{CandidateMatcher, MatchingClient};
pub use session::SessionState;
pub use types::{LineItemTable, PurchaseOrderFields, UploadedDocument};

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use commands::AppState;
    use tauri::Manager;
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("order_entry_lib=info")),
        )
        .init();

    tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .setup(|app| {
            let app_data_dir = app.path().app_data_dir().map_err(|e| e.to_string())?;
            // Users can drop endpoint overrides into the app data folder.
            let env_path = app_data_dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
            }
            let config = AppConfig::from_env(Some(app_data_dir)).map_err(|e| e.to_string())?;
            tracing::info!(
                extract = %config.extract_url,
                matching = %config.match_url,
                database = %config.database_path.display(),
                "order entry ready"
            );
            app.manage(AppState::new(config));
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::get_app_config,
            commands::get_session,
            commands::upload_document,
            commands::document_preview_base64,
            commands::add_po_field,
            commands::set_po_field,
            commands::remove_po_field,
            commands::clear_po_fields,
            commands::generate_extraction,
            commands::update_table,
            commands::edit_cell,
            commands::add_row,
            commands::remove_row,
            commands::add_column,
            commands::remove_column,
            commands::generate_matching,
            commands::select_match,
            commands::confirm_and_save,
            commands::start_new_order,
            commands::export_table,
            commands::save_export,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
