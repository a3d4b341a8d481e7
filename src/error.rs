//! Error types for the order-entry pipeline.
//!
//! Every failure a user action can hit is a [`PipelineError`]. The four remote/storage
//! kinds (transport, remote status, response format, storage) are handled the same way:
//! the action reports the message and the session keeps its previous state.

use std::fmt;
use thiserror::Error;

/// Which remote collaborator a request was addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Extraction,
    Matching,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Extraction => f.write_str("extraction"),
            Service::Matching => f.write_str("matching"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Remote services ───────────────────────────────────────────────────
    /// The endpoint could not be reached or the body could not be read.
    #[error("Could not reach the {service} service: {detail}")]
    Transport { service: Service, detail: String },

    /// The endpoint answered with a non-success status.
    #[error("The {service} service returned {status}: {body}")]
    Remote {
        service: Service,
        status: u16,
        body: String,
    },

    /// The endpoint answered 2xx but the body is not the expected JSON shape.
    #[error("Unexpected {service} response: {detail}")]
    Format { service: Service, detail: String },

    // ── Local storage ─────────────────────────────────────────────────────
    #[error("Saving to database failed: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Incoming columns differ from `order_matches` and the policy forbids extending it.
    #[error("Table '{table}' does not accept these columns (added: {added:?}, missing: {missing:?})")]
    SchemaMismatch {
        table: String,
        added: Vec<String>,
        missing: Vec<String>,
    },

    #[error("Cannot save a table without columns")]
    EmptySchema,

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    // ── Export ────────────────────────────────────────────────────────────
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Excel export failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    // ── Controller input ──────────────────────────────────────────────────
    /// An action ran before the upstream data it depends on exists.
    #[error("{0}")]
    NotReady(&'static str),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("{0}")]
    InvalidEdit(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// True for the kinds that come from the storage layer.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            PipelineError::Storage(_)
                | PipelineError::SchemaMismatch { .. }
                | PipelineError::EmptySchema
                | PipelineError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
