//! Blocking HTTP plumbing shared by the extraction and matching clients.

use crate::error::{PipelineError, Result, Service};
use reqwest::blocking::{Client, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Longest slice of an error body kept in a user-facing message.
const MAX_ERROR_BODY: usize = 300;

pub(crate) fn build_client(service: Service, timeout: Option<Duration>) -> Result<Client> {
    let mut builder = Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(|e| PipelineError::Transport {
        service,
        detail: e.to_string(),
    })
}

pub(crate) fn transport_error(service: Service, e: reqwest::Error) -> PipelineError {
    let detail = if e.is_connect() {
        format!("connection failed ({}). Check your internet connection and try again.", e)
    } else if e.is_timeout() {
        "request timed out. Try again.".to_string()
    } else {
        e.to_string()
    };
    PipelineError::Transport { service, detail }
}

/// Non-2xx → RemoteError, unreadable body → TransportError, bad JSON → FormatError.
pub(crate) fn read_json(service: Service, response: Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().map_err(|e| transport_error(service, e))?;
    debug!(%service, status = status.as_u16(), bytes = body.len(), "response received");

    if !status.is_success() {
        let body = body.trim();
        return Err(PipelineError::Remote {
            service,
            status: status.as_u16(),
            body: if body.is_empty() {
                status.canonical_reason().unwrap_or("no response body").to_string()
            } else {
                truncate(body, MAX_ERROR_BODY)
            },
        });
    }

    serde_json::from_str(&body).map_err(|e| PipelineError::Format {
        service,
        detail: format!("invalid JSON: {}", e),
    })
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
