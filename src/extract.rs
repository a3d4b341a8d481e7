//! Extraction client: PDF in, line-item table out.

use crate::config::AppConfig;
use crate::error::{PipelineError, Result, Service};
use crate::remote;
use crate::types::{LineItemTable, UploadedDocument};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use serde_json::Value;
use tracing::info;

/// Multipart field the extraction endpoint reads the PDF from.
pub const FILE_FIELD: &str = "file";
pub const PDF_MIME: &str = "application/pdf";

/// Anything that can turn an uploaded document into line items.
pub trait LineItemExtractor {
    fn extract(&self, document: &UploadedDocument) -> Result<LineItemTable>;
}

pub struct ExtractionClient {
    http: Client,
    url: String,
}

impl ExtractionClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(ExtractionClient {
            http: remote::build_client(Service::Extraction, config.http_timeout)?,
            url: config.extract_url.clone(),
        })
    }
}

impl LineItemExtractor for ExtractionClient {
    fn extract(&self, document: &UploadedDocument) -> Result<LineItemTable> {
        let part = Part::bytes(document.bytes.clone())
            .file_name(document.file_name.clone())
            .mime_str(PDF_MIME)
            .map_err(|e| remote::transport_error(Service::Extraction, e))?;
        let form = Form::new().part(FILE_FIELD, part);

        info!(url = %self.url, file = %document.file_name, bytes = document.bytes.len(), "sending PDF for extraction");
        let response = self
            .http
            .post(&self.url)
            .multipart(form)
            .send()
            .map_err(|e| remote::transport_error(Service::Extraction, e))?;

        let body = remote::read_json(Service::Extraction, response)?;
        let table = table_from_response(body)?;
        info!(rows = table.row_count(), columns = table.columns().len(), "extraction complete");
        Ok(table)
    }
}

/// The endpoint answers with an array of row objects; anything else is a format error.
pub fn table_from_response(body: Value) -> Result<LineItemTable> {
    let items = match body {
        Value::Array(items) => items,
        other => {
            return Err(PipelineError::Format {
                service: Service::Extraction,
                detail: format!("expected a JSON array of line items, got {}", json_kind(&other)),
            })
        }
    };

    let mut records = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(map) => records.push(map),
            other => {
                return Err(PipelineError::Format {
                    service: Service::Extraction,
                    detail: format!("line item {} is {}, expected an object", i + 1, json_kind(&other)),
                })
            }
        }
    }
    Ok(LineItemTable::from_records(records))
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
