//! Matching client: line-item descriptions in, ranked catalog candidates out.
//!
//! The service answers keyed by description text, not by row. Rows are re-expanded by
//! looking their description up, so two rows with the same description always receive
//! the same candidates and a description the service left out gets none.

use crate::config::AppConfig;
use crate::error::{PipelineError, Result, Service};
use crate::extract::json_kind;
use crate::remote;
use crate::types::{cell_text, LineItemTable, MatchCandidates, DESCRIPTION_COLUMN, MATCHED_ITEM_COLUMN};
use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::info;

/// Description → candidates, as returned by the service.
pub type CandidateMap = HashMap<String, Vec<String>>;

pub trait CandidateMatcher {
    fn match_batch(&self, descriptions: &[String], limit: usize) -> Result<CandidateMap>;
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    queries: &'a [String],
}

pub struct MatchingClient {
    http: Client,
    url: String,
}

impl MatchingClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(MatchingClient {
            http: remote::build_client(Service::Matching, config.http_timeout)?,
            url: config.match_url.clone(),
        })
    }
}

impl CandidateMatcher for MatchingClient {
    fn match_batch(&self, descriptions: &[String], limit: usize) -> Result<CandidateMap> {
        info!(url = %self.url, queries = descriptions.len(), limit, "requesting match candidates");
        let response = self
            .http
            .post(&self.url)
            .query(&[("limit", limit)])
            .json(&BatchRequest { queries: descriptions })
            .send()
            .map_err(|e| remote::transport_error(Service::Matching, e))?;

        let body = remote::read_json(Service::Matching, response)?;
        candidates_from_response(body)
    }
}

/// `Request Item` when the table has it, otherwise the first column that is not
/// `Matched Item`.
pub fn description_column(table: &LineItemTable) -> Option<&str> {
    if table.column_index(DESCRIPTION_COLUMN).is_some() {
        return Some(DESCRIPTION_COLUMN);
    }
    table
        .columns()
        .iter()
        .map(String::as_str)
        .find(|c| *c != MATCHED_ITEM_COLUMN)
}

/// Description text for every row, in row order. Rows of a table with no usable
/// column get an empty description each.
pub fn descriptions(table: &LineItemTable) -> Vec<String> {
    description_column(table)
        .and_then(|column| table.column_text(column))
        .unwrap_or_else(|| vec![String::new(); table.row_count()])
}

pub fn candidates_from_response(body: Value) -> Result<CandidateMap> {
    let object = match body {
        Value::Object(map) => map,
        other => {
            return Err(PipelineError::Format {
                service: Service::Matching,
                detail: format!("expected a JSON object keyed by query, got {}", json_kind(&other)),
            })
        }
    };

    let mut out = CandidateMap::with_capacity(object.len());
    for (query, value) in object {
        let list = match value {
            Value::Array(items) => items.iter().map(cell_text).collect(),
            other => {
                return Err(PipelineError::Format {
                    service: Service::Matching,
                    detail: format!("candidates for '{}' are {}, expected an array", query, json_kind(&other)),
                })
            }
        };
        out.insert(query, list);
    }
    Ok(out)
}

/// One candidate list per description, looked up by value.
pub fn align_candidates(descriptions: &[String], response: &CandidateMap) -> MatchCandidates {
    descriptions
        .iter()
        .map(|d| response.get(d).cloned().unwrap_or_default())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn table(v: Value) -> LineItemTable {
        crate::extract::table_from_response(v).unwrap()
    }

    #[test]
    fn prefers_request_item_column() {
        let t = table(json!([{"Line": 1, "Request Item": "bolt"}]));
        assert_eq!(description_column(&t), Some("Request Item"));
        assert_eq!(descriptions(&t), vec!["bolt"]);
    }

    #[test]
    fn falls_back_to_first_column() {
        let t = table(json!([{"Desc": "bolt", "Qty": 2}, {"Desc": 7, "Qty": 1}]));
        assert_eq!(description_column(&t), Some("Desc"));
        assert_eq!(descriptions(&t), vec!["bolt", "7"]);
    }

    #[test]
    fn no_columns_means_no_descriptions() {
        assert!(descriptions(&LineItemTable::default()).is_empty());
    }

    #[test]
    fn matched_item_is_never_the_description() {
        let mut t = table(json!([{"Matched Item": "B-1", "Desc": "bolt"}]));
        assert_eq!(descriptions(&t), vec!["bolt"]);

        t.remove_column("Desc").unwrap();
        assert_eq!(description_column(&t), None);
        assert_eq!(descriptions(&t), vec![""]);
    }

    #[test]
    fn alignment_follows_row_order_and_defaults_to_empty() {
        let response: CandidateMap = [
            ("washer".to_string(), vec!["W-1".to_string()]),
            ("bolt".to_string(), vec!["B-1".to_string(), "B-2".to_string()]),
        ]
        .into_iter()
        .collect();
        let rows = vec!["bolt".to_string(), "nut".to_string(), "washer".to_string()];
        assert_eq!(
            align_candidates(&rows, &response),
            vec![vec!["B-1", "B-2"], vec![], vec!["W-1"]]
        );
    }

    // Known quirk: lookup is by description value, so duplicate rows share a list.
    #[test]
    fn duplicate_descriptions_receive_identical_candidates() {
        let response: CandidateMap = [("bolt".to_string(), vec!["B-1".to_string(), "B-2".to_string()])]
            .into_iter()
            .collect();
        let rows = vec!["bolt".to_string(), "nut".to_string(), "bolt".to_string()];
        let aligned = align_candidates(&rows, &response);
        assert_eq!(aligned.len(), 3);
        assert_eq!(aligned[0], aligned[2]);
    }

    #[test]
    fn response_must_be_object_of_arrays() {
        let ok = candidates_from_response(json!({"bolt": ["B-1", 42]})).unwrap();
        assert_eq!(ok["bolt"], vec!["B-1", "42"]);

        assert!(matches!(
            candidates_from_response(json!(["B-1"])),
            Err(PipelineError::Format { service: Service::Matching, .. })
        ));
        assert!(candidates_from_response(json!({"bolt": "B-1"})).is_err());
    }
}
