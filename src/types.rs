use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Column that carries the user's chosen match for each line item.
pub const MATCHED_ITEM_COLUMN: &str = "Matched Item";

/// Preferred description column sent to the matching service.
pub const DESCRIPTION_COLUMN: &str = "Request Item";

/// Purchase-order fields every new session starts with, in display order.
pub const DEFAULT_PO_FIELDS: [&str; 4] = ["Request ID", "Delivery Address", "PO Date", "PO Number"];

/// Per-row candidate lists, parallel to the table rows at the time matching ran.
pub type MatchCandidates = Vec<Vec<String>>;

/// Uploaded purchase-order PDF. Replaced wholesale on every upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// What the view needs to know about the uploaded document (never the bytes).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub file_name: String,
    pub size: usize,
}

impl From<&UploadedDocument> for DocumentInfo {
    fn from(doc: &UploadedDocument) -> Self {
        DocumentInfo {
            file_name: doc.file_name.clone(),
            size: doc.bytes.len(),
        }
    }
}

/// Text shown for a cell: strings verbatim, null as empty, everything else as JSON.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Line items as an ordered grid: unique column names, one value per column in each row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct LineItemTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// Unchecked wire shape, validated into a [`LineItemTable`].
#[derive(Deserialize)]
struct RawTable {
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

impl TryFrom<RawTable> for LineItemTable {
    type Error = PipelineError;

    fn try_from(raw: RawTable) -> Result<Self> {
        let mut table = LineItemTable::new(raw.columns)?;
        for row in raw.rows {
            table.push_row(row)?;
        }
        Ok(table)
    }
}

impl LineItemTable {
    pub fn new(columns: Vec<String>) -> Result<Self> {
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(PipelineError::InvalidEdit(format!("Duplicate column '{}'", name)));
            }
        }
        Ok(LineItemTable {
            columns,
            rows: Vec::new(),
        })
    }

    /// Build from row objects. Columns are the union of keys in first-appearance order;
    /// a key missing from a row becomes `null`.
    pub fn from_records(records: Vec<Map<String, Value>>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = records
            .into_iter()
            .map(|mut record| {
                columns
                    .iter()
                    .map(|c| record.remove(c).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        LineItemTable { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[col])
    }

    /// Cell text for every row of one column.
    pub fn column_text(&self, column: &str) -> Option<Vec<String>> {
        let col = self.column_index(column)?;
        Some(self.rows.iter().map(|r| cell_text(&r[col])).collect())
    }

    pub fn set_cell(&mut self, row: usize, column: &str, value: Value) -> Result<()> {
        let col = self
            .column_index(column)
            .ok_or_else(|| PipelineError::InvalidEdit(format!("Unknown column '{}'", column)))?;
        let row_count = self.rows.len();
        let cells = self.rows.get_mut(row).ok_or_else(|| {
            PipelineError::InvalidEdit(format!("Row {} does not exist ({} rows)", row + 1, row_count))
        })?;
        cells[col] = value;
        Ok(())
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(PipelineError::InvalidEdit(format!(
                "Row has {} cells but the table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Append a row of empty strings and return its index.
    pub fn add_empty_row(&mut self) -> usize {
        self.rows
            .push(vec![Value::String(String::new()); self.columns.len()]);
        self.rows.len() - 1
    }

    pub fn remove_row(&mut self, row: usize) -> Result<Vec<Value>> {
        if row >= self.rows.len() {
            return Err(PipelineError::InvalidEdit(format!(
                "Row {} does not exist ({} rows)",
                row + 1,
                self.rows.len()
            )));
        }
        Ok(self.rows.remove(row))
    }

    /// Append a column filled with `default`. Fails on an empty or taken name.
    pub fn add_column(&mut self, name: &str, default: Value) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PipelineError::InvalidEdit("Column name is empty".to_string()));
        }
        if self.column_index(name).is_some() {
            return Err(PipelineError::InvalidEdit(format!("Column '{}' already exists", name)));
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(default.clone());
        }
        Ok(())
    }

    /// Add `name` with empty-string cells unless it already exists. Returns true if added.
    pub fn ensure_column(&mut self, name: &str) -> bool {
        if self.column_index(name).is_some() {
            return false;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(Value::String(String::new()));
        }
        true
    }

    pub fn remove_column(&mut self, name: &str) -> Result<()> {
        let col = self
            .column_index(name)
            .ok_or_else(|| PipelineError::InvalidEdit(format!("Unknown column '{}'", name)))?;
        self.columns.remove(col);
        for row in &mut self.rows {
            row.remove(col);
        }
        Ok(())
    }

    /// Rows as column-name → value objects, in column order.
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderField {
    pub name: String,
    pub value: String,
}

/// User-extensible purchase-order header fields; insertion order is display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PurchaseOrderFields(Vec<PurchaseOrderField>);

impl Default for PurchaseOrderFields {
    fn default() -> Self {
        PurchaseOrderFields(
            DEFAULT_PO_FIELDS
                .iter()
                .map(|name| PurchaseOrderField {
                    name: name.to_string(),
                    value: String::new(),
                })
                .collect(),
        )
    }
}

impl PurchaseOrderFields {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PurchaseOrderField> {
        self.0.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let field = self
            .0
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| PipelineError::InvalidEdit(format!("Unknown field '{}'", name)))?;
        field.value = value.to_string();
        Ok(())
    }

    /// Append an empty `Field N` (N = len + 1, bumped past taken names) and return its name.
    pub fn add_field(&mut self) -> String {
        let mut n = self.0.len() + 1;
        let mut name = format!("Field {}", n);
        while self.get(&name).is_some() {
            n += 1;
            name = format!("Field {}", n);
        }
        self.0.push(PurchaseOrderField {
            name: name.clone(),
            value: String::new(),
        });
        name
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|f| f.name != name);
        self.0.len() != before
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn records(v: Value) -> Vec<Map<String, Value>> {
        v.as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn from_records_unions_keys_in_first_appearance_order() {
        let table = LineItemTable::from_records(records(json!([
            {"Request Item": "bolt", "Qty": 4},
            {"Qty": 2, "Unit": "box"}
        ])));
        assert_eq!(table.columns(), ["Request Item", "Qty", "Unit"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell(0, "Unit"), Some(&Value::Null));
        assert_eq!(table.cell(1, "Request Item"), Some(&Value::Null));
        assert_eq!(table.cell(1, "Unit"), Some(&json!("box")));
    }

    #[test]
    fn cell_text_renders_each_kind() {
        assert_eq!(cell_text(&Value::Null), "");
        assert_eq!(cell_text(&json!("a,b")), "a,b");
        assert_eq!(cell_text(&json!(3)), "3");
        assert_eq!(cell_text(&json!(1.5)), "1.5");
        assert_eq!(cell_text(&json!(true)), "true");
        assert_eq!(cell_text(&json!(["x"])), "[\"x\"]");
    }

    #[test]
    fn ensure_column_only_adds_once() {
        let mut table = LineItemTable::from_records(records(json!([{"A": "x"}])));
        assert!(table.ensure_column(MATCHED_ITEM_COLUMN));
        assert!(!table.ensure_column(MATCHED_ITEM_COLUMN));
        assert_eq!(table.columns(), ["A", MATCHED_ITEM_COLUMN]);
        assert_eq!(table.cell(0, MATCHED_ITEM_COLUMN), Some(&json!("")));
    }

    #[test]
    fn edits_reject_unknown_targets() {
        let mut table = LineItemTable::from_records(records(json!([{"A": "x"}])));
        assert!(table.set_cell(1, "A", json!("y")).is_err());
        assert!(table.set_cell(0, "B", json!("y")).is_err());
        assert!(table.add_column("A", Value::Null).is_err());
        assert!(table.add_column("  ", Value::Null).is_err());
        assert!(table.remove_row(3).is_err());
        assert!(table.push_row(vec![]).is_err());
    }

    #[test]
    fn add_and_remove_rows_and_columns() {
        let mut table = LineItemTable::from_records(records(json!([{"A": "x"}])));
        let idx = table.add_empty_row();
        assert_eq!(idx, 1);
        table.add_column("B", json!(0)).unwrap();
        assert_eq!(table.rows()[1], vec![json!(""), json!(0)]);
        table.remove_column("A").unwrap();
        assert_eq!(table.columns(), ["B"]);
        let removed = table.remove_row(0).unwrap();
        assert_eq!(removed, vec![json!(0)]);
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn deserialize_validates_shape() {
        let ok: LineItemTable =
            serde_json::from_value(json!({"columns": ["A"], "rows": [["x"]]})).unwrap();
        assert_eq!(ok.row_count(), 1);

        let ragged = serde_json::from_value::<LineItemTable>(json!({"columns": ["A"], "rows": [["x", "y"]]}));
        assert!(ragged.is_err());

        let dup = serde_json::from_value::<LineItemTable>(json!({"columns": ["A", "A"], "rows": []}));
        assert!(dup.is_err());
    }

    #[test]
    fn records_round_trip_column_order() {
        let table = LineItemTable::from_records(records(json!([{"B": 1, "A": 2}])));
        let out = table.records();
        assert_eq!(out[0].keys().collect::<Vec<_>>(), ["B", "A"]);
    }

    #[test]
    fn po_fields_start_with_fixed_four() {
        let fields = PurchaseOrderFields::default();
        assert_eq!(fields.names(), DEFAULT_PO_FIELDS);
        assert!(fields.iter().all(|f| f.value.is_empty()));
    }

    #[test]
    fn add_field_grows_by_one_with_unique_name() {
        let mut fields = PurchaseOrderFields::default();
        assert_eq!(fields.add_field(), "Field 5");
        assert_eq!(fields.add_field(), "Field 6");
        assert!(fields.remove("Field 5"));
        // len is 5 again, "Field 6" is taken
        let name = fields.add_field();
        assert_eq!(name, "Field 7");
        assert_eq!(fields.len(), 6);
        assert_eq!(
            fields.names(),
            ["Request ID", "Delivery Address", "PO Date", "PO Number", "Field 6", "Field 7"]
        );
    }

    #[test]
    fn clear_then_add_restarts_numbering() {
        let mut fields = PurchaseOrderFields::default();
        fields.clear();
        assert!(fields.is_empty());
        assert_eq!(fields.add_field(), "Field 1");
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn set_value_keeps_order() {
        let mut fields = PurchaseOrderFields::default();
        fields.set("PO Date", "2024-05-01").unwrap();
        assert_eq!(fields.get("PO Date"), Some("2024-05-01"));
        assert_eq!(fields.names(), DEFAULT_PO_FIELDS);
        assert!(fields.set("Nope", "x").is_err());
    }
}
