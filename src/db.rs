use crate::error::{PipelineError, Result};
use crate::types::LineItemTable;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// The single append-only table finalized orders land in.
pub const TABLE_NAME: &str = "order_matches";

/// What to do when a save brings columns `order_matches` does not have yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaPolicy {
    /// Add the new columns; columns the table has but the save lacks get NULL.
    #[default]
    Extend,
    /// Refuse any save whose columns differ from the table's.
    Strict,
}

impl FromStr for SchemaPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "extend" => Ok(SchemaPolicy::Extend),
            "strict" => Ok(SchemaPolicy::Strict),
            other => Err(PipelineError::InvalidConfig(format!(
                "schema policy must be 'extend' or 'strict', got '{}'",
                other
            ))),
        }
    }
}

/// Outcome of comparing a save's columns to the stored table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaPlan {
    Create,
    Unchanged,
    /// Columns to add before inserting.
    Extend(Vec<String>),
}

/// Decide how `incoming` columns fit an `existing` table (None = no table yet).
/// SQLite column names are case-insensitive, so comparison is too.
pub fn plan_schema(
    existing: Option<&[String]>,
    incoming: &[String],
    policy: SchemaPolicy,
) -> Result<SchemaPlan> {
    if incoming.is_empty() {
        return Err(PipelineError::EmptySchema);
    }
    let existing = match existing {
        None => return Ok(SchemaPlan::Create),
        Some(cols) => cols,
    };
    let contains = |cols: &[String], name: &str| cols.iter().any(|c| c.eq_ignore_ascii_case(name));

    let added: Vec<String> = incoming
        .iter()
        .filter(|c| !contains(existing, c))
        .cloned()
        .collect();
    let missing: Vec<String> = existing
        .iter()
        .filter(|c| !contains(incoming, c))
        .cloned()
        .collect();

    if added.is_empty() && missing.is_empty() {
        return Ok(SchemaPlan::Unchanged);
    }
    match policy {
        SchemaPolicy::Extend if added.is_empty() => Ok(SchemaPlan::Unchanged),
        SchemaPolicy::Extend => Ok(SchemaPlan::Extend(added)),
        SchemaPolicy::Strict => Err(PipelineError::SchemaMismatch {
            table: TABLE_NAME.to_string(),
            added,
            missing,
        }),
    }
}

/// Local SQLite store for confirmed orders. The file is opened fresh for every call.
pub struct OrderStore {
    path: PathBuf,
    policy: SchemaPolicy,
}

impl OrderStore {
    pub fn new(path: impl Into<PathBuf>, policy: SchemaPolicy) -> Self {
        OrderStore {
            path: path.into(),
            policy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(Connection::open(&self.path)?)
    }

    /// Append every row of `table` in one transaction. Returns the number of rows written.
    pub fn append(&self, table: &LineItemTable) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let existing = table_columns(&tx)?;
        let plan = plan_schema(existing.as_deref(), table.columns(), self.policy)?;
        debug!(?plan, "schema negotiated for {}", TABLE_NAME);
        match &plan {
            SchemaPlan::Create => {
                let cols = table
                    .columns()
                    .iter()
                    .map(|c| quote_ident(c))
                    .collect::<Vec<_>>()
                    .join(", ");
                tx.execute(&format!("CREATE TABLE {} ({})", quote_ident(TABLE_NAME), cols), [])?;
            }
            SchemaPlan::Extend(added) => {
                for col in added {
                    tx.execute(
                        &format!("ALTER TABLE {} ADD COLUMN {}", quote_ident(TABLE_NAME), quote_ident(col)),
                        [],
                    )?;
                }
            }
            SchemaPlan::Unchanged => {}
        }

        let placeholders = (1..=table.columns().len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(TABLE_NAME),
            table
                .columns()
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            placeholders
        );
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in table.rows() {
                stmt.execute(params_from_iter(row.iter().map(to_sql_value)))?;
            }
        }
        tx.commit()?;

        info!(rows = table.row_count(), path = %self.path.display(), "appended to {}", TABLE_NAME);
        Ok(table.row_count())
    }

    /// The `n` most recently inserted rows, newest first.
    pub fn read_recent(&self, n: usize) -> Result<LineItemTable> {
        let conn = self.connect()?;
        if table_columns(&conn)?.is_none() {
            return Ok(LineItemTable::default());
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} ORDER BY rowid DESC LIMIT ?1",
            quote_ident(TABLE_NAME)
        ))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let rows = stmt
            .query_map(params![n as i64], |row| {
                (0..width)
                    .map(|i| row.get_ref(i).map(from_sql_value))
                    .collect::<rusqlite::Result<Vec<Value>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut table = LineItemTable::new(columns)?;
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Total rows stored so far (0 before the first save).
    pub fn count(&self) -> Result<usize> {
        let conn = self.connect()?;
        if table_columns(&conn)?.is_none() {
            return Ok(0);
        }
        let n: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(TABLE_NAME)),
            [],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    }
}

/// Column names of `order_matches`, or None if it does not exist.
fn table_columns(conn: &Connection) -> Result<Option<Vec<String>>> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![TABLE_NAME],
            |_| Ok(()),
        )
        .optional()?;
    if exists.is_none() {
        return Ok(None);
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(TABLE_NAME)))?;
    let cols = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Some(cols))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(BASE64.encode(bytes)),
    }
}
