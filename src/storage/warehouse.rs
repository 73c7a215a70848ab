//! SQLite-backed warehouse
//!
//! The agent builds its bronze and silver layers inside a single SQLite file.
//! Every call opens its own connection and closes it on return, so the store
//! can be shared freely between runs and blocking worker threads.

use crate::error::{Result, StratumError};
use anyhow::Context;
use rusqlite::fallible_iterator::FallibleIterator;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Batch, Connection, OptionalExtension, Statement};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Column name and declared type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Declared SQL type (may be empty for untyped columns)
    pub data_type: String,
}

/// Outcome of executing one statement or a batch
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutput {
    /// The last row-producing statement's result set
    Rows {
        /// Column names in select order
        columns: Vec<String>,
        /// Row values in column order
        rows: Vec<Vec<Value>>,
    },
    /// Total number of rows changed by the batch
    Affected(usize),
}

impl StatementOutput {
    /// Renders the output as the JSON text handed back to the model
    ///
    /// # Examples
    ///
    /// ```
    /// use stratum::storage::StatementOutput;
    ///
    /// assert_eq!(StatementOutput::Affected(3).to_json_string(), r#"{"rows_affected":3}"#);
    /// ```
    pub fn to_json_string(&self) -> String {
        let value = match self {
            Self::Rows { columns, rows } => serde_json::json!({
                "columns": columns,
                "rows": rows,
            }),
            Self::Affected(count) => serde_json::json!({ "rows_affected": count }),
        };
        value.to_string()
    }
}

/// Summary of a CSV load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    /// Table that now holds the data
    pub table: String,
    /// Number of rows inserted
    pub rows: usize,
    /// Columns created, with inferred types
    pub columns: Vec<ColumnInfo>,
}

/// Row count and leading rows of a table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePreview {
    /// Table name
    pub table: String,
    /// Total rows in the table
    pub row_count: u64,
    /// Column names
    pub columns: Vec<String>,
    /// First rows, at most the requested limit
    pub rows: Vec<Vec<Value>>,
}

/// Relational store the tools operate on
///
/// Methods are blocking; async callers run them on the blocking pool.
pub trait TableStore: Send + Sync {
    /// Executes a statement or a semicolon-separated batch
    fn execute(&self, sql: &str) -> Result<StatementOutput>;

    /// Returns the columns of an existing table or view
    fn describe(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Returns the names of all user tables, sorted
    fn list_tables(&self) -> Result<Vec<String>>;

    /// Replaces `table` with the contents of a CSV document in one transaction
    fn replace_from_csv(&self, table: &str, csv: &[u8]) -> Result<LoadSummary>;

    /// Drops every user table and returns the dropped names
    fn drop_all_tables(&self) -> Result<Vec<String>>;

    /// Returns the row count and up to `limit` rows of a table
    fn preview(&self, table: &str, limit: usize) -> Result<TablePreview>;
}

/// Warehouse stored in a SQLite database file
#[derive(Debug, Clone)]
pub struct SqliteTableStore {
    db_path: PathBuf,
}

impl SqliteTableStore {
    /// Create a store for the given database file, creating parent directories
    ///
    /// # Examples
    ///
    /// ```
    /// use stratum::storage::{SqliteTableStore, TableStore};
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let store = SqliteTableStore::new(dir.path().join("warehouse.db")).unwrap();
    /// assert!(store.list_tables().unwrap().is_empty());
    /// ```
    pub fn new<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create parent directory for warehouse")
                    .map_err(|e| StratumError::Storage(e.to_string()))?;
            }
        }

        Ok(Self { db_path })
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .context("Failed to open warehouse")
            .map_err(|e| StratumError::Storage(e.to_string()).into())
    }

    fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
        let found = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?",
                params![table],
                |_| Ok(()),
            )
            .optional()
            .map_err(|e| StratumError::Storage(e.to_string()))?;
        Ok(found.is_some())
    }
}

impl TableStore for SqliteTableStore {
    /// Runs `sql` as one transaction; a failing statement rolls back the
    /// whole batch
    fn execute(&self, sql: &str) -> Result<StatementOutput> {
        let mut conn = self.open()?;
        let tx = conn.transaction().map_err(statement_error)?;

        let mut executed = 0usize;
        let mut affected = 0usize;
        let mut result_set = None;

        {
            let mut batch = Batch::new(&tx, sql);
            while let Some(mut stmt) = batch.next().map_err(statement_error)? {
                executed += 1;
                if stmt.column_count() > 0 {
                    result_set = Some(collect_rows(&mut stmt, None)?);
                } else {
                    affected += stmt.execute([]).map_err(statement_error)?;
                }
            }
        }

        if executed == 0 {
            return Err(StratumError::Statement("empty statement".to_string()).into());
        }
        tx.commit().map_err(statement_error)?;

        tracing::debug!(statements = executed, affected, "Executed warehouse batch");

        Ok(match result_set {
            Some((columns, rows)) => StatementOutput::Rows { columns, rows },
            None => StatementOutput::Affected(affected),
        })
    }

    fn describe(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let conn = self.open()?;
        if !Self::table_exists(&conn, table)? {
            return Err(StratumError::UnknownTable(table.to_string()).into());
        }

        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))
            .map_err(statement_error)?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    data_type: row.get(2)?,
                })
            })
            .map_err(statement_error)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(statement_error)?;

        Ok(columns)
    }

    fn list_tables(&self) -> Result<Vec<String>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )
            .map_err(|e| StratumError::Storage(e.to_string()))?;
        let names = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| StratumError::Storage(e.to_string()))?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(|e| StratumError::Storage(e.to_string()))?;
        Ok(names)
    }

    fn replace_from_csv(&self, table: &str, csv: &[u8]) -> Result<LoadSummary> {
        if table.trim().is_empty() {
            return Err(StratumError::Statement("table name cannot be empty".to_string()).into());
        }

        let parsed = parse_csv(csv)?;
        let types = infer_column_types(&parsed.records, parsed.headers.len());

        let columns: Vec<ColumnInfo> = parsed
            .headers
            .iter()
            .zip(types.iter())
            .map(|(name, ty)| ColumnInfo {
                name: name.clone(),
                data_type: ty.as_sql().to_string(),
            })
            .collect();

        let quoted = quote_ident(table);
        let column_defs = columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.data_type))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");

        let mut conn = self.open()?;
        let tx = conn.transaction().map_err(statement_error)?;

        tx.execute(&format!("DROP TABLE IF EXISTS {}", quoted), [])
            .map_err(statement_error)?;
        tx.execute(&format!("CREATE TABLE {} ({})", quoted, column_defs), [])
            .map_err(statement_error)?;
        {
            let mut insert = tx
                .prepare(&format!("INSERT INTO {} VALUES ({})", quoted, placeholders))
                .map_err(statement_error)?;
            for record in &parsed.records {
                let values = record
                    .iter()
                    .zip(types.iter())
                    .map(|(cell, ty)| ty.convert(cell));
                insert
                    .execute(params_from_iter(values))
                    .map_err(statement_error)?;
            }
        }
        tx.commit().map_err(statement_error)?;

        tracing::info!(
            table = %table,
            rows = parsed.records.len(),
            columns = columns.len(),
            "Replaced table from CSV"
        );

        Ok(LoadSummary {
            table: table.to_string(),
            rows: parsed.records.len(),
            columns,
        })
    }

    fn drop_all_tables(&self) -> Result<Vec<String>> {
        let tables = self.list_tables()?;
        let mut conn = self.open()?;
        let tx = conn
            .transaction()
            .map_err(|e| StratumError::Storage(e.to_string()))?;
        for table in &tables {
            tx.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)), [])
                .map_err(|e| StratumError::Storage(e.to_string()))?;
            tracing::debug!("Dropped table {}", table);
        }
        tx.commit()
            .map_err(|e| StratumError::Storage(e.to_string()))?;
        Ok(tables)
    }

    fn preview(&self, table: &str, limit: usize) -> Result<TablePreview> {
        let conn = self.open()?;
        if !Self::table_exists(&conn, table)? {
            return Err(StratumError::UnknownTable(table.to_string()).into());
        }

        let quoted = quote_ident(table);
        let row_count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", quoted), [], |row| {
                row.get(0)
            })
            .map_err(statement_error)?;

        let mut stmt = conn
            .prepare(&format!("SELECT * FROM {}", quoted))
            .map_err(statement_error)?;
        let (columns, rows) = collect_rows(&mut stmt, Some(limit))?;

        Ok(TablePreview {
            table: table.to_string(),
            row_count: row_count.max(0) as u64,
            columns,
            rows,
        })
    }
}

fn statement_error(e: rusqlite::Error) -> StratumError {
    StratumError::Statement(e.to_string())
}

/// Quotes an SQL identifier, doubling embedded quotes
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn collect_rows(
    stmt: &mut Statement<'_>,
    limit: Option<usize>,
) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let width = columns.len();

    let mut rows = Vec::new();
    let mut cursor = stmt.query([]).map_err(statement_error)?;
    while let Some(row) = cursor.next().map_err(statement_error)? {
        if limit.is_some_and(|max| rows.len() >= max) {
            break;
        }
        let mut values = Vec::with_capacity(width);
        for idx in 0..width {
            let value = row.get_ref(idx).map_err(statement_error)?;
            values.push(sql_to_json(value));
        }
        rows.push(values);
    }

    Ok((columns, rows))
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}

struct ParsedCsv {
    headers: Vec<String>,
    records: Vec<csv::StringRecord>,
}

fn parse_csv(data: &[u8]) -> Result<ParsedCsv> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .trim(csv::Trim::Headers)
        .from_reader(data);

    let raw_headers = reader
        .headers()
        .map_err(|e| StratumError::Statement(format!("malformed CSV: {}", e)))?
        .clone();

    if raw_headers.is_empty() {
        return Err(StratumError::Statement("malformed CSV: no header row".to_string()).into());
    }

    let mut seen = HashSet::new();
    let headers = raw_headers
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            let base = if header.is_empty() {
                format!("column_{}", idx + 1)
            } else {
                header.to_string()
            };
            let mut name = base.clone();
            let mut suffix = 2;
            while !seen.insert(name.to_lowercase()) {
                name = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            name
        })
        .collect();

    let records = reader
        .records()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| StratumError::Statement(format!("malformed CSV: {}", e)))?;

    Ok(ParsedCsv { headers, records })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
        }
    }

    fn convert(self, cell: &str) -> SqlValue {
        if cell.is_empty() {
            return SqlValue::Null;
        }
        match self {
            Self::Integer => cell
                .trim()
                .parse()
                .map(SqlValue::Integer)
                .unwrap_or_else(|_| SqlValue::Text(cell.to_string())),
            Self::Real => cell
                .trim()
                .parse()
                .map(SqlValue::Real)
                .unwrap_or_else(|_| SqlValue::Text(cell.to_string())),
            Self::Text => SqlValue::Text(cell.to_string()),
        }
    }
}

/// Narrowest type that fits every non-empty cell of each column
fn infer_column_types(records: &[csv::StringRecord], width: usize) -> Vec<ColumnType> {
    (0..width)
        .map(|idx| {
            let mut ty = None;
            for cell in records.iter().filter_map(|r| r.get(idx)) {
                if cell.is_empty() {
                    continue;
                }
                let trimmed = cell.trim();
                let cell_ty = if trimmed.parse::<i64>().is_ok() {
                    ColumnType::Integer
                } else if trimmed.parse::<f64>().is_ok() {
                    ColumnType::Real
                } else {
                    ColumnType::Text
                };
                ty = Some(match (ty, cell_ty) {
                    (None, t) => t,
                    (Some(ColumnType::Text), _) | (_, ColumnType::Text) => ColumnType::Text,
                    (Some(ColumnType::Real), _) | (_, ColumnType::Real) => ColumnType::Real,
                    _ => ColumnType::Integer,
                });
                if ty == Some(ColumnType::Text) {
                    break;
                }
            }
            ty.unwrap_or(ColumnType::Text)
        })
        .collect()
}
