//! Dynamic-schema writer for destination SQLite tables.
//!
//! Tables are created from the first page that carries rows, typed from the
//! first non-null value of each column. Columns that show up on later pages
//! are added with `ALTER TABLE`. Existing column types are never changed;
//! SQLite keeps each value's own storage class under the column affinity.

use std::collections::HashSet;

use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnection};
use sqlx::SqlitePool;

use super::error::{ImportError, ImportResult};
use super::page::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    /// Storage type for a JSON value; `None` for null.
    pub fn infer(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnType::Integer),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(ColumnType::Integer),
            Value::Number(_) => Some(ColumnType::Real),
            Value::String(_) | Value::Array(_) | Value::Object(_) => Some(ColumnType::Text),
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

/// Key sources include for tables without an explicit primary key.
pub const ROWID: &str = "rowid";

/// Quote an identifier for use in SQLite statements.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Rows keyed by SQLite's own rowid: no declared keys, every row carries one.
fn keyed_by_rowid(rows: &[Row], primary_keys: &[String]) -> bool {
    primary_keys.is_empty()
        && !rows.is_empty()
        && rows.iter().all(|row| row.contains_key(ROWID))
}

/// Columns of a page in first-seen order with their inferred types.
fn page_columns(rows: &[Row], skip_rowid: bool) -> Vec<(String, ColumnType)> {
    let mut columns: Vec<(String, Option<ColumnType>)> = Vec::new();
    for row in rows {
        for (name, value) in row {
            if skip_rowid && name == ROWID {
                continue;
            }
            match columns.iter_mut().find(|(existing, _)| existing == name) {
                Some((_, ty)) => {
                    if ty.is_none() {
                        *ty = ColumnType::infer(value);
                    }
                }
                None => columns.push((name.clone(), ColumnType::infer(value))),
            }
        }
    }

    columns
        .into_iter()
        .map(|(name, ty)| (name, ty.unwrap_or(ColumnType::Text)))
        .collect()
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(flag) => query.bind(i64::from(*flag)),
        Value::Number(n) => {
            if let Some(int) = n.as_i64() {
                query.bind(int)
            } else if let Some(float) = n.as_f64() {
                query.bind(float)
            } else {
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

/// A writable handle on one destination database.
#[derive(Clone)]
pub struct Destination {
    name: String,
    pool: SqlitePool,
}

impl Destination {
    pub fn new(name: impl Into<String>, pool: SqlitePool) -> Self {
        Self {
            name: name.into(),
            pool,
        }
    }

    /// Database name used in redirects and job records.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Current row count, zero when the table does not exist yet.
    pub async fn row_count(&self, table: &str) -> Result<i64, sqlx::Error> {
        if !self.table_exists(table).await? {
            return Ok(0);
        }
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        sqlx::query_scalar(&sql).fetch_one(&self.pool).await
    }

    /// Create the table if needed and upsert one page of rows.
    ///
    /// The page is written in a single transaction. With primary keys rows
    /// replace existing rows with the same key; without them every call
    /// appends. Rows that all carry a `rowid` and no declared keys replace
    /// by SQLite rowid instead. Returns the number of rows written.
    pub async fn write_page(
        &self,
        table: &str,
        rows: &[Row],
        primary_keys: &[String],
    ) -> ImportResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| ImportError::write(table, err))?;

        let by_rowid = keyed_by_rowid(rows, primary_keys);
        let ready = ensure_columns(&mut *tx, table, rows, primary_keys, by_rowid)
            .await
            .map_err(|err| ImportError::write(table, err))?;
        if !ready {
            log::warn!("page for {} has no columns, nothing to create", table);
            return Ok(0);
        }

        let verb = if primary_keys.is_empty() && !by_rowid {
            "INSERT"
        } else {
            "INSERT OR REPLACE"
        };

        for row in rows {
            if row.is_empty() {
                let sql = format!("{verb} INTO {} DEFAULT VALUES", quote_ident(table));
                sqlx::query(&sql)
                    .execute(&mut *tx)
                    .await
                    .map_err(|err| ImportError::write(table, err))?;
                continue;
            }

            let columns: Vec<String> = row.keys().map(|name| quote_ident(name)).collect();
            let placeholders: Vec<String> = (1..=row.len()).map(|idx| format!("?{idx}")).collect();
            let sql = format!(
                "{verb} INTO {} ({}) VALUES ({})",
                quote_ident(table),
                columns.join(", "),
                placeholders.join(", ")
            );

            let mut query = sqlx::query(&sql);
            for value in row.values() {
                query = bind_value(query, value);
            }
            query
                .execute(&mut *tx)
                .await
                .map_err(|err| ImportError::write(table, err))?;
        }

        tx.commit()
            .await
            .map_err(|err| ImportError::write(table, err))?;

        Ok(rows.len() as u64)
    }
}

async fn existing_columns(
    conn: &mut SqliteConnection,
    table: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT name FROM pragma_table_info(?1)")
        .bind(table)
        .fetch_all(conn)
        .await
}

/// Bring the table's columns up to the page's. Returns false when the table
/// does not exist and the page has no columns to create it from.
async fn ensure_columns(
    conn: &mut SqliteConnection,
    table: &str,
    rows: &[Row],
    primary_keys: &[String],
    by_rowid: bool,
) -> Result<bool, sqlx::Error> {
    let columns = page_columns(rows, by_rowid);
    let existing = existing_columns(&mut *conn, table).await?;

    if existing.is_empty() {
        if columns.is_empty() {
            return Ok(false);
        }
        let mut defs: Vec<String> = columns
            .iter()
            .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.as_sql()))
            .collect();
        if !primary_keys.is_empty() {
            let keys: Vec<String> = primary_keys.iter().map(|key| quote_ident(key)).collect();
            defs.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(table),
            defs.join(", ")
        );
        log::info!("creating table {} with {} columns", table, columns.len());
        sqlx::query(&sql).execute(&mut *conn).await?;
        return Ok(true);
    }

    let known: HashSet<&str> = existing.iter().map(String::as_str).collect();
    for (name, ty) in columns.iter().filter(|(name, _)| !known.contains(name.as_str())) {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(table),
            quote_ident(name),
            ty.as_sql()
        );
        log::info!("adding column {} to table {}", name, table);
        sqlx::query(&sql).execute(&mut *conn).await?;
    }

    Ok(true)
}
