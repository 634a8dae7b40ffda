//! # SQLite Result Store
//!
//! Persists the result table to a single SQLite table through sqlx. Input and
//! output cells are stored as JSON text (SQL `NULL` for JSON null), the
//! `exception` column as plain text and `attempted` as an integer flag. Every
//! row write is one statement, so a killed run never leaves a half-written row.
//!
//! Table layout:
//!
//! ```sql
//! CREATE TABLE "results" (
//!     "task_id"   TEXT PRIMARY KEY NOT NULL,
//!     "<input>"   TEXT, ...
//!     "<output>"  TEXT, ...
//!     "exception" TEXT,
//!     "attempted" INTEGER NOT NULL DEFAULT 0
//! )
//! ```

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, instrument};

use super::error::{StoreError, StoreResult};
use super::store::ResultStore;
use crate::config::StoreConfig;
use crate::constants::{ATTEMPTED_COLUMN, EXCEPTION_COLUMN, TASK_ID_COLUMN};
use crate::models::{ResultRow, Row, TableSchema, TaskId};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    location: String,
    table: String,
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore")
            .field("location", &self.location)
            .field("table", &self.table)
            .finish()
    }
}

impl SqliteStore {
    /// Open (creating if missing) the database at `location`
    ///
    /// `location` is either a `sqlite:` URL or a plain file path.
    pub async fn connect(location: &str, table: impl Into<String>) -> StoreResult<Self> {
        let location = location.trim();
        if location.is_empty() {
            return Err(StoreError::InvalidLocation(location.to_string()));
        }

        let options = if location.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(location)?
        } else {
            SqliteConnectOptions::new().filename(location)
        }
        .create_if_missing(true);

        // one long-lived connection keeps `sqlite::memory:` databases alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let table = table.into();
        info!(location, table = %table, "Opened result store");

        Ok(Self {
            pool,
            location: location.to_string(),
            table,
        })
    }

    pub async fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        Self::connect(&config.url, config.table.clone()).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    async fn table_exists(&self) -> StoreResult<bool> {
        let found = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(self.table.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    fn create_sql(&self, schema: &TableSchema) -> String {
        let key = format!("{} TEXT PRIMARY KEY NOT NULL", quote(TASK_ID_COLUMN));
        let columns: Vec<String> = std::iter::once(key)
            .chain(schema.column_names().iter().map(|c| format!("{} TEXT", quote(c))))
            .chain(std::iter::once(format!(
                "{} INTEGER NOT NULL DEFAULT 0",
                quote(ATTEMPTED_COLUMN)
            )))
            .collect();
        format!("CREATE TABLE {} ({})", quote(&self.table), columns.join(", "))
    }

    fn upsert_sql(&self, schema: &TableSchema) -> String {
        let columns: Vec<String> = stored_columns(schema).iter().map(|c| quote(c)).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let updates: Vec<String> = columns
            .iter()
            .skip(1)
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        format!(
            "INSERT INTO {table} ({columns}) VALUES ({placeholders}) \
             ON CONFLICT({key}) DO UPDATE SET {updates}",
            table = quote(&self.table),
            columns = columns.join(", "),
            key = quote(TASK_ID_COLUMN),
            updates = updates.join(", "),
        )
    }
}

/// `task_id`, inputs, outputs, `exception`, `attempted`
fn stored_columns(schema: &TableSchema) -> Vec<String> {
    std::iter::once(TASK_ID_COLUMN.to_string())
        .chain(schema.column_names())
        .chain(std::iter::once(ATTEMPTED_COLUMN.to_string()))
        .collect()
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn encode_cell(value: Option<&Value>) -> StoreResult<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::to_string(value)?)),
    }
}

fn decode_cell(raw: Option<String>) -> StoreResult<Value> {
    match raw {
        None => Ok(Value::Null),
        Some(raw) => Ok(serde_json::from_str(&raw)?),
    }
}

/// JSON cells of a row in `schema` order (inputs, then outputs)
fn encoded_cells(schema: &TableSchema, row: &ResultRow) -> StoreResult<Vec<Option<String>>> {
    let inputs = schema
        .input_columns
        .iter()
        .map(|c| encode_cell(row.inputs.get(c)));
    let outputs = schema
        .output_columns
        .iter()
        .map(|c| encode_cell(row.outputs.get(&c.name)));
    inputs.chain(outputs).collect()
}

fn decode_row(schema: &TableSchema, row: &SqliteRow) -> StoreResult<ResultRow> {
    let mut id = None;
    let mut inputs = Row::new();
    let mut outputs = Row::new();
    let mut exception = None;
    let mut attempted = false;

    for column in row.columns() {
        let name = column.name();
        let index = column.ordinal();
        match name {
            TASK_ID_COLUMN => id = Some(TaskId::new(row.try_get::<String, _>(index)?)),
            EXCEPTION_COLUMN => exception = row.try_get::<Option<String>, _>(index)?,
            ATTEMPTED_COLUMN => attempted = row.try_get::<Option<i64>, _>(index)?.unwrap_or(0) != 0,
            _ => {
                let value = decode_cell(row.try_get::<Option<String>, _>(index)?)?;
                if schema.is_output(name) {
                    outputs.insert(name.to_string(), value);
                } else {
                    inputs.insert(name.to_string(), value);
                }
            }
        }
    }

    let id = id.ok_or_else(|| {
        StoreError::SchemaMismatch(format!("stored table has no '{TASK_ID_COLUMN}' column"))
    })?;
    Ok(ResultRow {
        id,
        inputs,
        outputs,
        exception,
        attempted,
    })
}

#[async_trait]
impl ResultStore for SqliteStore {
    #[instrument(skip(self, schema), fields(table = %self.table))]
    async fn load(&self, schema: &TableSchema) -> StoreResult<Option<Vec<ResultRow>>> {
        if !self.table_exists().await? {
            debug!("No stored table");
            return Ok(None);
        }

        let stored: Vec<String> = sqlx::query(&format!("PRAGMA table_info({})", quote(&self.table)))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<Result<_, _>>()?;
        if let Some(missing) = stored_columns(schema).into_iter().find(|c| !stored.contains(c)) {
            return Err(StoreError::SchemaMismatch(format!(
                "column '{missing}' is missing from stored table '{}'",
                self.table
            )));
        }

        let rows = sqlx::query(&format!("SELECT * FROM {} ORDER BY rowid", quote(&self.table)))
            .fetch_all(&self.pool)
            .await?;
        let rows = rows
            .iter()
            .map(|row| decode_row(schema, row))
            .collect::<StoreResult<Vec<_>>>()?;

        debug!(rows = rows.len(), "Loaded stored rows");
        Ok(Some(rows))
    }

    #[instrument(skip(self, schema, rows), fields(table = %self.table, rows = rows.len()))]
    async fn initialize(&self, schema: &TableSchema, rows: &[ResultRow]) -> StoreResult<()> {
        let create = self.create_sql(schema);
        let upsert = self.upsert_sql(schema);

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote(&self.table)))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&create).execute(&mut *tx).await?;

        for row in rows {
            let mut query = sqlx::query(&upsert).bind(row.id.as_str().to_string());
            for cell in encoded_cells(schema, row)? {
                query = query.bind(cell);
            }
            query
                .bind(row.exception.clone())
                .bind(i64::from(row.attempted))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!("Stored table initialized");
        Ok(())
    }

    async fn upsert(&self, schema: &TableSchema, row: &ResultRow) -> StoreResult<()> {
        let upsert = self.upsert_sql(schema);
        let mut query = sqlx::query(&upsert).bind(row.id.as_str().to_string());
        for cell in encoded_cells(schema, row)? {
            query = query.bind(cell);
        }
        query
            .bind(row.exception.clone())
            .bind(i64::from(row.attempted))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!(location = %self.location, "Result store closed");
    }
}
