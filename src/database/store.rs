//! Persisted store contract
//!
//! A store holds one table per run: one row per task with its inputs, its
//! output columns, the `exception` column and an `attempted` flag. Writes are
//! per row and self-contained, so a run killed at any point leaves every
//! committed row readable.

use async_trait::async_trait;
use std::fmt;

use super::error::StoreResult;
use crate::models::{ResultRow, TableSchema};

#[async_trait]
pub trait ResultStore: Send + Sync + fmt::Debug {
    /// Rows of a previous run in their stored order, or `None` when the
    /// store holds no table yet
    async fn load(&self, schema: &TableSchema) -> StoreResult<Option<Vec<ResultRow>>>;

    /// Replace any existing table with `rows`
    async fn initialize(&self, schema: &TableSchema, rows: &[ResultRow]) -> StoreResult<()>;

    /// Insert or replace one row, keyed by task id
    async fn upsert(&self, schema: &TableSchema, row: &ResultRow) -> StoreResult<()>;

    /// Release connections; further use is an error
    async fn close(&self);
}
