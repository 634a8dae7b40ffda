//! In-process result store
//!
//! Same contract as the SQLite store, held in memory. Share it through an
//! `Arc` to inspect what a run committed, or to resume a second run from it.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::error::{StoreError, StoreResult};
use super::store::ResultStore;
use crate::models::{ResultRow, TableSchema};

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<Option<Vec<ResultRow>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed rows in insertion order, `None` before initialization
    pub fn snapshot(&self) -> Option<Vec<ResultRow>> {
        self.rows.read().clone()
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn load(&self, _schema: &TableSchema) -> StoreResult<Option<Vec<ResultRow>>> {
        Ok(self.snapshot())
    }

    async fn initialize(&self, _schema: &TableSchema, rows: &[ResultRow]) -> StoreResult<()> {
        *self.rows.write() = Some(rows.to_vec());
        debug!(rows = rows.len(), "Memory store initialized");
        Ok(())
    }

    async fn upsert(&self, _schema: &TableSchema, row: &ResultRow) -> StoreResult<()> {
        let mut guard = self.rows.write();
        let rows = guard.as_mut().ok_or_else(|| {
            StoreError::SchemaMismatch("memory store has not been initialized".to_string())
        })?;
        match rows.iter_mut().find(|stored| stored.id == row.id) {
            Some(stored) => *stored = row.clone(),
            None => rows.push(row.clone()),
        }
        Ok(())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Row, TaskId};

    fn row(id: usize) -> ResultRow {
        ResultRow::seeded(TaskId::from(id), Row::new(), &TableSchema::default())
    }

    #[tokio::test]
    async fn upsert_requires_initialization() {
        let store = MemoryStore::new();
        assert!(store.upsert(&TableSchema::default(), &row(0)).await.is_err());
        assert!(store.load(&TableSchema::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let store = MemoryStore::new();
        let schema = TableSchema::default();
        store.initialize(&schema, &[row(0), row(1)]).await.unwrap();

        let mut updated = row(1);
        updated.attempted = true;
        store.upsert(&schema, &updated).await.unwrap();
        store.upsert(&schema, &row(2)).await.unwrap();

        let rows = store.snapshot().unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[1].attempted);
        assert_eq!(rows[2].id, TaskId::from(2usize));
    }
}
