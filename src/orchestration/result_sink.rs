//! # Result Sink
//!
//! Folds the unordered outcome stream into the result table. When a store is
//! configured, each merged row is committed there first and only then applied
//! in memory, so the store is never behind what the caller sees.

use std::sync::Arc;
use uuid::Uuid;

use crate::database::ResultStore;
use crate::error::Result;
use crate::logging::log_task_outcome;
use crate::models::{Outcome, ResultTable};

#[derive(Debug)]
pub struct ResultSink {
    run_id: Uuid,
    table: ResultTable,
    store: Option<Arc<dyn ResultStore>>,
    succeeded: usize,
    failed: usize,
}

impl ResultSink {
    pub fn new(run_id: Uuid, table: ResultTable, store: Option<Arc<dyn ResultStore>>) -> Self {
        Self {
            run_id,
            table,
            store,
            succeeded: 0,
            failed: 0,
        }
    }

    /// Merge one outcome: store first, then memory
    pub async fn commit(&mut self, outcome: &Outcome) -> Result<()> {
        let row = self.table.merged_row(outcome)?;
        if let Some(store) = &self.store {
            store.upsert(self.table.schema(), &row).await?;
        }
        self.table.insert(row);

        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        log_task_outcome(self.run_id, &outcome.id, outcome.is_success());
        Ok(())
    }

    pub fn table(&self) -> &ResultTable {
        &self.table
    }

    /// Outcomes committed in this run
    pub fn committed(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn into_table(self) -> ResultTable {
        self.table
    }
}
