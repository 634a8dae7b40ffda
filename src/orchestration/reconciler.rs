//! # Resume Reconciler
//!
//! Merges the persisted state of a previous run with the current dataset and
//! computes the residual task set.
//!
//! | Store | `resume` | Prior rows | Effect |
//! |---|---|---|---|
//! | none | any | - | table seeded from the dataset, every task residual |
//! | some | `false` | any | store overwritten from the dataset, every task residual |
//! | some | `true` | none / empty | as above |
//! | some | `true` | present | prior outcomes reused, only unattempted tasks residual |
//!
//! A prior outcome counts whether it succeeded or failed: failed rows are not
//! retried. Before reusing prior outcomes, every shared input column must
//! hold the same value in the dataset and in the store for each task that
//! already has an outcome; otherwise the run is refused.

use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::database::ResultStore;
use crate::error::{EvaluatorError, Result};
use crate::models::{Dataset, ResultRow, ResultTable, TableSchema, TaskId};

/// Reconciled starting point of a run
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub table: ResultTable,
    /// Task ids still to evaluate, in dataset order
    pub residual: Vec<TaskId>,
    /// Tasks whose prior outcome was reused
    pub resumed: usize,
}

pub async fn reconcile(
    dataset: &Dataset,
    schema: &TableSchema,
    store: Option<&dyn ResultStore>,
    resume: bool,
) -> Result<Reconciliation> {
    let seeded = ResultTable::seeded(dataset, schema.clone());

    let Some(store) = store else {
        debug!("No persisted store, evaluating every task");
        return Ok(fresh(seeded));
    };

    let prior = if resume {
        info!("Loading previous results from the persisted store");
        store.load(schema).await?
    } else {
        None
    };

    match prior {
        Some(prior) if !prior.is_empty() => resume_from(dataset, schema, store, seeded, prior).await,
        _ => {
            info!(rows = seeded.len(), "Initializing persisted store");
            let rows: Vec<ResultRow> = seeded.iter().cloned().collect();
            store.initialize(schema, &rows).await?;
            Ok(fresh(seeded))
        }
    }
}

fn fresh(table: ResultTable) -> Reconciliation {
    Reconciliation {
        residual: table.ids().to_vec(),
        table,
        resumed: 0,
    }
}

async fn resume_from(
    dataset: &Dataset,
    schema: &TableSchema,
    store: &dyn ResultStore,
    mut table: ResultTable,
    prior: Vec<ResultRow>,
) -> Result<Reconciliation> {
    let prior: HashMap<TaskId, ResultRow> = prior
        .into_iter()
        .filter(|row| row.attempted)
        .map(|row| (row.id.clone(), row))
        .collect();

    let columns = conflicting_columns(dataset, &prior);
    if !columns.is_empty() {
        return Err(EvaluatorError::ReconciliationConflict { columns });
    }

    let mut residual = Vec::new();
    let mut resumed = 0;
    for record in dataset.records() {
        match prior.get(record.id()) {
            Some(previous) => {
                let mut row = ResultRow::seeded(record.id().clone(), record.inputs().clone(), schema);
                for column in &schema.output_columns {
                    if let Some(value) = previous.outputs.get(&column.name) {
                        row.outputs.insert(column.name.clone(), value.clone());
                    }
                }
                row.exception = previous.exception.clone();
                row.attempted = true;
                table.insert(row);
                resumed += 1;
            }
            None => {
                // new or never attempted: (re)seed the stored row from the current inputs
                if let Some(row) = table.get(record.id()) {
                    store.upsert(schema, row).await?;
                }
                residual.push(record.id().clone());
            }
        }
    }

    info!(
        resumed,
        residual = residual.len(),
        "Reconciled dataset with persisted store"
    );
    Ok(Reconciliation {
        table,
        residual,
        resumed,
    })
}

/// Input columns whose value differs for any task with a prior outcome, in column order
fn conflicting_columns(dataset: &Dataset, prior: &HashMap<TaskId, ResultRow>) -> Vec<String> {
    dataset
        .columns()
        .iter()
        .filter(|column| {
            dataset.records().iter().any(|record| {
                prior.get(record.id()).is_some_and(|previous| {
                    let current = record.input(column).unwrap_or(&Value::Null);
                    let stored = previous.inputs.get(column.as_str()).unwrap_or(&Value::Null);
                    current != stored
                })
            })
        })
        .cloned()
        .collect()
}
