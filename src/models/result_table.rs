//! # Result Table
//!
//! In-memory table assembled during a run: for every input task, its inputs,
//! its declared output columns and the reserved `exception` column.
//!
//! ## Merge Rules
//!
//! - success: each declared output takes the value the function returned for
//!   it (`null` when the function omitted it); `exception` is cleared
//! - failure: each declared output becomes `null`; `exception` holds the trace
//!
//! Applying the same [`Outcome`] twice leaves the row unchanged, which is what
//! lets the persisted store and this table be updated from one outcome value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use super::dataset::Dataset;
use super::outcome::{Outcome, OutcomeResult};
use super::task::{Row, TaskId};
use crate::constants::EXCEPTION_COLUMN;
use crate::execution::backend::BackendError;

/// Output column declared by the caller, with the value seeded before evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputColumn {
    pub name: String,
    pub default: Value,
}

impl OutputColumn {
    pub fn new(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            default,
        }
    }
}

/// Column layout shared by the result table and the persisted store
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableSchema {
    pub input_columns: Vec<String>,
    pub output_columns: Vec<OutputColumn>,
}

impl TableSchema {
    pub fn new(input_columns: Vec<String>, output_columns: Vec<OutputColumn>) -> Self {
        Self {
            input_columns,
            output_columns,
        }
    }

    pub fn is_output(&self, name: &str) -> bool {
        self.output_columns.iter().any(|c| c.name == name)
    }

    /// Outputs at their declared defaults
    pub fn default_outputs(&self) -> Row {
        self.output_columns
            .iter()
            .map(|c| (c.name.clone(), c.default.clone()))
            .collect()
    }

    /// Inputs, then outputs, then `exception`
    pub fn column_names(&self) -> Vec<String> {
        self.input_columns
            .iter()
            .cloned()
            .chain(self.output_columns.iter().map(|c| c.name.clone()))
            .chain(std::iter::once(EXCEPTION_COLUMN.to_string()))
            .collect()
    }
}

/// One row of the result table / persisted store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub id: TaskId,
    pub inputs: Row,
    pub outputs: Row,
    pub exception: Option<String>,
    /// Set once an outcome for this row has been merged
    pub attempted: bool,
}

impl ResultRow {
    /// Row seeded from inputs with outputs at their defaults
    pub fn seeded(id: TaskId, inputs: Row, schema: &TableSchema) -> Self {
        Self {
            id,
            inputs,
            outputs: schema.default_outputs(),
            exception: None,
            attempted: false,
        }
    }

    /// Copy of this row with `outcome` merged in
    pub fn merged(&self, outcome: &Outcome, schema: &TableSchema) -> Self {
        let mut row = self.clone();
        match &outcome.result {
            OutcomeResult::Success(values) => {
                for column in &schema.output_columns {
                    let value = values.get(&column.name).cloned().unwrap_or(Value::Null);
                    row.outputs.insert(column.name.clone(), value);
                }
                if let Some(extra) = values.keys().find(|k| !schema.is_output(k)) {
                    debug!(
                        task_id = %outcome.id,
                        column = %extra,
                        "Ignoring undeclared output column"
                    );
                }
                row.exception = None;
            }
            OutcomeResult::Failure(trace) => {
                for column in &schema.output_columns {
                    row.outputs.insert(column.name.clone(), Value::Null);
                }
                row.exception = Some(trace.clone());
            }
        }
        row.attempted = true;
        row
    }

    /// Value of any column, `exception` included
    pub fn value(&self, column: &str) -> Option<Value> {
        if column == EXCEPTION_COLUMN {
            return Some(
                self.exception
                    .as_ref()
                    .map_or(Value::Null, |e| Value::String(e.clone())),
            );
        }
        self.inputs
            .get(column)
            .or_else(|| self.outputs.get(column))
            .cloned()
    }
}

/// TaskId-keyed table returned to the caller
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultTable {
    schema: TableSchema,
    order: Vec<TaskId>,
    rows: HashMap<TaskId, ResultRow>,
}

impl ResultTable {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            order: Vec::new(),
            rows: HashMap::new(),
        }
    }

    /// Table seeded from the dataset only
    pub fn seeded(dataset: &Dataset, schema: TableSchema) -> Self {
        let mut table = Self::new(schema);
        for record in dataset.records() {
            let row = ResultRow::seeded(record.id().clone(), record.inputs().clone(), &table.schema);
            table.insert(row);
        }
        table
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Insert or replace a row; a new id is appended to the row order
    pub fn insert(&mut self, row: ResultRow) {
        if !self.rows.contains_key(&row.id) {
            self.order.push(row.id.clone());
        }
        self.rows.insert(row.id.clone(), row);
    }

    /// The row as it would look after merging `outcome`
    pub fn merged_row(&self, outcome: &Outcome) -> Result<ResultRow, BackendError> {
        self.rows
            .get(&outcome.id)
            .map(|row| row.merged(outcome, &self.schema))
            .ok_or_else(|| BackendError::UnknownTask(outcome.id.clone()))
    }

    /// Merge an outcome in place
    pub fn apply(&mut self, outcome: &Outcome) -> Result<(), BackendError> {
        let row = self.merged_row(outcome)?;
        self.insert(row);
        Ok(())
    }

    pub fn get(&self, id: &TaskId) -> Option<&ResultRow> {
        self.rows.get(id)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.rows.contains_key(id)
    }

    /// Cell lookup by task id and column name
    pub fn value(&self, id: &TaskId, column: &str) -> Option<Value> {
        self.rows.get(id).and_then(|r| r.value(column))
    }

    /// Rows in input order
    pub fn iter(&self) -> impl Iterator<Item = &ResultRow> {
        self.order.iter().filter_map(|id| self.rows.get(id))
    }

    pub fn ids(&self) -> &[TaskId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn attempted_count(&self) -> usize {
        self.rows.values().filter(|r| r.attempted).count()
    }

    pub fn failed_count(&self) -> usize {
        self.rows.values().filter(|r| r.exception.is_some()).count()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema.column_names()
    }
}
