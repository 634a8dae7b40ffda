//! # Dataset
//!
//! Tabular input of a run: an ordered list of columns and one [`TaskRecord`]
//! per row. Every record carries every column, in column order; cells a row
//! did not provide are normalised to `null` so the persisted store and the
//! reconciler always compare like with like.

use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::task::{Row, TaskId, TaskRecord};
use crate::error::{EvaluatorError, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    records: Vec<TaskRecord>,
    positions: HashMap<TaskId, usize>,
}

impl Dataset {
    /// Empty dataset with a fixed column order
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            records: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Build a dataset whose task ids are the row positions (`"0"`, `"1"`, ...)
    ///
    /// Columns are the union of the rows' keys in first-seen order.
    pub fn from_rows(rows: Vec<Row>) -> Result<Self> {
        Self::with_ids(rows.into_iter().enumerate().map(|(i, row)| (TaskId::from(i), row)))
    }

    /// Build a dataset from explicit `(id, row)` pairs
    pub fn with_ids<I, K>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Row)>,
        K: Into<TaskId>,
    {
        let rows: Vec<(TaskId, Row)> = rows.into_iter().map(|(k, r)| (k.into(), r)).collect();

        let mut columns: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for (_, row) in &rows {
            for key in row.keys() {
                if seen.insert(key.clone()) {
                    columns.push(key.clone());
                }
            }
        }

        let mut dataset = Self::new(columns);
        for (id, row) in rows {
            dataset.push(id, row)?;
        }
        Ok(dataset)
    }

    /// Append a row; unknown keys are rejected, missing ones become `null`
    pub fn push(&mut self, id: impl Into<TaskId>, row: Row) -> Result<()> {
        let id = id.into();
        if self.positions.contains_key(&id) {
            return Err(EvaluatorError::Validation(format!(
                "Duplicate task id '{id}' in dataset"
            )));
        }
        if let Some(unknown) = row.keys().find(|k| !self.columns.contains(k)) {
            return Err(EvaluatorError::Validation(format!(
                "Row '{id}' has column '{unknown}' which is not part of the dataset"
            )));
        }

        let inputs = self.normalise(row);
        self.positions.insert(id.clone(), self.records.len());
        self.records.push(TaskRecord::new(id, inputs));
        Ok(())
    }

    fn normalise(&self, mut row: Row) -> Row {
        self.columns
            .iter()
            .map(|c| (c.clone(), row.remove(c).unwrap_or(Value::Null)))
            .collect()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[TaskRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<TaskRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &TaskId> {
        self.records.iter().map(TaskRecord::id)
    }

    pub fn get(&self, id: &TaskId) -> Option<&TaskRecord> {
        self.positions.get(id).map(|&position| &self.records[position])
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Sub-dataset restricted to `ids`, keeping the original row order
    pub fn select<'a, I>(&self, ids: I) -> Self
    where
        I: IntoIterator<Item = &'a TaskId>,
    {
        let mut wanted: Vec<usize> = ids
            .into_iter()
            .filter_map(|id| self.positions.get(id).copied())
            .collect();
        wanted.sort_unstable();
        wanted.dedup();

        let records: Vec<TaskRecord> = wanted.into_iter().map(|p| self.records[p].clone()).collect();
        let positions = records
            .iter()
            .enumerate()
            .map(|(position, record)| (record.id().clone(), position))
            .collect();
        Self {
            columns: self.columns.clone(),
            records,
            positions,
        }
    }

    /// Remove a column from the dataset and from every record
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(position) = self.columns.iter().position(|c| c == name) else {
            return false;
        };
        self.columns.remove(position);
        self.records = std::mem::take(&mut self.records)
            .into_iter()
            .map(|record| {
                let (id, mut inputs) = record.into_parts();
                inputs.shift_remove(name);
                TaskRecord::new(id, inputs)
            })
            .collect();
        true
    }

    /// Replace one cell, rebuilding the affected record
    pub fn set_value(&mut self, id: &TaskId, column: &str, value: Value) -> Result<()> {
        if !self.has_column(column) {
            return Err(EvaluatorError::Validation(format!(
                "Unknown column '{column}'"
            )));
        }
        let position = *self
            .positions
            .get(id)
            .ok_or_else(|| EvaluatorError::Validation(format!("Unknown task id '{id}'")))?;
        let record = &mut self.records[position];

        let (task_id, mut inputs) = record.clone().into_parts();
        inputs.insert(column.to_string(), value);
        *record = TaskRecord::new(task_id, inputs);
        Ok(())
    }
}
