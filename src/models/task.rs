//! # Task Model
//!
//! One input row of a dataset, identified by a [`TaskId`] that is stable
//! across runs.
//!
//! ## Identity
//!
//! The id is derived from the row identity of the *original* dataset (its
//! position, or an explicit key supplied by the caller), never from execution
//! order. A resumed run over the same dataset therefore addresses the same
//! persisted rows, whatever order the backend completed them in last time.
//!
//! ## Immutability
//!
//! A [`TaskRecord`] is built once when the dataset is loaded and never mutated;
//! the fields are private and only exposed by reference.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Ordered mapping of column name to cell value
pub type Row = Map<String, Value>;

/// Stable, opaque identifier of one input row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<usize> for TaskId {
    fn from(value: usize) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for TaskId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for TaskId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

/// Identity plus input attributes of one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    id: TaskId,
    inputs: Row,
}

impl TaskRecord {
    pub fn new(id: impl Into<TaskId>, inputs: Row) -> Self {
        Self {
            id: id.into(),
            inputs,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn inputs(&self) -> &Row {
        &self.inputs
    }

    /// Single input cell, `None` when the column is absent
    pub fn input(&self, column: &str) -> Option<&Value> {
        self.inputs.get(column)
    }

    pub fn into_parts(self) -> (TaskId, Row) {
        (self.id, self.inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_ids_from_positions_and_keys_agree() {
        assert_eq!(TaskId::from(3usize), TaskId::from("3"));
        assert_eq!(TaskId::from(-1i64).as_str(), "-1");
        assert_eq!(TaskId::new("row_a").to_string(), "row_a");
    }

    #[test]
    fn record_exposes_inputs_in_order() {
        let mut row = Row::new();
        row.insert("name".into(), json!("test1"));
        row.insert("value".into(), json!(1.0));
        let record = TaskRecord::new(0usize, row);

        let columns: Vec<&String> = record.inputs().keys().collect();
        assert_eq!(columns, vec!["name", "value"]);
        assert_eq!(record.input("value"), Some(&json!(1.0)));
        assert_eq!(record.input("missing"), None);
    }
}
