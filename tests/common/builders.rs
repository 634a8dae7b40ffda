//! Datasets, evaluation functions and stores shared by the integration tests

use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tasker_evaluator::prelude::*;
use tempfile::TempDir;

/// Dataset with one `value` column and positional task ids
pub fn value_dataset(values: &[i64]) -> Dataset {
    Dataset::from_rows(
        values
            .iter()
            .map(|v| [("value".to_string(), json!(v))].into_iter().collect::<Row>())
            .collect(),
    )
    .expect("valid dataset")
}

/// Dataset with `name`, `value` and `value_1` columns
pub fn mixed_dataset(rows: usize) -> Dataset {
    Dataset::from_rows(
        (0..rows)
            .map(|i| {
                [
                    ("name".to_string(), json!(format!("row_{i}"))),
                    ("value".to_string(), json!(i as f64 + 0.5)),
                    ("value_1".to_string(), json!(i as i64 * 2)),
                ]
                .into_iter()
                .collect::<Row>()
            })
            .collect(),
    )
    .expect("valid dataset")
}

pub fn id(index: usize) -> TaskId {
    TaskId::from(index)
}

/// `{result: value * 10}`
pub fn times_ten(row: &Row, _args: &ExtraArgs) -> Result<Row, EvalError> {
    let value = row
        .get("value")
        .and_then(Value::as_i64)
        .ok_or_else(|| EvalError::msg("value must be an integer"))?;
    Ok([("result".to_string(), json!(value * 10))].into_iter().collect())
}

/// `times_ten`, except that `value == 2` fails
pub fn fails_on_two(row: &Row, args: &ExtraArgs) -> Result<Row, EvalError> {
    if row.get("value") == Some(&json!(2)) {
        return Err(EvalError::msg("The value should not be 2"));
    }
    times_ten(row, args)
}

/// `{result: value * 10}` and `{twice: value * 2}` with an optional `coeff` added to both
pub fn two_outputs(row: &Row, args: &ExtraArgs) -> Result<Row, EvalError> {
    let value = row.get("value").and_then(Value::as_f64).unwrap_or_default();
    let coeff = args.f64_or(0, "coeff", 0.0);
    Ok([
        ("result".to_string(), json!(value * 10.0 + coeff)),
        ("twice".to_string(), json!(value * 2.0 + coeff)),
    ]
    .into_iter()
    .collect())
}

/// Counts calls; stops the run (operator interrupt) on the call after `limit`
pub struct InterruptAfter {
    pub limit: usize,
    pub calls: Arc<AtomicUsize>,
}

impl InterruptAfter {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl EvaluationFunction for InterruptAfter {
    fn evaluate(&self, inputs: &Row, args: &ExtraArgs) -> Result<Row, EvalError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.limit {
            return Err(EvalError::Interrupted);
        }
        times_ten(inputs, args)
    }
}

/// SQLite store in a temporary directory; keep the `TempDir` alive for the test
pub fn sqlite_store() -> (TempDir, StoreConfig) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path: PathBuf = dir.path().join("results.db");
    let store = StoreConfig::new(path.to_string_lossy().to_string());
    (dir, store)
}
