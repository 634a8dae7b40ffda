//! # Models
//!
//! Value types flowing through a run: task records derived once from the
//! input dataset, outcomes produced by evaluation attempts, and the result
//! table assembled from both.

pub mod dataset;
pub mod outcome;
pub mod result_table;
pub mod task;

pub use dataset::Dataset;
pub use outcome::{Outcome, OutcomeResult};
pub use result_table::{OutputColumn, ResultRow, ResultTable, TableSchema};
pub use task::{Row, TaskId, TaskRecord};
