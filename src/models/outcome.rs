//! Result of one evaluation attempt.

use serde::{Deserialize, Serialize};

use super::task::{Row, TaskId};

/// Either the output values or the failure trace of an attempt
///
/// Modelled as an enum so an outcome can never carry both, or neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeResult {
    Success(Row),
    Failure(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub id: TaskId,
    pub result: OutcomeResult,
}

impl Outcome {
    pub fn success(id: TaskId, outputs: Row) -> Self {
        Self {
            id,
            result: OutcomeResult::Success(outputs),
        }
    }

    pub fn failure(id: TaskId, trace: impl Into<String>) -> Self {
        Self {
            id,
            result: OutcomeResult::Failure(trace.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.result, OutcomeResult::Success(_))
    }

    pub fn outputs(&self) -> Option<&Row> {
        match &self.result {
            OutcomeResult::Success(outputs) => Some(outputs),
            OutcomeResult::Failure(_) => None,
        }
    }

    pub fn failure_trace(&self) -> Option<&str> {
        match &self.result {
            OutcomeResult::Success(_) => None,
            OutcomeResult::Failure(trace) => Some(trace),
        }
    }
}
