//! # Evaluator
//!
//! The run loop: validate the output schema, reconcile with the persisted
//! store, batch the residual tasks, dispatch each batch to the backend and
//! fold the outcomes into the result table as they arrive.
//!
//! Batches are issued strictly in sequence; batch `k + 1` is dispatched only
//! after every outcome of batch `k` has been committed.
//!
//! ## Interrupts
//!
//! An operator interrupt (raised through the [`InterruptSignal`], by Ctrl-C
//! when enabled, or by a task returning [`EvalError::Interrupted`]) stops the
//! loop: no further batch is issued, outcomes that are already available are
//! drained without waiting, and the partial table is returned as a normal
//! report with `stats.interrupted` set.
//!
//! [`EvalError::Interrupted`]: crate::execution::EvalError::Interrupted
//!
//! ## Usage
//!
//! ```rust,no_run
//! use serde_json::json;
//! use tasker_evaluator::prelude::*;
//!
//! fn times_ten(row: &Row, _args: &ExtraArgs) -> Result<Row, EvalError> {
//!     let value = row["value"].as_f64().unwrap_or_default();
//!     Ok([("result".to_string(), json!(value * 10.0))].into_iter().collect())
//! }
//!
//! # async fn run() -> tasker_evaluator::Result<()> {
//! let dataset = Dataset::from_rows(vec![
//!     [("value".to_string(), json!(1))].into_iter().collect(),
//!     [("value".to_string(), json!(2))].into_iter().collect(),
//! ])?;
//!
//! let request = EvaluationRequest::new()
//!     .with_output("result", json!(0.0))
//!     .with_backend(BackendConfig::for_kind(BackendKind::WorkerPool))
//!     .with_store(StoreConfig::new("results.db"))
//!     .resume(true);
//!
//! let report = evaluate(dataset, times_ten, request).await?;
//! println!("{} rows, {} failed", report.table.len(), report.stats.failed);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use futures::{FutureExt, StreamExt};
use rand::seq::SliceRandom;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::progress::{Progress, ProgressReporter};
use super::reconciler::reconcile;
use super::result_sink::ResultSink;
use crate::config::{BackendConfig, ConfigurationError, EvaluatorConfig, ExecutionConfig, StoreConfig};
use crate::constants::{DEFAULT_OUTPUT_COLUMN, EXCEPTION_COLUMN, RESERVED_STORE_COLUMNS};
use crate::database::{ResultStore, SqliteStore};
use crate::error::Result;
use crate::execution::backend::{AttemptStream, BackendError, BackendRegistry, DispatchContext, Mapper};
use crate::execution::batcher::batch;
use crate::execution::interrupt::InterruptSignal;
use crate::execution::isolation::{isolated_job, Attempt, EvaluationFunction, ExtraArgs};
use crate::logging::log_run_operation;
use crate::models::{Dataset, OutputColumn, ResultTable, TableSchema, TaskId};

/// Counters and timestamps of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStats {
    pub run_id: Uuid,
    /// Rows in the dataset
    pub total: usize,
    /// Rows that needed evaluation after reconciliation
    pub residual: usize,
    /// Rows whose prior outcome was reused
    pub resumed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunStats {
    /// Nothing was left to evaluate; usually a sign of a misconfigured resume
    pub fn nothing_to_do(&self) -> bool {
        self.residual == 0
    }

    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Result table plus run statistics
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub table: ResultTable,
    pub stats: RunStats,
}

/// Everything [`evaluate`] needs besides the dataset and the function
#[derive(Debug, Clone, Default)]
pub struct EvaluationRequest {
    pub output_columns: Vec<OutputColumn>,
    pub backend: BackendConfig,
    pub execution: ExecutionConfig,
    pub store: Option<StoreConfig>,
    pub args: ExtraArgs,
    pub interrupt: Option<InterruptSignal>,
}

impl EvaluationRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend, execution and store settings taken from a loaded configuration
    pub fn from_config(config: &EvaluatorConfig) -> Self {
        Self {
            backend: config.backend.clone(),
            execution: config.execution.clone(),
            store: config.store.clone(),
            ..Self::default()
        }
    }

    pub fn with_output(mut self, name: impl Into<String>, default: Value) -> Self {
        self.output_columns.push(OutputColumn::new(name, default));
        self
    }

    pub fn with_outputs(mut self, columns: impl IntoIterator<Item = OutputColumn>) -> Self {
        self.output_columns.extend(columns);
        self
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.execution.batch_size = Some(batch_size);
        self
    }

    pub fn resume(mut self, resume: bool) -> Self {
        self.execution.resume = resume;
        self
    }

    pub fn shuffle_rows(mut self, shuffle: bool) -> Self {
        self.execution.shuffle_rows = shuffle;
        self
    }

    pub fn handle_ctrl_c(mut self, enabled: bool) -> Self {
        self.execution.handle_ctrl_c = enabled;
        self
    }

    pub fn with_args(mut self, args: ExtraArgs) -> Self {
        self.args = args;
        self
    }

    pub fn with_interrupt(mut self, interrupt: InterruptSignal) -> Self {
        self.interrupt = Some(interrupt);
        self
    }
}

/// Evaluate `function` once per dataset row using the backends this build offers
///
/// The backend is shut down and the store closed on every path.
pub async fn evaluate<F>(dataset: Dataset, function: F, request: EvaluationRequest) -> Result<EvaluationReport>
where
    F: EvaluationFunction,
{
    evaluate_with(&BackendRegistry::from_features(), dataset, function, request).await
}

/// [`evaluate`] with an explicit backend registry
pub async fn evaluate_with<F>(
    registry: &BackendRegistry,
    dataset: Dataset,
    function: F,
    request: EvaluationRequest,
) -> Result<EvaluationReport>
where
    F: EvaluationFunction,
{
    let store: Option<Arc<dyn ResultStore>> = match &request.store {
        Some(config) => Some(Arc::new(SqliteStore::from_config(config).await?)),
        None => None,
    };
    let backend = match registry.build(&request.backend) {
        Ok(backend) => backend,
        Err(e) => {
            if let Some(store) = &store {
                store.close().await;
            }
            return Err(e);
        }
    };

    let mut evaluator = Evaluator::new(backend).with_execution(request.execution);
    if let Some(store) = store.clone() {
        evaluator = evaluator.with_store(store);
    }
    if let Some(interrupt) = request.interrupt {
        evaluator = evaluator.with_interrupt(interrupt);
    }

    let result = evaluator
        .run(dataset, function, request.output_columns, request.args)
        .await;

    evaluator.shutdown().await;
    if let Some(store) = &store {
        store.close().await;
    }
    result
}

/// Long-lived run loop owning one backend
#[derive(Debug)]
pub struct Evaluator {
    backend: Box<dyn Mapper>,
    store: Option<Arc<dyn ResultStore>>,
    execution: ExecutionConfig,
    interrupt: InterruptSignal,
    progress: watch::Sender<Progress>,
}

impl Evaluator {
    pub fn new(backend: Box<dyn Mapper>) -> Self {
        let (progress, _) = watch::channel(Progress::default());
        Self {
            backend,
            store: None,
            execution: ExecutionConfig::default(),
            interrupt: InterruptSignal::new(),
            progress,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_execution(mut self, execution: ExecutionConfig) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_interrupt(mut self, interrupt: InterruptSignal) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn backend(&self) -> &dyn Mapper {
        self.backend.as_ref()
    }

    /// Signal that stops the current run
    pub fn interrupt(&self) -> &InterruptSignal {
        &self.interrupt
    }

    /// Completed-task counts of the current run
    pub fn subscribe_progress(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    /// Run one evaluation over `dataset`
    ///
    /// An interrupt raised before or during dispatch ends this run; the
    /// signal is lowered again once dispatch returns.
    pub async fn run<F>(
        &self,
        mut dataset: Dataset,
        function: F,
        output_columns: Vec<OutputColumn>,
        args: ExtraArgs,
    ) -> Result<EvaluationReport>
    where
        F: EvaluationFunction,
    {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        log_run_operation("evaluate", run_id, "started", Some(self.backend.kind().as_str()));

        if self.execution.batch_size == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "execution.batch_size",
                "0",
                "batch size must be positive (leave unset for a single batch)",
            )
            .into());
        }
        if dataset.drop_column(EXCEPTION_COLUMN) {
            warn!(run_id = %run_id, "Dropping the '{EXCEPTION_COLUMN}' column of the input");
        }
        let schema = self.output_schema(&dataset, output_columns)?;

        let reconciliation = reconcile(
            &dataset,
            &schema,
            self.store.as_deref(),
            self.execution.resume,
        )
        .await?;
        let total = dataset.len();
        let residual = reconciliation.residual.len();
        let resumed = reconciliation.resumed;

        let mut sink = ResultSink::new(run_id, reconciliation.table, self.store.clone());
        let mut interrupted = false;

        if residual == 0 {
            warn!(run_id = %run_id, "No row to compute, something may be wrong");
        } else {
            info!(run_id = %run_id, rows = residual, "Rows to compute");
            let driven = self
                .drive(run_id, &dataset, reconciliation.residual, function, args, &mut sink)
                .await;
            // an interrupt ends one run only
            self.interrupt.reset();
            interrupted = driven?;
        }

        let stats = RunStats {
            run_id,
            total,
            residual,
            resumed,
            succeeded: sink.succeeded(),
            failed: sink.failed(),
            interrupted,
            started_at,
            finished_at: Utc::now(),
        };
        log_run_operation(
            "evaluate",
            run_id,
            if interrupted { "interrupted" } else { "finished" },
            None,
        );
        info!(
            run_id = %run_id,
            succeeded = stats.succeeded,
            failed = stats.failed,
            resumed = stats.resumed,
            elapsed_ms = (stats.finished_at - stats.started_at).num_milliseconds(),
            "Evaluation finished"
        );

        Ok(EvaluationReport {
            table: sink.into_table(),
            stats,
        })
    }

    /// Release the backend; safe to call repeatedly
    pub async fn shutdown(&self) {
        self.backend.shutdown().await;
    }

    fn output_schema(&self, dataset: &Dataset, mut outputs: Vec<OutputColumn>) -> Result<TableSchema> {
        if outputs.is_empty() {
            if self.backend.requires_output_schema() {
                return Err(ConfigurationError::MissingOutputSchema {
                    backend: self.backend.kind().to_string(),
                }
                .into());
            }
            outputs.push(OutputColumn::new(DEFAULT_OUTPUT_COLUMN, Value::String(String::new())));
        }

        let mut seen = HashSet::new();
        for column in &outputs {
            if column.name == EXCEPTION_COLUMN {
                return Err(ConfigurationError::reserved_column(EXCEPTION_COLUMN).into());
            }
            if !seen.insert(column.name.as_str()) || dataset.has_column(&column.name) {
                return Err(ConfigurationError::DuplicateColumn {
                    column: column.name.clone(),
                }
                .into());
            }
        }

        if self.store.is_some() {
            let reserved = dataset
                .columns()
                .iter()
                .map(String::as_str)
                .chain(outputs.iter().map(|c| c.name.as_str()))
                .find(|name| RESERVED_STORE_COLUMNS.contains(name));
            if let Some(name) = reserved {
                return Err(ConfigurationError::reserved_column(name).into());
            }
        }

        Ok(TableSchema::new(dataset.columns().to_vec(), outputs))
    }

    /// Dispatch the residual tasks batch by batch; returns whether the run was interrupted
    async fn drive<F>(
        &self,
        run_id: Uuid,
        dataset: &Dataset,
        residual: Vec<TaskId>,
        function: F,
        args: ExtraArgs,
        sink: &mut ResultSink,
    ) -> Result<bool>
    where
        F: EvaluationFunction,
    {
        let mut tasks = dataset.select(&residual).into_records();
        if self.execution.shuffle_rows {
            tasks.shuffle(&mut rand::thread_rng());
        }

        let _ctrl_c = self
            .execution
            .handle_ctrl_c
            .then(|| self.interrupt.install_ctrl_c_handler());

        let job = isolated_job(Arc::new(function), Arc::new(args));
        // backends watch a run-scoped signal so work left over from an
        // interrupted run stays cancelled after the operator signal is lowered
        let cancel = InterruptSignal::new();
        let ctx = DispatchContext::new(job, cancel.clone());
        let batches = batch(tasks, self.execution.batch_size);
        let batch_count = batches.len();
        let mut progress = ProgressReporter::start(run_id, &self.progress, residual.len());

        for (index, tasks) in batches.into_iter().enumerate() {
            if self.interrupt.is_triggered() {
                break;
            }

            let expected = tasks.len();
            debug!(run_id = %run_id, batch = index, batches = batch_count, size = expected, "Dispatching batch");
            let mut stream = self.backend.dispatch(ctx.clone(), tasks)?;
            let mut received = 0;

            loop {
                tokio::select! {
                    biased;
                    _ = self.interrupt.triggered() => {
                        cancel.trigger();
                        drain(&mut stream, sink, &mut progress).await?;
                        break;
                    }
                    next = stream.next() => match next {
                        Some(Ok(Attempt::Completed(outcome))) => {
                            sink.commit(&outcome).await?;
                            progress.record();
                            received += 1;
                        }
                        Some(Ok(Attempt::Interrupted(task_id))) => {
                            warn!(run_id = %run_id, task_id = %task_id, "Stopping mapper loop");
                            self.interrupt.trigger();
                            cancel.trigger();
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => break,
                    }
                }
            }

            if self.interrupt.is_triggered() {
                break;
            }
            if received < expected {
                return Err(BackendError::IncompleteBatch { expected, received }.into());
            }
        }

        let interrupted = self.interrupt.is_triggered();
        if interrupted {
            warn!(
                run_id = %run_id,
                committed = sink.committed(),
                residual = residual.len(),
                "Stopping mapper loop. Reason: operator interrupt"
            );
        }
        Ok(interrupted)
    }
}

/// Commit whatever the stream can yield without waiting
async fn drain(
    stream: &mut AttemptStream,
    sink: &mut ResultSink,
    progress: &mut ProgressReporter<'_>,
) -> Result<()> {
    while let Some(Some(next)) = stream.next().now_or_never() {
        match next {
            Ok(Attempt::Completed(outcome)) => {
                sink.commit(&outcome).await?;
                progress.record();
            }
            Ok(Attempt::Interrupted(_)) => {}
            Err(e) => {
                warn!(error = %e, "Backend failed while draining after interrupt");
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use crate::database::MemoryStore;
    use crate::error::EvaluatorError;
    use crate::execution::backend::SerialBackend;
    use crate::execution::isolation::EvalError;
    use crate::models::Row;
    use serde_json::json;

    fn dataset(values: &[i64]) -> Dataset {
        Dataset::from_rows(
            values
                .iter()
                .map(|v| [("value".to_string(), json!(v))].into_iter().collect::<Row>())
                .collect(),
        )
        .unwrap()
    }

    fn times_ten(row: &Row, _args: &ExtraArgs) -> std::result::Result<Row, EvalError> {
        let value = row.get("value").and_then(Value::as_i64).unwrap_or_default();
        Ok([("result".to_string(), json!(value * 10))].into_iter().collect())
    }

    fn serial() -> Evaluator {
        Evaluator::new(Box::new(SerialBackend::new()))
    }

    #[tokio::test]
    async fn default_output_column_is_data() {
        let report = serial()
            .run(dataset(&[1]), times_ten, vec![], ExtraArgs::new())
            .await
            .unwrap();
        assert_eq!(
            report.table.column_names(),
            vec!["value", DEFAULT_OUTPUT_COLUMN, EXCEPTION_COLUMN]
        );
        // undeclared outputs are ignored
        assert_eq!(report.table.value(&TaskId::from(0usize), "data"), Some(Value::Null));
    }

    #[tokio::test]
    async fn exception_is_a_reserved_output() {
        let err = serial()
            .run(
                dataset(&[1]),
                times_ten,
                vec![OutputColumn::new("exception", Value::Null)],
                ExtraArgs::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: The 'exception' column can not be one of the new columns"
        );
    }

    #[tokio::test]
    async fn store_columns_are_reserved_with_a_store() {
        let evaluator = serial().with_store(Arc::new(MemoryStore::new()));
        let err = evaluator
            .run(
                dataset(&[1]),
                times_ten,
                vec![OutputColumn::new("attempted", Value::Null)],
                ExtraArgs::new(),
            )
            .await
            .unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[tokio::test]
    async fn duplicate_outputs_are_rejected() {
        let err = serial()
            .run(
                dataset(&[1]),
                times_ten,
                vec![
                    OutputColumn::new("result", json!(0)),
                    OutputColumn::new("result", json!(1)),
                ],
                ExtraArgs::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EvaluatorError::Configuration(ConfigurationError::DuplicateColumn { .. })
        ));
    }

    #[tokio::test]
    async fn input_exception_column_is_dropped() {
        let rows: Vec<Row> = vec![[
            ("value".to_string(), json!(2)),
            ("exception".to_string(), json!("stale")),
        ]
        .into_iter()
        .collect()];
        let report = serial()
            .run(
                Dataset::from_rows(rows).unwrap(),
                times_ten,
                vec![OutputColumn::new("result", json!(0))],
                ExtraArgs::new(),
            )
            .await
            .unwrap();
        let row = report.table.get(&TaskId::from(0usize)).unwrap();
        assert_eq!(row.exception, None);
        assert_eq!(row.outputs.get("result"), Some(&json!(20)));
        assert!(!row.inputs.contains_key("exception"));
    }

    #[tokio::test]
    async fn empty_dataset_has_nothing_to_do() {
        let report = serial()
            .run(
                Dataset::new(["value"]),
                times_ten,
                vec![OutputColumn::new("result", json!(0))],
                ExtraArgs::new(),
            )
            .await
            .unwrap();
        assert!(report.stats.nothing_to_do());
        assert!(report.table.is_empty());
    }

    #[tokio::test]
    async fn progress_is_published() {
        let evaluator = serial().with_execution(ExecutionConfig {
            batch_size: Some(2),
            ..ExecutionConfig::default()
        });
        let progress = evaluator.subscribe_progress();
        let report = evaluator
            .run(
                dataset(&[1, 2, 3, 4, 5]),
                times_ten,
                vec![OutputColumn::new("result", json!(0))],
                ExtraArgs::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.stats.completed(), 5);
        assert_eq!(*progress.borrow(), Progress { completed: 5, total: 5 });
        assert_eq!(evaluator.backend().kind(), BackendKind::Serial);
    }

    #[tokio::test]
    async fn evaluator_is_reusable_after_an_interrupt() {
        let evaluator = serial();
        let columns = || vec![OutputColumn::new("result", json!(0))];

        evaluator.interrupt().trigger();
        let first = evaluator
            .run(dataset(&[1, 2, 3]), times_ten, columns(), ExtraArgs::new())
            .await
            .unwrap();
        assert!(first.stats.interrupted);
        assert_eq!(first.stats.completed(), 0);
        assert!(!evaluator.interrupt().is_triggered());

        let second = evaluator
            .run(dataset(&[1, 2, 3]), times_ten, columns(), ExtraArgs::new())
            .await
            .unwrap();
        assert!(!second.stats.interrupted);
        assert_eq!(second.stats.succeeded, 3);
        assert_eq!(
            second.table.value(&TaskId::from(2usize), "result"),
            Some(json!(30))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn interrupted_work_stays_cancelled_on_a_reused_pool() {
        use crate::execution::backend::WorkerPoolBackend;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let evaluator = Evaluator::new(Box::new(WorkerPoolBackend::start(1, Some(1)).unwrap()));
        let columns = || vec![OutputColumn::new("result", json!(0))];
        let first_calls = Arc::new(AtomicUsize::new(0));
        let interrupting = {
            let calls = Arc::clone(&first_calls);
            move |row: &Row, args: &ExtraArgs| -> std::result::Result<Row, EvalError> {
                std::thread::sleep(std::time::Duration::from_millis(20));
                if calls.fetch_add(1, Ordering::SeqCst) >= 1 {
                    return Err(EvalError::Interrupted);
                }
                times_ten(row, args)
            }
        };

        let first = evaluator
            .run(dataset(&[1, 2, 3, 4, 5, 6, 7, 8]), interrupting, columns(), ExtraArgs::new())
            .await
            .unwrap();
        assert!(first.stats.interrupted);

        let second = evaluator
            .run(dataset(&[1, 2, 3]), times_ten, columns(), ExtraArgs::new())
            .await
            .unwrap();
        assert!(!second.stats.interrupted);
        assert_eq!(second.stats.succeeded, 3);

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(first_calls.load(Ordering::SeqCst) < 8);
        evaluator.shutdown().await;
    }

    #[tokio::test]
    async fn ctrl_c_handling_does_not_leak_into_later_runs() {
        let evaluator = serial().with_execution(ExecutionConfig {
            handle_ctrl_c: true,
            ..ExecutionConfig::default()
        });
        for _ in 0..3 {
            let report = evaluator
                .run(
                    dataset(&[1, 2]),
                    times_ten,
                    vec![OutputColumn::new("result", json!(0))],
                    ExtraArgs::new(),
                )
                .await
                .unwrap();
            assert_eq!(report.stats.succeeded, 2);
        }
        assert!(!evaluator.interrupt().is_triggered());
    }

    #[tokio::test]
    async fn zero_batch_size_is_rejected_before_work() {
        let request = EvaluationRequest::new().with_batch_size(0);
        let err = evaluate(dataset(&[1]), times_ten, request).await.unwrap_err();
        assert!(err.is_configuration_error());
    }
}
